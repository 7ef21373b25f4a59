//! Test Environment
//!
//! Isolated catalog + vector store instances for end-to-end tests:
//! - SQLite catalog and memory store snapshot in a temporary directory
//! - Engine and indexer wired to deterministic fixture models
//! - Reopen support for persistence checks

use std::path::{Path, PathBuf};
use std::sync::Arc;

use music_rag_core::catalog::{ItemCatalog, SqliteCatalog};
use music_rag_core::search::RetrievalEngine;
use music_rag_core::store::{MemoryStoreConfig, MemoryVectorStore, Modality, VectorStore};
use music_rag_core::{MusicIndexer, MusicItem};
use tempfile::TempDir;

use crate::mocks::{KeywordAudioEmbedder, KeywordReranker, KeywordTextEmbedder, TestDataFactory};

/// A complete retrieval stack over temporary storage.
///
/// The directory is deleted when the environment is dropped.
///
/// # Example
///
/// ```rust,ignore
/// let env = TestEnvironment::seeded();
/// let results = env.engine.search_by_text("calm piano", 5, env.catalog.as_ref())?;
/// ```
pub struct TestEnvironment {
    pub store: Arc<MemoryVectorStore>,
    pub catalog: Arc<SqliteCatalog>,
    pub engine: RetrievalEngine,
    pub indexer: MusicIndexer,
    /// Kept alive to prevent premature deletion
    _temp_dir: Option<TempDir>,
    root: PathBuf,
}

impl TestEnvironment {
    /// Empty environment in a fresh temporary directory
    pub fn new_temp() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir.path().to_path_buf();
        let mut env = Self::open_at(&root);
        env._temp_dir = Some(temp_dir);
        env
    }

    /// Environment seeded with [`TestDataFactory::catalog`]
    pub fn seeded() -> Self {
        let env = Self::new_temp();
        env.index_all(TestDataFactory::catalog());
        env
    }

    /// Open (or reopen) an environment rooted at `root`. The directory is
    /// NOT deleted afterwards.
    pub fn open_at(root: &Path) -> Self {
        let store = Arc::new(
            MemoryVectorStore::open(MemoryStoreConfig {
                snapshot_path: Some(root.join("vectors.json")),
                ..Default::default()
            })
            .expect("Failed to open memory store"),
        );
        let catalog = Arc::new(
            SqliteCatalog::new(Some(root.join("catalog.db"))).expect("Failed to open catalog"),
        );
        let text = Arc::new(KeywordTextEmbedder);
        let audio = Arc::new(KeywordAudioEmbedder);

        let engine = RetrievalEngine::new(store.clone(), text.clone())
            .with_audio_embedder(audio.clone())
            .with_reranker(Arc::new(KeywordReranker));
        let indexer = MusicIndexer::new(store.clone(), catalog.clone(), text)
            .with_audio_embedder(audio);

        Self {
            store,
            catalog,
            engine,
            indexer,
            _temp_dir: None,
            root: root.to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Index items in one batch and flush
    pub fn index_all(&self, items: Vec<MusicItem>) -> Vec<MusicItem> {
        let indexed = self.indexer.index_batch(items).expect("Failed to index items");
        self.indexer.flush().expect("Failed to flush store");
        indexed
    }

    /// Number of vectors held for a modality
    pub fn vector_count(&self, modality: Modality) -> usize {
        self.store
            .stats()
            .map(|s| s.get(&modality).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    /// Number of catalogued items
    pub fn item_count(&self) -> usize {
        self.catalog.count().unwrap_or(0)
    }
}
