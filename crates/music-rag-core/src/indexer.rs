//! Indexing
//!
//! Embeds items and writes them to the vector store and the item catalog.
//! The store is written first, so a catalog failure leaves vectors whose
//! hits are dropped at retrieval as cache misses until the item is
//! re-indexed.

use std::sync::Arc;

use crate::catalog::ItemCatalog;
use crate::embeddings::{music_item_text, AudioEmbedder, TextEmbedder};
use crate::error::{RagError, Result};
use crate::models::MusicItem;
use crate::store::{MetadataRecord, VectorStore};

/// Largest batch accepted by `index_batch` unless configured otherwise
pub const DEFAULT_MAX_BATCH_SIZE: usize = 100;

/// Writes items into a store and catalog
pub struct MusicIndexer {
    store: Arc<dyn VectorStore>,
    catalog: Arc<dyn ItemCatalog>,
    text_embedder: Arc<dyn TextEmbedder>,
    audio_embedder: Option<Arc<dyn AudioEmbedder>>,
    max_batch_size: usize,
}

impl MusicIndexer {
    pub fn new(
        store: Arc<dyn VectorStore>,
        catalog: Arc<dyn ItemCatalog>,
        text_embedder: Arc<dyn TextEmbedder>,
    ) -> Self {
        Self {
            store,
            catalog,
            text_embedder,
            audio_embedder: None,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
        }
    }

    pub fn with_audio_embedder(mut self, embedder: Arc<dyn AudioEmbedder>) -> Self {
        self.audio_embedder = Some(embedder);
        self
    }

    pub fn with_max_batch_size(mut self, max: usize) -> Self {
        self.max_batch_size = max;
        self
    }

    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    /// Audio embedding for an item, if it has audio and an embedder exists.
    /// Failures degrade to a zero vector.
    fn embed_audio(&self, item: &MusicItem) -> Option<Vec<f32>> {
        let path = item.audio_path.as_deref()?;
        let Some(embedder) = &self.audio_embedder else {
            tracing::debug!(id = %item.id, "No audio embedder, skipping audio");
            return None;
        };
        match embedder.embed(path) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!(
                    id = %item.id,
                    path = %path.display(),
                    error = %e,
                    "Audio embedding failed, using zero vector"
                );
                Some(vec![0.0; embedder.dimensions()])
            }
        }
    }

    /// Index a single item, returning it with its embeddings attached
    pub fn index(&self, item: MusicItem) -> Result<MusicItem> {
        let mut item = item;
        validate_item(&item)?;

        let text = music_item_text(&item);
        let text_embedding = self.text_embedder.embed(&text)?;
        let audio_embedding = self.embed_audio(&item);
        let metadata = item.metadata.to_record();

        self.store.upsert(
            &item.id,
            Some(&text_embedding),
            audio_embedding.as_deref(),
            Some(&metadata),
        )?;

        item.text_embedding = Some(text_embedding);
        item.audio_embedding = audio_embedding;
        self.catalog.put_item(&item)?;

        tracing::info!(id = %item.id, title = %item.title, "Indexed music item");
        Ok(item)
    }

    /// Index several items. Text embeddings are computed in one batch call.
    pub fn index_batch(&self, items: Vec<MusicItem>) -> Result<Vec<MusicItem>> {
        if items.len() > self.max_batch_size {
            return Err(RagError::Validation(format!(
                "Batch size {} exceeds maximum of {}",
                items.len(),
                self.max_batch_size
            )));
        }
        if items.is_empty() {
            return Ok(items);
        }
        for item in &items {
            validate_item(item)?;
        }

        let texts: Vec<String> = items.iter().map(music_item_text).collect();
        let text_embeddings = self.text_embedder.embed_batch(&texts)?;
        if text_embeddings.len() != items.len() {
            return Err(RagError::Provider(crate::embeddings::EmbeddingError::EmbeddingFailed(
                format!(
                    "Expected {} embeddings, got {}",
                    items.len(),
                    text_embeddings.len()
                ),
            )));
        }

        let ids: Vec<String> = items.iter().map(|i| i.id.clone()).collect();
        let metadatas: Vec<MetadataRecord> = items.iter().map(|i| i.metadata.to_record()).collect();
        self.store
            .upsert_batch(&ids, Some(&text_embeddings), None, Some(&metadatas))?;

        // Audio for the subset of items that have it
        let mut indexed = Vec::with_capacity(items.len());
        let mut with_audio = 0;
        for (mut item, text_embedding) in items.into_iter().zip(text_embeddings) {
            if let Some(audio) = self.embed_audio(&item) {
                self.store.upsert(&item.id, None, Some(&audio), None)?;
                item.audio_embedding = Some(audio);
                with_audio += 1;
            }
            item.text_embedding = Some(text_embedding);
            indexed.push(item);
        }

        self.catalog.put_items(&indexed)?;

        tracing::info!(
            items = indexed.len(),
            with_audio,
            "Indexed batch of music items"
        );
        Ok(indexed)
    }

    /// Remove an item from the store and catalog
    pub fn remove(&self, id: &str) -> Result<bool> {
        let in_store = self.store.remove(id)?;
        let in_catalog = self.catalog.remove_item(id)?;
        Ok(in_store || in_catalog)
    }

    /// Persist store state, for backends that write to disk
    pub fn flush(&self) -> Result<()> {
        self.store.flush()?;
        Ok(())
    }
}

fn validate_item(item: &MusicItem) -> Result<()> {
    if item.id.trim().is_empty() {
        return Err(RagError::Validation("Item id cannot be empty".to_string()));
    }
    Ok(())
}
