//! In-Memory Vector Store
//!
//! Exact brute-force nearest-neighbour search behind a read/write lock.
//! Deterministic: equal distances come back in id insertion order. Suitable
//! for tests and catalogues up to a few tens of thousands of items.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{
    DistanceMetric, MetadataFilter, MetadataRecord, Modality, StoreError, StoreHit, StoreStats,
    VectorStore,
};

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Configuration for [`MemoryVectorStore`]
#[derive(Debug, Clone, Default)]
pub struct MemoryStoreConfig {
    pub text_metric: DistanceMetric,
    pub audio_metric: DistanceMetric,
    /// Fixed text dimension; adopted from the first vector when `None`
    pub text_dimensions: Option<usize>,
    /// Fixed audio dimension; adopted from the first vector when `None`
    pub audio_dimensions: Option<usize>,
    /// Snapshot file written by `flush`
    pub snapshot_path: Option<PathBuf>,
}

// ============================================================================
// PER-MODALITY INDEX
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FlatIndex {
    metric: DistanceMetric,
    dimensions: Option<usize>,
    entries: Vec<(String, Vec<f32>)>,
    #[serde(skip)]
    positions: HashMap<String, usize>,
}

impl FlatIndex {
    fn new(metric: DistanceMetric, dimensions: Option<usize>) -> Self {
        Self {
            metric,
            dimensions,
            entries: Vec::new(),
            positions: HashMap::new(),
        }
    }

    fn rebuild_positions(&mut self) {
        self.positions = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, (id, _))| (id.clone(), i))
            .collect();
    }

    fn check_dimensions(&self, vector: &[f32]) -> Result<(), StoreError> {
        match self.dimensions {
            Some(expected) if expected != vector.len() => Err(StoreError::InvalidDimensions {
                expected,
                got: vector.len(),
            }),
            _ => Ok(()),
        }
    }

    /// Replacing keeps the id's original slot
    fn insert(&mut self, id: &str, vector: &[f32]) {
        if self.dimensions.is_none() {
            self.dimensions = Some(vector.len());
        }
        match self.positions.get(id) {
            Some(&pos) => self.entries[pos].1 = vector.to_vec(),
            None => {
                self.positions.insert(id.to_string(), self.entries.len());
                self.entries.push((id.to_string(), vector.to_vec()));
            }
        }
    }

    fn remove(&mut self, id: &str) -> bool {
        match self.positions.remove(id) {
            Some(pos) => {
                self.entries.remove(pos);
                self.rebuild_positions();
                true
            }
            None => false,
        }
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MemoryState {
    text: FlatIndex,
    audio: FlatIndex,
    metadata: HashMap<String, MetadataRecord>,
}

impl MemoryState {
    fn index(&self, modality: Modality) -> &FlatIndex {
        match modality {
            Modality::Text => &self.text,
            Modality::Audio => &self.audio,
        }
    }
}

// ============================================================================
// STORE
// ============================================================================

/// Brute-force vector store
pub struct MemoryVectorStore {
    state: RwLock<MemoryState>,
    snapshot_path: Option<PathBuf>,
}

impl Default for MemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryVectorStore {
    /// Empty store with cosine distance for both modalities
    pub fn new() -> Self {
        Self::with_config(MemoryStoreConfig::default())
    }

    /// Empty store with custom configuration
    pub fn with_config(config: MemoryStoreConfig) -> Self {
        Self {
            state: RwLock::new(MemoryState {
                text: FlatIndex::new(config.text_metric, config.text_dimensions),
                audio: FlatIndex::new(config.audio_metric, config.audio_dimensions),
                metadata: HashMap::new(),
            }),
            snapshot_path: config.snapshot_path,
        }
    }

    /// Load the snapshot at `config.snapshot_path` if it exists, otherwise
    /// start empty. Later `flush` calls write back to the same file.
    pub fn open(config: MemoryStoreConfig) -> Result<Self, StoreError> {
        match config.snapshot_path.clone() {
            Some(path) if path.exists() => {
                let mut store = Self::load(&path)?;
                store.snapshot_path = Some(path);
                Ok(store)
            }
            _ => Ok(Self::with_config(config)),
        }
    }

    /// Write a JSON snapshot of every index and metadata record
    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        let state = self.read()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_vec(&*state)?;
        std::fs::write(path, json)?;
        tracing::debug!(
            path = %path.display(),
            text = state.text.len(),
            audio = state.audio.len(),
            "Saved vector store snapshot"
        );
        Ok(())
    }

    /// Restore a store from a JSON snapshot
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let bytes = std::fs::read(path)?;
        let mut state: MemoryState = serde_json::from_slice(&bytes)
            .map_err(|e| StoreError::Persistence(format!("{}: {}", path.display(), e)))?;
        state.text.rebuild_positions();
        state.audio.rebuild_positions();
        tracing::info!(
            path = %path.display(),
            text = state.text.len(),
            audio = state.audio.len(),
            "Loaded vector store snapshot"
        );
        Ok(Self {
            state: RwLock::new(state),
            snapshot_path: None,
        })
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryState>, StoreError> {
        self.state
            .read()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryState>, StoreError> {
        self.state
            .write()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))
    }
}

impl VectorStore for MemoryVectorStore {
    fn upsert(
        &self,
        id: &str,
        text_embedding: Option<&[f32]>,
        audio_embedding: Option<&[f32]>,
        metadata: Option<&MetadataRecord>,
    ) -> Result<(), StoreError> {
        let mut state = self.write()?;

        // Validate both modalities before touching either
        if let Some(v) = text_embedding {
            state.text.check_dimensions(v)?;
        }
        if let Some(v) = audio_embedding {
            state.audio.check_dimensions(v)?;
        }

        if let Some(v) = text_embedding {
            state.text.insert(id, v);
        }
        if let Some(v) = audio_embedding {
            state.audio.insert(id, v);
        }
        if let Some(m) = metadata {
            state.metadata.insert(id.to_string(), m.clone());
        }
        Ok(())
    }

    fn query(
        &self,
        modality: Modality,
        embedding: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<StoreHit>, StoreError> {
        let state = self.read()?;
        let index = state.index(modality);

        if index.entries.is_empty() || top_k == 0 {
            return Ok(vec![]);
        }
        index.check_dimensions(embedding)?;

        let filter = filter.filter(|f| !f.is_empty());
        let mut scored: Vec<(usize, f32)> = index
            .entries
            .iter()
            .enumerate()
            .filter(|(_, (id, _))| filter.is_none_or(|f| f.matches_opt(state.metadata.get(id))))
            .map(|(pos, (_, vector))| (pos, index.metric.distance(embedding, vector)))
            .collect();

        // Stable: equal distances keep insertion order
        scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);

        Ok(scored
            .into_iter()
            .map(|(pos, distance)| {
                let id = &index.entries[pos].0;
                StoreHit {
                    id: id.clone(),
                    distance,
                    metadata: state.metadata.get(id).cloned(),
                }
            })
            .collect())
    }

    fn remove(&self, id: &str) -> Result<bool, StoreError> {
        let mut state = self.write()?;
        let text = state.text.remove(id);
        let audio = state.audio.remove(id);
        let meta = state.metadata.remove(id).is_some();
        Ok(text || audio || meta)
    }

    fn stats(&self) -> Result<StoreStats, StoreError> {
        let state = self.read()?;
        Ok(Modality::ALL
            .iter()
            .map(|m| (*m, state.index(*m).len()))
            .collect())
    }

    fn flush(&self) -> Result<(), StoreError> {
        match &self.snapshot_path {
            Some(path) => self.save(path),
            None => Ok(()),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
