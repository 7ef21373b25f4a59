//! HNSW Vector Store
//!
//! Uses USearch for HNSW (Hierarchical Navigable Small World) indexing, one
//! index per modality, with metadata filters evaluated as a search predicate.
//!
//! Features:
//! - Sub-millisecond approximate queries
//! - Cosine or L2 distance per modality
//! - Incremental updates and removals
//! - Persistence of index, key mappings and metadata to a directory

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use usearch::{Index, IndexOptions, MetricKind, ScalarKind};

use super::{
    DistanceMetric, MetadataFilter, MetadataRecord, Modality, StoreError, StoreHit, StoreStats,
    VectorStore,
};

// ============================================================================
// CONSTANTS
// ============================================================================

/// HNSW connectivity parameter (higher = better recall, more memory)
pub const DEFAULT_CONNECTIVITY: usize = 16;

/// HNSW expansion factor for index building
pub const DEFAULT_EXPANSION_ADD: usize = 128;

/// HNSW expansion factor for search (higher = better recall, slower)
pub const DEFAULT_EXPANSION_SEARCH: usize = 64;

const METADATA_FILE: &str = "metadata.json";

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Configuration for [`HnswVectorStore`]
#[derive(Debug, Clone)]
pub struct HnswConfig {
    pub connectivity: usize,
    pub expansion_add: usize,
    pub expansion_search: usize,
    pub text_metric: DistanceMetric,
    pub audio_metric: DistanceMetric,
    /// Fixed text dimension; adopted from the first vector when `None`
    pub text_dimensions: Option<usize>,
    /// Fixed audio dimension; adopted from the first vector when `None`
    pub audio_dimensions: Option<usize>,
    /// Directory that `flush` writes to and `open` reads from
    pub directory: Option<PathBuf>,
}

impl Default for HnswConfig {
    fn default() -> Self {
        Self {
            connectivity: DEFAULT_CONNECTIVITY,
            expansion_add: DEFAULT_EXPANSION_ADD,
            expansion_search: DEFAULT_EXPANSION_SEARCH,
            text_metric: DistanceMetric::Cosine,
            audio_metric: DistanceMetric::Cosine,
            text_dimensions: None,
            audio_dimensions: None,
            directory: None,
        }
    }
}

impl HnswConfig {
    fn metric(&self, modality: Modality) -> DistanceMetric {
        match modality {
            Modality::Text => self.text_metric,
            Modality::Audio => self.audio_metric,
        }
    }

    fn dimensions(&self, modality: Modality) -> Option<usize> {
        match modality {
            Modality::Text => self.text_dimensions,
            Modality::Audio => self.audio_dimensions,
        }
    }

    fn index_options(&self, dimensions: usize, metric: DistanceMetric) -> IndexOptions {
        IndexOptions {
            dimensions,
            metric: match metric {
                DistanceMetric::Cosine => MetricKind::Cos,
                DistanceMetric::Euclidean => MetricKind::L2sq,
            },
            quantization: ScalarKind::F32,
            connectivity: self.connectivity,
            expansion_add: self.expansion_add,
            expansion_search: self.expansion_search,
            multi: false,
        }
    }
}

// ============================================================================
// PER-MODALITY INDEX
// ============================================================================

#[derive(Serialize, Deserialize)]
struct KeyMappings {
    dimensions: usize,
    metric: DistanceMetric,
    key_to_id: HashMap<String, u64>,
    next_id: u64,
}

struct ModalityIndex {
    index: Index,
    dimensions: usize,
    metric: DistanceMetric,
    key_to_id: HashMap<String, u64>,
    id_to_key: HashMap<u64, String>,
    next_id: u64,
}

impl ModalityIndex {
    fn create(config: &HnswConfig, dimensions: usize, metric: DistanceMetric) -> Result<Self, StoreError> {
        let index = Index::new(&config.index_options(dimensions, metric))
            .map_err(|e| StoreError::Index(format!("Index creation failed: {}", e)))?;
        Ok(Self {
            index,
            dimensions,
            metric,
            key_to_id: HashMap::new(),
            id_to_key: HashMap::new(),
            next_id: 0,
        })
    }

    fn check_dimensions(&self, vector: &[f32]) -> Result<(), StoreError> {
        if vector.len() != self.dimensions {
            return Err(StoreError::InvalidDimensions {
                expected: self.dimensions,
                got: vector.len(),
            });
        }
        Ok(())
    }

    /// usearch requires capacity to be reserved before `add`
    fn ensure_capacity(&self) -> Result<(), StoreError> {
        let capacity = self.index.capacity();
        if self.index.size() >= capacity {
            let new_capacity = std::cmp::max(capacity * 2, 16);
            self.index
                .reserve(new_capacity)
                .map_err(|e| StoreError::Index(format!("Failed to reserve capacity: {}", e)))?;
        }
        Ok(())
    }

    fn add(&mut self, key: &str, vector: &[f32]) -> Result<(), StoreError> {
        self.check_dimensions(vector)?;

        if let Some(&existing) = self.key_to_id.get(key) {
            self.index
                .remove(existing)
                .map_err(|e| StoreError::Index(e.to_string()))?;
            self.ensure_capacity()?;
            self.index
                .add(existing, vector)
                .map_err(|e| StoreError::Index(e.to_string()))?;
            return Ok(());
        }

        self.ensure_capacity()?;
        let id = self.next_id;
        self.next_id += 1;
        self.index
            .add(id, vector)
            .map_err(|e| StoreError::Index(e.to_string()))?;
        self.key_to_id.insert(key.to_string(), id);
        self.id_to_key.insert(id, key.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<bool, StoreError> {
        match self.key_to_id.remove(key) {
            Some(id) => {
                self.id_to_key.remove(&id);
                self.index
                    .remove(id)
                    .map_err(|e| StoreError::Index(e.to_string()))?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn len(&self) -> usize {
        self.key_to_id.len()
    }

    /// Convert a raw usearch distance to the store's metric
    fn normalize_distance(&self, raw: f32) -> f32 {
        if !raw.is_finite() {
            return 1.0;
        }
        match self.metric {
            DistanceMetric::Cosine => raw.max(0.0),
            DistanceMetric::Euclidean => raw.max(0.0).sqrt(),
        }
    }

    fn save(&self, base: &Path) -> Result<(), StoreError> {
        let path_str = base
            .to_str()
            .ok_or_else(|| StoreError::Persistence("Invalid path".to_string()))?;
        self.index
            .save(path_str)
            .map_err(|e| StoreError::Persistence(e.to_string()))?;

        let mappings = KeyMappings {
            dimensions: self.dimensions,
            metric: self.metric,
            key_to_id: self.key_to_id.clone(),
            next_id: self.next_id,
        };
        std::fs::write(base.with_extension("mappings.json"), serde_json::to_vec(&mappings)?)?;
        Ok(())
    }

    fn load(config: &HnswConfig, base: &Path) -> Result<Self, StoreError> {
        let mappings: KeyMappings =
            serde_json::from_slice(&std::fs::read(base.with_extension("mappings.json"))?)?;
        let path_str = base
            .to_str()
            .ok_or_else(|| StoreError::Persistence("Invalid path".to_string()))?;

        let index = Index::new(&config.index_options(mappings.dimensions, mappings.metric))
            .map_err(|e| StoreError::Persistence(e.to_string()))?;
        index
            .load(path_str)
            .map_err(|e| StoreError::Persistence(e.to_string()))?;

        let id_to_key = mappings
            .key_to_id
            .iter()
            .map(|(k, v)| (*v, k.clone()))
            .collect();

        Ok(Self {
            index,
            dimensions: mappings.dimensions,
            metric: mappings.metric,
            key_to_id: mappings.key_to_id,
            id_to_key,
            next_id: mappings.next_id,
        })
    }
}

struct HnswState {
    text: Option<ModalityIndex>,
    audio: Option<ModalityIndex>,
    metadata: HashMap<String, MetadataRecord>,
}

impl HnswState {
    fn slot(&mut self, modality: Modality) -> &mut Option<ModalityIndex> {
        match modality {
            Modality::Text => &mut self.text,
            Modality::Audio => &mut self.audio,
        }
    }

    fn get(&self, modality: Modality) -> Option<&ModalityIndex> {
        match modality {
            Modality::Text => self.text.as_ref(),
            Modality::Audio => self.audio.as_ref(),
        }
    }
}

// ============================================================================
// STORE
// ============================================================================

/// Approximate vector store backed by one USearch index per modality
pub struct HnswVectorStore {
    config: HnswConfig,
    state: Mutex<HnswState>,
}

impl HnswVectorStore {
    /// Create an empty store. Indexes are created on first insert unless a
    /// dimension is configured.
    pub fn new(config: HnswConfig) -> Result<Self, StoreError> {
        let mut state = HnswState {
            text: None,
            audio: None,
            metadata: HashMap::new(),
        };
        for modality in Modality::ALL {
            if let Some(dims) = config.dimensions(modality) {
                *state.slot(modality) =
                    Some(ModalityIndex::create(&config, dims, config.metric(modality))?);
            }
        }
        Ok(Self {
            config,
            state: Mutex::new(state),
        })
    }

    /// Load persisted state from `config.directory` when present, otherwise
    /// start empty
    pub fn open(config: HnswConfig) -> Result<Self, StoreError> {
        let store = Self::new(config)?;
        if let Some(dir) = store.config.directory.clone() {
            if dir.exists() {
                store.load_from(&dir)?;
            }
        }
        Ok(store)
    }

    fn index_base(dir: &Path, modality: Modality) -> PathBuf {
        dir.join(format!("{}.usearch", modality))
    }

    fn lock(&self) -> Result<MutexGuard<'_, HnswState>, StoreError> {
        self.state
            .lock()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))
    }

    /// Write every index, its key mappings and the metadata to `dir`
    pub fn save_to(&self, dir: &Path) -> Result<(), StoreError> {
        std::fs::create_dir_all(dir)?;
        let state = self.lock()?;
        for modality in Modality::ALL {
            if let Some(index) = state.get(modality) {
                index.save(&Self::index_base(dir, modality))?;
            }
        }
        std::fs::write(dir.join(METADATA_FILE), serde_json::to_vec(&state.metadata)?)?;
        tracing::debug!(dir = %dir.display(), "Saved HNSW store");
        Ok(())
    }

    fn load_from(&self, dir: &Path) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        for modality in Modality::ALL {
            let base = Self::index_base(dir, modality);
            if base.exists() {
                let index = ModalityIndex::load(&self.config, &base)?;
                tracing::info!(
                    modality = %modality,
                    vectors = index.len(),
                    "Loaded HNSW index"
                );
                *state.slot(modality) = Some(index);
            }
        }
        let meta_path = dir.join(METADATA_FILE);
        if meta_path.exists() {
            state.metadata = serde_json::from_slice(&std::fs::read(meta_path)?)?;
        }
        Ok(())
    }

    fn insert(
        &self,
        state: &mut HnswState,
        modality: Modality,
        id: &str,
        vector: &[f32],
    ) -> Result<(), StoreError> {
        let slot = state.slot(modality);
        if slot.is_none() {
            *slot = Some(ModalityIndex::create(
                &self.config,
                vector.len(),
                self.config.metric(modality),
            )?);
        }
        match slot {
            Some(index) => index.add(id, vector),
            None => Err(StoreError::Index("index unavailable".to_string())),
        }
    }
}

impl VectorStore for HnswVectorStore {
    fn upsert(
        &self,
        id: &str,
        text_embedding: Option<&[f32]>,
        audio_embedding: Option<&[f32]>,
        metadata: Option<&MetadataRecord>,
    ) -> Result<(), StoreError> {
        let mut state = self.lock()?;

        for (modality, vector) in [(Modality::Text, text_embedding), (Modality::Audio, audio_embedding)] {
            if let (Some(index), Some(v)) = (state.get(modality), vector) {
                index.check_dimensions(v)?;
            }
        }

        if let Some(v) = text_embedding {
            self.insert(&mut state, Modality::Text, id, v)?;
        }
        if let Some(v) = audio_embedding {
            self.insert(&mut state, Modality::Audio, id, v)?;
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
        let state = self.lock()?;
        let Some(index) = state.get(modality) else {
            return Ok(vec![]);
        };
        if index.len() == 0 || top_k == 0 {
            return Ok(vec![]);
        }
        index.check_dimensions(embedding)?;

        let count = top_k.min(index.len());
        let matches = match filter.filter(|f| !f.is_empty()) {
            Some(f) => index.index.filtered_search(embedding, count, |key: u64| {
                index
                    .id_to_key
                    .get(&key)
                    .is_some_and(|id| f.matches_opt(state.metadata.get(id)))
            }),
            None => index.index.search(embedding, count),
        }
        .map_err(|e| StoreError::Index(format!("Search failed: {}", e)))?;

        let mut hits = Vec::with_capacity(matches.keys.len());
        for (key, distance) in matches.keys.iter().zip(matches.distances.iter()) {
            if let Some(id) = index.id_to_key.get(key) {
                hits.push(StoreHit {
                    id: id.clone(),
                    distance: index.normalize_distance(*distance),
                    metadata: state.metadata.get(id).cloned(),
                });
            }
        }
        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(hits)
    }

    fn remove(&self, id: &str) -> Result<bool, StoreError> {
        let mut state = self.lock()?;
        let mut removed = false;
        for modality in Modality::ALL {
            if let Some(index) = state.slot(modality).as_mut() {
                removed |= index.remove(id)?;
            }
        }
        removed |= state.metadata.remove(id).is_some();
        Ok(removed)
    }

    fn stats(&self) -> Result<StoreStats, StoreError> {
        let state = self.lock()?;
        Ok(Modality::ALL
            .iter()
            .map(|m| (*m, state.get(*m).map_or(0, ModalityIndex::len)))
            .collect())
    }

    fn flush(&self) -> Result<(), StoreError> {
        match &self.config.directory {
            Some(dir) => self.save_to(dir),
            None => Ok(()),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
