//! Vector Store Adapter
//!
//! One nearest-neighbour index per modality plus a metadata record per id.
//!
//! - `upsert` inserts or replaces the embedding of each supplied modality;
//!   omitted embeddings and metadata are left as they were
//! - `query` returns hits ascending by distance, never padded
//! - filters are AND-ed across fields, OR-ed within a list
//!
//! Backends:
//! - [`MemoryVectorStore`]: exact brute-force search, JSON snapshots
//! - [`HnswVectorStore`]: USearch HNSW (feature `vector-search`)

mod filter;
mod memory;

#[cfg(feature = "vector-search")]
mod hnsw;

pub use filter::{FilterValue, MetadataFilter, MetadataRecord, MetadataValue};
pub use memory::{MemoryStoreConfig, MemoryVectorStore};

#[cfg(feature = "vector-search")]
pub use hnsw::{HnswConfig, HnswVectorStore};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::embeddings::cosine_similarity;

// ============================================================================
// MODALITY & METRIC
// ============================================================================

/// Embedding space an index serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Text,
    Audio,
}

impl Modality {
    pub const ALL: [Modality; 2] = [Modality::Text, Modality::Audio];

    pub fn as_str(&self) -> &'static str {
        match self {
            Modality::Text => "text",
            Modality::Audio => "audio",
        }
    }
}

impl std::fmt::Display for Modality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Distance metric used by one modality's index
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    /// `1 - cos(a, b)`, clamped at zero
    #[default]
    Cosine,
    /// L2 distance
    Euclidean,
}

impl DistanceMetric {
    /// Distance between two vectors of equal length
    pub fn distance(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            DistanceMetric::Cosine => {
                let norm_a = a.iter().map(|x| x * x).sum::<f32>();
                let norm_b = b.iter().map(|x| x * x).sum::<f32>();
                if norm_a == 0.0 || norm_b == 0.0 {
                    return 1.0;
                }
                (1.0 - cosine_similarity(a, b)).max(0.0)
            }
            DistanceMetric::Euclidean => crate::embeddings::euclidean_distance(a, b),
        }
    }
}

impl std::str::FromStr for DistanceMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cosine" | "cos" => Ok(DistanceMetric::Cosine),
            "euclidean" | "l2" => Ok(DistanceMetric::Euclidean),
            other => Err(format!("unknown distance metric: {}", other)),
        }
    }
}

// ============================================================================
// RESULTS & ERRORS
// ============================================================================

/// A single nearest-neighbour hit
#[derive(Debug, Clone, PartialEq)]
pub struct StoreHit {
    pub id: String,
    pub distance: f32,
    pub metadata: Option<MetadataRecord>,
}

/// Per-modality vector counts
pub type StoreStats = BTreeMap<Modality, usize>;

/// Vector store error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Vector length does not match the index dimension
    #[error("Invalid dimensions: expected {expected}, got {got}")]
    InvalidDimensions { expected: usize, got: usize },
    /// A batch list has a different length than `ids`
    #[error("Batch length mismatch: {field} has {got} entries, expected {expected}")]
    BatchLengthMismatch {
        field: &'static str,
        expected: usize,
        got: usize,
    },
    /// A batch failed part-way; earlier entries were applied
    #[error("Batch failed after {applied} of {total} items: {source}")]
    PartialBatch {
        applied: usize,
        total: usize,
        #[source]
        source: Box<StoreError>,
    },
    /// Underlying index failure
    #[error("Index error: {0}")]
    Index(String),
    /// Snapshot save/load failure
    #[error("Persistence error: {0}")]
    Persistence(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),
}

// ============================================================================
// TRAIT
// ============================================================================

/// Storage and nearest-neighbour search over per-modality embeddings.
///
/// Implementations use interior locking: concurrent upserts to different ids
/// are independent, and an upsert racing a query on the same id is
/// last-write-wins.
pub trait VectorStore: Send + Sync {
    /// Insert or replace the supplied embeddings and metadata for `id`
    fn upsert(
        &self,
        id: &str,
        text_embedding: Option<&[f32]>,
        audio_embedding: Option<&[f32]>,
        metadata: Option<&MetadataRecord>,
    ) -> Result<(), StoreError>;

    /// Batch form of [`upsert`](Self::upsert).
    ///
    /// Every supplied list must be as long as `ids`. The default applies the
    /// batch item by item and reports how far it got on failure.
    fn upsert_batch(
        &self,
        ids: &[String],
        text_embeddings: Option<&[Vec<f32>]>,
        audio_embeddings: Option<&[Vec<f32>]>,
        metadatas: Option<&[MetadataRecord]>,
    ) -> Result<(), StoreError> {
        check_batch_lengths(ids.len(), text_embeddings, audio_embeddings, metadatas)?;

        for (i, id) in ids.iter().enumerate() {
            let text = text_embeddings.map(|t| t[i].as_slice());
            let audio = audio_embeddings.map(|a| a[i].as_slice());
            let metadata = metadatas.map(|m| &m[i]);
            if let Err(e) = self.upsert(id, text, audio, metadata) {
                return Err(StoreError::PartialBatch {
                    applied: i,
                    total: ids.len(),
                    source: Box::new(e),
                });
            }
        }
        Ok(())
    }

    /// Nearest neighbours of `embedding` in one modality, ascending by
    /// distance. Returns fewer than `top_k` hits when fewer ids match.
    fn query(
        &self,
        modality: Modality,
        embedding: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<StoreHit>, StoreError>;

    /// Delete `id` from every modality and drop its metadata.
    /// Returns whether anything was removed.
    fn remove(&self, id: &str) -> Result<bool, StoreError>;

    /// Vector count per modality
    fn stats(&self) -> Result<StoreStats, StoreError>;

    /// Persist pending state, for backends that have any
    fn flush(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Validate that every supplied batch list matches `expected`
pub(crate) fn check_batch_lengths(
    expected: usize,
    text_embeddings: Option<&[Vec<f32>]>,
    audio_embeddings: Option<&[Vec<f32>]>,
    metadatas: Option<&[MetadataRecord]>,
) -> Result<(), StoreError> {
    let lengths = [
        ("text_embeddings", text_embeddings.map(<[_]>::len)),
        ("audio_embeddings", audio_embeddings.map(<[_]>::len)),
        ("metadatas", metadatas.map(<[_]>::len)),
    ];
    for (field, len) in lengths {
        if let Some(got) = len {
            if got != expected {
                return Err(StoreError::BatchLengthMismatch {
                    field,
                    expected,
                    got,
                });
            }
        }
    }
    Ok(())
}
