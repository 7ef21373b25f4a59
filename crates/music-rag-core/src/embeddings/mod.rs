//! Embedding Providers
//!
//! Contracts for turning text or audio into fixed-dimension vectors, plus
//! the canonical text composition used when indexing a music item.
//!
//! - [`TextEmbedder`] / [`AudioEmbedder`]: provider traits
//! - [`CachedTextEmbedder`]: LRU cache of query embeddings in front of any
//!   text embedder
//! - [`LocalTextEmbedder`]: fastembed ONNX inference (feature `embeddings`)
//! - [`FeatureAudioEmbedder`]: MFCC/chroma/spectral features of WAV files
//!   (feature `audio`)

mod cache;

#[cfg(feature = "audio")]
mod audio;

#[cfg(feature = "embeddings")]
mod local;

pub use cache::{CachedTextEmbedder, DEFAULT_CACHE_CAPACITY};

#[cfg(feature = "audio")]
pub use audio::{FeatureAudioEmbedder, DEFAULT_MAX_DURATION_SECS, DEFAULT_N_MFCC, DEFAULT_SAMPLE_RATE};

#[cfg(feature = "embeddings")]
pub use local::{LocalTextEmbedder, DEFAULT_TEXT_MODEL};

use std::path::Path;

use crate::models::MusicItem;

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Embedding error types
#[non_exhaustive]
#[derive(Debug, Clone, thiserror::Error)]
pub enum EmbeddingError {
    /// Failed to initialize the embedding model
    #[error("Model initialization failed: {0}")]
    ModelInit(String),
    /// Failed to generate embedding
    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),
    /// Invalid input (empty, unreadable file, etc.)
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

// ============================================================================
// PROVIDER TRAITS
// ============================================================================

/// Text to vector
pub trait TextEmbedder: Send + Sync {
    /// Embed a single text
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Embed several texts. Output order matches input order.
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    /// Output dimension
    fn dimensions(&self) -> usize;

    /// Human-readable model identifier
    fn model_name(&self) -> &str;
}

/// Audio file to vector
pub trait AudioEmbedder: Send + Sync {
    fn embed(&self, path: &Path) -> Result<Vec<f32>, EmbeddingError>;

    fn dimensions(&self) -> usize;
}

// ============================================================================
// ITEM TEXT
// ============================================================================

/// Canonical text of an item for the text index.
///
/// Fixed field order, empty fields omitted, parts joined with `" | "`.
pub fn music_item_text(item: &MusicItem) -> String {
    let mut parts = vec![
        format!("Title: {}", item.title),
        format!("Artist: {}", item.artist),
    ];

    if let Some(desc) = item.description.as_deref().filter(|d| !d.is_empty()) {
        parts.push(format!("Description: {}", desc));
    }

    let meta = &item.metadata;
    if let Some(genre) = meta.genre.as_deref().filter(|g| !g.is_empty()) {
        parts.push(format!("Genre: {}", genre));
    }
    if !meta.mood.is_empty() {
        parts.push(format!("Mood: {}", meta.mood.join(", ")));
    }
    if let Some(origin) = meta.cultural_origin.as_deref().filter(|o| !o.is_empty()) {
        parts.push(format!("Cultural Origin: {}", origin));
    }
    if !meta.instrumentation.is_empty() {
        parts.push(format!("Instruments: {}", meta.instrumentation.join(", ")));
    }

    parts.join(" | ")
}

// ============================================================================
// VECTOR MATH
// ============================================================================

/// Cosine similarity; 0.0 for mismatched lengths or zero vectors
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let mut dot = 0.0_f32;
    let mut norm_a = 0.0_f32;
    let mut norm_b = 0.0_f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denominator = (norm_a * norm_b).sqrt();
    if denominator > 0.0 {
        dot / denominator
    } else {
        0.0
    }
}

/// Euclidean distance; `f32::MAX` for mismatched lengths
#[inline]
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return f32::MAX;
    }

    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f32>()
        .sqrt()
}

/// Scale a vector to unit length in place. Zero vectors are left untouched.
pub fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MusicMetadata;

    #[test]
    fn test_music_item_text_full() {
        let item = MusicItem::new("1", "Bolero", "Ravel")
            .with_description("Orchestral crescendo")
            .with_metadata(MusicMetadata {
                genre: Some("Classical".to_string()),
                mood: vec!["building".to_string(), "hypnotic".to_string()],
                cultural_origin: Some("France".to_string()),
                instrumentation: vec!["snare".to_string(), "flute".to_string()],
                subgenre: Some("Impressionism".to_string()),
                ..Default::default()
            });

        assert_eq!(
            music_item_text(&item),
            "Title: Bolero | Artist: Ravel | Description: Orchestral crescendo | \
             Genre: Classical | Mood: building, hypnotic | Cultural Origin: France | \
             Instruments: snare, flute"
        );
    }

    #[test]
    fn test_music_item_text_omits_empty() {
        let item = MusicItem::new("1", "Untitled", "Unknown").with_description("");
        assert_eq!(music_item_text(&item), "Title: Untitled | Artist: Unknown");
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_normalize() {
        let mut v = vec![3.0, 4.0];
        normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);

        let mut zero = vec![0.0, 0.0];
        normalize(&mut zero);
        assert_eq!(zero, vec![0.0, 0.0]);
    }
}
