//! Deterministic embedders
//!
//! Bag-of-keywords vectors: one dimension per vocabulary word plus a small
//! constant bias so no vector is all zeros. Identical keyword sets have
//! cosine distance 0; disjoint sets are far apart.

use std::path::Path;

use music_rag_core::embeddings::{AudioEmbedder, EmbeddingError, TextEmbedder};
use music_rag_core::search::{Rerank, RerankerError};

/// Words the fixture embedders understand
pub const VOCABULARY: [&str; 12] = [
    "jazz", "rock", "blues", "folk", "electronic", "calm", "energetic", "melancholic", "piano",
    "guitar", "synth", "drums",
];

const BIAS: f32 = 0.05;

fn keyword_vector(text: &str) -> Vec<f32> {
    let lower = text.to_lowercase();
    let mut v: Vec<f32> = VOCABULARY
        .iter()
        .map(|w| if lower.contains(w) { 1.0 } else { 0.0 })
        .collect();
    v.push(BIAS);
    v
}

/// Text embedder over [`VOCABULARY`]
#[derive(Debug, Default, Clone)]
pub struct KeywordTextEmbedder;

impl TextEmbedder for KeywordTextEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(keyword_vector(text))
    }

    fn dimensions(&self) -> usize {
        VOCABULARY.len() + 1
    }

    fn model_name(&self) -> &str {
        "keyword-fixture"
    }
}

/// Audio embedder keyed on the file name, so `piano_calm.wav` embeds like
/// the text "piano calm". Paths containing `corrupt` fail.
#[derive(Debug, Default, Clone)]
pub struct KeywordAudioEmbedder;

impl AudioEmbedder for KeywordAudioEmbedder {
    fn embed(&self, path: &Path) -> Result<Vec<f32>, EmbeddingError> {
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default();
        if name.contains("corrupt") {
            return Err(EmbeddingError::InvalidInput(format!(
                "cannot decode {}",
                path.display()
            )));
        }
        Ok(keyword_vector(&name.replace(['_', '-'], " ")))
    }

    fn dimensions(&self) -> usize {
        VOCABULARY.len() + 1
    }
}

/// Scores a document by how many query keywords it mentions
#[derive(Debug, Default, Clone)]
pub struct KeywordReranker;

impl Rerank for KeywordReranker {
    fn score(&self, query: &str, documents: &[String]) -> Result<Vec<f32>, RerankerError> {
        let query = query.to_lowercase();
        let wanted: Vec<&str> = VOCABULARY
            .iter()
            .copied()
            .filter(|w| query.contains(w))
            .collect();
        Ok(documents
            .iter()
            .map(|doc| {
                let doc = doc.to_lowercase();
                wanted.iter().filter(|w| doc.contains(*w)).count() as f32
            })
            .collect())
    }
}
