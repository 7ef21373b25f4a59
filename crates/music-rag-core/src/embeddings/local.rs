//! Local Text Embeddings
//!
//! Uses fastembed v5.11 for local ONNX inference. No external API calls.
//!
//! ## Models
//!
//! - **Default**: all-MiniLM-L6-v2 (384d, sentence-transformers compatible)
//! - all-MiniLM-L12-v2 (384d), bge-small-en-v1.5 (384d), bge-base-en-v1.5 (768d),
//!   nomic-embed-text-v1.5 (768d)

use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::path::PathBuf;
use std::sync::Mutex;

use super::{EmbeddingError, TextEmbedder};

// ============================================================================
// CONSTANTS
// ============================================================================

/// Model used when none is configured
pub const DEFAULT_TEXT_MODEL: &str = "all-MiniLM-L6-v2";

/// Maximum text length in bytes (truncated if longer)
const MAX_TEXT_LENGTH: usize = 8192;

/// Batch size for batch embedding
const BATCH_SIZE: usize = 32;

/// Resolve a configured model name to a fastembed model and its dimension
fn resolve_model(name: &str) -> Result<(EmbeddingModel, usize), EmbeddingError> {
    let key = name
        .trim()
        .trim_start_matches("sentence-transformers/")
        .trim_start_matches("BAAI/")
        .trim_start_matches("nomic-ai/")
        .to_ascii_lowercase();

    match key.as_str() {
        "all-minilm-l6-v2" => Ok((EmbeddingModel::AllMiniLML6V2, 384)),
        "all-minilm-l12-v2" => Ok((EmbeddingModel::AllMiniLML12V2, 384)),
        "bge-small-en-v1.5" => Ok((EmbeddingModel::BGESmallENV15, 384)),
        "bge-base-en-v1.5" => Ok((EmbeddingModel::BGEBaseENV15, 768)),
        "nomic-embed-text-v1.5" => Ok((EmbeddingModel::NomicEmbedTextV15, 768)),
        _ => Err(EmbeddingError::ModelInit(format!(
            "Unsupported text embedding model: {}",
            name
        ))),
    }
}

/// Get the default cache directory for fastembed models
/// Uses FASTEMBED_CACHE_PATH env var, or falls back to platform cache directory
fn default_cache_dir() -> PathBuf {
    if let Ok(path) = std::env::var("FASTEMBED_CACHE_PATH") {
        return PathBuf::from(path);
    }

    // Linux: ~/.cache/music-rag/fastembed
    if let Some(proj_dirs) = directories::ProjectDirs::from("com", "music-rag", "music-rag") {
        return proj_dirs.cache_dir().join("fastembed");
    }

    PathBuf::from(".fastembed_cache")
}

/// Cut at a char boundary no later than `max` bytes
fn truncate_text(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

// ============================================================================
// EMBEDDER
// ============================================================================

/// Sentence embedder running a fastembed model in-process
pub struct LocalTextEmbedder {
    model: Mutex<TextEmbedding>,
    model_name: String,
    dimensions: usize,
}

impl LocalTextEmbedder {
    /// Load the default model
    pub fn new() -> Result<Self, EmbeddingError> {
        Self::with_model(DEFAULT_TEXT_MODEL, None)
    }

    /// Load a named model, downloading it into `cache_dir` on first use
    pub fn with_model(name: &str, cache_dir: Option<PathBuf>) -> Result<Self, EmbeddingError> {
        let (model, dimensions) = resolve_model(name)?;
        let cache_dir = cache_dir.unwrap_or_else(default_cache_dir);

        if let Err(e) = std::fs::create_dir_all(&cache_dir) {
            tracing::warn!("Failed to create cache directory {:?}: {}", cache_dir, e);
        }

        let options = InitOptions::new(model)
            .with_show_download_progress(true)
            .with_cache_dir(cache_dir);

        let model = TextEmbedding::try_new(options).map_err(|e| {
            EmbeddingError::ModelInit(format!(
                "Failed to initialize {}: {}. \
                Ensure ONNX runtime is available and model files can be downloaded.",
                name, e
            ))
        })?;

        tracing::info!(model = name, dimensions, "Text embedding model loaded");

        Ok(Self {
            model: Mutex::new(model),
            model_name: name.to_string(),
            dimensions,
        })
    }
}

impl TextEmbedder for LocalTextEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.is_empty() {
            return Err(EmbeddingError::InvalidInput("Text cannot be empty".to_string()));
        }

        let mut model = self
            .model
            .lock()
            .map_err(|e| EmbeddingError::ModelInit(format!("Lock poisoned: {}", e)))?;

        let embeddings = model
            .embed(vec![truncate_text(text, MAX_TEXT_LENGTH)], None)
            .map_err(|e| EmbeddingError::EmbeddingFailed(e.to_string()))?;

        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::EmbeddingFailed("No embedding generated".to_string()))
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let mut model = self
            .model
            .lock()
            .map_err(|e| EmbeddingError::ModelInit(format!("Lock poisoned: {}", e)))?;
        let mut all = Vec::with_capacity(texts.len());

        for chunk in texts.chunks(BATCH_SIZE) {
            let truncated: Vec<&str> = chunk
                .iter()
                .map(|t| truncate_text(t, MAX_TEXT_LENGTH))
                .collect();
            let embeddings = model
                .embed(truncated, None)
                .map_err(|e| EmbeddingError::EmbeddingFailed(e.to_string()))?;
            all.extend(embeddings);
        }

        if all.len() != texts.len() {
            return Err(EmbeddingError::EmbeddingFailed(format!(
                "Expected {} embeddings, got {}",
                texts.len(),
                all.len()
            )));
        }
        Ok(all)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_model_names() {
        assert_eq!(resolve_model("all-MiniLM-L6-v2").unwrap().1, 384);
        assert_eq!(
            resolve_model("sentence-transformers/all-MiniLM-L6-v2").unwrap().1,
            384
        );
        assert_eq!(resolve_model("BAAI/bge-base-en-v1.5").unwrap().1, 768);
        assert!(resolve_model("gpt-embedding-9000").is_err());
    }

    #[test]
    fn test_truncate_respects_char_boundary() {
        let text = "é".repeat(10);
        let cut = truncate_text(&text, 5);
        assert_eq!(cut.len(), 4);
        assert_eq!(truncate_text("short", 100), "short");
    }
}
