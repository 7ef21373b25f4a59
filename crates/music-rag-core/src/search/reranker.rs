//! Result Reranking Module
//!
//! ## Two-Stage Retrieval with Cross-Encoder
//!
//! Uses fastembed's Jina Reranker v1 Turbo (38M params) cross-encoder
//! for high-precision reranking:
//! 1. Stage 1: Retrieve candidates via the dual-track engine (fast, high recall)
//! 2. Stage 2: Cross-encoder rerank of the item texts (slower, high precision)
//!
//! Falls back to BM25-like term overlap scoring when the cross-encoder
//! model is unavailable. [`HybridScoreReranker`] optionally blends the
//! rerank score back with the retrieval score.

#[cfg(feature = "embeddings")]
use fastembed::{RerankInitOptions, RerankerModel, TextRerank};
#[cfg(feature = "embeddings")]
use std::sync::Mutex;

use crate::models::{MusicItem, QueryResult};

// ============================================================================
// CONSTANTS
// ============================================================================

/// Default number of results after reranking
pub const DEFAULT_RERANK_COUNT: usize = 10;

// ============================================================================
// TYPES
// ============================================================================

/// Reranker error types
#[derive(Debug, Clone, thiserror::Error)]
pub enum RerankerError {
    /// Failed to initialize the reranker model
    #[error("Reranker initialization failed: {0}")]
    ModelInit(String),
    /// Failed to rerank
    #[error("Reranking failed: {0}")]
    RerankFailed(String),
    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// A reranked result with relevance score
#[derive(Debug, Clone)]
pub struct RerankedResult<T> {
    /// The original item
    pub item: T,
    /// Reranking score (higher is more relevant)
    pub score: f32,
    /// Original rank before reranking
    pub original_rank: usize,
}

/// Relevance scoring of documents against a query
pub trait Rerank: Send + Sync {
    /// One score per document, in document order. Higher is more relevant.
    fn score(&self, query: &str, documents: &[String]) -> Result<Vec<f32>, RerankerError>;

    /// Results scoring below this are dropped
    fn min_score(&self) -> Option<f32> {
        None
    }
}

// ============================================================================
// ITEM TEXT
// ============================================================================

/// Rich text representation of an item for the cross-encoder
pub fn music_item_document(item: &MusicItem) -> String {
    let meta = &item.metadata;
    let mut parts = vec![
        format!("Title: {}", item.title),
        format!("Artist: {}", item.artist),
    ];

    let mut push = |label: &str, value: Option<String>| {
        if let Some(v) = value.filter(|v| !v.is_empty()) {
            parts.push(format!("{}: {}", label, v));
        }
    };

    push("Description", item.description.clone());
    push("Genre", meta.genre.clone());
    push("Subgenre", meta.subgenre.clone());
    push("Mood", Some(meta.mood.join(", ")));
    push("Cultural Origin", meta.cultural_origin.clone());
    push("Tempo", meta.tempo.map(|t| format!("{} BPM", t)));
    push("Instruments", Some(meta.instrumentation.join(", ")));
    push("Era", meta.era.clone());
    push("Key", meta.key.clone());

    parts.join(" | ")
}

// ============================================================================
// RERANKER SERVICE
// ============================================================================

/// Configuration for reranking
#[derive(Debug, Clone)]
pub struct RerankerConfig {
    /// Number of results to return after reranking
    pub result_count: usize,
    /// Minimum score threshold (results below this are filtered)
    pub min_score: Option<f32>,
}

impl Default for RerankerConfig {
    fn default() -> Self {
        Self {
            result_count: DEFAULT_RERANK_COUNT,
            min_score: None,
        }
    }
}

/// Cross-encoder reranker
///
/// When the `embeddings` feature is enabled and `init_cross_encoder()` is called,
/// uses Jina Reranker v1 Turbo for neural cross-encoder scoring.
/// Falls back to BM25-like term overlap when the model is unavailable.
pub struct CrossEncoderReranker {
    config: RerankerConfig,
    #[cfg(feature = "embeddings")]
    cross_encoder: Option<Mutex<TextRerank>>,
}

impl Default for CrossEncoderReranker {
    fn default() -> Self {
        Self::new(RerankerConfig::default())
    }
}

impl CrossEncoderReranker {
    /// Create a new reranker with the given configuration
    ///
    /// The cross-encoder model is NOT loaded here. Call `init_cross_encoder()`
    /// explicitly to load it.
    pub fn new(config: RerankerConfig) -> Self {
        Self {
            config,
            #[cfg(feature = "embeddings")]
            cross_encoder: None,
        }
    }

    /// Initialize the cross-encoder model (Jina Reranker v1 Turbo, ~150MB)
    ///
    /// Downloads the model on first call. Call this during startup,
    /// not in tests or hot paths.
    #[cfg(feature = "embeddings")]
    pub fn init_cross_encoder(&mut self) {
        if self.cross_encoder.is_some() {
            return;
        }

        let options = RerankInitOptions::new(RerankerModel::JINARerankerV1TurboEn)
            .with_show_download_progress(true);

        match TextRerank::try_new(options) {
            Ok(model) => {
                tracing::info!("Cross-encoder reranker loaded (Jina Reranker v1 Turbo)");
                self.cross_encoder = Some(Mutex::new(model));
            }
            Err(e) => {
                tracing::warn!("Cross-encoder unavailable, using BM25 fallback: {}", e);
            }
        }
    }

    /// Check if the cross-encoder model is available
    pub fn has_cross_encoder(&self) -> bool {
        #[cfg(feature = "embeddings")]
        {
            self.cross_encoder.is_some()
        }
        #[cfg(not(feature = "embeddings"))]
        {
            false
        }
    }

    /// Score with the cross-encoder, if loaded and working
    #[cfg(feature = "embeddings")]
    fn cross_encoder_scores(&self, query: &str, documents: &[String]) -> Option<Vec<f32>> {
        let model = self.cross_encoder.as_ref()?;
        let mut model = match model.lock() {
            Ok(m) => m,
            Err(_) => {
                tracing::warn!("Cross-encoder lock poisoned, using BM25 fallback");
                return None;
            }
        };
        let docs: Vec<&str> = documents.iter().map(String::as_str).collect();

        match model.rerank(query, &docs, false, None) {
            Ok(results) => {
                let mut scores = vec![f32::MIN; documents.len()];
                for rr in results {
                    if let Some(slot) = scores.get_mut(rr.index) {
                        *slot = rr.score;
                    }
                }
                Some(scores)
            }
            Err(e) => {
                // Fall through to BM25 for this call
                tracing::warn!("Cross-encoder rerank failed, using BM25 fallback: {}", e);
                None
            }
        }
    }

    /// Rerank candidates based on relevance to the query
    ///
    /// Uses cross-encoder model when available for neural relevance scoring.
    /// Falls back to BM25-like term overlap scoring otherwise.
    pub fn rerank<T>(
        &self,
        query: &str,
        candidates: Vec<(T, String)>,
        top_k: Option<usize>,
    ) -> Result<Vec<RerankedResult<T>>, RerankerError> {
        if candidates.is_empty() {
            return Ok(vec![]);
        }

        let documents: Vec<String> = candidates.iter().map(|(_, text)| text.clone()).collect();
        let scores = self.score(query, &documents)?;
        let limit = top_k.unwrap_or(self.config.result_count);

        let mut results: Vec<RerankedResult<T>> = candidates
            .into_iter()
            .zip(scores)
            .enumerate()
            .map(|(rank, ((item, _), score))| RerankedResult {
                item,
                score,
                original_rank: rank,
            })
            .collect();

        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

        if let Some(min_score) = self.config.min_score {
            results.retain(|r| r.score >= min_score);
        }

        results.truncate(limit);
        Ok(results)
    }

    /// BM25-inspired term overlap scoring (fallback when cross-encoder unavailable)
    fn compute_relevance_score(query: &str, document: &str) -> f32 {
        let query_lower = query.to_lowercase();
        let query_terms: Vec<&str> = query_lower.split_whitespace().collect();
        let doc_lower = document.to_lowercase();
        let doc_len = document.len() as f32;

        if doc_len == 0.0 {
            return 0.0;
        }

        let mut score = 0.0;
        let k1 = 1.2_f32;
        let b = 0.75_f32;
        let avg_doc_len = 500.0_f32;

        for term in &query_terms {
            let tf = doc_lower.matches(term).count() as f32;
            if tf > 0.0 {
                let numerator = tf * (k1 + 1.0);
                let denominator = tf + k1 * (1.0 - b + b * (doc_len / avg_doc_len));
                score += numerator / denominator;
            }
        }

        if !query_terms.is_empty() {
            score /= query_terms.len() as f32;
        }

        score
    }

    /// Get the current configuration
    pub fn config(&self) -> &RerankerConfig {
        &self.config
    }
}

impl Rerank for CrossEncoderReranker {
    fn score(&self, query: &str, documents: &[String]) -> Result<Vec<f32>, RerankerError> {
        if query.trim().is_empty() {
            return Err(RerankerError::InvalidInput("Query cannot be empty".to_string()));
        }
        if documents.is_empty() {
            return Ok(vec![]);
        }

        #[cfg(feature = "embeddings")]
        if let Some(scores) = self.cross_encoder_scores(query, documents) {
            return Ok(scores);
        }

        Ok(documents
            .iter()
            .map(|d| Self::compute_relevance_score(query, d))
            .collect())
    }

    fn min_score(&self) -> Option<f32> {
        self.config.min_score
    }
}

// ============================================================================
// HYBRID SCORE BLENDING
// ============================================================================

/// Min-max normalise into [0, 1]. All-equal inputs map to 1.0.
pub fn min_max_normalize(scores: &[f32]) -> Vec<f32> {
    if scores.is_empty() {
        return vec![];
    }
    let min = scores.iter().copied().fold(f32::INFINITY, f32::min);
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let range = max - min;
    if range <= f32::EPSILON || !range.is_finite() {
        return vec![1.0; scores.len()];
    }
    scores.iter().map(|s| (s - min) / range).collect()
}

/// Blends retrieval and rerank scores after normalising each
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HybridScoreReranker {
    retrieval_weight: f32,
    rerank_weight: f32,
}

impl Default for HybridScoreReranker {
    fn default() -> Self {
        Self {
            retrieval_weight: 0.5,
            rerank_weight: 0.5,
        }
    }
}

impl HybridScoreReranker {
    /// Weights that do not sum to 1 are renormalised
    pub fn new(retrieval_weight: f32, rerank_weight: f32) -> Self {
        let total = retrieval_weight + rerank_weight;
        if !total.is_finite() || total <= 0.0 || retrieval_weight < 0.0 || rerank_weight < 0.0 {
            tracing::warn!(
                retrieval_weight,
                rerank_weight,
                "Invalid blend weights, using 0.5 / 0.5"
            );
            return Self::default();
        }
        if (total - 1.0).abs() > 1e-6 {
            tracing::warn!(
                "Weights don't sum to 1.0: {} + {} = {}. Normalizing...",
                retrieval_weight,
                rerank_weight,
                total
            );
        }
        Self {
            retrieval_weight: retrieval_weight / total,
            rerank_weight: rerank_weight / total,
        }
    }

    pub fn retrieval_weight(&self) -> f32 {
        self.retrieval_weight
    }

    pub fn rerank_weight(&self) -> f32 {
        self.rerank_weight
    }

    /// Weighted sum of the normalised score lists, element-wise
    pub fn combine(&self, retrieval_scores: &[f32], rerank_scores: &[f32]) -> Vec<f32> {
        let retrieval = min_max_normalize(retrieval_scores);
        let rerank = min_max_normalize(rerank_scores);
        retrieval
            .iter()
            .zip(rerank.iter())
            .map(|(r, x)| self.retrieval_weight * r + self.rerank_weight * x)
            .collect()
    }
}

// ============================================================================
// RESULT RERANKING
// ============================================================================

/// Reorder retrieval results by relevance to `query`.
///
/// Sets `rerank_score` on every kept result. With a blend, the sort key is
/// the blended score; otherwise it is the rerank score. Ties keep the
/// incoming order.
pub fn rerank_results(
    reranker: &dyn Rerank,
    blend: Option<&HybridScoreReranker>,
    query: &str,
    results: Vec<QueryResult>,
    top_n: Option<usize>,
) -> Result<Vec<QueryResult>, RerankerError> {
    if results.is_empty() {
        return Ok(results);
    }

    let documents: Vec<String> = results
        .iter()
        .map(|r| music_item_document(&r.music_item))
        .collect();
    let scores = reranker.score(query, &documents)?;
    if scores.len() != results.len() {
        return Err(RerankerError::RerankFailed(format!(
            "Expected {} scores, got {}",
            results.len(),
            scores.len()
        )));
    }

    let keys = match blend {
        Some(b) => {
            let retrieval: Vec<f32> = results.iter().map(|r| r.score).collect();
            b.combine(&retrieval, &scores)
        }
        None => scores.clone(),
    };

    let mut ranked: Vec<(f32, QueryResult)> = results
        .into_iter()
        .zip(scores)
        .zip(keys)
        .map(|((mut result, score), key)| {
            result.rerank_score = Some(score);
            (key, result)
        })
        .collect();

    ranked.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

    if let Some(min) = reranker.min_score() {
        ranked.retain(|(_, r)| r.rerank_score.is_some_and(|s| s >= min));
    }
    if let Some(n) = top_n {
        ranked.truncate(n);
    }

    Ok(ranked.into_iter().map(|(_, r)| r).collect())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MusicMetadata, RetrievalType};

    fn result(id: &str, title: &str, score: f32) -> QueryResult {
        QueryResult::new(MusicItem::new(id, title, "Artist"), score, RetrievalType::Broad)
    }

    #[test]
    fn test_rerank_basic() {
        let reranker = CrossEncoderReranker::default();

        let candidates = vec![
            (1, "The quick brown fox".to_string()),
            (2, "A lazy dog sleeps".to_string()),
            (3, "The fox jumps over".to_string()),
        ];

        let results = reranker.rerank("fox", candidates, Some(2)).unwrap();

        assert_eq!(results.len(), 2);
        assert!(results[0].item == 1 || results[0].item == 3);
    }

    #[test]
    fn test_rerank_empty_candidates() {
        let reranker = CrossEncoderReranker::default();
        let candidates: Vec<(i32, String)> = vec![];

        let results = reranker.rerank("query", candidates, Some(5)).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_rerank_empty_query() {
        let reranker = CrossEncoderReranker::default();
        let candidates = vec![(1, "some text".to_string())];

        let result = reranker.rerank("", candidates, Some(5));
        assert!(result.is_err());
    }

    #[test]
    fn test_min_score_filter() {
        let reranker = CrossEncoderReranker::new(RerankerConfig {
            min_score: Some(0.5),
            ..Default::default()
        });

        let candidates = vec![
            (1, "fox fox fox".to_string()),
            (2, "completely unrelated".to_string()),
        ];

        let results = reranker.rerank("fox", candidates, None).unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].item, 1);
    }

    #[test]
    fn test_default_has_no_cross_encoder() {
        let reranker = CrossEncoderReranker::default();
        assert!(!reranker.has_cross_encoder());
    }

    #[test]
    fn test_music_item_document() {
        let item = MusicItem::new("1", "Take Five", "Dave Brubeck").with_metadata(MusicMetadata {
            genre: Some("Jazz".to_string()),
            subgenre: Some("Cool Jazz".to_string()),
            tempo: Some(172.0),
            key: Some("Eb minor".to_string()),
            era: Some("1950s".to_string()),
            ..Default::default()
        });
        assert_eq!(
            music_item_document(&item),
            "Title: Take Five | Artist: Dave Brubeck | Genre: Jazz | Subgenre: Cool Jazz | \
             Tempo: 172 BPM | Era: 1950s | Key: Eb minor"
        );
    }

    #[test]
    fn test_min_max_normalize() {
        assert_eq!(min_max_normalize(&[1.0, 3.0, 2.0]), vec![0.0, 1.0, 0.5]);
        assert_eq!(min_max_normalize(&[2.0, 2.0]), vec![1.0, 1.0]);
        assert!(min_max_normalize(&[]).is_empty());
    }

    #[test]
    fn test_hybrid_weights_renormalize() {
        let blend = HybridScoreReranker::new(3.0, 1.0);
        assert!((blend.retrieval_weight() - 0.75).abs() < 1e-6);
        assert!((blend.rerank_weight() - 0.25).abs() < 1e-6);

        let fallback = HybridScoreReranker::new(0.0, 0.0);
        assert_eq!(fallback, HybridScoreReranker::default());
    }

    #[test]
    fn test_hybrid_combine() {
        let blend = HybridScoreReranker::new(0.5, 0.5);
        let combined = blend.combine(&[1.0, 0.0], &[0.0, 1.0]);
        assert!((combined[0] - 0.5).abs() < 1e-6);
        assert!((combined[1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_rerank_results_sets_scores() {
        let reranker = CrossEncoderReranker::default();
        let results = vec![
            result("a", "Quiet piano", 0.9),
            result("b", "Loud guitar solo", 0.5),
        ];
        let reranked = rerank_results(&reranker, None, "guitar", results, None).unwrap();

        assert_eq!(reranked[0].id(), "b");
        assert!(reranked.iter().all(|r| r.rerank_score.is_some()));
        // Retrieval score is untouched
        assert!((reranked[0].score - 0.5).abs() < 1e-6);
    }

    struct Broken;

    impl Rerank for Broken {
        fn score(&self, _query: &str, _documents: &[String]) -> Result<Vec<f32>, RerankerError> {
            Ok(vec![1.0])
        }
    }

    #[test]
    fn test_rerank_results_length_mismatch() {
        let results = vec![result("a", "x", 0.9), result("b", "y", 0.5)];
        assert!(rerank_results(&Broken, None, "q", results, None).is_err());
    }
}
