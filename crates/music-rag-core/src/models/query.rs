//! Retrieval Query and Results

use serde::{Deserialize, Deserializer, Serialize};
use std::path::PathBuf;

use super::MusicItem;
use crate::error::{RagError, Result};

// ============================================================================
// CONSTANTS
// ============================================================================

/// Default number of results
pub const DEFAULT_TOP_K: usize = 10;

/// Largest accepted `top_k`
pub const MAX_TOP_K: usize = 100;

/// Default weight of the text modality in fusion
pub const DEFAULT_SEMANTIC_WEIGHT: f32 = 0.7;

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

fn default_semantic_weight() -> f32 {
    DEFAULT_SEMANTIC_WEIGHT
}

fn default_true() -> bool {
    true
}

/// Accept `null` as an empty list
fn nullable_list<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

// ============================================================================
// QUERY
// ============================================================================

/// A retrieval request.
///
/// Neither `text_query` nor `audio_path` is required; a query with neither
/// yields an empty result set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalQuery {
    #[serde(default)]
    pub text_query: Option<String>,
    #[serde(default)]
    pub audio_path: Option<PathBuf>,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default, deserialize_with = "nullable_list")]
    pub genre_filter: Vec<String>,
    /// Only the first mood is applied by the targeted pass
    #[serde(default, deserialize_with = "nullable_list")]
    pub mood_filter: Vec<String>,
    #[serde(default, deserialize_with = "nullable_list")]
    pub cultural_origin_filter: Vec<String>,
    /// Inclusive BPM range `(min, max)`
    #[serde(default)]
    pub tempo_range: Option<(f32, f32)>,
    #[serde(default = "default_true")]
    pub use_broad_retrieval: bool,
    #[serde(default = "default_true")]
    pub use_targeted_retrieval: bool,
    /// Weight of the text modality; audio gets `1 - semantic_weight`
    #[serde(default = "default_semantic_weight")]
    pub semantic_weight: f32,
}

impl Default for RetrievalQuery {
    fn default() -> Self {
        Self {
            text_query: None,
            audio_path: None,
            top_k: DEFAULT_TOP_K,
            genre_filter: Vec::new(),
            mood_filter: Vec::new(),
            cultural_origin_filter: Vec::new(),
            tempo_range: None,
            use_broad_retrieval: true,
            use_targeted_retrieval: true,
            semantic_weight: DEFAULT_SEMANTIC_WEIGHT,
        }
    }
}

impl RetrievalQuery {
    /// Text query with default settings
    pub fn text(query: impl Into<String>) -> Self {
        Self {
            text_query: Some(query.into()),
            ..Default::default()
        }
    }

    /// Audio query with default settings
    pub fn audio(path: impl Into<PathBuf>) -> Self {
        Self {
            audio_path: Some(path.into()),
            ..Default::default()
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_genres<I, S>(mut self, genres: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.genre_filter = genres.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_moods<I, S>(mut self, moods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.mood_filter = moods.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_origins<I, S>(mut self, origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cultural_origin_filter = origins.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_semantic_weight(mut self, weight: f32) -> Self {
        self.semantic_weight = weight;
        self
    }

    pub fn with_passes(mut self, broad: bool, targeted: bool) -> Self {
        self.use_broad_retrieval = broad;
        self.use_targeted_retrieval = targeted;
        self
    }

    /// The text query, treating an empty string as absent
    pub fn text_query(&self) -> Option<&str> {
        self.text_query.as_deref().filter(|q| !q.is_empty())
    }

    /// True when there is nothing to embed
    pub fn is_empty(&self) -> bool {
        self.text_query().is_none() && self.audio_path.is_none()
    }

    /// True when any filter list is non-empty
    pub fn has_filters(&self) -> bool {
        !self.genre_filter.is_empty()
            || !self.mood_filter.is_empty()
            || !self.cultural_origin_filter.is_empty()
    }

    /// Reject out-of-range parameters
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_TOP_K).contains(&self.top_k) {
            return Err(RagError::Validation(format!(
                "top_k must be between 1 and {}, got {}",
                MAX_TOP_K, self.top_k
            )));
        }
        if !self.semantic_weight.is_finite() || !(0.0..=1.0).contains(&self.semantic_weight) {
            return Err(RagError::Validation(format!(
                "semantic_weight must be within [0, 1], got {}",
                self.semantic_weight
            )));
        }
        if let Some((min, max)) = self.tempo_range {
            if min > max {
                return Err(RagError::Validation(format!(
                    "tempo_range min ({}) exceeds max ({})",
                    min, max
                )));
            }
        }
        Ok(())
    }
}

// ============================================================================
// RESULTS
// ============================================================================

/// Which pass produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalType {
    Broad,
    Targeted,
    Hybrid,
}

impl RetrievalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetrievalType::Broad => "broad",
            RetrievalType::Targeted => "targeted",
            RetrievalType::Hybrid => "hybrid",
        }
    }
}

impl std::fmt::Display for RetrievalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A ranked result. Scores are only comparable within one result set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub music_item: MusicItem,
    pub score: f32,
    pub retrieval_type: RetrievalType,
    /// Set only when the reranking stage ran
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rerank_score: Option<f32>,
}

impl QueryResult {
    pub fn new(music_item: MusicItem, score: f32, retrieval_type: RetrievalType) -> Self {
        Self {
            music_item,
            score,
            retrieval_type,
            rerank_score: None,
        }
    }

    /// Id of the underlying item
    pub fn id(&self) -> &str {
        &self.music_item.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_json() {
        let query: RetrievalQuery = serde_json::from_str(r#"{"text_query": "jazz"}"#).unwrap();
        assert_eq!(query.top_k, 10);
        assert!((query.semantic_weight - 0.7).abs() < f32::EPSILON);
        assert!(query.use_broad_retrieval);
        assert!(query.use_targeted_retrieval);
        assert!(!query.has_filters());
    }

    #[test]
    fn test_null_filters_are_empty() {
        let query: RetrievalQuery =
            serde_json::from_str(r#"{"text_query": "x", "genre_filter": null}"#).unwrap();
        assert!(query.genre_filter.is_empty());
    }

    #[test]
    fn test_tempo_range_is_a_pair() {
        let query: RetrievalQuery =
            serde_json::from_str(r#"{"tempo_range": [90, 120]}"#).unwrap();
        assert_eq!(query.tempo_range, Some((90.0, 120.0)));
    }

    #[test]
    fn test_validate_top_k() {
        assert!(RetrievalQuery::text("a").with_top_k(0).validate().is_err());
        assert!(RetrievalQuery::text("a").with_top_k(101).validate().is_err());
        assert!(RetrievalQuery::text("a").with_top_k(1).validate().is_ok());
        assert!(RetrievalQuery::text("a").with_top_k(100).validate().is_ok());
    }

    #[test]
    fn test_validate_weight() {
        assert!(RetrievalQuery::text("a").with_semantic_weight(1.5).validate().is_err());
        assert!(RetrievalQuery::text("a").with_semantic_weight(-0.1).validate().is_err());
        assert!(RetrievalQuery::text("a").with_semantic_weight(f32::NAN).validate().is_err());
        assert!(RetrievalQuery::text("a").with_semantic_weight(0.0).validate().is_ok());
    }

    #[test]
    fn test_validate_tempo_range() {
        let mut query = RetrievalQuery::text("a");
        query.tempo_range = Some((140.0, 100.0));
        assert!(matches!(query.validate(), Err(RagError::Validation(_))));
    }

    #[test]
    fn test_empty_text_counts_as_absent() {
        let query = RetrievalQuery::text("");
        assert!(query.is_empty());
        assert!(query.text_query().is_none());
        assert!(!RetrievalQuery::audio("/a.wav").is_empty());
    }

    #[test]
    fn test_retrieval_type_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&RetrievalType::Targeted).unwrap(),
            "\"targeted\""
        );
        assert_eq!(RetrievalType::Broad.to_string(), "broad");
    }
}
