//! LLM Query Enhancement and Result Explanation
//!
//! Optional, best-effort stages around retrieval:
//! - [`QueryEnhancer`]: rewrites a query and suggests filters
//! - [`ResultExplainer`]: summarizes why results were returned
//! - [`SessionStore`]: caller-owned per-session history for contextual enhancement
//!
//! Failures never abort a search. Callers use [`enhance_or_fallback`] and
//! [`explain_or_fallback`], which log the error and return a generic payload.

#[cfg(feature = "llm")]
mod openai;
mod session;

#[cfg(feature = "llm")]
pub use openai::{
    parse_enhancement, parse_explanation, OpenAiClient, OpenAiConfig, OpenAiQueryEnhancer,
    OpenAiResultExplainer, DEFAULT_LLM_BASE_URL, DEFAULT_LLM_MODEL,
};
pub use session::{
    ContextualEnhancer, SessionFeedback, SessionPreferences, SessionStore, SessionSummary,
    DEFAULT_MAX_HISTORY, DEFAULT_MAX_SESSIONS,
};

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;

use crate::models::{QueryResult, RetrievalQuery, RetrievalType};

/// Number of top results sent for explanation
pub const EXPLAIN_TOP_N: usize = 5;

// ============================================================================
// ERRORS
// ============================================================================

/// Transport-level LLM failure
#[derive(Debug, Clone, thiserror::Error)]
pub enum LlmError {
    #[error("LLM client not configured: {0}")]
    NotConfigured(String),
    #[error("LLM request timed out")]
    Timeout,
    #[error("LLM request failed: {0}")]
    Request(String),
    #[error("LLM returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("LLM response had no content")]
    EmptyResponse,
}

/// Query enhancement failed
#[derive(Debug, thiserror::Error)]
pub enum EnhancementError {
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error("Invalid enhancement response: {0}")]
    InvalidResponse(#[from] serde_json::Error),
}

/// Result explanation failed
#[derive(Debug, thiserror::Error)]
pub enum ExplanationError {
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error("Invalid explanation response: {0}")]
    InvalidResponse(#[from] serde_json::Error),
}

// ============================================================================
// PAYLOADS
// ============================================================================

fn nullable_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Unknown strategies read as `hybrid`
fn lenient_strategy<'de, D>(deserializer: D) -> Result<RetrievalType, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
    Ok(match raw.trim().to_lowercase().as_str() {
        "broad" => RetrievalType::Broad,
        "targeted" => RetrievalType::Targeted,
        _ => RetrievalType::Hybrid,
    })
}

fn default_strategy() -> RetrievalType {
    RetrievalType::Hybrid
}

/// Metadata the model inferred from the wording of a query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImplicitMetadata {
    pub genre: Option<String>,
    #[serde(deserialize_with = "nullable_list")]
    pub mood: Vec<String>,
    pub era: Option<String>,
    pub cultural_origin: Option<String>,
    pub energy_level: Option<String>,
    /// Descriptive tempo ("slow", "upbeat", ...)
    pub tempo: Option<String>,
}

/// Filters suggested by an enhancer, shaped like the query's own
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuggestedFilters {
    #[serde(deserialize_with = "nullable_list")]
    pub genre_filter: Vec<String>,
    #[serde(deserialize_with = "nullable_list")]
    pub mood_filter: Vec<String>,
    pub tempo_range: Option<(f32, f32)>,
    #[serde(deserialize_with = "nullable_list")]
    pub cultural_origin_filter: Vec<String>,
}

impl SuggestedFilters {
    pub fn is_empty(&self) -> bool {
        self.genre_filter.is_empty()
            && self.mood_filter.is_empty()
            && self.tempo_range.is_none()
            && self.cultural_origin_filter.is_empty()
    }
}

/// An enhanced query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnhancedQuery {
    pub original_query: String,
    #[serde(default)]
    pub intent: String,
    #[serde(default)]
    pub implicit_metadata: ImplicitMetadata,
    #[serde(default)]
    pub enhanced_query: String,
    #[serde(default)]
    pub suggested_filters: SuggestedFilters,
    #[serde(default, deserialize_with = "nullable_list")]
    pub alternative_queries: Vec<String>,
    #[serde(default = "default_strategy", deserialize_with = "lenient_strategy")]
    pub search_strategy: RetrievalType,
    #[serde(default)]
    pub explanation: String,
}

impl EnhancedQuery {
    /// Payload returned when enhancement is unavailable
    pub fn fallback(query: &str) -> Self {
        Self {
            original_query: query.to_string(),
            intent: "general search".to_string(),
            implicit_metadata: ImplicitMetadata::default(),
            enhanced_query: query.to_string(),
            suggested_filters: SuggestedFilters::default(),
            alternative_queries: Vec::new(),
            search_strategy: RetrievalType::Hybrid,
            explanation: "Fallback: Using original query without enhancement".to_string(),
        }
    }

    /// Rewrite `query` with the enhanced text and fill any filter the caller
    /// left empty from the suggestions. Filters the caller set are kept.
    pub fn apply_to(&self, query: &mut RetrievalQuery) {
        let enhanced = self.enhanced_query.trim();
        if !enhanced.is_empty() {
            query.text_query = Some(enhanced.to_string());
        }

        let suggested = &self.suggested_filters;
        if query.genre_filter.is_empty() {
            query.genre_filter = suggested.genre_filter.clone();
        }
        if query.mood_filter.is_empty() {
            query.mood_filter = suggested.mood_filter.clone();
        }
        if query.cultural_origin_filter.is_empty() {
            query.cultural_origin_filter = suggested.cultural_origin_filter.clone();
        }
        if query.tempo_range.is_none() {
            query.tempo_range = suggested.tempo_range.filter(|(min, max)| min <= max);
        }
    }

    /// Original, enhanced (when different) and alternative phrasings,
    /// deduplicated case-insensitively on trimmed text, order preserved
    pub fn expansions(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        std::iter::once(&self.original_query)
            .chain(std::iter::once(&self.enhanced_query))
            .chain(self.alternative_queries.iter())
            .filter_map(|q| {
                let trimmed = q.trim();
                if trimmed.is_empty() || !seen.insert(trimmed.to_lowercase()) {
                    None
                } else {
                    Some(trimmed.to_string())
                }
            })
            .collect()
    }
}

/// Context passed to an enhancer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnhancementContext {
    pub previous_queries: Vec<String>,
    pub preferences: SessionPreferences,
}

impl EnhancementContext {
    pub fn is_empty(&self) -> bool {
        self.previous_queries.is_empty() && self.preferences.is_empty()
    }
}

/// Why one result matched
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemExplanation {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub explanation: String,
}

/// Explanation of a result set
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResultExplanation {
    pub summary: String,
    pub explanations: Vec<ItemExplanation>,
    pub listening_recommendations: String,
    #[serde(alias = "insights")]
    pub musical_insights: String,
    #[serde(deserialize_with = "nullable_list")]
    pub discovery_suggestions: Vec<String>,
}

impl ResultExplanation {
    /// Payload returned when explanation is unavailable
    pub fn fallback(query: &str, results: &[QueryResult]) -> Self {
        Self {
            summary: format!("Found {} tracks matching '{}'.", results.len(), query),
            explanations: results
                .iter()
                .take(EXPLAIN_TOP_N)
                .map(|r| ItemExplanation {
                    title: if r.music_item.title.is_empty() {
                        "Unknown".to_string()
                    } else {
                        r.music_item.title.clone()
                    },
                    explanation: "Matches your search criteria".to_string(),
                })
                .collect(),
            listening_recommendations: "Start with the top results for best matches.".to_string(),
            musical_insights: "Various musical styles and characteristics.".to_string(),
            discovery_suggestions: vec![
                "Try refining your search with genre or mood filters".to_string(),
            ],
        }
    }
}

// ============================================================================
// TRAITS
// ============================================================================

/// Rewrites a free-text query
pub trait QueryEnhancer: Send + Sync {
    fn enhance(
        &self,
        query: &str,
        context: Option<&EnhancementContext>,
    ) -> Result<EnhancedQuery, EnhancementError>;
}

/// Explains a ranked result list
pub trait ResultExplainer: Send + Sync {
    fn explain(
        &self,
        query: &str,
        results: &[QueryResult],
    ) -> Result<ResultExplanation, ExplanationError>;
}

/// Enhance, degrading to [`EnhancedQuery::fallback`] on failure
pub fn enhance_or_fallback(
    enhancer: &dyn QueryEnhancer,
    query: &str,
    context: Option<&EnhancementContext>,
) -> EnhancedQuery {
    match enhancer.enhance(query, context) {
        Ok(enhanced) => {
            tracing::debug!(
                query,
                enhanced = %enhanced.enhanced_query,
                intent = %enhanced.intent,
                "Enhanced query"
            );
            enhanced
        }
        Err(e) => {
            tracing::warn!(query, error = %e, "Query enhancement failed, using original query");
            EnhancedQuery::fallback(query)
        }
    }
}

/// Explain, degrading to [`ResultExplanation::fallback`] on failure
pub fn explain_or_fallback(
    explainer: &dyn ResultExplainer,
    query: &str,
    results: &[QueryResult],
) -> ResultExplanation {
    match explainer.explain(query, results) {
        Ok(explanation) => explanation,
        Err(e) => {
            tracing::warn!(query, error = %e, "Result explanation failed, using generic summary");
            ResultExplanation::fallback(query, results)
        }
    }
}

/// Query variations for multi-query retrieval
pub fn expand_query(enhancer: &dyn QueryEnhancer, query: &str) -> Vec<String> {
    enhance_or_fallback(enhancer, query, None).expansions()
}
