//! Dual-Track Retrieval Engine
//!
//! One retrieval runs as a fixed sequence of stages:
//!
//! `EMBED → BROAD_PASS → TARGETED_PASS → MERGE → DEDUPE_RANK → DONE`
//!
//! - **Broad pass**: unfiltered fused query over `2 × top_k` candidates
//! - **Targeted pass**: fused query restricted by the query's metadata
//!   filters over `top_k` candidates, scores multiplied by [`TARGETED_BOOST`]
//! - **Dedupe/rank**: an id found by both passes keeps its targeted
//!   instance; the list is sorted by score (stable) and cut at `top_k`
//!
//! Candidates whose id is not in the caller's item cache are dropped
//! without error. Keeping the cache in step with the store is the
//! caller's responsibility.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use super::hybrid::{FusedCandidate, HybridScorer, HybridSearchConfig};
use super::reranker::{rerank_results, HybridScoreReranker, Rerank};
use crate::catalog::ItemCache;
use crate::embeddings::{AudioEmbedder, TextEmbedder};
use crate::error::Result;
use crate::models::{QueryResult, RetrievalQuery, RetrievalType};
use crate::store::{MetadataFilter, VectorStore};

// ============================================================================
// CONSTANTS
// ============================================================================

/// Score multiplier for targeted-pass results. Decides which instance wins
/// when both passes return the same item.
pub const TARGETED_BOOST: f32 = 1.2;

/// Broad pass fetches this many times `top_k`
pub const BROAD_FETCH_MULTIPLIER: usize = 2;

// ============================================================================
// STAGES
// ============================================================================

/// Stage of a single retrieval
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalStage {
    Embed,
    BroadPass,
    TargetedPass,
    Merge,
    DedupeRank,
    Done,
}

impl RetrievalStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetrievalStage::Embed => "EMBED",
            RetrievalStage::BroadPass => "BROAD_PASS",
            RetrievalStage::TargetedPass => "TARGETED_PASS",
            RetrievalStage::Merge => "MERGE",
            RetrievalStage::DedupeRank => "DEDUPE_RANK",
            RetrievalStage::Done => "DONE",
        }
    }
}

fn enter(stage: RetrievalStage) {
    tracing::debug!(stage = stage.as_str(), "Retrieval stage");
}

// ============================================================================
// HELPERS
// ============================================================================

/// Metadata filter for the targeted pass.
///
/// Genre and cultural origin are matched against any listed value. Only the
/// first mood is used.
pub fn build_metadata_filter(query: &RetrievalQuery) -> MetadataFilter {
    let mut filter = MetadataFilter::new()
        .with_any_of("genre", query.genre_filter.iter().cloned())
        .with_any_of("cultural_origin", query.cultural_origin_filter.iter().cloned());
    if let Some(mood) = query.mood_filter.first() {
        filter = filter.with_exact("mood", mood.clone());
    }
    filter
}

/// Merge-stage ranking: each id appears once, targeted instances take
/// precedence over broad ones, order is by descending score with ties in
/// input order, and at most `top_k` results are kept.
pub fn dedupe_and_rank(results: Vec<QueryResult>, top_k: usize) -> Vec<QueryResult> {
    let targeted: HashSet<String> = results
        .iter()
        .filter(|r| r.retrieval_type == RetrievalType::Targeted)
        .map(|r| r.music_item.id.clone())
        .collect();

    let mut ranked: Vec<QueryResult> = results
        .into_iter()
        .filter(|r| r.retrieval_type == RetrievalType::Targeted || !targeted.contains(r.id()))
        .collect();

    // Stable: equal scores keep merge order
    ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

    let mut seen: HashSet<String> = HashSet::new();
    let mut unique = Vec::with_capacity(top_k.min(ranked.len()));
    for result in ranked {
        if unique.len() >= top_k {
            break;
        }
        if seen.insert(result.music_item.id.clone()) {
            unique.push(result);
        }
    }
    unique
}

/// Resolve fused candidates through the item cache, dropping misses
fn resolve(
    candidates: Vec<FusedCandidate>,
    cache: &dyn ItemCache,
    retrieval_type: RetrievalType,
    boost: f32,
) -> Result<Vec<QueryResult>> {
    let mut results = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        match cache.get_item(&candidate.id)? {
            Some(item) => results.push(QueryResult::new(
                item,
                candidate.combined_score * boost,
                retrieval_type,
            )),
            None => tracing::trace!(id = %candidate.id, "Cache miss, dropping candidate"),
        }
    }
    Ok(results)
}

// ============================================================================
// ENGINE
// ============================================================================

/// Dual-track hybrid retrieval over a vector store
pub struct RetrievalEngine {
    store: Arc<dyn VectorStore>,
    text_embedder: Arc<dyn TextEmbedder>,
    audio_embedder: Option<Arc<dyn AudioEmbedder>>,
    reranker: Option<Arc<dyn Rerank>>,
    score_blend: Option<HybridScoreReranker>,
    scorer: HybridScorer,
}

impl RetrievalEngine {
    /// Engine with a text embedder only
    pub fn new(store: Arc<dyn VectorStore>, text_embedder: Arc<dyn TextEmbedder>) -> Self {
        Self {
            store,
            text_embedder,
            audio_embedder: None,
            reranker: None,
            score_blend: None,
            scorer: HybridScorer::new(),
        }
    }

    pub fn with_audio_embedder(mut self, embedder: Arc<dyn AudioEmbedder>) -> Self {
        self.audio_embedder = Some(embedder);
        self
    }

    pub fn with_reranker(mut self, reranker: Arc<dyn Rerank>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    /// Blend rerank scores with retrieval scores when ordering reranked results
    pub fn with_score_blend(mut self, blend: HybridScoreReranker) -> Self {
        self.score_blend = Some(blend);
        self
    }

    pub fn with_search_config(mut self, config: HybridSearchConfig) -> Self {
        self.scorer = HybridScorer::with_config(config);
        self
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    pub fn text_embedder(&self) -> &Arc<dyn TextEmbedder> {
        &self.text_embedder
    }

    pub fn audio_embedder(&self) -> Option<&Arc<dyn AudioEmbedder>> {
        self.audio_embedder.as_ref()
    }

    pub fn has_reranker(&self) -> bool {
        self.reranker.is_some()
    }

    /// Text failures propagate. Audio failures degrade to a zero vector.
    fn embed_query(&self, query: &RetrievalQuery) -> Result<(Option<Vec<f32>>, Option<Vec<f32>>)> {
        let text = match query.text_query() {
            Some(q) => Some(self.text_embedder.embed(q)?),
            None => None,
        };

        let audio = match (&query.audio_path, &self.audio_embedder) {
            (Some(path), Some(embedder)) => Some(self.embed_audio(embedder.as_ref(), path)),
            (Some(path), None) => {
                tracing::warn!(
                    path = %path.display(),
                    "No audio embedder configured, ignoring audio query"
                );
                None
            }
            (None, _) => None,
        };

        Ok((text, audio))
    }

    fn embed_audio(&self, embedder: &dyn AudioEmbedder, path: &Path) -> Vec<f32> {
        match embedder.embed(path) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Audio embedding failed, using zero vector"
                );
                vec![0.0; embedder.dimensions()]
            }
        }
    }

    /// Run the broad and targeted passes and return the ranked, deduplicated
    /// results (at most `top_k`).
    pub fn retrieve(&self, query: &RetrievalQuery, cache: &dyn ItemCache) -> Result<Vec<QueryResult>> {
        query.validate()?;

        enter(RetrievalStage::Embed);
        if query.is_empty() {
            enter(RetrievalStage::Done);
            return Ok(vec![]);
        }
        let (text_emb, audio_emb) = self.embed_query(query)?;
        if text_emb.is_none() && audio_emb.is_none() {
            enter(RetrievalStage::Done);
            return Ok(vec![]);
        }

        let mut broad = Vec::new();
        if query.use_broad_retrieval {
            enter(RetrievalStage::BroadPass);
            let candidates = self.scorer.search(
                self.store.as_ref(),
                text_emb.as_deref(),
                audio_emb.as_deref(),
                query.top_k * BROAD_FETCH_MULTIPLIER,
                query.semantic_weight,
                None,
            )?;
            broad = resolve(candidates, cache, RetrievalType::Broad, 1.0)?;
            tracing::debug!(results = broad.len(), "Broad pass complete");
        }

        let mut targeted = Vec::new();
        if query.use_targeted_retrieval && query.has_filters() {
            enter(RetrievalStage::TargetedPass);
            let filter = build_metadata_filter(query);
            let candidates = self.scorer.search(
                self.store.as_ref(),
                text_emb.as_deref(),
                audio_emb.as_deref(),
                query.top_k,
                query.semantic_weight,
                Some(&filter),
            )?;
            targeted = resolve(candidates, cache, RetrievalType::Targeted, TARGETED_BOOST)?;
            tracing::debug!(results = targeted.len(), "Targeted pass complete");
        }

        enter(RetrievalStage::Merge);
        let (broad_count, targeted_count) = (broad.len(), targeted.len());
        let mut merged = broad;
        merged.extend(targeted);

        enter(RetrievalStage::DedupeRank);
        let results = dedupe_and_rank(merged, query.top_k);

        enter(RetrievalStage::Done);
        tracing::info!(
            broad = broad_count,
            targeted = targeted_count,
            returned = results.len(),
            top_k = query.top_k,
            "Retrieval complete"
        );
        Ok(results)
    }

    /// [`retrieve`](Self::retrieve) followed by the reranking stage.
    ///
    /// Reranking runs only with a configured reranker and a text query. A
    /// reranker failure keeps the retrieval order.
    pub fn retrieve_with_rerank(
        &self,
        query: &RetrievalQuery,
        cache: &dyn ItemCache,
    ) -> Result<Vec<QueryResult>> {
        let results = self.retrieve(query, cache)?;

        let (Some(reranker), Some(text)) = (&self.reranker, query.text_query()) else {
            return Ok(results);
        };

        match rerank_results(
            reranker.as_ref(),
            self.score_blend.as_ref(),
            text,
            results.clone(),
            None,
        ) {
            Ok(reranked) => {
                tracing::debug!(results = reranked.len(), "Rerank complete");
                Ok(reranked)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Reranking failed, keeping retrieval order");
                Ok(results)
            }
        }
    }

    /// Text search with default settings
    pub fn search_by_text(
        &self,
        text: &str,
        top_k: usize,
        cache: &dyn ItemCache,
    ) -> Result<Vec<QueryResult>> {
        self.retrieve(&RetrievalQuery::text(text).with_top_k(top_k), cache)
    }

    /// Audio search with default settings
    pub fn search_by_audio(
        &self,
        path: &Path,
        top_k: usize,
        cache: &dyn ItemCache,
    ) -> Result<Vec<QueryResult>> {
        self.retrieve(&RetrievalQuery::audio(path).with_top_k(top_k), cache)
    }
}

// ============================================================================
// TESTS
// ============================================================================
