//! Hybrid Scorer (Text + Audio)
//!
//! Fuses per-modality nearest-neighbour results into one ranking using a
//! weighted sum of similarities:
//!
//! `combined = w * text_score + (1 - w) * audio_score`
//!
//! where each score is `1 / (1 + distance)` and a modality that did not
//! return a candidate contributes 0. When only one modality's embedding is
//! supplied, the combined score is that modality's similarity.

use std::collections::HashMap;

use crate::store::{MetadataFilter, MetadataRecord, Modality, StoreError, StoreHit, VectorStore};

// ============================================================================
// FUSION
// ============================================================================

/// Map a distance to a similarity in (0, 1]. Monotonically decreasing.
#[inline]
pub fn distance_to_similarity(distance: f32) -> f32 {
    1.0 / (1.0 + distance.max(0.0))
}

/// A candidate after fusion
#[derive(Debug, Clone, PartialEq)]
pub struct FusedCandidate {
    pub id: String,
    pub text_score: f32,
    pub audio_score: f32,
    pub combined_score: f32,
    pub metadata: Option<MetadataRecord>,
}

/// Fuse text and audio hits into one list sorted by combined score.
///
/// Ties keep union insertion order: text hits in text rank order, then
/// audio-only hits in audio rank order.
///
/// # Arguments
/// * `text_hits` - Hits from the text index, ascending by distance
/// * `audio_hits` - Hits from the audio index, ascending by distance
/// * `semantic_weight` - Weight of the text modality
/// * `top_k` - Maximum number of candidates returned
pub fn fuse_modalities(
    text_hits: &[StoreHit],
    audio_hits: &[StoreHit],
    semantic_weight: f32,
    top_k: usize,
) -> Vec<FusedCandidate> {
    let mut candidates: Vec<FusedCandidate> = Vec::with_capacity(text_hits.len() + audio_hits.len());
    let mut positions: HashMap<&str, usize> = HashMap::new();

    for hit in text_hits {
        if positions.contains_key(hit.id.as_str()) {
            continue;
        }
        positions.insert(&hit.id, candidates.len());
        candidates.push(FusedCandidate {
            id: hit.id.clone(),
            text_score: distance_to_similarity(hit.distance),
            audio_score: 0.0,
            combined_score: 0.0,
            metadata: hit.metadata.clone(),
        });
    }

    for hit in audio_hits {
        match positions.get(hit.id.as_str()) {
            Some(&pos) => {
                let candidate = &mut candidates[pos];
                if candidate.audio_score == 0.0 {
                    candidate.audio_score = distance_to_similarity(hit.distance);
                }
                if candidate.metadata.is_none() {
                    candidate.metadata = hit.metadata.clone();
                }
            }
            None => {
                positions.insert(&hit.id, candidates.len());
                candidates.push(FusedCandidate {
                    id: hit.id.clone(),
                    text_score: 0.0,
                    audio_score: distance_to_similarity(hit.distance),
                    combined_score: 0.0,
                    metadata: hit.metadata.clone(),
                });
            }
        }
    }

    for c in &mut candidates {
        c.combined_score = semantic_weight * c.text_score + (1.0 - semantic_weight) * c.audio_score;
    }

    // Stable sort: ties keep union order
    candidates.sort_by(|a, b| {
        b.combined_score
            .partial_cmp(&a.combined_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    candidates.truncate(top_k);
    candidates
}

// ============================================================================
// HYBRID SEARCH CONFIGURATION
// ============================================================================

/// Configuration for hybrid search
#[derive(Debug, Clone)]
pub struct HybridSearchConfig {
    /// Number of results to fetch from each modality before fusion, as a
    /// multiple of `top_k`
    pub source_limit_multiplier: usize,
}

impl Default for HybridSearchConfig {
    fn default() -> Self {
        Self {
            source_limit_multiplier: 2,
        }
    }
}

// ============================================================================
// HYBRID SCORER
// ============================================================================

/// Queries each supplied modality and fuses the results
#[derive(Debug, Clone, Default)]
pub struct HybridScorer {
    config: HybridSearchConfig,
}

impl HybridScorer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: HybridSearchConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &HybridSearchConfig {
        &self.config
    }

    /// Fused top-`top_k` search over whichever modalities are supplied
    pub fn search(
        &self,
        store: &dyn VectorStore,
        text_embedding: Option<&[f32]>,
        audio_embedding: Option<&[f32]>,
        top_k: usize,
        semantic_weight: f32,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<FusedCandidate>, StoreError> {
        let fetch = top_k.saturating_mul(self.config.source_limit_multiplier.max(1));

        let text_hits = match text_embedding {
            Some(e) => store.query(Modality::Text, e, fetch, filter)?,
            None => vec![],
        };
        let audio_hits = match audio_embedding {
            Some(e) => store.query(Modality::Audio, e, fetch, filter)?,
            None => vec![],
        };

        tracing::debug!(
            text_hits = text_hits.len(),
            audio_hits = audio_hits.len(),
            fetch,
            "Modality queries complete"
        );

        let weight = effective_weight(
            text_embedding.is_some(),
            audio_embedding.is_some(),
            semantic_weight,
        );
        Ok(fuse_modalities(&text_hits, &audio_hits, weight, top_k))
    }
}

/// Text weight actually applied: the whole weight goes to the only
/// modality queried.
#[inline]
pub fn effective_weight(has_text: bool, has_audio: bool, semantic_weight: f32) -> f32 {
    match (has_text, has_audio) {
        (true, false) => 1.0,
        (false, true) => 0.0,
        _ => semantic_weight,
    }
}

// ============================================================================
// TESTS
// ============================================================================
