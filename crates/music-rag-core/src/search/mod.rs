//! Search Module
//!
//! Dual-track hybrid retrieval:
//! - Hybrid scorer fusing text and audio similarities
//! - Broad (unfiltered) and targeted (filtered, boosted) passes
//! - Cross-encoder reranking with BM25 fallback

mod engine;
mod hybrid;
mod reranker;

pub use engine::{
    build_metadata_filter, dedupe_and_rank, RetrievalEngine, RetrievalStage,
    BROAD_FETCH_MULTIPLIER, TARGETED_BOOST,
};
pub use hybrid::{
    distance_to_similarity, effective_weight, fuse_modalities, FusedCandidate, HybridScorer,
    HybridSearchConfig,
};
pub use reranker::{
    min_max_normalize, music_item_document, rerank_results, CrossEncoderReranker,
    HybridScoreReranker, Rerank, RerankedResult, RerankerConfig, RerankerError,
    DEFAULT_RERANK_COUNT,
};
