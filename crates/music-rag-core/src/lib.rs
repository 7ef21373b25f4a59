//! # Music RAG Core
//!
//! Retrieval engine for music discovery. Given a text or audio query it
//! returns ranked music items by fusing:
//!
//! - **Embedding modalities**: text and audio vectors, weighted by `semantic_weight`
//! - **Retrieval strategies**: a broad unfiltered pass and a targeted pass
//!   restricted by metadata filters, whose scores are boosted
//! - **Scoring signals**: vector similarity, metadata match, optional
//!   cross-encoder rerank score
//!
//! The result is one deduplicated list with deterministic ordering.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use music_rag_core::{
//!     LocalTextEmbedder, MemoryCatalog, MemoryVectorStore, MusicIndexer, MusicItem,
//!     RetrievalEngine, RetrievalQuery,
//! };
//!
//! let store = Arc::new(MemoryVectorStore::new());
//! let catalog = Arc::new(MemoryCatalog::new());
//! let embedder = Arc::new(LocalTextEmbedder::new()?);
//!
//! let indexer = MusicIndexer::new(store.clone(), catalog.clone(), embedder.clone());
//! indexer.index(MusicItem::new("1", "So What", "Miles Davis"))?;
//!
//! let engine = RetrievalEngine::new(store, embedder);
//! let query = RetrievalQuery::text("modal jazz trumpet").with_genres(["Jazz"]);
//! let results = engine.retrieve(&query, catalog.as_ref())?;
//! ```
//!
//! ## Feature Flags
//!
//! - `embeddings` (default): local text embeddings and cross-encoder reranking with fastembed
//! - `audio` (default): WAV decoding and spectral audio features with hound and rustfft
//! - `vector-search` (default): HNSW vector store with USearch
//! - `llm` (default): OpenAI-compatible query enhancement and result explanation
//! - `bundled-sqlite` (default): compile SQLite into the item catalog

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(rustdoc::missing_crate_level_docs)]

// ============================================================================
// MODULES
// ============================================================================

pub mod catalog;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod indexer;
pub mod llm;
pub mod models;
pub mod search;
pub mod store;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

// Data model
pub use models::{
    MusicItem, MusicMetadata, QueryResult, RetrievalQuery, RetrievalType,
    DEFAULT_SEMANTIC_WEIGHT, DEFAULT_TOP_K, MAX_TOP_K,
};

// Errors
pub use error::{RagError, Result};

// Configuration
pub use config::{ConfigError, RagConfig, StoreBackend};

// Vector store
pub use store::{
    DistanceMetric, FilterValue, MemoryStoreConfig, MemoryVectorStore, MetadataFilter,
    MetadataRecord, MetadataValue, Modality, StoreError, StoreHit, StoreStats, VectorStore,
};

#[cfg(feature = "vector-search")]
pub use store::{HnswConfig, HnswVectorStore};

// Embeddings
pub use embeddings::{
    music_item_text, AudioEmbedder, CachedTextEmbedder, EmbeddingError, TextEmbedder,
};

#[cfg(feature = "embeddings")]
pub use embeddings::LocalTextEmbedder;

#[cfg(feature = "audio")]
pub use embeddings::FeatureAudioEmbedder;

// Retrieval
pub use search::{
    CrossEncoderReranker, HybridScoreReranker, HybridScorer, HybridSearchConfig, Rerank,
    RerankerConfig, RerankerError, RetrievalEngine, TARGETED_BOOST,
};

// Catalog and indexing
pub use catalog::{CatalogError, ItemCache, ItemCatalog, MemoryCatalog, SqliteCatalog};
pub use indexer::MusicIndexer;

// LLM stages
pub use llm::{
    EnhancedQuery, EnhancementContext, EnhancementError, ExplanationError, QueryEnhancer,
    ResultExplainer, ResultExplanation, SessionStore,
};

#[cfg(feature = "llm")]
pub use llm::{OpenAiClient, OpenAiConfig, OpenAiQueryEnhancer, OpenAiResultExplainer};

// ============================================================================
// VERSION INFO
// ============================================================================

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default text embedding model
pub const DEFAULT_EMBEDDING_MODEL: &str = "all-MiniLM-L6-v2";

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        ItemCache, ItemCatalog, MetadataFilter, MusicIndexer, MusicItem, MusicMetadata,
        QueryResult, RagError, Result, RetrievalEngine, RetrievalQuery, RetrievalType,
        TextEmbedder, VectorStore,
    };
}
