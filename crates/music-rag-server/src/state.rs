//! Shared application state
//!
//! Everything the HTTP handlers and CLI commands need, assembled once from
//! [`RagConfig`]. All core components are `Send + Sync` and shared as `Arc`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{info, warn};

use music_rag_core::catalog::{ItemCatalog, SqliteCatalog};
use music_rag_core::embeddings::{AudioEmbedder, CachedTextEmbedder, TextEmbedder};
use music_rag_core::llm::{QueryEnhancer, ResultExplainer, SessionStore};
use music_rag_core::search::{CrossEncoderReranker, Rerank, RerankerConfig, RetrievalEngine};
use music_rag_core::store::{MemoryStoreConfig, MemoryVectorStore, VectorStore};
use music_rag_core::{MusicIndexer, RagConfig, StoreBackend};

/// Snapshot file of the memory backend inside the vectors directory
const MEMORY_SNAPSHOT_FILE: &str = "snapshot.json";

/// Shared state behind every request
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<RagConfig>,
    pub store: Arc<dyn VectorStore>,
    pub catalog: Arc<dyn ItemCatalog>,
    pub engine: Arc<RetrievalEngine>,
    pub indexer: Arc<MusicIndexer>,
    pub sessions: Arc<SessionStore>,
    pub enhancer: Option<Arc<dyn QueryEnhancer>>,
    pub explainer: Option<Arc<dyn ResultExplainer>>,
}

impl AppState {
    /// Assemble state from already-built components. No audio embedder,
    /// no reranker and no LLM stages are attached.
    pub fn from_parts(
        config: RagConfig,
        store: Arc<dyn VectorStore>,
        catalog: Arc<dyn ItemCatalog>,
        text_embedder: Arc<dyn TextEmbedder>,
    ) -> Self {
        Self::assemble(config, store, catalog, text_embedder, None, None)
    }

    fn assemble(
        config: RagConfig,
        store: Arc<dyn VectorStore>,
        catalog: Arc<dyn ItemCatalog>,
        text_embedder: Arc<dyn TextEmbedder>,
        audio_embedder: Option<Arc<dyn AudioEmbedder>>,
        reranker: Option<Arc<dyn Rerank>>,
    ) -> Self {
        let mut engine = RetrievalEngine::new(store.clone(), text_embedder.clone());
        let mut indexer = MusicIndexer::new(store.clone(), catalog.clone(), text_embedder)
            .with_max_batch_size(config.max_batch_size);
        if let Some(audio) = audio_embedder {
            engine = engine.with_audio_embedder(audio.clone());
            indexer = indexer.with_audio_embedder(audio);
        }
        if let Some(reranker) = reranker {
            engine = engine.with_reranker(reranker);
        }
        let sessions = SessionStore::with_capacity(config.max_session_history, config.max_sessions);

        Self {
            config: Arc::new(config),
            store,
            catalog,
            engine: Arc::new(engine),
            indexer: Arc::new(indexer),
            sessions: Arc::new(sessions),
            enhancer: None,
            explainer: None,
        }
    }

    /// Attach LLM stages
    pub fn with_llm(
        mut self,
        enhancer: Option<Arc<dyn QueryEnhancer>>,
        explainer: Option<Arc<dyn ResultExplainer>>,
    ) -> Self {
        self.enhancer = enhancer;
        self.explainer = explainer;
        self
    }

    /// Build every component described by `config`.
    ///
    /// Loads the embedding model, so call it off the async executor.
    pub fn from_config(config: RagConfig) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&config.data_dir).with_context(|| {
            format!("creating data directory {}", config.data_dir.display())
        })?;

        let store = open_store(&config)?;
        let catalog: Arc<dyn ItemCatalog> = Arc::new(
            SqliteCatalog::new(Some(config.catalog_path())).context("opening item catalog")?,
        );
        let text_embedder = load_text_embedder(&config)?;
        let audio_embedder = load_audio_embedder(&config)?;

        let reranker: Option<Arc<dyn Rerank>> = if config.enable_reranking {
            #[allow(unused_mut)]
            let mut reranker = CrossEncoderReranker::new(RerankerConfig::default());
            #[cfg(feature = "embeddings")]
            reranker.init_cross_encoder();
            Some(Arc::new(reranker))
        } else {
            None
        };

        let (enhancer, explainer) = load_llm_stages(&config)?;

        info!(
            backend = config.store_backend.as_str(),
            model = %config.text_model,
            audio = audio_embedder.is_some(),
            reranking = reranker.is_some(),
            enhancement = enhancer.is_some(),
            explanation = explainer.is_some(),
            "Application state initialized"
        );

        Ok(Self::assemble(config, store, catalog, text_embedder, audio_embedder, reranker)
            .with_llm(enhancer, explainer))
    }

    /// Timeout applied to optional LLM stages
    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.config.llm_timeout_secs.max(1))
    }
}

/// Open the configured vector store backend
pub fn open_store(config: &RagConfig) -> anyhow::Result<Arc<dyn VectorStore>> {
    let dir = config.vectors_dir();
    let store: Arc<dyn VectorStore> = match config.store_backend {
        StoreBackend::Memory => Arc::new(
            MemoryVectorStore::open(MemoryStoreConfig {
                text_metric: config.text_metric,
                audio_metric: config.audio_metric,
                snapshot_path: Some(dir.join(MEMORY_SNAPSHOT_FILE)),
                ..Default::default()
            })
            .context("opening memory vector store")?,
        ),
        #[cfg(feature = "vector-search")]
        StoreBackend::Hnsw => {
            use music_rag_core::store::{HnswConfig, HnswVectorStore};
            Arc::new(
                HnswVectorStore::open(HnswConfig {
                    text_metric: config.text_metric,
                    audio_metric: config.audio_metric,
                    directory: Some(dir),
                    ..Default::default()
                })
                .context("opening HNSW vector store")?,
            )
        }
        #[cfg(not(feature = "vector-search"))]
        StoreBackend::Hnsw => {
            anyhow::bail!("the hnsw store backend requires the `vector-search` feature")
        }
    };
    Ok(store)
}

#[cfg(feature = "embeddings")]
fn load_text_embedder(config: &RagConfig) -> anyhow::Result<Arc<dyn TextEmbedder>> {
    use music_rag_core::embeddings::LocalTextEmbedder;

    let embedder = LocalTextEmbedder::with_model(&config.text_model, None)
        .with_context(|| format!("loading text embedding model {}", config.text_model))?;
    Ok(Arc::new(CachedTextEmbedder::new(embedder, config.query_cache_size)))
}

#[cfg(not(feature = "embeddings"))]
fn load_text_embedder(_config: &RagConfig) -> anyhow::Result<Arc<dyn TextEmbedder>> {
    anyhow::bail!("a text embedder requires the `embeddings` feature")
}

#[cfg(feature = "audio")]
fn load_audio_embedder(config: &RagConfig) -> anyhow::Result<Option<Arc<dyn AudioEmbedder>>> {
    use music_rag_core::embeddings::{FeatureAudioEmbedder, DEFAULT_MAX_DURATION_SECS, DEFAULT_SAMPLE_RATE};

    if !config.enable_audio_embeddings {
        return Ok(None);
    }
    let embedder = FeatureAudioEmbedder::with_settings(
        DEFAULT_SAMPLE_RATE,
        config.audio_n_mfcc,
        DEFAULT_MAX_DURATION_SECS,
    )
    .context("configuring audio feature embedder")?;
    info!(dimensions = embedder.dimensions(), "Audio feature embedder ready");
    Ok(Some(Arc::new(embedder)))
}

#[cfg(not(feature = "audio"))]
fn load_audio_embedder(config: &RagConfig) -> anyhow::Result<Option<Arc<dyn AudioEmbedder>>> {
    if config.enable_audio_embeddings {
        warn!("Audio embeddings enabled but the `audio` feature is not compiled in; audio queries are ignored");
    }
    Ok(None)
}

type LlmStages = (
    Option<Arc<dyn QueryEnhancer>>,
    Option<Arc<dyn ResultExplainer>>,
);

#[cfg(feature = "llm")]
fn load_llm_stages(config: &RagConfig) -> anyhow::Result<LlmStages> {
    use music_rag_core::llm::{OpenAiClient, OpenAiConfig, OpenAiQueryEnhancer, OpenAiResultExplainer};

    if !config.enable_query_enhancement && !config.enable_result_explanation {
        return Ok((None, None));
    }
    let Some(api_key) = config.openai_api_key.clone() else {
        warn!("LLM stages enabled but OPENAI_API_KEY is not set; they will be skipped");
        return Ok((None, None));
    };

    let client = OpenAiClient::new(OpenAiConfig {
        api_key,
        base_url: config.llm_base_url.clone(),
        model: config.llm_model.clone(),
        timeout: Duration::from_secs(config.llm_timeout_secs),
    })
    .context("creating LLM client")?;

    let enhancer: Option<Arc<dyn QueryEnhancer>> = config
        .enable_query_enhancement
        .then(|| Arc::new(OpenAiQueryEnhancer::new(client.clone())) as Arc<dyn QueryEnhancer>);
    let explainer: Option<Arc<dyn ResultExplainer>> = config
        .enable_result_explanation
        .then(|| Arc::new(OpenAiResultExplainer::new(client)) as Arc<dyn ResultExplainer>);
    Ok((enhancer, explainer))
}

#[cfg(not(feature = "llm"))]
fn load_llm_stages(config: &RagConfig) -> anyhow::Result<LlmStages> {
    if config.enable_query_enhancement || config.enable_result_explanation {
        warn!("LLM stages enabled but the `llm` feature is not compiled in");
    }
    Ok((None, None))
}
