//! Configuration
//!
//! Settings come from `MUSIC_RAG_*` environment variables with defaults for
//! anything unset. Loading goes through a lookup function so tests never
//! touch the process environment.

use directories::ProjectDirs;
use std::path::PathBuf;
use std::str::FromStr;

use crate::models::{DEFAULT_SEMANTIC_WEIGHT, DEFAULT_TOP_K, MAX_TOP_K};
use crate::store::DistanceMetric;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "MUSIC_RAG_";

/// Invalid configuration value
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {reason}")]
    Invalid { var: String, reason: String },
    #[error("Could not determine a data directory")]
    NoDataDir,
}

impl ConfigError {
    fn invalid(var: &str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            var: var.to_string(),
            reason: reason.into(),
        }
    }
}

/// Vector store backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// Brute-force store with a JSON snapshot
    Memory,
    /// USearch HNSW store
    Hnsw,
}

impl StoreBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreBackend::Memory => "memory",
            StoreBackend::Hnsw => "hnsw",
        }
    }
}

impl Default for StoreBackend {
    fn default() -> Self {
        if cfg!(feature = "vector-search") {
            StoreBackend::Hnsw
        } else {
            StoreBackend::Memory
        }
    }
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(StoreBackend::Memory),
            "hnsw" | "usearch" => Ok(StoreBackend::Hnsw),
            other => Err(format!("unknown store backend: {}", other)),
        }
    }
}

/// Application settings
#[derive(Debug, Clone, PartialEq)]
pub struct RagConfig {
    pub app_name: String,
    pub environment: String,
    pub data_dir: PathBuf,
    pub store_backend: StoreBackend,
    pub text_metric: DistanceMetric,
    pub audio_metric: DistanceMetric,
    pub text_model: String,
    pub enable_reranking: bool,
    pub enable_query_enhancement: bool,
    pub enable_result_explanation: bool,
    pub llm_model: String,
    pub llm_base_url: String,
    pub llm_timeout_secs: u64,
    pub openai_api_key: Option<String>,
    pub default_top_k: usize,
    pub default_semantic_weight: f32,
    pub api_host: String,
    pub api_port: u16,
    pub api_key: Option<String>,
    pub log_level: String,
    pub log_json: bool,
    pub max_batch_size: usize,
    pub query_cache_size: usize,
    /// Compute audio embeddings from `audio_path` files
    pub enable_audio_embeddings: bool,
    /// MFCC count of the audio features; embeddings have three times as many dimensions
    pub audio_n_mfcc: usize,
    pub max_sessions: usize,
    pub max_session_history: usize,
}

impl RagConfig {
    /// Defaults with the given data directory
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            app_name: "Music RAG".to_string(),
            environment: "development".to_string(),
            data_dir: data_dir.into(),
            store_backend: StoreBackend::default(),
            text_metric: DistanceMetric::Cosine,
            audio_metric: DistanceMetric::Cosine,
            text_model: crate::DEFAULT_EMBEDDING_MODEL.to_string(),
            enable_reranking: false,
            enable_query_enhancement: false,
            enable_result_explanation: false,
            llm_model: "gpt-4o-mini".to_string(),
            llm_base_url: "https://api.openai.com/v1".to_string(),
            llm_timeout_secs: 30,
            openai_api_key: None,
            default_top_k: DEFAULT_TOP_K,
            default_semantic_weight: DEFAULT_SEMANTIC_WEIGHT,
            api_host: "127.0.0.1".to_string(),
            api_port: 8000,
            api_key: None,
            log_level: "info".to_string(),
            log_json: false,
            max_batch_size: crate::indexer::DEFAULT_MAX_BATCH_SIZE,
            query_cache_size: crate::embeddings::DEFAULT_CACHE_CAPACITY,
            enable_audio_embeddings: true,
            audio_n_mfcc: 40,
            max_sessions: crate::llm::DEFAULT_MAX_SESSIONS,
            max_session_history: crate::llm::DEFAULT_MAX_HISTORY,
        }
    }

    /// Load from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load using `lookup` to resolve variable names
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Lookup(&lookup);

        let data_dir = match env.string("DATA_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => default_data_dir()?,
        };
        let mut config = Self::with_data_dir(data_dir);

        if let Some(v) = env.string("APP_NAME") {
            config.app_name = v;
        }
        if let Some(v) = env.string("ENVIRONMENT") {
            config.environment = v;
        }
        if let Some(v) = env.parse("STORE_BACKEND")? {
            config.store_backend = v;
        }
        if let Some(v) = env.parse("TEXT_METRIC")? {
            config.text_metric = v;
        }
        if let Some(v) = env.parse("AUDIO_METRIC")? {
            config.audio_metric = v;
        }
        if let Some(v) = env.string("TEXT_MODEL") {
            config.text_model = v;
        }
        if let Some(v) = env.flag("ENABLE_RERANKING")? {
            config.enable_reranking = v;
        }
        if let Some(v) = env.flag("ENABLE_QUERY_ENHANCEMENT")? {
            config.enable_query_enhancement = v;
        }
        if let Some(v) = env.flag("ENABLE_RESULT_EXPLANATION")? {
            config.enable_result_explanation = v;
        }
        if let Some(v) = env.string("LLM_MODEL") {
            config.llm_model = v;
        }
        if let Some(v) = env.string("LLM_BASE_URL") {
            config.llm_base_url = v;
        }
        if let Some(v) = env.parse("LLM_TIMEOUT_SECS")? {
            config.llm_timeout_secs = v;
        }
        config.openai_api_key = lookup("OPENAI_API_KEY").filter(|k| !k.trim().is_empty());
        if let Some(v) = env.parse("DEFAULT_TOP_K")? {
            config.default_top_k = v;
        }
        if let Some(v) = env.parse("DEFAULT_SEMANTIC_WEIGHT")? {
            config.default_semantic_weight = v;
        }
        if let Some(v) = env.string("API_HOST") {
            config.api_host = v;
        }
        if let Some(v) = env.parse("API_PORT")? {
            config.api_port = v;
        }
        config.api_key = env.string("API_KEY");
        if let Some(v) = env.string("LOG_LEVEL") {
            config.log_level = v;
        }
        if let Some(v) = env.flag("LOG_JSON")? {
            config.log_json = v;
        }
        if let Some(v) = env.parse("MAX_BATCH_SIZE")? {
            config.max_batch_size = v;
        }
        if let Some(v) = env.parse("QUERY_CACHE_SIZE")? {
            config.query_cache_size = v;
        }
        if let Some(v) = env.flag("ENABLE_AUDIO_EMBEDDINGS")? {
            config.enable_audio_embeddings = v;
        }
        if let Some(v) = env.parse("AUDIO_N_MFCC")? {
            config.audio_n_mfcc = v;
        }
        if let Some(v) = env.parse("MAX_SESSIONS")? {
            config.max_sessions = v;
        }
        if let Some(v) = env.parse("MAX_SESSION_HISTORY")? {
            config.max_session_history = v;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        let w = self.default_semantic_weight;
        if !w.is_finite() || !(0.0..=1.0).contains(&w) {
            return Err(ConfigError::invalid(
                "MUSIC_RAG_DEFAULT_SEMANTIC_WEIGHT",
                format!("{} is outside [0, 1]", w),
            ));
        }
        if self.default_top_k == 0 || self.default_top_k > MAX_TOP_K {
            return Err(ConfigError::invalid(
                "MUSIC_RAG_DEFAULT_TOP_K",
                format!("{} is outside 1..={}", self.default_top_k, MAX_TOP_K),
            ));
        }
        if self.max_batch_size == 0 {
            return Err(ConfigError::invalid("MUSIC_RAG_MAX_BATCH_SIZE", "must be at least 1"));
        }
        if self.query_cache_size == 0 {
            return Err(ConfigError::invalid("MUSIC_RAG_QUERY_CACHE_SIZE", "must be at least 1"));
        }
        if !(12..=128).contains(&self.audio_n_mfcc) {
            return Err(ConfigError::invalid(
                "MUSIC_RAG_AUDIO_N_MFCC",
                format!("{} is outside 12..=128", self.audio_n_mfcc),
            ));
        }
        if self.max_sessions == 0 {
            return Err(ConfigError::invalid("MUSIC_RAG_MAX_SESSIONS", "must be at least 1"));
        }
        if self.max_session_history == 0 {
            return Err(ConfigError::invalid("MUSIC_RAG_MAX_SESSION_HISTORY", "must be at least 1"));
        }
        Ok(())
    }

    /// Item catalog database file
    pub fn catalog_path(&self) -> PathBuf {
        self.data_dir.join(crate::catalog::CATALOG_FILE)
    }

    /// Directory holding vector store files
    pub fn vectors_dir(&self) -> PathBuf {
        self.data_dir.join("vectors")
    }

    /// `host:port` the HTTP server binds
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api_host, self.api_port)
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }
}

/// Platform data directory
pub fn default_data_dir() -> Result<PathBuf, ConfigError> {
    ProjectDirs::from("com", "music-rag", "music-rag")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .ok_or(ConfigError::NoDataDir)
}

struct Lookup<'a, F>(&'a F);

impl<F> Lookup<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn var_name(key: &str) -> String {
        format!("{ENV_PREFIX}{key}")
    }

    /// Non-empty trimmed value
    fn string(&self, key: &str) -> Option<String> {
        (self.0)(&Self::var_name(key))
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse<T>(&self, key: &str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.string(key)
            .map(|raw| {
                raw.parse::<T>()
                    .map_err(|e| ConfigError::invalid(&Self::var_name(key), format!("{raw:?}: {e}")))
            })
            .transpose()
    }

    fn flag(&self, key: &str) -> Result<Option<bool>, ConfigError> {
        self.string(key)
            .map(|raw| match raw.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                _ => Err(ConfigError::invalid(
                    &Self::var_name(key),
                    format!("{raw:?} is not a boolean"),
                )),
            })
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<RagConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        RagConfig::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[("MUSIC_RAG_DATA_DIR", "/tmp/music-rag")]).unwrap();
        assert_eq!(config.app_name, "Music RAG");
        assert_eq!(config.default_top_k, 10);
        assert!((config.default_semantic_weight - 0.7).abs() < 1e-6);
        assert_eq!(config.api_port, 8000);
        assert!(config.api_key.is_none());
        assert!(!config.enable_reranking);
        assert!(config.enable_audio_embeddings);
        assert_eq!(config.audio_n_mfcc, 40);
        assert_eq!(config.max_sessions, 1000);
        assert_eq!(config.max_session_history, 5);
        assert_eq!(config.catalog_path(), PathBuf::from("/tmp/music-rag/catalog.db"));
        assert_eq!(config.bind_address(), "127.0.0.1:8000");
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("MUSIC_RAG_DATA_DIR", "/data"),
            ("MUSIC_RAG_STORE_BACKEND", "memory"),
            ("MUSIC_RAG_ENABLE_RERANKING", "yes"),
            ("MUSIC_RAG_DEFAULT_SEMANTIC_WEIGHT", "0.4"),
            ("MUSIC_RAG_API_PORT", "9000"),
            ("MUSIC_RAG_API_KEY", "secret"),
            ("MUSIC_RAG_AUDIO_METRIC", "euclidean"),
            ("MUSIC_RAG_ENABLE_AUDIO_EMBEDDINGS", "false"),
            ("MUSIC_RAG_MAX_SESSIONS", "50"),
            ("OPENAI_API_KEY", "sk-test"),
        ])
        .unwrap();
        assert!(!config.enable_audio_embeddings);
        assert_eq!(config.max_sessions, 50);
        assert_eq!(config.store_backend, StoreBackend::Memory);
        assert!(config.enable_reranking);
        assert!((config.default_semantic_weight - 0.4).abs() < 1e-6);
        assert_eq!(config.api_port, 9000);
        assert_eq!(config.api_key.as_deref(), Some("secret"));
        assert_eq!(config.audio_metric, DistanceMetric::Euclidean);
        assert_eq!(config.openai_api_key.as_deref(), Some("sk-test"));
    }

    #[test]
    fn test_invalid_values() {
        let base = ("MUSIC_RAG_DATA_DIR", "/data");
        assert!(load(&[base, ("MUSIC_RAG_DEFAULT_SEMANTIC_WEIGHT", "1.5")]).is_err());
        assert!(load(&[base, ("MUSIC_RAG_API_PORT", "eighty")]).is_err());
        assert!(load(&[base, ("MUSIC_RAG_STORE_BACKEND", "faiss")]).is_err());
        assert!(load(&[base, ("MUSIC_RAG_ENABLE_RERANKING", "maybe")]).is_err());
        assert!(load(&[base, ("MUSIC_RAG_DEFAULT_TOP_K", "0")]).is_err());
        assert!(load(&[base, ("MUSIC_RAG_MAX_SESSIONS", "0")]).is_err());
        assert!(load(&[base, ("MUSIC_RAG_AUDIO_N_MFCC", "4")]).is_err());
    }

    #[test]
    fn test_blank_values_use_defaults() {
        let config = load(&[
            ("MUSIC_RAG_DATA_DIR", "/data"),
            ("MUSIC_RAG_API_KEY", "  "),
            ("MUSIC_RAG_LOG_LEVEL", ""),
        ])
        .unwrap();
        assert!(config.api_key.is_none());
        assert_eq!(config.log_level, "info");
    }
}
