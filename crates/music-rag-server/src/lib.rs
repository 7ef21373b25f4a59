//! Music RAG Server
//!
//! HTTP API and command-line front ends over `music-rag-core`.

pub mod api;
pub mod state;

use std::io;

use tracing::Level;
use tracing_subscriber::EnvFilter;

use music_rag_core::RagConfig;

/// Initialize logging to stderr.
///
/// `RUST_LOG` wins when set; otherwise the configured level applies.
pub fn init_tracing(config: &RagConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::default().add_directive(Level::INFO.into()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false);

    if config.log_json {
        builder.json().init();
    } else {
        builder.with_ansi(false).init();
    }
}
