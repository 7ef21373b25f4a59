//! Music RAG HTTP server
//!
//! Serves the retrieval API described in [`music_rag_server::api`].
//! Configuration comes from `MUSIC_RAG_*` environment variables.

use std::process::ExitCode;

use tracing::{error, info, warn};

use music_rag_core::RagConfig;
use music_rag_server::api::build_router;
use music_rag_server::init_tracing;
use music_rag_server::state::AppState;

#[tokio::main]
async fn main() -> ExitCode {
    let config = match RagConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    init_tracing(&config);
    info!("Music RAG server v{} starting...", env!("CARGO_PKG_VERSION"));

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Server error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(config: RagConfig) -> anyhow::Result<()> {
    let address = config.bind_address();

    // Model loading blocks
    let state = tokio::task::spawn_blocking(move || AppState::from_config(config)).await??;
    let store = state.store.clone();

    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!(address = %address, environment = %state.config.environment, "Listening");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down, flushing vector store");
    if let Err(e) = tokio::task::spawn_blocking(move || store.flush()).await? {
        warn!("Failed to flush vector store: {}", e);
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
