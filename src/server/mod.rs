//! HTTP surface over the thread, summary and reply services.

mod error;
mod extract;
mod routes;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use axum::routing::{get, post};

use crate::config::FetchConfig;
use crate::service::{ReplyGateway, SummaryService, ThreadService};

#[derive(Clone)]
pub struct AppState {
    pub threads: Arc<ThreadService>,
    pub summaries: Arc<SummaryService>,
    pub replies: Arc<ReplyGateway>,
    pub fetch: FetchConfig,
    /// Reported by `/health`
    pub model: String,
    pub mailbox: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/threads", get(routes::list_threads))
        .route("/thread/{id}", get(routes::get_thread))
        .route("/summary", post(routes::summary))
        .route("/draft", post(routes::draft))
        .route("/send", post(routes::send))
        .with_state(state)
}

/// Serve until Ctrl-C.
pub async fn serve(bind: &str, state: AppState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {bind}"))?;
    tracing::info!("Listening on {}", bind);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
