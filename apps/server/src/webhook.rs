//! Webhook update delivery.
//!
//! Telegram posts updates to the public URL; teloxide's axum listener turns
//! them into a stream for the dispatcher. The same server answers
//! `GET /health`.

use crate::config::WebhookSettings;
use crate::state::{SharedState, StatsSummary};
use axum::{extract::State, routing::get, Json, Router};
use gasbot_alerts::TelegramBot;
use gasbot_core::GasPrice;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use teloxide::update_listeners::webhooks;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Error, Debug)]
pub enum WebhookError {
    #[error("Failed to register webhook: {0}")]
    Register(#[from] teloxide::RequestError),
    #[error("Webhook server error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Webhook server task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub subscribers: usize,
    pub latest: Option<GasPrice>,
    pub stats: StatsSummary,
}

/// Health check handler.
async fn health_handler(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        subscribers: state.registry.len().await,
        latest: state.latest.load().map(|price| *price),
        stats: state.stats_summary(),
    })
}

pub fn health_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Register the webhook, serve it on `settings.port` and dispatch updates
/// until `cancel` fires.
pub async fn run_webhook(
    bot: Arc<TelegramBot>,
    state: SharedState,
    settings: WebhookSettings,
    cancel: CancellationToken,
) -> Result<(), WebhookError> {
    let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));
    let options = webhooks::Options::new(addr, settings.public_url.clone());
    let (listener, stop_flag, router) =
        webhooks::axum_to_router(bot.bot().clone(), options).await?;
    let app = router.merge(health_router(state));

    let tcp = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, url = %settings.public_url, "Webhook server listening");

    let server_cancel = cancel.clone();
    let server = tokio::spawn(async move {
        axum::serve(tcp, app)
            .with_graceful_shutdown(async move {
                tokio::select! {
                    _ = stop_flag => {}
                    _ = server_cancel.cancelled() => {}
                }
            })
            .await
    });

    bot.run_with_listener(listener, cancel).await;
    server.await??;
    info!("Webhook server stopped");
    Ok(())
}
