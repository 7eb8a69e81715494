//! HTTP surface: the Telegram webhook and webhook registration.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::bot::engine::BotEngine;
use crate::bot::update;
use crate::error::BotError;

/// State shared by every route.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<BotEngine>,
    /// Full URL Telegram should post updates to.
    pub webhook_url: Option<String>,
    /// Shared secret Telegram must echo on every webhook call.
    pub webhook_secret: Option<String>,
}

/// Header Telegram uses to echo the webhook secret.
pub const SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/webhook", post(webhook))
        .route("/health", get(|| async { "OK" }))
        .with_state(state)
}

/// Bind and serve until Ctrl-C.
pub async fn serve(addr: SocketAddr, state: AppState) -> std::io::Result<()> {
    let listener = TcpListener::bind(&addr).await?;
    info!("🌐 Listening on {}", addr);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl-C: {e}");
            }
            info!("Shutting down");
        })
        .await
}

/// `GET /` - (re)register the webhook. Safe to call repeatedly.
pub async fn index(State(state): State<AppState>) -> (StatusCode, String) {
    let Some(url) = state.webhook_url.as_deref() else {
        let message = "PUBLIC_URL is not configured. \
            Set it to the bot's https base URL (no trailing slash).";
        error!("{}", message);
        return (StatusCode::INTERNAL_SERVER_ERROR, message.to_string());
    };

    match state
        .engine
        .register_webhook(url, state.webhook_secret.as_deref())
        .await
    {
        Ok(()) => (StatusCode::OK, format!("Webhook set to {url}\nBot is running.")),
        Err(e) => {
            error!("Failed to set webhook: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, format!("Failed to set webhook: {e}"))
        }
    }
}

/// `POST /webhook` - one Telegram update per request.
pub async fn webhook(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> StatusCode {
    if let Some(expected) = state.webhook_secret.as_deref() {
        let given = headers.get(SECRET_HEADER).and_then(|v| v.to_str().ok());
        if given != Some(expected) {
            warn!("Rejecting webhook call without a valid secret token");
            return StatusCode::UNAUTHORIZED;
        }
    }

    let update = match update::parse(&body) {
        Ok(u) => u,
        Err(e) => {
            let err = BotError::MalformedRequest(e.to_string());
            warn!("Ignoring webhook body ({} bytes): {err}", body.len());
            return StatusCode::BAD_REQUEST;
        }
    };

    let update_id = update.update_id;
    match update.into_event() {
        Some(event) => state.engine.handle_event(event).await,
        None => info!("Update {} has nothing to handle", update_id),
    }

    StatusCode::OK
}
