//! Relay: the HTTP + websocket front of an in-process channel hub.
//!
//! SYSTEM CONTEXT
//! ==============
//! Browsers and headless peers cannot share a `LocalHub` directly, so the
//! relay exposes one over websockets. Each connection maps to at most one
//! hub subscription; the hub owns presence and fan-out, the relay only
//! translates frames.
//!
//! Routes:
//! - `GET /ws`: websocket upgrade, see [`ws`]
//! - `GET /api/presence/{topic}`: current visitor count on a topic
//! - `GET /healthz`: liveness

pub mod ws;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::channel::memory::LocalHub;

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct PresenceCount {
    pub topic: String,
    pub count: usize,
}

/// Build the relay router over `hub`.
pub fn app(hub: LocalHub) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ws", get(ws::handle_ws))
        .route("/api/presence/{topic}", get(presence_count))
        .route("/healthz", get(healthz))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(hub)
}

/// Serve the relay on an already-bound listener until the server fails.
///
/// # Errors
///
/// Returns the underlying I/O error if the accept loop dies.
pub async fn serve(listener: TcpListener, hub: LocalHub) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "relay listening");
    }
    axum::serve(listener, app(hub)).await
}

async fn presence_count(State(hub): State<LocalHub>, Path(topic): Path<String>) -> Json<PresenceCount> {
    let count = hub.presence_count(&topic);
    Json(PresenceCount { topic, count })
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
