pub mod config;
pub mod error;
pub mod palette;
pub mod protocol;
pub mod room;
pub mod telemetry;
pub mod wordbank;
pub mod ws;

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use room::manager::RoomDirectory;
use ws::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init()?;

    let state = AppState {
        directory: Arc::new(RoomDirectory::new()),
    };

    let origins = config::cors_allowed_origins()?;
    let cors = if origins.is_empty() {
        CorsLayer::new()
    } else {
        CorsLayer::new().allow_origin(AllowOrigin::list(origins))
    };

    let app = Router::new()
        .route("/health", get(health))
        .route("/rooms", get(list_rooms))
        .route("/ws", get(ws::ws_upgrade))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = config::server_addr()?;
    tracing::info!(%addr, "doodleroom listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health() -> Json<serde_json::Value> {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);
    Json(json!({ "status": "ok", "timestamp": timestamp }))
}

/// Diagnostic enumeration of active rooms (§4.F); not part of the game
/// protocol itself.
async fn list_rooms(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({ "rooms": state.directory.list_rooms() }))
}
