use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::state::AppState;

/// GET /health
/// Returns service status plus the gateway's current backend selection.
pub async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    let gateway = state.pipeline.gateway().status();
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "service": env!("CARGO_PKG_NAME"),
        "gateway": gateway,
    }))
}
