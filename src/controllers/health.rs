use axum::{extract::State, http::StatusCode, Json};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::AppState;

// GET /health
pub async fn liveness() -> &'static str {
    "OK"
}

// GET /health/ready: store and cache connectivity.
pub async fn readiness(State(state): State<Arc<AppState>>) -> (StatusCode, Json<Value>) {
    let database = match &state.database {
        Some(db) => Some(db.ping().await.is_ok()),
        None => None,
    };
    let cache = match &state.cache {
        Some(cache) => Some(cache.ping().await),
        None => None,
    };

    // The cache is optional; only the store gates readiness.
    let ready = database.unwrap_or(true);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(json!({
            "ready": ready,
            "environment": state.config.app.environment,
            "database": database,
            "cache": cache,
        })),
    )
}
