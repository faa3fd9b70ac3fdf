use axum::response::Json;
use serde_json::{json, Value};

/// Liveness check. Served outside `base_path` and never rate limited.
#[must_use]
pub fn health_handler() -> Json<Value> {
    Json(json!({ "ok": true }))
}
