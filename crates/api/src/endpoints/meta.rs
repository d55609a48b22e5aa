//! Health check.

use axum::{Router, routing::get};

use crate::middleware::AppState;

async fn healthz() -> &'static str {
    "ok"
}

pub fn router() -> Router<AppState> {
    Router::new().route("/healthz", get(healthz))
}
