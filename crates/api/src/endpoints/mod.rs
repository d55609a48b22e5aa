//! HTTP endpoints.

mod admin;
mod auth;
mod meta;
mod pages;
mod poll;

use axum::{Router, middleware::from_fn};

use crate::middleware::{AppState, no_store};

pub use poll::ALREADY_VOTED;

/// Create the application router.
pub fn router() -> Router<AppState> {
    Router::new()
        .merge(pages::router())
        .merge(poll::router())
        .merge(auth::router())
        .merge(meta::router())
        .merge(admin::router().layer(from_fn(no_store)))
}
