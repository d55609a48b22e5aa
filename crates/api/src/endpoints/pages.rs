//! Public pages.

use axum::{Router, extract::State, response::Html, routing::get};

use crate::{html, middleware::AppState};

/// Voting page.
async fn index(State(state): State<AppState>) -> Html<String> {
    html::index(&state.site.question)
}

/// Shown after a successful vote.
async fn thanks() -> Html<String> {
    html::message("Thank you!", "Your vote has been recorded.")
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(index))
        .route("/thanks", get(thanks))
}
