//! Vote submission.

use axum::{
    Form, Router,
    extract::State,
    response::{IntoResponse, Redirect, Response},
    routing::post,
};
use serde::Deserialize;
use tally_common::AppResult;
use tally_core::VoteOutcome;

use crate::{extractors::ClientInfo, html, middleware::AppState};

/// Reply for a client that has voted before.
pub const ALREADY_VOTED: &str = "You've already submitted a vote from this device. Thank you!";

/// Vote form.
#[derive(Debug, Deserialize)]
pub struct VoteForm {
    #[serde(default)]
    pub choice: String,
}

/// Record a vote.
async fn vote(
    State(state): State<AppState>,
    client: ClientInfo,
    Form(form): Form<VoteForm>,
) -> AppResult<Response> {
    let fingerprint = state
        .vote_service
        .fingerprint(&client.ip, &client.user_agent);

    let outcome = state
        .vote_service
        .cast_vote(&form.choice, &fingerprint, &client.ip, &client.user_agent)
        .await?;

    Ok(match outcome {
        VoteOutcome::Inserted(_) => Redirect::to("/thanks").into_response(),
        VoteOutcome::AlreadyVoted => html::message("Thank you!", ALREADY_VOTED).into_response(),
    })
}

pub fn router() -> Router<AppState> {
    Router::new().route("/vote", post(vote))
}
