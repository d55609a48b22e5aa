//! Admin endpoints.
//!
//! Every handler takes [`AdminAccess`], which rejects the request before the
//! handler runs and sets the session cookie when a new session was opened.

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, header},
    response::{Html, IntoResponse},
    routing::{get, post},
};
use serde_json::{Value, json};
use tally_common::{AppResult, BackupReceipt};
use tally_core::Tally;
use url::Url;

use crate::{extractors::AdminAccess, html, middleware::AppState};

/// HTML results page.
async fn results(
    admin: AdminAccess,
    State(state): State<AppState>,
) -> AppResult<(AdminAccess, Html<String>)> {
    let tally = state.vote_service.tally().await?;
    let votes = state.vote_service.list_recent().await?;
    Ok((admin, html::results(&state.site.question, &tally, &votes)))
}

/// Vote counts as JSON.
async fn stats(
    admin: AdminAccess,
    State(state): State<AppState>,
) -> AppResult<(AdminAccess, Json<Tally>)> {
    let tally = state.vote_service.tally().await?;
    Ok((admin, Json(tally)))
}

/// Dashboard with the link to hand out to voters.
async fn dashboard(
    admin: AdminAccess,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> (AdminAccess, Html<String>) {
    let vote_url = vote_url(state.site.public_url.as_deref(), &headers);
    (admin, html::dashboard(&state.site.question, &vote_url))
}

/// Public voting URL: the configured one, else derived from the request.
fn vote_url(public_url: Option<&str>, headers: &HeaderMap) -> String {
    if let Some(base) = public_url.map(str::trim).filter(|u| !u.is_empty()) {
        return Url::parse(base)
            .map(|url| url.to_string())
            .unwrap_or_else(|_| format!("{}/", base.trim_end_matches('/')));
    }

    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");
    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .filter(|p| matches!(*p, "http" | "https"))
        .unwrap_or("http");
    format!("{scheme}://{host}/")
}

/// CSV download of every vote.
async fn export_csv(
    admin: AdminAccess,
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    let csv = state.vote_service.export_csv().await?;
    Ok((
        admin,
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"votes.csv\""),
        ],
        csv,
    ))
}

/// Delete every vote.
async fn reset(
    admin: AdminAccess,
    State(state): State<AppState>,
) -> AppResult<(AdminAccess, Json<Value>)> {
    let deleted = state.vote_service.reset().await?;
    Ok((admin, Json(json!({ "deleted": deleted }))))
}

/// Upload a backup right away.
async fn backup(
    admin: AdminAccess,
    State(state): State<AppState>,
) -> AppResult<(AdminAccess, Json<BackupReceipt>)> {
    let receipt = state.backup_service.backup_now().await?;
    Ok((admin, Json(receipt)))
}

/// Replace all votes with the latest backup.
async fn restore(
    admin: AdminAccess,
    State(state): State<AppState>,
) -> AppResult<(AdminAccess, Json<Value>)> {
    let restored = state.backup_service.restore_now().await?;
    Ok((admin, Json(json!({ "restored": restored }))))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/results", get(results))
        .route("/stats", get(stats))
        .route("/dashboard", get(dashboard))
        .route("/export.csv", get(export_csv))
        .route("/admin/reset", post(reset))
        .route("/admin/backup", post(backup))
        .route("/admin/restore", post(restore))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_vote_url_prefers_config() {
        let headers = HeaderMap::new();
        assert_eq!(
            vote_url(Some("https://poll.example.org"), &headers),
            "https://poll.example.org/"
        );
        assert_eq!(
            vote_url(Some("https://poll.example.org/"), &headers),
            "https://poll.example.org/"
        );
    }

    #[test]
    fn test_vote_url_from_request() {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("vote.local:8000"));
        assert_eq!(vote_url(None, &headers), "http://vote.local:8000/");

        headers.insert("x-forwarded-proto", HeaderValue::from_static("https"));
        assert_eq!(vote_url(Some(""), &headers), "https://vote.local:8000/");
    }
}
