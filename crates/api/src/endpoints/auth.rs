//! Admin logout.

use axum::{
    Router,
    extract::State,
    response::{IntoResponse, Redirect},
    routing::get,
};
use axum_extra::extract::cookie::CookieJar;
use tally_core::SessionToken;

use crate::{
    extractors::{SESSION_COOKIE, removal_cookie},
    middleware::AppState,
};

/// End the admin session and clear its cookie.
async fn logout(State(state): State<AppState>, jar: CookieJar) -> impl IntoResponse {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        let token = SessionToken::from_client(cookie.value());
        state.admin_auth.logout(&token).await;
    }

    (jar.remove(removal_cookie()), Redirect::to("/"))
}

pub fn router() -> Router<AppState> {
    Router::new().route("/logout", get(logout).post(logout))
}
