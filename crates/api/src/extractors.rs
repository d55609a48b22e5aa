//! Request extractors.

use std::convert::Infallible;
use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, FromRequestParts, Query},
    http::{HeaderMap, request::Parts},
    response::{IntoResponse, IntoResponseParts, Response, ResponseParts},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{TimeDelta, Utc};
use serde::Deserialize;
use tally_common::{AppError, DenialReason};
use tally_core::{Authorized, SessionToken};

use crate::middleware::AppState;

/// Name of the admin session cookie.
pub const SESSION_COOKIE: &str = "tally_session";

/// Client address and user agent.
///
/// The address is the first `X-Forwarded-For` entry, then `X-Real-IP`, then
/// the socket peer. Forwarding headers are taken at face value.
///
/// Only the first `X-Forwarded-For` hop feeds the fingerprint, not the whole
/// header value. Fingerprints stored by a deployment that hashed the full
/// header will not match the ones computed here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    pub ip: String,
    pub user_agent: String,
}

impl ClientInfo {
    fn from_parts(parts: &Parts) -> Self {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string());

        Self {
            ip: forwarded_ip(&parts.headers).or(peer).unwrap_or_default(),
            user_agent: header_str(&parts.headers, "user-agent")
                .unwrap_or_default()
                .to_string(),
        }
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn forwarded_ip(headers: &HeaderMap) -> Option<String> {
    let first_forwarded = header_str(headers, "x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    first_forwarded
        .or_else(|| header_str(headers, "x-real-ip").map(str::trim).filter(|v| !v.is_empty()))
        .map(ToString::to_string)
}

impl<S> FromRequestParts<S> for ClientInfo
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_parts(parts))
    }
}

#[derive(Debug, Default, Deserialize)]
struct AdminKey {
    key: Option<String>,
}

/// Proof that the request may use admin pages.
///
/// Also a response part: when the request opened a new session the cookie
/// is set on the response.
#[derive(Debug)]
pub struct AdminAccess {
    pub authorized: Authorized,
    jar: CookieJar,
}

/// Rejected admin request. A stale session cookie is cleared on the way out.
#[derive(Debug)]
pub struct AdminRejection {
    reason: DenialReason,
    clear_cookie: bool,
}

impl IntoResponse for AdminRejection {
    fn into_response(self) -> Response {
        let error = AppError::AccessDenied(self.reason);
        if self.clear_cookie {
            (CookieJar::new().remove(removal_cookie()), error).into_response()
        } else {
            error.into_response()
        }
    }
}

impl FromRequestParts<AppState> for AdminAccess {
    type Rejection = AdminRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let client = ClientInfo::from_parts(parts);
        let key = Query::<AdminKey>::try_from_uri(&parts.uri)
            .map(|Query(k)| k)
            .unwrap_or_default();
        let jar = CookieJar::from_headers(&parts.headers);
        let token = jar
            .get(SESSION_COOKIE)
            .map(|c| SessionToken::from_client(c.value()));

        let authorized = state
            .admin_auth
            .authorize(&client.ip, key.key.as_deref(), token.as_ref(), Utc::now())
            .await
            .map_err(|reason| AdminRejection {
                reason,
                clear_cookie: token.is_some() && reason != DenialReason::TooManyAttempts,
            })?;

        let jar = if authorized.established {
            jar.add(session_cookie(
                &authorized.token,
                state.admin_auth.session_timeout(),
                state.site.secure_cookie,
            ))
        } else {
            jar
        };

        Ok(Self { authorized, jar })
    }
}

impl IntoResponseParts for AdminAccess {
    type Error = Infallible;

    fn into_response_parts(self, res: ResponseParts) -> Result<ResponseParts, Self::Error> {
        self.jar.into_response_parts(res)
    }
}

/// Cookie carrying a freshly established session.
#[must_use]
pub fn session_cookie(token: &SessionToken, timeout: TimeDelta, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token.as_str().to_string()))
        .http_only(true)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(time::Duration::seconds(timeout.num_seconds()))
        .secure(secure)
        .build()
}

/// Cookie that removes the session cookie from the browser.
#[must_use]
pub fn removal_cookie() -> Cookie<'static> {
    Cookie::build(SESSION_COOKIE).path("/").build()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts(req: Request<()>) -> Parts {
        req.into_parts().0
    }

    #[test]
    fn test_forwarded_for_first_entry() {
        let forwarded = parts(
            Request::builder()
                .header("x-forwarded-for", " 203.0.113.9 , 10.0.0.1")
                .header("x-real-ip", "192.0.2.1")
                .header("user-agent", "curl/8")
                .body(())
                .unwrap(),
        );
        let client = ClientInfo::from_parts(&forwarded);
        assert_eq!(client.ip, "203.0.113.9");
        assert_eq!(client.user_agent, "curl/8");
    }

    #[test]
    fn test_real_ip_then_peer() {
        let real_ip = parts(
            Request::builder()
                .header("x-real-ip", "192.0.2.1")
                .body(())
                .unwrap(),
        );
        assert_eq!(ClientInfo::from_parts(&real_ip).ip, "192.0.2.1");

        let mut req = Request::builder().body(()).unwrap();
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([198, 51, 100, 3], 4000))));
        let client = ClientInfo::from_parts(&parts(req));
        assert_eq!(client.ip, "198.51.100.3");
        assert_eq!(client.user_agent, "");
    }

    #[test]
    fn test_session_cookie_attributes() {
        let token = SessionToken::generate();
        let cookie = session_cookie(&token, TimeDelta::seconds(3600), true).to_string();

        assert!(cookie.starts_with(&format!("{SESSION_COOKIE}={}", token.as_str())));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Lax"));
        assert!(cookie.contains("Path=/"));
        assert!(cookie.contains("Max-Age=3600"));
        assert!(cookie.contains("Secure"));

        let plain = session_cookie(&token, TimeDelta::seconds(60), false).to_string();
        assert!(!plain.contains("Secure"));
    }
}
