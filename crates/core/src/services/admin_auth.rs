//! Admin access guard.
//!
//! Combines the failed-login limiter, the configured results key and the
//! session store into one decision per admin request.

use chrono::{DateTime, TimeDelta, Utc};
use tally_common::{DenialReason, SecretMatcher, config::AdminConfig};
use tracing::{debug, info};

use super::rate_limit::{
    LoginRateLimiter, RateLimitConfig, RateLimitDecision, saturating_seconds,
};
use super::session::{AdminSession, SessionStore, SessionToken};

/// Outcome of a successful authorization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authorized {
    /// Token addressing the session.
    pub token: SessionToken,
    /// The session itself.
    pub session: AdminSession,
    /// True when the session was created by this request.
    pub established: bool,
}

/// Admin authorization service.
#[derive(Clone)]
pub struct AdminAuthService {
    matcher: SecretMatcher,
    timeout: TimeDelta,
    limiter: LoginRateLimiter,
    sessions: SessionStore,
}

impl AdminAuthService {
    /// Create a new admin auth service.
    #[must_use]
    pub fn new(
        results_key: &str,
        session_timeout: TimeDelta,
        limiter: LoginRateLimiter,
        sessions: SessionStore,
    ) -> Self {
        let hmac_key = uuid::Uuid::new_v4();
        Self {
            matcher: SecretMatcher::new(results_key, hmac_key.as_bytes()),
            timeout: session_timeout,
            limiter,
            sessions,
        }
    }

    /// Build the service from the `admin` config section.
    #[must_use]
    pub fn from_config(config: &AdminConfig) -> Self {
        let limiter = LoginRateLimiter::new(RateLimitConfig::new(
            config.rate_limit_threshold,
            config.rate_limit_window_secs,
        ));
        Self::new(
            &config.results_key,
            saturating_seconds(config.session_timeout_secs),
            limiter,
            SessionStore::new(),
        )
    }

    /// Decide whether a request may use the admin pages.
    ///
    /// Rules are applied in order: a blocked IP is refused outright, a live
    /// session is accepted as is, a matching credential opens a new session
    /// and a wrong one counts as a failed attempt. An empty credential is
    /// treated as absent.
    pub async fn authorize(
        &self,
        ip: &str,
        credential: Option<&str>,
        token: Option<&SessionToken>,
        now: DateTime<Utc>,
    ) -> Result<Authorized, DenialReason> {
        if let RateLimitDecision::Blocked { retry_after } = self.limiter.check(ip, now).await {
            debug!(ip = %ip, retry_after, "Admin request from blocked IP");
            return Err(DenialReason::TooManyAttempts);
        }

        if let Some(token) = token {
            if let Some(session) = self.sessions.get(token).await {
                if session.is_valid_at(now, self.timeout) {
                    return Ok(Authorized {
                        token: token.clone(),
                        session,
                        established: false,
                    });
                }
                self.sessions.remove(token).await;
                debug!(login_at = %session.login_at, "Admin session expired");
            }
        }

        match credential.filter(|c| !c.is_empty()) {
            Some(candidate) if self.matcher.matches(candidate) => {
                let session = AdminSession::new(now);
                let token = self.sessions.insert(session).await;
                info!(ip = %ip, "Admin session established");
                Ok(Authorized {
                    token,
                    session,
                    established: true,
                })
            }
            Some(_) => {
                self.limiter.record_failure(ip, now).await;
                Err(DenialReason::InvalidCredential)
            }
            None => Err(DenialReason::AuthenticationRequired),
        }
    }

    /// End a session. Unknown tokens are ignored.
    pub async fn logout(&self, token: &SessionToken) {
        if self.sessions.remove(token).await {
            info!("Admin logged out");
        }
    }

    /// Periodic cleanup of limiter entries and expired sessions.
    pub async fn sweep(&self, now: DateTime<Utc>) {
        self.limiter.sweep(now).await;
        let purged = self.sessions.purge_expired(now, self.timeout).await;
        if purged > 0 {
            debug!(purged, "Purged expired admin sessions");
        }
    }

    /// Configured session lifetime.
    #[must_use]
    pub const fn session_timeout(&self) -> TimeDelta {
        self.timeout
    }
}
