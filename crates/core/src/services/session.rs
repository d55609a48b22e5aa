//! Admin sessions.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::RwLock;

/// Opaque token identifying an admin session, carried in a cookie.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SessionToken(String);

impl SessionToken {
    /// Generate a new random token.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    /// Wrap a token received from a client.
    #[must_use]
    pub fn from_client(raw: &str) -> Self {
        Self(raw.to_string())
    }

    /// The token value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionToken(..)")
    }
}

/// An authenticated admin session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdminSession {
    /// When the credential was accepted.
    pub login_at: DateTime<Utc>,
}

impl AdminSession {
    /// Start a session at `now`.
    #[must_use]
    pub const fn new(now: DateTime<Utc>) -> Self {
        Self { login_at: now }
    }

    /// A session is valid while no more than `timeout` has elapsed since login.
    #[must_use]
    pub fn is_valid_at(&self, now: DateTime<Utc>, timeout: TimeDelta) -> bool {
        now.signed_duration_since(self.login_at) <= timeout
    }

    /// When the session stops being valid.
    #[must_use]
    pub fn expires_at(&self, timeout: TimeDelta) -> DateTime<Utc> {
        self.login_at
            .checked_add_signed(timeout)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

/// In-memory session store shared by request handlers.
#[derive(Clone, Default)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<SessionToken, AdminSession>>>,
}

impl SessionStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `session` under a fresh token.
    pub async fn insert(&self, session: AdminSession) -> SessionToken {
        let token = SessionToken::generate();
        self.sessions.write().await.insert(token.clone(), session);
        token
    }

    /// Look up a session.
    pub async fn get(&self, token: &SessionToken) -> Option<AdminSession> {
        self.sessions.read().await.get(token).copied()
    }

    /// Remove a session. Returns whether one existed.
    pub async fn remove(&self, token: &SessionToken) -> bool {
        self.sessions.write().await.remove(token).is_some()
    }

    /// Remove every session that has expired at `now`.
    pub async fn purge_expired(&self, now: DateTime<Utc>, timeout: TimeDelta) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| session.is_valid_at(now, timeout));
        before - sessions.len()
    }

    /// Number of live entries.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Whether the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
