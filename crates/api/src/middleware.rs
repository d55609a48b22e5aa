//! Shared state and middleware.

#![allow(missing_docs)]

use std::sync::Arc;

use axum::{
    body::Body,
    http::{HeaderValue, Request, header},
    middleware::Next,
    response::Response,
};
use tally_common::Config;
use tally_core::{AdminAuthService, BackupService, VoteService};

/// Settings the handlers read from config.
#[derive(Debug, Clone)]
pub struct SiteSettings {
    pub question: String,
    pub public_url: Option<String>,
    pub secure_cookie: bool,
}

impl SiteSettings {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            question: config.poll.question.clone(),
            public_url: config.server.public_url.clone(),
            secure_cookie: config.admin.secure_cookie,
        }
    }
}

/// Application state.
#[derive(Clone)]
pub struct AppState {
    pub vote_service: VoteService,
    pub admin_auth: AdminAuthService,
    pub backup_service: BackupService,
    pub site: Arc<SiteSettings>,
}

impl AppState {
    #[must_use]
    pub fn new(
        vote_service: VoteService,
        admin_auth: AdminAuthService,
        backup_service: BackupService,
        site: SiteSettings,
    ) -> Self {
        Self {
            vote_service,
            admin_auth,
            backup_service,
            site: Arc::new(site),
        }
    }
}

/// Keep admin responses out of shared caches.
pub async fn no_store(req: Request<Body>, next: Next) -> Response {
    let mut response = next.run(req).await;
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}
