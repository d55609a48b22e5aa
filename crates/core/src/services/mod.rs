//! Business logic services.

#![allow(missing_docs)]

pub mod admin_auth;
pub mod backup;
pub mod rate_limit;
pub mod session;
pub mod vote;

pub use admin_auth::{AdminAuthService, Authorized};
pub use backup::{
    BackupService, BackupWorker, build_backend, restore_before_start, wait_for_worker,
};
pub use rate_limit::{LoginRateLimiter, RateLimitConfig, RateLimitDecision};
pub use session::{AdminSession, SessionStore, SessionToken};
pub use vote::{CSV_HEADER, Tally, VoteOutcome, VoteService, render_csv};
