//! Common utilities and shared types for tally.
//!
//! This crate provides foundational components used across all tally crates:
//!
//! - **Configuration**: Application settings via [`Config`]
//! - **Error handling**: Unified error types via [`AppError`] and [`AppResult`]
//! - **Cryptography**: Voter fingerprints and admin credential checks
//! - **Storage**: Backup backends for the vote database (local, S3-compatible)
//!
//! # Example
//!
//! ```no_run
//! use tally_common::{AppResult, Config, Fingerprinter};
//!
//! fn example() -> AppResult<()> {
//!     let config = Config::load()?;
//!     let fingerprinter = Fingerprinter::new(config.fingerprint.salt);
//!     println!("{}", fingerprinter.fingerprint("127.0.0.1", "curl/8.0"));
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod crypto;
pub mod error;
pub mod storage;

pub use config::Config;
pub use crypto::{Fingerprinter, SecretMatcher};
pub use error::{AppError, AppResult, DenialReason};
#[cfg(feature = "s3")]
pub use storage::S3Backup;
pub use storage::{BackupBackend, BackupReceipt, DownloadOutcome, LocalBackup};
