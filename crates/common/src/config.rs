//! Application configuration.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use validator::Validate;

/// Longest accepted admin session or rate-limit window: one year.
pub const MAX_ADMIN_DURATION_SECS: u64 = 365 * 24 * 60 * 60;

/// Application configuration.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct Config {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Poll configuration.
    #[serde(default)]
    pub poll: PollConfig,
    /// Admin access configuration.
    #[validate(nested)]
    pub admin: AdminConfig,
    /// Voter fingerprint configuration.
    #[validate(nested)]
    pub fingerprint: FingerprintConfig,
    /// Backup configuration.
    #[serde(default)]
    #[validate(nested)]
    pub backup: BackupConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to bind to.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Externally reachable URL of the voting page, shown on the dashboard.
    #[serde(default)]
    pub public_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_url: None,
        }
    }
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path of the `SQLite` database file.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            max_connections: default_max_connections(),
        }
    }
}

impl DatabaseConfig {
    /// Connection URL for the database file, creating it if missing.
    #[must_use]
    pub fn url(&self) -> String {
        format!("sqlite://{}?mode=rwc", self.path.display())
    }
}

/// Poll configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PollConfig {
    /// The question shown to voters.
    #[serde(default = "default_question")]
    pub question: String,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            question: default_question(),
        }
    }
}

/// Admin access configuration.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AdminConfig {
    /// Shared secret granting access to results.
    #[validate(length(min = 1))]
    pub results_key: String,
    /// Admin session lifetime in seconds.
    #[serde(default = "default_session_timeout")]
    #[validate(range(min = 1, max = MAX_ADMIN_DURATION_SECS))]
    pub session_timeout_secs: u64,
    /// Failed-login window in seconds.
    #[serde(default = "default_rate_limit_window")]
    #[validate(range(min = 1, max = MAX_ADMIN_DURATION_SECS))]
    pub rate_limit_window_secs: u64,
    /// Failed logins tolerated within the window before blocking.
    #[serde(default = "default_rate_limit_threshold")]
    #[validate(range(min = 1))]
    pub rate_limit_threshold: u32,
    /// Mark the session cookie `Secure`.
    #[serde(default)]
    pub secure_cookie: bool,
}

/// Voter fingerprint configuration.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct FingerprintConfig {
    /// Server-side salt mixed into every fingerprint.
    #[validate(length(min = 1))]
    pub salt: String,
}

/// Which backend receives database backups.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupBackendKind {
    /// Backups disabled.
    #[default]
    None,
    /// Copy to a local directory.
    Local,
    /// Upload to S3-compatible object storage.
    S3,
}

/// Backup configuration.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct BackupConfig {
    /// Selected backend.
    #[serde(default)]
    pub backend: BackupBackendKind,
    /// Target directory for the local backend.
    #[serde(default)]
    pub local_dir: Option<PathBuf>,
    /// Object key the database file is stored under.
    #[serde(default = "default_object_key")]
    #[validate(length(min = 1))]
    pub object_key: String,
    /// Upper bound for a single upload or download, in seconds.
    #[serde(default = "default_backup_timeout")]
    #[validate(range(min = 1))]
    pub timeout_secs: u64,
    /// S3 settings for the s3 backend.
    #[serde(default)]
    pub s3: Option<S3Config>,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            backend: BackupBackendKind::None,
            local_dir: None,
            object_key: default_object_key(),
            timeout_secs: default_backup_timeout(),
            s3: None,
        }
    }
}

/// S3-compatible object storage settings.
#[derive(Debug, Clone, Deserialize)]
pub struct S3Config {
    /// Endpoint URL (AWS or a compatible service such as `MinIO`).
    pub endpoint: String,
    /// Bucket name.
    pub bucket: String,
    /// Region.
    #[serde(default = "default_region")]
    pub region: String,
    /// Access key ID.
    pub access_key_id: String,
    /// Secret access key.
    pub secret_access_key: String,
    /// Key prefix within the bucket.
    #[serde(default)]
    pub prefix: Option<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

const fn default_port() -> u16 {
    8000
}

fn default_db_path() -> PathBuf {
    PathBuf::from("votes.db")
}

const fn default_max_connections() -> u32 {
    5
}

fn default_question() -> String {
    "Do you support this position?".to_string()
}

const fn default_session_timeout() -> u64 {
    3600
}

const fn default_rate_limit_window() -> u64 {
    900
}

const fn default_rate_limit_threshold() -> u32 {
    5
}

fn default_object_key() -> String {
    "votes.db".to_string()
}

const fn default_backup_timeout() -> u64 {
    30
}

fn default_region() -> String {
    "us-east-1".to_string()
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Configuration is loaded in the following order:
    /// 1. `config/default.toml`
    /// 2. `config/{environment}.toml` (based on `TALLY_ENV`)
    /// 3. Environment variables with `TALLY__` prefix
    pub fn load() -> Result<Self, crate::AppError> {
        let env = std::env::var("TALLY_ENV").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("TALLY")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Self::finish(config)
    }

    /// Load configuration from a specific file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, crate::AppError> {
        let config = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("TALLY")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Self::finish(config)
    }

    fn finish(config: config::Config) -> Result<Self, crate::AppError> {
        let config: Self = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn parse(toml: &str) -> Result<Config, crate::AppError> {
        let config = config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()?;
        Config::finish(config)
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = parse(
            r#"
            [admin]
            results_key = "secret"
            [fingerprint]
            salt = "pepper"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 8000);
        assert_eq!(config.database.path, PathBuf::from("votes.db"));
        assert_eq!(config.admin.session_timeout_secs, 3600);
        assert_eq!(config.admin.rate_limit_window_secs, 900);
        assert_eq!(config.admin.rate_limit_threshold, 5);
        assert_eq!(config.backup.backend, BackupBackendKind::None);
        assert_eq!(config.backup.object_key, "votes.db");
    }

    #[test]
    fn test_missing_secret_is_rejected() {
        let result = parse(
            r#"
            [fingerprint]
            salt = "pepper"
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_secret_is_rejected() {
        let result = parse(
            r#"
            [admin]
            results_key = ""
            [fingerprint]
            salt = "pepper"
            "#,
        );
        assert!(matches!(result, Err(crate::AppError::Validation(_))));
    }

    #[test]
    fn test_admin_durations_are_bounded() {
        for field in ["session_timeout_secs", "rate_limit_window_secs"] {
            let result = parse(&format!(
                r#"
                [admin]
                results_key = "secret"
                {field} = 100000000000000000
                [fingerprint]
                salt = "pepper"
                "#
            ));
            assert!(
                matches!(result, Err(crate::AppError::Validation(_))),
                "{field}"
            );
        }

        let at_limit = parse(&format!(
            r#"
            [admin]
            results_key = "secret"
            session_timeout_secs = {MAX_ADMIN_DURATION_SECS}
            rate_limit_window_secs = {MAX_ADMIN_DURATION_SECS}
            [fingerprint]
            salt = "pepper"
            "#
        ))
        .unwrap();
        assert_eq!(at_limit.admin.rate_limit_window_secs, MAX_ADMIN_DURATION_SECS);
    }

    #[test]
    fn test_backup_section() {
        let config = parse(
            r#"
            [admin]
            results_key = "secret"
            [fingerprint]
            salt = "pepper"
            [backup]
            backend = "s3"
            timeout_secs = 5
            [backup.s3]
            endpoint = "http://localhost:9000"
            bucket = "polls"
            access_key_id = "id"
            secret_access_key = "key"
            "#,
        )
        .unwrap();

        assert_eq!(config.backup.backend, BackupBackendKind::S3);
        assert_eq!(config.backup.timeout_secs, 5);
        let s3 = config.backup.s3.unwrap();
        assert_eq!(s3.bucket, "polls");
        assert_eq!(s3.region, "us-east-1");
    }

    #[test]
    fn test_database_url() {
        let db = DatabaseConfig {
            path: PathBuf::from("/data/votes.db"),
            max_connections: 1,
        };
        assert_eq!(db.url(), "sqlite:///data/votes.db?mode=rwc");
    }
}
