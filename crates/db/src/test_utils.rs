//! Test utilities for database operations.
//!
//! Provides throwaway `SQLite` databases with the schema already migrated.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};
use tracing::info;

/// A test database context that manages the lifecycle of a scratch database file.
pub struct TestDatabase {
    conn: Arc<DatabaseConnection>,
    path: PathBuf,
}

impl TestDatabase {
    /// Create a uniquely named database in the system temp directory (for parallel tests).
    ///
    /// Runs migrations before returning.
    pub async fn create_unique() -> Result<Self, DbErr> {
        let unique_suffix = uuid::Uuid::new_v4().simple().to_string();
        let path = std::env::temp_dir().join(format!("tally_test_{}.db", &unique_suffix[..12]));
        Self::at(path).await
    }

    /// Create (or reopen) a test database at a specific path.
    pub async fn at(path: PathBuf) -> Result<Self, DbErr> {
        let mut opts = ConnectOptions::new(format!("sqlite://{}?mode=rwc", path.display()));
        opts.max_connections(4).sqlx_logging(false);

        let conn = Database::connect(opts).await?;
        crate::migrations::run(&conn).await?;

        info!(path = %path.display(), "Created test database");

        Ok(Self {
            conn: Arc::new(conn),
            path,
        })
    }

    /// Get the database connection.
    #[must_use]
    pub fn connection(&self) -> &DatabaseConnection {
        &self.conn
    }

    /// Get a shareable handle to the connection, as repositories expect.
    #[must_use]
    pub fn shared(&self) -> Arc<DatabaseConnection> {
        Arc::clone(&self.conn)
    }

    /// Path of the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A path next to the database file that does not exist yet.
    #[must_use]
    pub fn sidecar_path(&self, label: &str) -> PathBuf {
        self.path.with_extension(format!(
            "{label}.{}.db",
            &uuid::Uuid::new_v4().simple().to_string()[..8]
        ))
    }

    /// Delete the database file and its journal files.
    pub async fn drop_database(self) -> Result<(), DbErr> {
        if let Ok(conn) = Arc::try_unwrap(self.conn) {
            conn.close().await?;
        }

        for suffix in ["", "-wal", "-shm", "-journal"] {
            let mut file = self.path.clone().into_os_string();
            file.push(suffix);
            let _ = std::fs::remove_file(file);
        }

        info!(path = %self.path.display(), "Dropped test database");
        Ok(())
    }
}
