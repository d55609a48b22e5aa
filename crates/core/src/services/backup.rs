//! Backup and restore of the vote database.
//!
//! Snapshots are taken with `VACUUM INTO` so the live database never has to
//! be closed. Uploads requested from the vote path are coalesced through a
//! one-slot channel and performed by [`BackupWorker`].

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tally_common::config::{BackupBackendKind, BackupConfig};
use tally_common::{AppError, AppResult, BackupBackend, BackupReceipt, DownloadOutcome, LocalBackup};
use tally_db::repositories::VoteRepository;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Build the configured backend, or `None` when backups are disabled.
pub fn build_backend(config: &BackupConfig) -> AppResult<Option<Arc<dyn BackupBackend>>> {
    match config.backend {
        BackupBackendKind::None => Ok(None),
        BackupBackendKind::Local => {
            let dir = config.local_dir.clone().ok_or_else(|| {
                AppError::Config("backup.local_dir is required for the local backend".to_string())
            })?;
            Ok(Some(Arc::new(LocalBackup::new(
                dir,
                config.object_key.clone(),
            ))))
        }
        #[cfg(feature = "s3")]
        BackupBackendKind::S3 => {
            let s3 = config.s3.as_ref().ok_or_else(|| {
                AppError::Config("backup.s3 is required for the s3 backend".to_string())
            })?;
            Ok(Some(Arc::new(tally_common::S3Backup::new(
                s3,
                &config.object_key,
            ))))
        }
        #[cfg(not(feature = "s3"))]
        BackupBackendKind::S3 => Err(AppError::Config(
            "s3 backups require the `s3` feature".to_string(),
        )),
    }
}

/// Download the latest backup onto `db_path` before the database is opened.
///
/// A missing backup or any failure leaves the local file untouched and is
/// only logged.
pub async fn restore_before_start(
    backend: Option<&dyn BackupBackend>,
    db_path: &Path,
    timeout: Duration,
) {
    let Some(backend) = backend else {
        debug!("Backups disabled, skipping startup restore");
        return;
    };

    match tokio::time::timeout(timeout, backend.download(db_path)).await {
        Ok(Ok(DownloadOutcome::Downloaded { size })) => {
            info!(source = %backend.describe(), size, "Restored database from backup");
        }
        Ok(Ok(DownloadOutcome::NotFound)) => {
            info!(source = %backend.describe(), "No backup found, starting with local database");
        }
        Ok(Err(e)) => warn!(error = %e, "Startup restore failed"),
        Err(_) => warn!(timeout_secs = timeout.as_secs(), "Startup restore timed out"),
    }
}

/// Backup service.
#[derive(Clone)]
pub struct BackupService {
    inner: Arc<BackupInner>,
    requests: mpsc::Sender<()>,
}

struct BackupInner {
    backend: Option<Arc<dyn BackupBackend>>,
    repo: VoteRepository,
    db_path: PathBuf,
    timeout: Duration,
}

/// Background task draining backup requests.
pub struct BackupWorker {
    inner: Arc<BackupInner>,
    requests: mpsc::Receiver<()>,
}

impl BackupService {
    /// Create a new backup service and the worker that serves its requests.
    #[must_use]
    pub fn new(
        backend: Option<Arc<dyn BackupBackend>>,
        repo: VoteRepository,
        db_path: PathBuf,
        timeout: Duration,
    ) -> (Self, BackupWorker) {
        let (tx, rx) = mpsc::channel(1);
        let inner = Arc::new(BackupInner {
            backend,
            repo,
            db_path,
            timeout,
        });
        let worker = BackupWorker {
            inner: Arc::clone(&inner),
            requests: rx,
        };
        (Self { inner, requests: tx }, worker)
    }

    /// Whether a backend is configured.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.inner.backend.is_some()
    }

    /// Ask the worker for a backup without waiting for it.
    ///
    /// Requests made while one is already pending are merged into it.
    pub fn request_backup(&self) {
        if !self.is_enabled() {
            return;
        }

        match self.requests.try_send(()) {
            Ok(()) => debug!("Backup requested"),
            Err(mpsc::error::TrySendError::Full(())) => debug!("Backup already pending"),
            Err(mpsc::error::TrySendError::Closed(())) => {
                warn!("Backup worker is not running, request dropped");
            }
        }
    }

    /// Snapshot the database and upload it.
    pub async fn backup_now(&self) -> AppResult<BackupReceipt> {
        self.inner.backup().await
    }

    /// Replace every vote with the contents of the latest backup.
    ///
    /// Returns the number of restored votes.
    pub async fn restore_now(&self) -> AppResult<u64> {
        self.inner.restore().await
    }
}

impl BackupInner {
    async fn backup(&self) -> AppResult<BackupReceipt> {
        let backend = self.enabled_backend()?;
        let snapshot = self.sidecar_path("backup");

        let result: AppResult<BackupReceipt> = async {
            self.repo.snapshot_to(&snapshot).await?;
            tokio::time::timeout(self.timeout, backend.upload(&snapshot))
                .await
                .map_err(|_| self.timed_out("upload"))?
        }
        .await;

        remove_sidecar(&snapshot).await;

        let receipt = result?;
        info!(
            target_path = %backend.describe(),
            size = receipt.size,
            md5 = %receipt.md5,
            "Backup uploaded"
        );
        Ok(receipt)
    }

    async fn restore(&self) -> AppResult<u64> {
        let backend = self.enabled_backend()?;
        let download = self.sidecar_path("restore");

        let result: AppResult<u64> = async {
            let outcome = tokio::time::timeout(self.timeout, backend.download(&download))
                .await
                .map_err(|_| self.timed_out("download"))??;

            if outcome == DownloadOutcome::NotFound {
                return Err(AppError::NotFound("No backup available".to_string()));
            }

            let votes = VoteRepository::load_snapshot(&download).await?;
            self.repo.replace_all(votes).await
        }
        .await;

        remove_sidecar(&download).await;

        let restored = result?;
        info!(source = %backend.describe(), restored, "Votes restored from backup");
        Ok(restored)
    }

    fn enabled_backend(&self) -> AppResult<&Arc<dyn BackupBackend>> {
        self.backend
            .as_ref()
            .ok_or_else(|| AppError::Backup("Backups are disabled".to_string()))
    }

    fn timed_out(&self, action: &str) -> AppError {
        AppError::Backup(format!(
            "Backup {action} timed out after {}s",
            self.timeout.as_secs()
        ))
    }

    fn sidecar_path(&self, label: &str) -> PathBuf {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        self.db_path
            .with_extension(format!("{label}-{}.db", &suffix[..12]))
    }
}

async fn remove_sidecar(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await
        && e.kind() != std::io::ErrorKind::NotFound
    {
        warn!(path = %path.display(), error = %e, "Failed to remove temporary backup file");
    }
}

impl BackupWorker {
    /// Serve backup requests until every [`BackupService`] handle is dropped.
    pub async fn run(mut self) {
        while self.requests.recv().await.is_some() {
            if let Err(e) = self.inner.backup().await {
                error!(error = %e, "Background backup failed");
            }
        }
        debug!("Backup worker stopped");
    }
}

/// Wait for a spawned [`BackupWorker`] to flush its pending request.
///
/// Every [`BackupService`] handle must already be dropped, otherwise the
/// worker keeps waiting for requests and this gives up after `limit`.
/// Returns whether the worker finished in time.
pub async fn wait_for_worker(worker: JoinHandle<()>, limit: Duration) -> bool {
    match tokio::time::timeout(limit, worker).await {
        Ok(Ok(())) => {
            info!("Pending backups flushed");
            true
        }
        Ok(Err(e)) => {
            error!(error = %e, "Backup worker failed");
            false
        }
        Err(_) => {
            warn!(limit_secs = limit.as_secs(), "Gave up waiting for pending backup");
            false
        }
    }
}
