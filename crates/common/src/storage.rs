//! Backup storage for the vote database file.
//!
//! Supports a local directory and S3-compatible object storage.

use std::path::{Path, PathBuf};

use crate::{AppError, AppResult};

/// Metadata of an uploaded backup.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct BackupReceipt {
    /// Object key the backup was stored under.
    pub key: String,
    /// Size in bytes.
    pub size: u64,
    /// MD5 hash of the uploaded bytes.
    pub md5: String,
}

/// Outcome of a download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// The backup was written to the local path.
    Downloaded {
        /// Number of bytes written.
        size: u64,
    },
    /// No backup exists yet.
    NotFound,
}

/// Backup storage backend trait.
#[async_trait::async_trait]
pub trait BackupBackend: Send + Sync {
    /// Upload the file at `local_path`.
    async fn upload(&self, local_path: &Path) -> AppResult<BackupReceipt>;

    /// Download the backup into `local_path`, replacing it.
    async fn download(&self, local_path: &Path) -> AppResult<DownloadOutcome>;

    /// Human-readable target description for logs.
    fn describe(&self) -> String;
}

async fn read_local(local_path: &Path) -> AppResult<Vec<u8>> {
    tokio::fs::read(local_path).await.map_err(|e| {
        AppError::Backup(format!("Failed to read {}: {e}", local_path.display()))
    })
}

async fn write_local(local_path: &Path, data: &[u8]) -> AppResult<()> {
    if let Some(parent) = local_path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| AppError::Backup(format!("Failed to create directory: {e}")))?;
    }

    // Write next to the target and rename so readers never see a partial file
    let partial = local_path.with_extension("part");
    tokio::fs::write(&partial, data)
        .await
        .map_err(|e| AppError::Backup(format!("Failed to write file: {e}")))?;
    tokio::fs::rename(&partial, local_path)
        .await
        .map_err(|e| AppError::Backup(format!("Failed to move file into place: {e}")))?;

    Ok(())
}

/// Local directory backup backend.
pub struct LocalBackup {
    dir: PathBuf,
    key: String,
}

impl LocalBackup {
    /// Create a new local backup backend storing `key` inside `dir`.
    #[must_use]
    pub const fn new(dir: PathBuf, key: String) -> Self {
        Self { dir, key }
    }

    fn target(&self) -> PathBuf {
        self.dir.join(&self.key)
    }
}

#[async_trait::async_trait]
impl BackupBackend for LocalBackup {
    async fn upload(&self, local_path: &Path) -> AppResult<BackupReceipt> {
        let data = read_local(local_path).await?;
        write_local(&self.target(), &data).await?;

        Ok(BackupReceipt {
            key: self.key.clone(),
            size: data.len() as u64,
            md5: format!("{:x}", md5::compute(&data)),
        })
    }

    async fn download(&self, local_path: &Path) -> AppResult<DownloadOutcome> {
        let data = match tokio::fs::read(self.target()).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(DownloadOutcome::NotFound);
            }
            Err(e) => return Err(AppError::Backup(format!("Failed to read backup: {e}"))),
        };

        write_local(local_path, &data).await?;
        Ok(DownloadOutcome::Downloaded {
            size: data.len() as u64,
        })
    }

    fn describe(&self) -> String {
        self.target().display().to_string()
    }
}

/// S3-compatible object storage backup backend.
#[cfg(feature = "s3")]
pub struct S3Backup {
    client: aws_sdk_s3::Client,
    bucket: String,
    key: String,
}

#[cfg(feature = "s3")]
impl S3Backup {
    /// Create a new S3 backup backend.
    #[must_use]
    pub fn new(config: &crate::config::S3Config, key: &str) -> Self {
        use aws_config::Region;
        use aws_sdk_s3::config::Credentials;

        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "tally",
        );

        let s3_config = aws_sdk_s3::Config::builder()
            .endpoint_url(&config.endpoint)
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials)
            .force_path_style(true)
            .behavior_version_latest()
            .build();

        let key = match &config.prefix {
            Some(prefix) => format!("{}/{}", prefix.trim_end_matches('/'), key),
            None => key.to_string(),
        };

        Self {
            client: aws_sdk_s3::Client::from_conf(s3_config),
            bucket: config.bucket.clone(),
            key,
        }
    }
}

#[cfg(feature = "s3")]
#[async_trait::async_trait]
impl BackupBackend for S3Backup {
    async fn upload(&self, local_path: &Path) -> AppResult<BackupReceipt> {
        use aws_sdk_s3::primitives::ByteStream;

        let data = read_local(local_path).await?;
        let md5 = format!("{:x}", md5::compute(&data));
        let size = data.len() as u64;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&self.key)
            .body(ByteStream::from(data))
            .content_type("application/vnd.sqlite3")
            .send()
            .await
            .map_err(|e| AppError::Backup(format!("S3 upload failed: {e}")))?;

        Ok(BackupReceipt {
            key: self.key.clone(),
            size,
            md5,
        })
    }

    async fn download(&self, local_path: &Path) -> AppResult<DownloadOutcome> {
        let object = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&self.key)
            .send()
            .await
        {
            Ok(object) => object,
            Err(e) => {
                if e
                    .as_service_error()
                    .is_some_and(aws_sdk_s3::operation::get_object::GetObjectError::is_no_such_key)
                {
                    return Ok(DownloadOutcome::NotFound);
                }
                return Err(AppError::Backup(format!("S3 download failed: {e}")));
            }
        };

        let data = object
            .body
            .collect()
            .await
            .map_err(|e| AppError::Backup(format!("S3 body read failed: {e}")))?
            .into_bytes();

        write_local(local_path, &data).await?;
        Ok(DownloadOutcome::Downloaded {
            size: data.len() as u64,
        })
    }

    fn describe(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.key)
    }
}
