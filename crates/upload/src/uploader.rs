//! High-level upload entry points.
//!
//! [`Uploader`] wires a [`RemoteClient`], the chunk cache and the scheduler
//! together behind two calls: [`Uploader::upload_file`] and
//! [`Uploader::upload_directory`].

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use panup_transfer::{
    ChunkCache, DEFAULT_CHUNK_SIZE, ProgressCallback, StatsSnapshot, UploadJob, format_size,
};
use tokio::sync::mpsc;
use tracing::info;

use crate::error::UploadError;
use crate::orchestrator::FileUploader;
use crate::remote::RemoteClient;
use crate::retry::RetryPolicy;
use crate::scanner::{ExcludeRules, PathMapping, scan_files_for_upload};
use crate::scheduler::{DEFAULT_MAX_CONCURRENCY, DEFAULT_REPORT_INTERVAL, UploadScheduler};
use crate::types::{UploadEvent, UploadOutcome};

/// Default remote directory all uploads are placed under.
pub const DEFAULT_APP_PATH: &str = "/apps/panup/";

/// Settings shared by every upload an [`Uploader`] performs.
#[derive(Debug, Clone)]
pub struct UploaderConfig {
    /// Remote directory prefix.
    pub app_path: String,
    /// Chunk cache directory; `./.chunks` when unset.
    pub cache_dir: Option<PathBuf>,
    pub chunk_size: usize,
    pub retry: RetryPolicy,
    /// Progress report interval for directory uploads; `None` disables reports.
    pub progress_interval: Option<Duration>,
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            app_path: DEFAULT_APP_PATH.into(),
            cache_dir: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
            retry: RetryPolicy::default(),
            progress_interval: Some(DEFAULT_REPORT_INTERVAL),
        }
    }
}

/// Options for one directory upload.
#[derive(Debug, Clone)]
pub struct DirectoryOptions {
    /// User exclusion patterns, applied on top of the defaults.
    pub exclude: Vec<String>,
    /// Keep the relative directory structure instead of flattening.
    pub keep_structure: bool,
    pub max_concurrency: usize,
}

impl Default for DirectoryOptions {
    fn default() -> Self {
        Self {
            exclude: Vec::new(),
            keep_structure: true,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }
}

impl DirectoryOptions {
    fn mapping(&self) -> PathMapping {
        if self.keep_structure {
            PathMapping::KeepStructure
        } else {
            PathMapping::Flatten
        }
    }
}

/// Uploads files and directories to a remote storage account.
pub struct Uploader {
    remote: Arc<dyn RemoteClient>,
    config: UploaderConfig,
    callbacks: Vec<ProgressCallback>,
    events_tx: Option<mpsc::Sender<UploadEvent>>,
}

impl Uploader {
    pub fn new(remote: Arc<dyn RemoteClient>, config: UploaderConfig) -> Self {
        Self {
            remote,
            config,
            callbacks: Vec::new(),
            events_tx: None,
        }
    }

    pub fn config(&self) -> &UploaderConfig {
        &self.config
    }

    /// Registers a callback for periodic progress during directory uploads.
    pub fn on_progress(&mut self, callback: ProgressCallback) {
        self.callbacks.push(callback);
    }

    /// Forwards directory upload events to `tx`.
    ///
    /// Events that do not fit in `tx` are dropped; forwarding never holds
    /// up [`upload_directory`](Self::upload_directory).
    pub fn forward_events(&mut self, tx: mpsc::Sender<UploadEvent>) {
        self.events_tx = Some(tx);
    }

    fn file_uploader(&self) -> Result<FileUploader, UploadError> {
        let cache = ChunkCache::resolve(self.config.cache_dir.as_deref())?;
        Ok(
            FileUploader::new(Arc::clone(&self.remote), cache, self.config.app_path.clone())
                .with_chunk_size(self.config.chunk_size)
                .with_retry_policy(self.config.retry.clone()),
        )
    }

    /// Uploads a single file.
    ///
    /// The remote name defaults to the local file's base name.
    pub async fn upload_file(
        &self,
        credential: &str,
        local_path: &Path,
        remote_name: Option<&str>,
    ) -> Result<UploadOutcome, UploadError> {
        let metadata = tokio::fs::metadata(local_path).await?;
        if !metadata.is_file() {
            return Err(UploadError::NotAFile(local_path.display().to_string()));
        }

        let remote_name = match remote_name {
            Some(name) => name.to_string(),
            None => local_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| UploadError::NotAFile(local_path.display().to_string()))?,
        };

        let job = UploadJob::for_file(local_path, remote_name)?;
        info!(
            file = %local_path.display(),
            remote = %job.remote_path,
            size = %format_size(job.size),
            "uploading file"
        );
        self.file_uploader()?.upload(credential, &job).await
    }

    /// Uploads every non-excluded file below `root`.
    ///
    /// Individual failures do not stop the run; the result is
    /// [`UploadError::FilesFailed`] if any file failed.
    pub async fn upload_directory(
        &self,
        credential: &str,
        root: &Path,
        options: &DirectoryOptions,
    ) -> Result<StatsSnapshot, UploadError> {
        let rules = ExcludeRules::new(options.exclude.iter().cloned());
        let scan_root = root.to_path_buf();
        let mapping = options.mapping();
        let jobs = tokio::task::spawn_blocking(move || {
            scan_files_for_upload(&scan_root, &rules, mapping)
        })
        .await??;

        let total_bytes: u64 = jobs.iter().map(|j| j.size).sum();
        info!(
            dir = %root.display(),
            files = jobs.len(),
            total_size = %format_size(total_bytes),
            "files discovered"
        );

        let uploader = Arc::new(self.file_uploader()?);
        let mut scheduler = UploadScheduler::new(uploader, options.max_concurrency)
            .with_report_interval(self.config.progress_interval);
        for cb in &self.callbacks {
            scheduler.on_progress(Arc::clone(cb));
        }

        // The caller may only drain `tx` after we return, so forwarding
        // drops events on a full channel instead of waiting.
        let forward = match (scheduler.take_events(), self.events_tx.clone()) {
            (Some(mut rx), Some(tx)) => Some(tokio::spawn(async move {
                while let Some(event) = rx.recv().await {
                    if let Err(mpsc::error::TrySendError::Closed(_)) = tx.try_send(event) {
                        break;
                    }
                }
            })),
            _ => None,
        };

        let result = scheduler.run(credential, jobs).await;

        // Dropping the scheduler closes its sender so the forwarder drains and ends.
        drop(scheduler);
        if let Some(handle) = forward {
            let _ = handle.await;
        }
        result
    }
}
