//! Concurrent upload scheduler for directory uploads.
//!
//! Runs one task per job behind a counting admission gate, folds every
//! outcome into shared [`UploadStats`], and reports progress periodically.
//! A failed file never cancels its siblings.

use std::sync::Arc;
use std::time::Duration;

use panup_transfer::{
    ProgressCallback, ProgressReporter, StatsSnapshot, UploadJob, UploadStats, format_duration,
    format_size,
};
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tracing::{error, info};

use crate::error::UploadError;
use crate::orchestrator::FileUploader;
use crate::types::{UploadEvent, UploadOutcome};

/// Default number of files uploaded at once.
pub const DEFAULT_MAX_CONCURRENCY: usize = 3;

/// Default interval between progress reports.
pub const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_secs(5);

/// Uploads many files with bounded concurrency.
pub struct UploadScheduler {
    uploader: Arc<FileUploader>,
    max_concurrency: usize,
    report_interval: Option<Duration>,
    callbacks: Vec<ProgressCallback>,
    events_tx: mpsc::Sender<UploadEvent>,
    events_rx: Option<mpsc::Receiver<UploadEvent>>,
}

impl UploadScheduler {
    /// Creates a scheduler running at most `max_concurrency` uploads at once
    /// (at least one).
    pub fn new(uploader: Arc<FileUploader>, max_concurrency: usize) -> Self {
        let (events_tx, events_rx) = mpsc::channel(256);
        Self {
            uploader,
            max_concurrency: max_concurrency.max(1),
            report_interval: Some(DEFAULT_REPORT_INTERVAL),
            callbacks: Vec::new(),
            events_tx,
            events_rx: Some(events_rx),
        }
    }

    /// Sets the progress report interval; `None` disables periodic reports.
    pub fn with_report_interval(mut self, interval: Option<Duration>) -> Self {
        self.report_interval = interval;
        self
    }

    /// Registers a callback for periodic progress snapshots.
    pub fn on_progress(&mut self, callback: ProgressCallback) {
        self.callbacks.push(callback);
    }

    /// Takes the event receiver. Can only be called once.
    ///
    /// Events are dropped rather than awaited when the receiver lags.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<UploadEvent>> {
        self.events_rx.take()
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Uploads every job and waits for all of them to resolve.
    ///
    /// Returns the final statistics, or [`UploadError::FilesFailed`] if any
    /// file failed.
    pub async fn run(
        &self,
        credential: &str,
        jobs: Vec<UploadJob>,
    ) -> Result<StatsSnapshot, UploadError> {
        let total = jobs.len();
        let total_bytes: u64 = jobs.iter().map(|j| j.size).sum();
        let stats = Arc::new(UploadStats::new(total as u64, total_bytes));

        if jobs.is_empty() {
            info!("no files to upload");
            return Ok(stats.snapshot());
        }

        info!(
            files = total,
            total_size = %format_size(total_bytes),
            max_concurrency = self.max_concurrency,
            "starting concurrent upload"
        );

        let mut reporter = self.report_interval.map(|interval| {
            let mut reporter = ProgressReporter::new(Some(interval));
            for cb in &self.callbacks {
                reporter.on_progress(Arc::clone(cb));
            }
            let tx = self.events_tx.clone();
            reporter.on_progress(Arc::new(move |snapshot| {
                let _ = tx.try_send(UploadEvent::Progress(*snapshot));
            }));
            reporter.start(Arc::clone(&stats));
            reporter
        });

        let gate = Arc::new(Semaphore::new(self.max_concurrency));
        let credential: Arc<str> = Arc::from(credential);
        let mut workers = JoinSet::new();

        for (i, job) in jobs.into_iter().enumerate() {
            let Ok(permit) = Arc::clone(&gate).acquire_owned().await else {
                // The gate is owned by this call and never closed.
                break;
            };

            let uploader = Arc::clone(&self.uploader);
            let stats = Arc::clone(&stats);
            let credential = Arc::clone(&credential);
            let events_tx = self.events_tx.clone();

            workers.spawn(async move {
                let _permit = permit;
                let index = i + 1;
                info!(file = %job.remote_path, "[{index}/{total}] uploading");
                let _ = events_tx.try_send(UploadEvent::Started {
                    remote_path: job.remote_path.clone(),
                    index,
                    total,
                });

                match uploader.upload(&credential, &job).await {
                    Ok(outcome) => {
                        stats.record_success(job.size);
                        info!(file = %job.remote_path, "upload succeeded");
                        let event = match outcome {
                            UploadOutcome::AlreadyExists { .. } => UploadEvent::AlreadyExists {
                                remote_path: job.remote_path,
                            },
                            UploadOutcome::Uploaded { .. } => UploadEvent::Completed {
                                remote_path: job.remote_path,
                                bytes: job.size,
                            },
                        };
                        let _ = events_tx.try_send(event);
                    }
                    Err(e) => {
                        stats.record_failure();
                        error!(file = %job.remote_path, error = %e, "upload failed");
                        let _ = events_tx.try_send(UploadEvent::Failed {
                            remote_path: job.remote_path,
                            error: e.to_string(),
                        });
                    }
                }
            });
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                // A panicking worker never reached its stats update.
                stats.record_failure();
                error!(error = %e, "upload task aborted");
            }
        }

        if let Some(reporter) = reporter.as_mut() {
            reporter.stop().await;
        }

        let summary = stats.snapshot();
        info!(
            total = summary.total_files,
            uploaded = summary.uploaded_files,
            failed = summary.failed_files,
            transferred = %format!("{}/{}", format_size(summary.uploaded_bytes), format_size(summary.total_bytes)),
            elapsed = %format_duration(summary.elapsed),
            "upload finished"
        );
        if summary.uploaded_files > 0 {
            info!(
                "average speed: {}/s",
                format_size(summary.average_speed() as u64)
            );
        }

        let unresolved = summary.total_files.saturating_sub(summary.done());
        let failed = summary.failed_files + unresolved;
        if failed > 0 {
            return Err(UploadError::FilesFailed {
                failed,
                total: summary.total_files,
            });
        }
        Ok(summary)
    }
}
