use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::info;

/// Default progress report interval.
const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);

/// Callback invoked with each periodic progress snapshot.
pub type ProgressCallback = Arc<dyn Fn(&StatsSnapshot) + Send + Sync>;

// ---------------------------------------------------------------------------
// UploadStats
// ---------------------------------------------------------------------------

/// Aggregate statistics for one upload run.
///
/// Shared by every worker behind an `Arc`; counters are atomics so
/// concurrent completions never need a lock.
#[derive(Debug)]
pub struct UploadStats {
    total_files: u64,
    total_bytes: u64,
    uploaded_files: AtomicU64,
    failed_files: AtomicU64,
    uploaded_bytes: AtomicU64,
    started: Instant,
}

impl UploadStats {
    pub fn new(total_files: u64, total_bytes: u64) -> Self {
        Self {
            total_files,
            total_bytes,
            uploaded_files: AtomicU64::new(0),
            failed_files: AtomicU64::new(0),
            uploaded_bytes: AtomicU64::new(0),
            started: Instant::now(),
        }
    }

    /// Records a file that reached the remote side (uploaded or already present).
    pub fn record_success(&self, bytes: u64) {
        self.uploaded_files.fetch_add(1, Ordering::Relaxed);
        self.uploaded_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Records a file whose upload failed terminally.
    pub fn record_failure(&self) {
        self.failed_files.fetch_add(1, Ordering::Relaxed);
    }

    /// Files resolved so far, successful or not.
    pub fn completed(&self) -> u64 {
        self.uploaded_files.load(Ordering::Relaxed) + self.failed_files.load(Ordering::Relaxed)
    }

    pub fn total_files(&self) -> u64 {
        self.total_files
    }

    /// Point-in-time copy of all counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            total_files: self.total_files,
            uploaded_files: self.uploaded_files.load(Ordering::Relaxed),
            failed_files: self.failed_files.load(Ordering::Relaxed),
            total_bytes: self.total_bytes,
            uploaded_bytes: self.uploaded_bytes.load(Ordering::Relaxed),
            elapsed: self.started.elapsed(),
        }
    }
}

/// Immutable view of [`UploadStats`] at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub total_files: u64,
    pub uploaded_files: u64,
    pub failed_files: u64,
    pub total_bytes: u64,
    pub uploaded_bytes: u64,
    pub elapsed: Duration,
}

impl StatsSnapshot {
    /// Files resolved so far.
    pub fn done(&self) -> u64 {
        self.uploaded_files + self.failed_files
    }

    /// Percentage of files resolved. An empty run counts as complete.
    pub fn percent(&self) -> f64 {
        if self.total_files == 0 {
            return 100.0;
        }
        self.done() as f64 / self.total_files as f64 * 100.0
    }

    /// Average throughput in bytes per second over the whole run.
    pub fn average_speed(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        self.uploaded_bytes as f64 / secs
    }
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.1}% ({}/{}) | ok: {} | failed: {} | {}/{} | {}",
            self.percent(),
            self.done(),
            self.total_files,
            self.uploaded_files,
            self.failed_files,
            format_size(self.uploaded_bytes),
            format_size(self.total_bytes),
            format_duration(self.elapsed),
        )
    }
}

// ---------------------------------------------------------------------------
// ProgressReporter
// ---------------------------------------------------------------------------

/// Periodically reports [`UploadStats`] from a background tokio task.
pub struct ProgressReporter {
    interval: Duration,
    callbacks: Vec<ProgressCallback>,
    running: Option<(oneshot::Sender<()>, JoinHandle<()>)>,
}

impl ProgressReporter {
    /// Creates a reporter with the given interval.
    ///
    /// If `interval` is `None`, defaults to 5 s.
    pub fn new(interval: Option<Duration>) -> Self {
        Self {
            interval: interval.unwrap_or(DEFAULT_INTERVAL),
            callbacks: Vec::new(),
            running: None,
        }
    }

    /// Registers a progress callback. Takes effect on the next [`start`](Self::start).
    pub fn on_progress(&mut self, callback: ProgressCallback) {
        self.callbacks.push(callback);
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Starts periodic reports. The first report fires one interval after start.
    pub fn start(&mut self, stats: Arc<UploadStats>) {
        let (tx, mut rx) = oneshot::channel();
        let callbacks = self.callbacks.clone();
        let interval = self.interval;

        let handle = tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            let mut speed = SpeedCalculator::new(None, None);
            let mut last_bytes = 0u64;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let snapshot = stats.snapshot();
                        speed.add_sample(snapshot.uploaded_bytes.saturating_sub(last_bytes));
                        last_bytes = snapshot.uploaded_bytes;

                        let remaining = snapshot.total_bytes.saturating_sub(snapshot.uploaded_bytes);
                        let eta = speed
                            .eta(remaining)
                            .map(format_duration)
                            .unwrap_or_else(|| "-".into());

                        info!(
                            speed = %format!("{}/s", format_size(speed.bytes_per_second() as u64)),
                            eta = %eta,
                            "progress: {snapshot}"
                        );
                        for cb in &callbacks {
                            cb(&snapshot);
                        }
                    }
                    _ = &mut rx => break,
                }
            }
        });

        // Replacing a running reporter drops its sender, which stops it.
        self.running = Some((tx, handle));
    }

    /// Stops the periodic task and waits for it to exit.
    pub async fn stop(&mut self) {
        if let Some((tx, handle)) = self.running.take() {
            let _ = tx.send(());
            let _ = handle.await;
        }
    }
}

// ---------------------------------------------------------------------------
// SpeedCalculator
// ---------------------------------------------------------------------------

struct SpeedSample {
    bytes: u64,
    timestamp: Instant,
}

/// Calculates transfer speed using a sliding window of samples.
pub struct SpeedCalculator {
    samples: Vec<SpeedSample>,
    max_samples: usize,
    window_size: Duration,
}

impl SpeedCalculator {
    /// Creates a new calculator.
    ///
    /// - `window_size`: time window for speed calculation (default 30 s).
    /// - `max_samples`: maximum retained samples (default 100).
    pub fn new(window_size: Option<Duration>, max_samples: Option<usize>) -> Self {
        Self {
            samples: Vec::new(),
            max_samples: max_samples.unwrap_or(100),
            window_size: window_size.unwrap_or(Duration::from_secs(30)),
        }
    }

    /// Records `bytes` transferred since the previous sample.
    pub fn add_sample(&mut self, bytes: u64) {
        let now = Instant::now();
        self.samples.push(SpeedSample {
            bytes,
            timestamp: now,
        });

        if let Some(cutoff) = now.checked_sub(self.window_size) {
            self.samples.retain(|sample| sample.timestamp >= cutoff);
        }

        if self.samples.len() > self.max_samples {
            let excess = self.samples.len() - self.max_samples;
            self.samples.drain(..excess);
        }
    }

    /// Average speed in bytes/second within the window.
    ///
    /// The first sample only marks the window start. Returns 0.0 with fewer
    /// than 2 samples.
    pub fn bytes_per_second(&self) -> f64 {
        if self.samples.len() < 2 {
            return 0.0;
        }

        let first = &self.samples[0];
        let last = &self.samples[self.samples.len() - 1];
        let elapsed = last.timestamp.duration_since(first.timestamp);
        if elapsed.is_zero() {
            return 0.0;
        }

        let total_bytes: u64 = self.samples[1..].iter().map(|sample| sample.bytes).sum();
        total_bytes as f64 / elapsed.as_secs_f64()
    }

    /// Estimates time remaining to transfer `remaining_bytes`.
    ///
    /// Returns `None` if speed is zero.
    pub fn eta(&self, remaining_bytes: u64) -> Option<Duration> {
        let speed = self.bytes_per_second();
        if speed <= 0.0 {
            return None;
        }
        Some(Duration::from_secs_f64(remaining_bytes as f64 / speed))
    }
}

// ---------------------------------------------------------------------------
// Formatting
// ---------------------------------------------------------------------------

/// Formats a byte count with binary units, e.g. `1.5 MB`.
pub fn format_size(bytes: u64) -> String {
    const UNIT: u64 = 1024;
    if bytes < UNIT {
        return format!("{bytes} B");
    }
    let mut div = UNIT;
    let mut exp = 0usize;
    let mut n = bytes / UNIT;
    while n >= UNIT {
        div *= UNIT;
        exp += 1;
        n /= UNIT;
    }
    let unit = ['K', 'M', 'G', 'T', 'P', 'E'][exp];
    format!("{:.1} {unit}B", bytes as f64 / div as f64)
}

/// Formats a duration as seconds, minutes or hours with one decimal.
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs_f64();
    if secs < 60.0 {
        format!("{secs:.1}s")
    } else if secs < 3600.0 {
        format!("{:.1}m", secs / 60.0)
    } else {
        format!("{:.1}h", secs / 3600.0)
    }
}
