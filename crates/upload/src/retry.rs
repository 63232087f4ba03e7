//! Bounded retry with exponential backoff for part uploads.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::error::UploadError;
use crate::remote::{PartReceipt, PartUpload, RemoteClient, RemoteError};

/// Lowercase message fragments that mark an error as transient.
const RETRYABLE_PATTERNS: &[&str] = &[
    "timeout",
    "timed out",
    "connection reset",
    "connection refused",
    "network unreachable",
    "network is unreachable",
    "temporary failure",
    "500 internal server error",
    "502 bad gateway",
    "503 service unavailable",
    "504 gateway timeout",
    "i/o timeout",
    "unexpected end of input",
    "eof",
    "broken pipe",
];

/// Returns true if `message` looks like a transient network failure.
///
/// Matching is a case-insensitive substring test.
pub fn is_retryable_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    RETRYABLE_PATTERNS.iter().any(|p| lower.contains(p))
}

/// Retry budget and backoff schedule for one part upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubles for each further retry.
    pub base_delay: Duration,
    /// Backoff cap.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Total attempts including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay before retry number `attempt` (1-based): `base * 2^(attempt-1)`, capped.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1);
        2u32.checked_pow(exp)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }
}

/// Runs `op` under `policy`, retrying transient failures of part `part`.
///
/// Fatal errors return at once as [`UploadError::PartRejected`]; running
/// out of attempts returns [`UploadError::RetriesExhausted`].
pub async fn retry_part<T, F, Fut>(
    policy: &RetryPolicy,
    part: usize,
    mut op: F,
) -> Result<T, UploadError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RemoteError>>,
{
    let max_attempts = policy.max_attempts();
    let mut attempt: u32 = 0;

    loop {
        if attempt > 0 {
            let delay = policy.delay_for_attempt(attempt);
            warn!(
                part,
                retry = attempt,
                delay_ms = delay.as_millis() as u64,
                "retrying part upload"
            );
            tokio::time::sleep(delay).await;
        }

        let last_err = match op().await {
            Ok(value) => {
                if attempt > 0 {
                    info!(part, retries = attempt, "part upload recovered after retry");
                }
                return Ok(value);
            }
            Err(e) => e,
        };

        if !last_err.is_retryable() {
            error!(part, error = %last_err, "part upload failed with non-retryable error");
            return Err(UploadError::PartRejected {
                part,
                source: last_err,
            });
        }

        attempt += 1;
        debug!(part, attempt, max_attempts, error = %last_err, "part upload attempt failed");
        if attempt >= max_attempts {
            return Err(UploadError::RetriesExhausted {
                part,
                attempts: max_attempts,
                source: last_err,
            });
        }
    }
}

/// Uploads one part through `remote`, retrying transient failures.
pub async fn upload_part_with_retry(
    remote: &dyn RemoteClient,
    credential: &str,
    request: &PartUpload,
    policy: &RetryPolicy,
) -> Result<PartReceipt, UploadError> {
    retry_part(policy, request.part_index, || {
        remote.upload_part(credential, request)
    })
    .await
}
