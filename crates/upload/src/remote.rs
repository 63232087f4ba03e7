//! Remote upload client trait and protocol values.
//!
//! `RemoteClient` is implemented by whatever speaks the storage service's
//! three-phase protocol. Keeping it a trait decouples the upload engine from
//! transport and lets tests script required parts, existing files and
//! injected failures.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

/// Boxed future returned by [`RemoteClient`] methods.
pub type RemoteFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, RemoteError>> + Send + 'a>>;

/// Abstract connection to the remote storage service.
///
/// The credential is passed on every call; its refresh is the caller's concern.
pub trait RemoteClient: Send + Sync {
    /// Registers an upload and returns the parts the remote side still needs.
    fn precreate<'a>(
        &'a self,
        credential: &'a str,
        request: &'a PrecreateRequest,
    ) -> RemoteFuture<'a, PrecreateResult>;

    /// Uploads one staged chunk file as part `request.part_index`.
    fn upload_part<'a>(
        &'a self,
        credential: &'a str,
        request: &'a PartUpload,
    ) -> RemoteFuture<'a, PartReceipt>;

    /// Assembles previously uploaded parts into the final remote file.
    fn finalize_create<'a>(
        &'a self,
        credential: &'a str,
        request: &'a FinalizeRequest,
    ) -> RemoteFuture<'a, FinalizeResult>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrecreateRequest {
    /// Absolute remote path.
    pub path: String,
    pub size: u64,
    /// Ordered per-chunk MD5 digests (the content fingerprint).
    pub block_list: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrecreateResult {
    pub upload_id: String,
    /// Part indexes still required, in upload order.
    pub required_parts: Vec<usize>,
    /// The remote file already exists with matching content.
    pub exists: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartUpload {
    pub upload_id: String,
    pub path: String,
    pub chunk_file: PathBuf,
    pub part_index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartReceipt {
    /// MD5 of the part as stored remotely.
    pub digest: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizeRequest {
    pub upload_id: String,
    pub path: String,
    pub size: u64,
    pub block_list: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizeResult {
    /// Service status code; 0 means success.
    pub status: i32,
    /// Final remote path (may differ from the requested one).
    pub path: String,
}

/// Errors returned by a [`RemoteClient`].
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    /// Connection-level failure (DNS, TCP, TLS, timeouts).
    #[error("{0}")]
    Transport(String),

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// Error reported by the service itself.
    #[error("{0}")]
    Api(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RemoteError {
    /// Whether retrying the same call may succeed.
    ///
    /// Server-side 500/502/503/504 responses are transient; everything else
    /// is classified by its message.
    pub fn is_retryable(&self) -> bool {
        match self {
            RemoteError::Http { status, .. } if matches!(status, 500 | 502 | 503 | 504) => true,
            RemoteError::Io(e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::TimedOut
                        | std::io::ErrorKind::ConnectionReset
                        | std::io::ErrorKind::ConnectionRefused
                        | std::io::ErrorKind::ConnectionAborted
                        | std::io::ErrorKind::BrokenPipe
                        | std::io::ErrorKind::UnexpectedEof
                ) =>
            {
                true
            }
            other => crate::retry::is_retryable_message(&other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_are_retryable() {
        for status in [500, 502, 503, 504] {
            let err = RemoteError::Http {
                status,
                message: "oops".into(),
            };
            assert!(err.is_retryable(), "status {status}");
        }
    }

    #[test]
    fn client_errors_are_fatal() {
        let err = RemoteError::Http {
            status: 403,
            message: "forbidden".into(),
        };
        assert!(!err.is_retryable());
        assert!(!RemoteError::Api("invalid credential".into()).is_retryable());
    }

    #[test]
    fn io_kinds_classified() {
        let reset = std::io::Error::from(std::io::ErrorKind::ConnectionReset);
        assert!(RemoteError::Io(reset).is_retryable());
        let denied = std::io::Error::from(std::io::ErrorKind::PermissionDenied);
        assert!(!RemoteError::Io(denied).is_retryable());
    }

    #[test]
    fn transport_message_classified() {
        assert!(RemoteError::Transport("read: Connection Reset by peer".into()).is_retryable());
        assert!(RemoteError::Transport("unexpected EOF".into()).is_retryable());
        assert!(!RemoteError::Transport("certificate rejected".into()).is_retryable());
    }
}
