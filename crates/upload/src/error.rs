//! Upload error types.

use panup_transfer::TransferError;

use crate::remote::RemoteError;
use crate::types::UploadPhase;

/// Errors produced while uploading files.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),

    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("part {part} rejected: {source}")]
    PartRejected {
        part: usize,
        #[source]
        source: RemoteError,
    },

    #[error("part {part} failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        part: usize,
        attempts: u32,
        #[source]
        source: RemoteError,
    },

    #[error("part index {part} out of range: file has {chunks} chunks")]
    PartOutOfRange { part: usize, chunks: usize },

    #[error("file changed while uploading: {0}")]
    ContentChanged(String),

    #[error("finalize returned status {status}")]
    FinalizeStatus { status: i32 },

    #[error("{phase} failed for {path}: {source}")]
    Phase {
        path: String,
        phase: UploadPhase,
        #[source]
        source: Box<UploadError>,
    },

    #[error("{failed} of {total} files failed to upload")]
    FilesFailed { failed: u64, total: u64 },

    #[error("not a directory: {0}")]
    NotADirectory(String),

    #[error("not a regular file: {0}")]
    NotAFile(String),

    #[error("task join error: {0}")]
    Join(String),
}

impl UploadError {
    /// Wraps this error with the file and phase it occurred in.
    pub fn in_phase(self, path: impl Into<String>, phase: UploadPhase) -> Self {
        UploadError::Phase {
            path: path.into(),
            phase,
            source: Box::new(self),
        }
    }

    /// The phase a wrapped error occurred in, if any.
    pub fn phase(&self) -> Option<UploadPhase> {
        match self {
            UploadError::Phase { phase, .. } => Some(*phase),
            _ => None,
        }
    }

    /// The innermost error, unwrapping phase context.
    pub fn root(&self) -> &UploadError {
        match self {
            UploadError::Phase { source, .. } => source.root(),
            other => other,
        }
    }
}

impl From<tokio::task::JoinError> for UploadError {
    fn from(e: tokio::task::JoinError) -> Self {
        UploadError::Join(e.to_string())
    }
}
