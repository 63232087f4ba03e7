//! Data types for the upload flow.

use std::fmt;

use panup_transfer::StatsSnapshot;

/// Working phase of a single-file upload.
///
/// The phases run strictly in this order; an already-existing remote file
/// ends the upload right after [`Precreating`](Self::Precreating).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UploadPhase {
    Hashing,
    Precreating,
    Chunking,
    UploadingParts,
    Finalizing,
}

impl fmt::Display for UploadPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UploadPhase::Hashing => "hashing",
            UploadPhase::Precreating => "precreate",
            UploadPhase::Chunking => "chunking",
            UploadPhase::UploadingParts => "uploading parts",
            UploadPhase::Finalizing => "finalize",
        };
        f.write_str(name)
    }
}

/// Successful end state of a single-file upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// Parts were uploaded and the remote file was created.
    Uploaded {
        remote_path: String,
        parts_uploaded: usize,
    },
    /// The remote side already holds identical content.
    AlreadyExists { remote_path: String },
}

impl UploadOutcome {
    pub fn remote_path(&self) -> &str {
        match self {
            UploadOutcome::Uploaded { remote_path, .. } => remote_path,
            UploadOutcome::AlreadyExists { remote_path } => remote_path,
        }
    }
}

/// Event emitted by the scheduler during a directory upload.
#[derive(Debug, Clone)]
pub enum UploadEvent {
    /// A worker picked up a file. `index` is the 1-based dispatch position.
    Started {
        remote_path: String,
        index: usize,
        total: usize,
    },
    /// The file was uploaded.
    Completed { remote_path: String, bytes: u64 },
    /// The remote side already had the file.
    AlreadyExists { remote_path: String },
    /// The file failed terminally.
    Failed { remote_path: String, error: String },
    /// Periodic aggregate progress.
    Progress(StatsSnapshot),
}
