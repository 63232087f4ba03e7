use std::path::PathBuf;
use std::time::SystemTime;

/// A chunk of file data read from disk.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Sequence index within the file (0-based).
    pub index: usize,
    /// Byte offset within the file.
    pub offset: u64,
    /// Raw chunk data.
    pub data: Vec<u8>,
    /// MD5 hex digest of `data`.
    pub checksum: String,
}

impl Chunk {
    /// Size of this chunk in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// A chunk that has been staged as a file in the chunk cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkDescriptor {
    /// Sequence index within the source file (0-based).
    pub index: usize,
    /// MD5 hex digest of the chunk bytes.
    pub digest: String,
    /// Location of the staged chunk file.
    pub path: PathBuf,
}

/// One file scheduled for upload.
///
/// Immutable once built; the scheduler consumes it and folds the outcome
/// into [`UploadStats`](crate::UploadStats).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadJob {
    pub local_path: PathBuf,
    /// Remote name relative to the application path prefix, `/`-separated.
    pub remote_path: String,
    pub size: u64,
    pub modified: Option<SystemTime>,
}

impl UploadJob {
    /// Builds a job for a single local file, reading its size and mtime.
    pub fn for_file(
        local_path: impl Into<PathBuf>,
        remote_path: impl Into<String>,
    ) -> std::io::Result<Self> {
        let local_path = local_path.into();
        let metadata = std::fs::metadata(&local_path)?;
        Ok(Self {
            local_path,
            remote_path: remote_path.into(),
            size: metadata.len(),
            modified: metadata.modified().ok(),
        })
    }
}
