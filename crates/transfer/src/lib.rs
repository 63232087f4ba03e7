//! Chunked file handling for resumable uploads.
//!
//! Splits files into fixed-size, MD5-fingerprinted chunks, stages chunk
//! files in a cache directory, and keeps the shared statistics that the
//! upload scheduler reports progress from.

mod cache;
mod chunked;
mod progress;
mod types;
mod validation;

pub use cache::{ChunkCache, ChunkSet, DEFAULT_CACHE_DIR};
pub use chunked::{ChunkReader, FileDigest, checksum_bytes, checksum_file_chunks};
pub use progress::{
    ProgressCallback, ProgressReporter, SpeedCalculator, StatsSnapshot, UploadStats,
    format_duration, format_size,
};
pub use types::{Chunk, ChunkDescriptor, UploadJob};
pub use validation::{join_remote_path, validate_remote_name};

/// Default chunk size: 4 MiB.
///
/// Fixed by the remote protocol; every chunk but the last has exactly this size.
pub const DEFAULT_CHUNK_SIZE: usize = 4 * 1024 * 1024;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot write chunk {path}: {source}")]
    WriteChunk {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot prepare cache directory {path}: {source}")]
    CacheDir {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid path: {0}")]
    InvalidPath(String),
}
