use std::io::Read;
use std::path::Path;

use md5::{Digest, Md5};

use crate::types::Chunk;
use crate::{DEFAULT_CHUNK_SIZE, TransferError};

// ---------------------------------------------------------------------------
// Checksum helpers
// ---------------------------------------------------------------------------

/// Computes MD5 of `data` and returns the hex-encoded digest.
pub fn checksum_bytes(data: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Content fingerprint of a file: its size and per-chunk digests in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDigest {
    pub size: u64,
    pub chunk_digests: Vec<String>,
}

impl FileDigest {
    /// Number of chunks the file splits into.
    pub fn chunk_count(&self) -> usize {
        self.chunk_digests.len()
    }
}

/// Read-only digest pass over `path`.
///
/// Produces the ordered chunk digest sequence without writing anything.
pub fn checksum_file_chunks(path: &Path, chunk_size: usize) -> Result<FileDigest, TransferError> {
    let mut reader = ChunkReader::new(path, chunk_size)?;
    let size = reader.file_size();
    let mut chunk_digests = Vec::new();
    while let Some(chunk) = reader.next_chunk()? {
        chunk_digests.push(chunk.checksum);
    }
    Ok(FileDigest {
        size,
        chunk_digests,
    })
}

// ---------------------------------------------------------------------------
// ChunkReader
// ---------------------------------------------------------------------------

/// Reads a file in fixed-size chunks with automatic MD5 checksums.
pub struct ChunkReader {
    file: std::fs::File,
    chunk_size: usize,
    offset: u64,
    index: usize,
    file_path: String,
    file_size: u64,
}

impl ChunkReader {
    /// Opens `path` for chunked reading.
    ///
    /// If `chunk_size` is 0, [`DEFAULT_CHUNK_SIZE`] (4 MiB) is used.
    pub fn new(path: &Path, chunk_size: usize) -> Result<Self, TransferError> {
        let file_path = path.to_string_lossy().into_owned();
        let file = std::fs::File::open(path).map_err(|source| TransferError::Read {
            path: file_path.clone(),
            source,
        })?;
        let file_size = file
            .metadata()
            .map_err(|source| TransferError::Read {
                path: file_path.clone(),
                source,
            })?
            .len();
        let chunk_size = if chunk_size == 0 {
            DEFAULT_CHUNK_SIZE
        } else {
            chunk_size
        };
        Ok(Self {
            file,
            chunk_size,
            offset: 0,
            index: 0,
            file_path,
            file_size,
        })
    }

    /// Reads the next chunk. Returns `None` at EOF.
    ///
    /// Every chunk but the last is exactly `chunk_size` bytes.
    pub fn next_chunk(&mut self) -> Result<Option<Chunk>, TransferError> {
        let mut buf = Vec::with_capacity(self.chunk_size);
        let n = (&mut self.file)
            .take(self.chunk_size as u64)
            .read_to_end(&mut buf)
            .map_err(|source| TransferError::Read {
                path: self.file_path.clone(),
                source,
            })?;
        if n == 0 {
            return Ok(None);
        }

        let chunk = Chunk {
            index: self.index,
            offset: self.offset,
            checksum: checksum_bytes(&buf),
            data: buf,
        };
        self.offset += n as u64;
        self.index += 1;
        Ok(Some(chunk))
    }

    /// Current byte offset.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// File size in bytes at open time.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Bytes remaining to read.
    pub fn remaining(&self) -> u64 {
        self.file_size.saturating_sub(self.offset)
    }
}
