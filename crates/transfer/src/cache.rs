//! Chunk cache directory and staged chunk files.
//!
//! A [`ChunkSet`] owns the chunk files staged for one upload and removes
//! them when dropped, so every exit path of an upload cleans up after itself.
//! The cache directory itself is left in place.

use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::chunked::ChunkReader;
use crate::types::ChunkDescriptor;
use crate::TransferError;

/// Name of the cache directory created under the working directory.
pub const DEFAULT_CACHE_DIR: &str = ".chunks";

/// Location where chunk files are staged before upload.
#[derive(Debug, Clone)]
pub struct ChunkCache {
    dir: PathBuf,
}

impl ChunkCache {
    /// Resolves the cache directory and creates it if absent.
    ///
    /// Uses `override_dir` when given, otherwise `./.chunks` under the
    /// current working directory.
    pub fn resolve(override_dir: Option<&Path>) -> Result<Self, TransferError> {
        let dir = match override_dir {
            Some(dir) => dir.to_path_buf(),
            None => std::env::current_dir()?.join(DEFAULT_CACHE_DIR),
        };
        std::fs::create_dir_all(&dir).map_err(|source| TransferError::CacheDir {
            path: dir.display().to_string(),
            source,
        })?;
        Ok(Self { dir })
    }

    /// The resolved cache directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Splits `source` into chunk files inside the cache.
    ///
    /// File names combine the source base name, the process id and a
    /// per-call token so concurrent uploads never collide. If writing fails
    /// midway, the chunks already written are removed with the returned
    /// error.
    pub fn materialize(&self, source: &Path, chunk_size: usize) -> Result<ChunkSet, TransferError> {
        self.materialize_with(source, chunk_size, write_chunk_file)
    }

    fn materialize_with<W>(
        &self,
        source: &Path,
        chunk_size: usize,
        mut write: W,
    ) -> Result<ChunkSet, TransferError>
    where
        W: FnMut(&Path, &[u8]) -> Result<(), TransferError>,
    {
        let base_name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".into());
        let token = uuid::Uuid::new_v4().simple().to_string();
        let pid = std::process::id();

        let mut reader = ChunkReader::new(source, chunk_size)?;
        let mut set = ChunkSet {
            chunks: Vec::new(),
        };

        while let Some(chunk) = reader.next_chunk()? {
            let path = self
                .dir
                .join(format!("{base_name}.{pid}.{token}.chunk.{}", chunk.index));
            // Owned by the set before the first byte lands, so a failed
            // write is removed along with the rest.
            set.chunks.push(ChunkDescriptor {
                index: chunk.index,
                digest: chunk.checksum,
                path: path.clone(),
            });
            write(&path, &chunk.data)?;
        }

        debug!(
            file = %source.display(),
            chunks = set.len(),
            "chunk files staged"
        );
        Ok(set)
    }
}

fn write_chunk_file(path: &Path, data: &[u8]) -> Result<(), TransferError> {
    let to_err = |source| TransferError::WriteChunk {
        path: path.display().to_string(),
        source,
    };
    let mut file = std::fs::File::create(path).map_err(to_err)?;
    file.write_all(data).map_err(to_err)?;
    file.flush().map_err(to_err)
}

/// Chunk files staged for one upload. Removed from disk on drop.
#[derive(Debug)]
pub struct ChunkSet {
    chunks: Vec<ChunkDescriptor>,
}

impl ChunkSet {
    /// Number of staged chunks.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Looks up a chunk by sequence index.
    pub fn get(&self, index: usize) -> Option<&ChunkDescriptor> {
        self.chunks.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChunkDescriptor> {
        self.chunks.iter()
    }
}

impl Drop for ChunkSet {
    fn drop(&mut self) {
        if self.chunks.is_empty() {
            return;
        }
        let mut removed = 0usize;
        for chunk in &self.chunks {
            match std::fs::remove_file(&chunk.path) {
                Ok(()) => removed += 1,
                Err(e) => {
                    debug!(path = %chunk.path.display(), error = %e, "failed to remove chunk file")
                }
            }
        }
        debug!(removed, total = self.chunks.len(), "chunk files cleaned up");
    }
}
