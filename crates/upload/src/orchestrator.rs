//! Single-file upload state machine.
//!
//! Drives one file through hashing, precreate, chunk staging, part upload
//! and finalize. Staged chunk files live in a [`ChunkSet`] that is dropped
//! on every exit path, so the cache never keeps a finished file's chunks.

use std::path::PathBuf;
use std::sync::Arc;

use panup_transfer::{
    ChunkCache, ChunkSet, DEFAULT_CHUNK_SIZE, FileDigest, UploadJob, checksum_file_chunks,
    join_remote_path,
};
use tracing::{debug, info};

use crate::error::UploadError;
use crate::remote::{FinalizeRequest, PartUpload, PrecreateRequest, PrecreateResult, RemoteClient};
use crate::retry::{RetryPolicy, upload_part_with_retry};
use crate::types::{UploadOutcome, UploadPhase};

/// Uploads single files through a [`RemoteClient`].
///
/// Cheap to share behind an `Arc`; one instance serves every worker of a
/// directory upload.
pub struct FileUploader {
    remote: Arc<dyn RemoteClient>,
    cache: ChunkCache,
    app_path: String,
    chunk_size: usize,
    retry: RetryPolicy,
}

impl FileUploader {
    /// Creates an uploader placing files under `app_path` on the remote side.
    pub fn new(remote: Arc<dyn RemoteClient>, cache: ChunkCache, app_path: impl Into<String>) -> Self {
        Self {
            remote,
            cache,
            app_path: app_path.into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = if chunk_size == 0 {
            DEFAULT_CHUNK_SIZE
        } else {
            chunk_size
        };
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn cache(&self) -> &ChunkCache {
        &self.cache
    }

    /// Runs the full upload pipeline for one file.
    ///
    /// Errors are wrapped with the local path and the phase that failed.
    pub async fn upload(
        &self,
        credential: &str,
        job: &UploadJob,
    ) -> Result<UploadOutcome, UploadError> {
        let file = job.local_path.display().to_string();

        // 1. Hashing
        debug!(file = %file, "computing chunk digests");
        let digest = self
            .hash_file(job.local_path.clone())
            .await
            .map_err(|e| e.in_phase(&file, UploadPhase::Hashing))?;
        info!(
            file = %file,
            size = digest.size,
            chunks = digest.chunk_count(),
            "file hashed"
        );

        // 2. Precreating
        let (remote_path, precreate) = self
            .precreate(credential, &job.remote_path, &digest)
            .await
            .map_err(|e| e.in_phase(&file, UploadPhase::Precreating))?;
        debug!(file = %file, upload_id = %precreate.upload_id, "precreate complete");

        if precreate.exists {
            info!(file = %file, remote = %remote_path, "already exists remotely, skipping upload");
            return Ok(UploadOutcome::AlreadyExists { remote_path });
        }

        // 3. Chunking
        let chunks = self
            .stage_chunks(job.local_path.clone(), &digest)
            .await
            .map_err(|e| e.in_phase(&file, UploadPhase::Chunking))?;
        debug!(file = %file, chunks = chunks.len(), "chunk files created");

        // 4. UploadingParts
        self.upload_parts(credential, &remote_path, &precreate, &chunks)
            .await
            .map_err(|e| e.in_phase(&file, UploadPhase::UploadingParts))?;

        // 5. Finalizing
        let request = FinalizeRequest {
            upload_id: precreate.upload_id.clone(),
            path: remote_path.clone(),
            size: digest.size,
            block_list: digest.chunk_digests.clone(),
        };
        let created = self
            .remote
            .finalize_create(credential, &request)
            .await
            .map_err(UploadError::from)
            .and_then(|result| {
                if result.status == 0 {
                    Ok(result)
                } else {
                    Err(UploadError::FinalizeStatus {
                        status: result.status,
                    })
                }
            })
            .map_err(|e| e.in_phase(&file, UploadPhase::Finalizing))?;

        drop(chunks);
        info!(file = %file, remote = %created.path, "upload complete");
        Ok(UploadOutcome::Uploaded {
            remote_path: created.path,
            parts_uploaded: precreate.required_parts.len(),
        })
    }

    async fn hash_file(&self, path: PathBuf) -> Result<FileDigest, UploadError> {
        let chunk_size = self.chunk_size;
        let digest = tokio::task::spawn_blocking(move || checksum_file_chunks(&path, chunk_size))
            .await??;
        Ok(digest)
    }

    async fn precreate(
        &self,
        credential: &str,
        remote_name: &str,
        digest: &FileDigest,
    ) -> Result<(String, PrecreateResult), UploadError> {
        let remote_path = join_remote_path(&self.app_path, remote_name)?;
        let request = PrecreateRequest {
            path: remote_path.clone(),
            size: digest.size,
            block_list: digest.chunk_digests.clone(),
        };
        let result = self.remote.precreate(credential, &request).await?;
        Ok((remote_path, result))
    }

    /// Writes chunk files and checks they match the digest pass.
    async fn stage_chunks(&self, path: PathBuf, digest: &FileDigest) -> Result<ChunkSet, UploadError> {
        let cache = self.cache.clone();
        let chunk_size = self.chunk_size;
        let source = path.clone();
        let chunks =
            tokio::task::spawn_blocking(move || cache.materialize(&source, chunk_size)).await??;

        let unchanged = chunks.len() == digest.chunk_count()
            && chunks
                .iter()
                .zip(&digest.chunk_digests)
                .all(|(chunk, expected)| &chunk.digest == expected);
        if !unchanged {
            return Err(UploadError::ContentChanged(path.display().to_string()));
        }
        Ok(chunks)
    }

    /// Uploads the parts the remote side asked for, in the order it listed them.
    async fn upload_parts(
        &self,
        credential: &str,
        remote_path: &str,
        precreate: &PrecreateResult,
        chunks: &ChunkSet,
    ) -> Result<(), UploadError> {
        let total = precreate.required_parts.len();
        for (n, &part) in precreate.required_parts.iter().enumerate() {
            let chunk = chunks.get(part).ok_or(UploadError::PartOutOfRange {
                part,
                chunks: chunks.len(),
            })?;

            debug!(part, progress = %format!("{}/{total}", n + 1), "uploading part");
            let request = PartUpload {
                upload_id: precreate.upload_id.clone(),
                path: remote_path.to_string(),
                chunk_file: chunk.path.clone(),
                part_index: part,
            };
            let receipt =
                upload_part_with_retry(self.remote.as_ref(), credential, &request, &self.retry)
                    .await?;
            debug!(part, digest = %receipt.digest, "part uploaded");
        }
        Ok(())
    }
}
