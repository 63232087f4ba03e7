//! Scripted `RemoteClient` shared by the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use panup_transfer::{ChunkCache, UploadJob, checksum_bytes};
use panup_upload::{
    FileUploader, FinalizeRequest, FinalizeResult, PartReceipt, PartUpload, PrecreateRequest,
    PrecreateResult, RemoteClient, RemoteError, RemoteFuture,
};
use tokio::sync::Semaphore;

/// Test double recording every call and replaying scripted failures.
#[derive(Default)]
pub struct ScriptedRemote {
    exists: bool,
    required: Option<Vec<usize>>,
    finalize_status: i32,
    /// Remote paths containing one of these fail precreate with a fatal error.
    reject_paths: Vec<String>,
    part_failures: Mutex<HashMap<usize, VecDeque<RemoteError>>>,
    hold: Option<Arc<Semaphore>>,

    pub precreates: Mutex<Vec<PrecreateRequest>>,
    pub parts: Mutex<Vec<usize>>,
    /// Whether the chunk file existed when each part was uploaded.
    pub chunk_files_present: Mutex<Vec<bool>>,
    pub chunk_files: Mutex<Vec<PathBuf>>,
    pub finalized: Mutex<Vec<FinalizeRequest>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Precreate reports the file as already present.
    pub fn existing(mut self) -> Self {
        self.exists = true;
        self
    }

    /// Precreate asks for exactly these parts instead of all of them.
    pub fn requiring(mut self, parts: Vec<usize>) -> Self {
        self.required = Some(parts);
        self
    }

    pub fn finalize_status(mut self, status: i32) -> Self {
        self.finalize_status = status;
        self
    }

    pub fn rejecting(mut self, path_fragment: &str) -> Self {
        self.reject_paths.push(path_fragment.to_string());
        self
    }

    /// Part `part` fails with each of `errors` in turn before succeeding.
    pub fn failing_part(self, part: usize, errors: Vec<RemoteError>) -> Self {
        self.part_failures
            .lock()
            .unwrap()
            .insert(part, errors.into());
        self
    }

    /// Precreate waits for a permit from `hold` before returning.
    pub fn holding(mut self, hold: Arc<Semaphore>) -> Self {
        self.hold = Some(hold);
        self
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn part_calls(&self) -> Vec<usize> {
        self.parts.lock().unwrap().clone()
    }
}

impl RemoteClient for ScriptedRemote {
    fn precreate<'a>(
        &'a self,
        _credential: &'a str,
        request: &'a PrecreateRequest,
    ) -> RemoteFuture<'a, PrecreateResult> {
        Box::pin(async move {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            self.precreates.lock().unwrap().push(request.clone());

            if let Some(hold) = &self.hold {
                if let Ok(permit) = hold.acquire().await {
                    permit.forget();
                }
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.reject_paths.iter().any(|p| request.path.contains(p)) {
                return Err(RemoteError::Api("file name not allowed".into()));
            }
            let required = if self.exists {
                Vec::new()
            } else {
                self.required
                    .clone()
                    .unwrap_or_else(|| (0..request.block_list.len()).collect())
            };
            Ok(PrecreateResult {
                upload_id: format!("up-{}", request.path),
                required_parts: required,
                exists: self.exists,
            })
        })
    }

    fn upload_part<'a>(
        &'a self,
        _credential: &'a str,
        request: &'a PartUpload,
    ) -> RemoteFuture<'a, PartReceipt> {
        Box::pin(async move {
            self.parts.lock().unwrap().push(request.part_index);
            self.chunk_files_present
                .lock()
                .unwrap()
                .push(request.chunk_file.is_file());
            self.chunk_files.lock().unwrap().push(request.chunk_file.clone());

            let injected = self
                .part_failures
                .lock()
                .unwrap()
                .get_mut(&request.part_index)
                .and_then(VecDeque::pop_front);
            if let Some(err) = injected {
                return Err(err);
            }
            let data = std::fs::read(&request.chunk_file)?;
            Ok(PartReceipt {
                digest: checksum_bytes(&data),
            })
        })
    }

    fn finalize_create<'a>(
        &'a self,
        _credential: &'a str,
        request: &'a FinalizeRequest,
    ) -> RemoteFuture<'a, FinalizeResult> {
        Box::pin(async move {
            self.finalized.lock().unwrap().push(request.clone());
            Ok(FinalizeResult {
                status: self.finalize_status,
                path: request.path.clone(),
            })
        })
    }
}

pub fn transient() -> RemoteError {
    RemoteError::Transport("read tcp: connection reset by peer".into())
}

/// Writes `len` bytes of patterned data to `dir/name`.
pub fn write_file(dir: &Path, name: &str, len: usize) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
    std::fs::write(&path, data).unwrap();
    path
}

pub fn job(local: &Path, remote: &str) -> UploadJob {
    UploadJob::for_file(local, remote).unwrap()
}

/// Builds a `FileUploader` with tiny chunks and a cache under `cache_dir`.
pub fn file_uploader(remote: Arc<ScriptedRemote>, cache_dir: &Path) -> FileUploader {
    let cache = ChunkCache::resolve(Some(cache_dir)).unwrap();
    FileUploader::new(remote, cache, "/apps/panup/").with_chunk_size(4)
}

/// Number of entries left in the cache directory.
pub fn cache_entries(cache_dir: &Path) -> usize {
    std::fs::read_dir(cache_dir).unwrap().count()
}
