//! Filesystem mirror of the remote upload protocol.
//!
//! `MirrorRemote` stores "remote" files under a local root directory and
//! keeps in-progress uploads as sessions under `<root>/.sessions/<id>/`.
//! Completed files keep their remote path below the root, so a later
//! precreate with the same content reports the file as existing.
//!
//! Finalize removes its session whatever the status. A session whose
//! upload is abandoned before finalize stays on disk until the mirror
//! root is cleaned by hand.

use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};

use panup_transfer::{DEFAULT_CHUNK_SIZE, checksum_bytes, checksum_file_chunks};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::remote::{
    FinalizeRequest, FinalizeResult, PartReceipt, PartUpload, PrecreateRequest, PrecreateResult,
    RemoteClient, RemoteError, RemoteFuture,
};

const SESSIONS_DIR: &str = ".sessions";
const MANIFEST_FILE: &str = "manifest.json";

/// Finalize status: a declared part was never uploaded.
pub const STATUS_PART_MISSING: i32 = 31363;
/// Finalize status: a stored part does not match its declared digest.
pub const STATUS_DIGEST_MISMATCH: i32 = 31190;

/// What precreate promised, checked again at finalize.
#[derive(Debug, Serialize, Deserialize)]
struct SessionManifest {
    path: String,
    size: u64,
    block_list: Vec<String>,
}

/// [`RemoteClient`] backed by a local directory.
#[derive(Debug, Clone)]
pub struct MirrorRemote {
    root: PathBuf,
    chunk_size: usize,
}

impl MirrorRemote {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Chunk size used to fingerprint existing files. Must match the
    /// uploader's chunk size for the exists check to hit.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        if chunk_size > 0 {
            self.chunk_size = chunk_size;
        }
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Local location of a remote path.
    pub fn local_path(&self, remote_path: &str) -> Result<PathBuf, RemoteError> {
        resolve_under(&self.root, remote_path)
    }

    fn session_dir(&self, upload_id: &str) -> Result<PathBuf, RemoteError> {
        let valid = !upload_id.is_empty()
            && upload_id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
        if !valid {
            return Err(RemoteError::Api(format!("invalid upload id: {upload_id}")));
        }
        let dir = self.root.join(SESSIONS_DIR).join(upload_id);
        if !dir.is_dir() {
            return Err(RemoteError::Api(format!("unknown upload id: {upload_id}")));
        }
        Ok(dir)
    }

    fn precreate_blocking(&self, request: &PrecreateRequest) -> Result<PrecreateResult, RemoteError> {
        let target = self.local_path(&request.path)?;

        let same_size = fs::metadata(&target)
            .map(|m| m.is_file() && m.len() == request.size)
            .unwrap_or(false);
        if same_size {
            let existing = checksum_file_chunks(&target, self.chunk_size)
                .map_err(|e| RemoteError::Api(e.to_string()))?;
            if existing.chunk_digests == request.block_list {
                debug!(path = %request.path, "content already present");
                return Ok(PrecreateResult {
                    upload_id: String::new(),
                    required_parts: Vec::new(),
                    exists: true,
                });
            }
        }

        let upload_id = uuid::Uuid::new_v4().to_string();
        let session = self.root.join(SESSIONS_DIR).join(&upload_id);
        fs::create_dir_all(&session)?;

        let manifest = SessionManifest {
            path: request.path.clone(),
            size: request.size,
            block_list: request.block_list.clone(),
        };
        let json = serde_json::to_vec_pretty(&manifest)
            .map_err(|e| RemoteError::Api(format!("failed to encode session manifest: {e}")))?;
        fs::write(session.join(MANIFEST_FILE), json)?;

        debug!(path = %request.path, upload_id = %upload_id, "session opened");
        Ok(PrecreateResult {
            upload_id,
            required_parts: (0..request.block_list.len()).collect(),
            exists: false,
        })
    }

    fn upload_part_blocking(&self, request: &PartUpload) -> Result<PartReceipt, RemoteError> {
        let session = self.session_dir(&request.upload_id)?;
        let data = fs::read(&request.chunk_file)?;
        let digest = checksum_bytes(&data);

        let part_path = session.join(format!("part.{}", request.part_index));
        fs::write(&part_path, &data)?;

        debug!(part = request.part_index, bytes = data.len(), "part stored");
        Ok(PartReceipt { digest })
    }

    fn finalize_blocking(&self, request: &FinalizeRequest) -> Result<FinalizeResult, RemoteError> {
        let session = self.session_dir(&request.upload_id)?;
        let result = self.assemble(&session, request)?;

        // Accepted or rejected, a finalized session cannot be reused.
        if let Err(e) = fs::remove_dir_all(&session) {
            warn!(upload_id = %request.upload_id, error = %e, "failed to remove session");
        }
        Ok(result)
    }

    /// Checks the session against `request` and moves the assembled file
    /// into place. Returns a non-zero status when the session is unusable.
    fn assemble(
        &self,
        session: &Path,
        request: &FinalizeRequest,
    ) -> Result<FinalizeResult, RemoteError> {
        let manifest: SessionManifest = {
            let raw = fs::read(session.join(MANIFEST_FILE))?;
            serde_json::from_slice(&raw)
                .map_err(|e| RemoteError::Api(format!("corrupt session manifest: {e}")))?
        };

        let rejected = |status: i32| FinalizeResult {
            status,
            path: request.path.clone(),
        };

        if manifest.path != request.path
            || manifest.size != request.size
            || manifest.block_list != request.block_list
        {
            warn!(path = %request.path, "finalize does not match precreate");
            return Ok(rejected(STATUS_DIGEST_MISMATCH));
        }

        let mut parts = Vec::with_capacity(request.block_list.len());
        for (index, expected) in request.block_list.iter().enumerate() {
            let part_path = session.join(format!("part.{index}"));
            let data = match fs::read(&part_path) {
                Ok(data) => data,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    warn!(path = %request.path, part = index, "part missing at finalize");
                    return Ok(rejected(STATUS_PART_MISSING));
                }
                Err(e) => return Err(e.into()),
            };
            if &checksum_bytes(&data) != expected {
                warn!(path = %request.path, part = index, "part digest mismatch at finalize");
                return Ok(rejected(STATUS_DIGEST_MISMATCH));
            }
            parts.push(part_path);
        }

        let target = self.local_path(&request.path)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }

        // Assemble next to the target, then swap it in.
        let staging = session.join("assembled");
        let mut written: u64 = 0;
        {
            let mut out = fs::File::create(&staging)?;
            for part in &parts {
                let data = fs::read(part)?;
                out.write_all(&data)?;
                written += data.len() as u64;
            }
            out.sync_all()?;
        }
        if written != request.size {
            warn!(path = %request.path, written, expected = request.size, "assembled size mismatch");
            return Ok(rejected(STATUS_DIGEST_MISMATCH));
        }
        fs::rename(&staging, &target).or_else(|_| {
            fs::copy(&staging, &target)?;
            fs::remove_file(&staging)
        })?;

        info!(path = %request.path, size = written, "file created");
        Ok(FinalizeResult {
            status: 0,
            path: request.path.clone(),
        })
    }
}

/// Maps an absolute `/`-separated remote path onto `root`.
fn resolve_under(root: &Path, remote_path: &str) -> Result<PathBuf, RemoteError> {
    let relative = Path::new(remote_path.trim_start_matches('/'));
    let mut resolved = root.to_path_buf();
    let mut depth = 0;
    for component in relative.components() {
        match component {
            Component::Normal(part) => {
                resolved.push(part);
                depth += 1;
            }
            Component::CurDir => {}
            _ => {
                return Err(RemoteError::Api(format!("invalid remote path: {remote_path}")));
            }
        }
    }
    if depth == 0 || relative.starts_with(SESSIONS_DIR) {
        return Err(RemoteError::Api(format!("invalid remote path: {remote_path}")));
    }
    Ok(resolved)
}

fn check_credential(credential: &str) -> Result<(), RemoteError> {
    if credential.trim().is_empty() {
        return Err(RemoteError::Api("invalid credential".into()));
    }
    Ok(())
}

/// Runs a filesystem operation on the blocking pool.
async fn blocking<T, F>(op: F) -> Result<T, RemoteError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, RemoteError> + Send + 'static,
{
    tokio::task::spawn_blocking(op)
        .await
        .map_err(|e| RemoteError::Transport(format!("mirror task failed: {e}")))?
}

impl RemoteClient for MirrorRemote {
    fn precreate<'a>(
        &'a self,
        credential: &'a str,
        request: &'a PrecreateRequest,
    ) -> RemoteFuture<'a, PrecreateResult> {
        Box::pin(async move {
            check_credential(credential)?;
            let this = self.clone();
            let request = request.clone();
            blocking(move || this.precreate_blocking(&request)).await
        })
    }

    fn upload_part<'a>(
        &'a self,
        credential: &'a str,
        request: &'a PartUpload,
    ) -> RemoteFuture<'a, PartReceipt> {
        Box::pin(async move {
            check_credential(credential)?;
            let this = self.clone();
            let request = request.clone();
            blocking(move || this.upload_part_blocking(&request)).await
        })
    }

    fn finalize_create<'a>(
        &'a self,
        credential: &'a str,
        request: &'a FinalizeRequest,
    ) -> RemoteFuture<'a, FinalizeResult> {
        Box::pin(async move {
            check_credential(credential)?;
            let this = self.clone();
            let request = request.clone();
            blocking(move || this.finalize_blocking(&request)).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const CHUNK: usize = 4;

    struct Fixture {
        _dir: TempDir,
        remote: MirrorRemote,
        scratch: PathBuf,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("remote");
        let scratch = dir.path().join("scratch");
        fs::create_dir_all(&root).unwrap();
        fs::create_dir_all(&scratch).unwrap();
        Fixture {
            remote: MirrorRemote::new(root).with_chunk_size(CHUNK),
            scratch,
            _dir: dir,
        }
    }

    /// Writes each chunk into `scratch` and returns (paths, digests).
    fn stage(scratch: &Path, chunks: &[&[u8]]) -> (Vec<PathBuf>, Vec<String>) {
        chunks
            .iter()
            .enumerate()
            .map(|(i, data)| {
                let path = scratch.join(format!("chunk.{i}"));
                fs::write(&path, data).unwrap();
                (path, checksum_bytes(data))
            })
            .unzip()
    }

    fn precreate_request(path: &str, size: u64, block_list: &[String]) -> PrecreateRequest {
        PrecreateRequest {
            path: path.into(),
            size,
            block_list: block_list.to_vec(),
        }
    }

    async fn send_parts(remote: &MirrorRemote, upload_id: &str, path: &str, files: &[PathBuf]) {
        for (i, file) in files.iter().enumerate() {
            let request = PartUpload {
                upload_id: upload_id.into(),
                path: path.into(),
                chunk_file: file.clone(),
                part_index: i,
            };
            remote.upload_part("tok", &request).await.unwrap();
        }
    }

    #[tokio::test]
    async fn empty_credential_is_rejected() {
        let f = fixture();
        let err = f
            .remote
            .precreate("", &precreate_request("/apps/a.bin", 0, &[]))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "invalid credential");
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn full_cycle_creates_file_and_clears_session() {
        let f = fixture();
        let (files, digests) = stage(&f.scratch, &[b"abcd", b"efgh", b"ij"]);
        let pre = f
            .remote
            .precreate("tok", &precreate_request("/apps/x/a.bin", 10, &digests))
            .await
            .unwrap();
        assert!(!pre.exists);
        assert_eq!(pre.required_parts, vec![0, 1, 2]);

        send_parts(&f.remote, &pre.upload_id, "/apps/x/a.bin", &files).await;

        let result = f
            .remote
            .finalize_create(
                "tok",
                &FinalizeRequest {
                    upload_id: pre.upload_id.clone(),
                    path: "/apps/x/a.bin".into(),
                    size: 10,
                    block_list: digests,
                },
            )
            .await
            .unwrap();
        assert_eq!(result.status, 0);
        assert_eq!(result.path, "/apps/x/a.bin");

        let stored = f.remote.local_path("/apps/x/a.bin").unwrap();
        assert_eq!(fs::read(stored).unwrap(), b"abcdefghij");
        assert!(!f.remote.root().join(SESSIONS_DIR).join(&pre.upload_id).exists());
    }

    #[tokio::test]
    async fn matching_content_reports_exists() {
        let f = fixture();
        let stored = f.remote.local_path("/apps/a.bin").unwrap();
        fs::create_dir_all(stored.parent().unwrap()).unwrap();
        fs::write(&stored, b"abcdefgh").unwrap();

        let digests = vec![checksum_bytes(b"abcd"), checksum_bytes(b"efgh")];
        let pre = f
            .remote
            .precreate("tok", &precreate_request("/apps/a.bin", 8, &digests))
            .await
            .unwrap();
        assert!(pre.exists);
        assert!(pre.required_parts.is_empty());

        // Same size, different content.
        let other = vec![checksum_bytes(b"abcd"), checksum_bytes(b"XXXX")];
        let pre = f
            .remote
            .precreate("tok", &precreate_request("/apps/a.bin", 8, &other))
            .await
            .unwrap();
        assert!(!pre.exists);
    }

    #[tokio::test]
    async fn missing_part_yields_status() {
        let f = fixture();
        let (files, digests) = stage(&f.scratch, &[b"abcd", b"ef"]);
        let pre = f
            .remote
            .precreate("tok", &precreate_request("/apps/a.bin", 6, &digests))
            .await
            .unwrap();
        send_parts(&f.remote, &pre.upload_id, "/apps/a.bin", &files[..1]).await;
        let upload_id = pre.upload_id.clone();

        let result = f
            .remote
            .finalize_create(
                "tok",
                &FinalizeRequest {
                    upload_id: pre.upload_id,
                    path: "/apps/a.bin".into(),
                    size: 6,
                    block_list: digests,
                },
            )
            .await
            .unwrap();
        assert_eq!(result.status, STATUS_PART_MISSING);
        assert!(!f.remote.local_path("/apps/a.bin").unwrap().exists());
        assert!(!f.remote.root().join(SESSIONS_DIR).join(&upload_id).exists());
    }

    #[tokio::test]
    async fn corrupted_part_yields_status() {
        let f = fixture();
        let (files, digests) = stage(&f.scratch, &[b"abcd", b"ef"]);
        let pre = f
            .remote
            .precreate("tok", &precreate_request("/apps/a.bin", 6, &digests))
            .await
            .unwrap();
        fs::write(&files[1], b"zz").unwrap();
        send_parts(&f.remote, &pre.upload_id, "/apps/a.bin", &files).await;
        let upload_id = pre.upload_id.clone();

        let result = f
            .remote
            .finalize_create(
                "tok",
                &FinalizeRequest {
                    upload_id: pre.upload_id,
                    path: "/apps/a.bin".into(),
                    size: 6,
                    block_list: digests.clone(),
                },
            )
            .await
            .unwrap();
        assert_eq!(result.status, STATUS_DIGEST_MISMATCH);

        // The rejected session is gone; finalizing it again is an error.
        assert!(!f.remote.root().join(SESSIONS_DIR).join(&upload_id).exists());
        let retry = f
            .remote
            .finalize_create(
                "tok",
                &FinalizeRequest {
                    upload_id,
                    path: "/apps/a.bin".into(),
                    size: 6,
                    block_list: digests,
                },
            )
            .await;
        assert!(retry.is_err());
    }

    #[tokio::test]
    async fn unknown_upload_id_is_an_error() {
        let f = fixture();
        let (files, _) = stage(&f.scratch, &[b"abcd"]);
        let request = PartUpload {
            upload_id: "../../etc".into(),
            path: "/apps/a.bin".into(),
            chunk_file: files[0].clone(),
            part_index: 0,
        };
        assert!(f.remote.upload_part("tok", &request).await.is_err());
    }

    #[test]
    fn remote_paths_stay_under_root() {
        let root = Path::new("/srv/mirror");
        assert_eq!(
            resolve_under(root, "/apps/panup/a/b.txt").unwrap(),
            root.join("apps/panup/a/b.txt")
        );
        assert!(resolve_under(root, "/apps/../../etc/passwd").is_err());
        assert!(resolve_under(root, "/").is_err());
        assert!(resolve_under(root, "/.sessions/x").is_err());
    }

    #[tokio::test]
    async fn zero_byte_file_round_trips() {
        let f = fixture();
        let pre = f
            .remote
            .precreate("tok", &precreate_request("/apps/empty", 0, &[]))
            .await
            .unwrap();
        assert!(pre.required_parts.is_empty());
        let result = f
            .remote
            .finalize_create(
                "tok",
                &FinalizeRequest {
                    upload_id: pre.upload_id,
                    path: "/apps/empty".into(),
                    size: 0,
                    block_list: Vec::new(),
                },
            )
            .await
            .unwrap();
        assert_eq!(result.status, 0);

        let again = f
            .remote
            .precreate("tok", &precreate_request("/apps/empty", 0, &[]))
            .await
            .unwrap();
        assert!(again.exists);
    }
}
