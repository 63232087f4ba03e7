//! Resumable chunked-upload engine.
//!
//! This crate implements the **upload orchestration** for sending local
//! files to a cloud-storage account. It has no transport of its own: callers
//! provide a [`RemoteClient`] that speaks the remote protocol.
//!
//! # Pipeline
//!
//! 1. **Hash**: compute the per-chunk MD5 fingerprint of the file
//! 2. **Precreate**: register the upload and learn which parts are missing
//! 3. **Chunk**: stage chunk files in the cache directory
//! 4. **Upload**: send each required part with retry and backoff
//! 5. **Finalize**: assemble the parts into the remote file
//!
//! Directory uploads walk the tree into jobs and run them through the
//! [`UploadScheduler`] under a bounded admission gate.

pub mod error;
pub mod glob;
pub mod mirror;
pub mod orchestrator;
pub mod remote;
pub mod retry;
pub mod scanner;
pub mod scheduler;
pub mod types;
pub mod uploader;

// Re-export primary types for convenience.
pub use error::UploadError;
pub use mirror::MirrorRemote;
pub use orchestrator::FileUploader;
pub use remote::{
    FinalizeRequest, FinalizeResult, PartReceipt, PartUpload, PrecreateRequest, PrecreateResult,
    RemoteClient, RemoteError, RemoteFuture,
};
pub use retry::{RetryPolicy, is_retryable_message, upload_part_with_retry};
pub use scanner::{DEFAULT_EXCLUDES, ExcludeRules, PathMapping, parse_exclude_list, scan_files_for_upload};
pub use scheduler::UploadScheduler;
pub use types::{UploadEvent, UploadOutcome, UploadPhase};
pub use uploader::{DEFAULT_APP_PATH, DirectoryOptions, Uploader, UploaderConfig};
