pub mod client;
pub mod multipart;

#[cfg(test)]
pub(crate) mod mock;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::StorageError;
pub use multipart::{
    CompletedPartRecord, CompletionManifest, LogProgress, ProgressObserver, UploadOrchestrator,
    UploadSession, UploadState, UploadSummary,
};

/// The multipart operations the orchestrator needs from an object store.
#[async_trait]
pub trait StorageClient: Send + Sync {
    /// Starts a multipart upload and returns its upload id.
    async fn create_session(&self, bucket: &str, key: &str) -> Result<String, StorageError>;

    /// Uploads one part and returns the ETag the service assigned to it.
    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
        payload: Bytes,
    ) -> Result<String, StorageError>;

    async fn complete_session(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        manifest: &CompletionManifest,
    ) -> Result<(), StorageError>;

    /// Discards the upload and its parts. Safe to repeat; the service may
    /// answer a repeated abort with a `NoSuchUpload` error.
    async fn abort_session(&self, bucket: &str, key: &str, upload_id: &str)
        -> Result<(), StorageError>;
}
