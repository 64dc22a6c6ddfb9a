use std::num::NonZeroUsize;
use std::path::Path;
use std::time::{Duration, Instant};

use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::StorageClient;
use crate::config::MAX_PARTS;
use crate::error::{ConfigError, StorageError, UploadError};
use crate::part_source::PartSource;

/// An open multipart upload on the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSession {
    upload_id: String,
    bucket: String,
    key: String,
    chunk_size: NonZeroUsize,
}

impl UploadSession {
    pub fn upload_id(&self) -> &str {
        &self.upload_id
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

/// The part of an uploaded part that outlives its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedPartRecord {
    pub part_number: i32,
    pub etag: String,
}

impl CompletedPartRecord {
    pub fn new(part_number: i32, etag: impl Into<String>) -> Self {
        Self {
            part_number,
            etag: etag.into(),
        }
    }
}

/// Parts submitted to complete an upload, ascending by part number.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompletionManifest {
    parts: Vec<CompletedPartRecord>,
}

impl CompletionManifest {
    pub fn from_parts(mut parts: Vec<CompletedPartRecord>) -> Self {
        parts.sort_by_key(|part| part.part_number);
        Self { parts }
    }

    pub fn iter(&self) -> impl Iterator<Item = &CompletedPartRecord> {
        self.parts.iter()
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// True when the part numbers are exactly `1..=len`.
    pub fn is_contiguous(&self) -> bool {
        self.parts
            .iter()
            .zip(1..)
            .all(|(part, expected)| part.part_number == expected)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadState {
    Idle,
    SessionOpen,
    PartsComplete,
    Aborting,
    Aborted,
    Done,
    /// Completion was rejected; the session is left open on the service.
    CompletionFailed,
    /// The service refused to create a session.
    Failed,
}

/// Receives a notification for every part the service accepted.
pub trait ProgressObserver: Send {
    fn part_uploaded(&mut self, part_number: i32, etag: &str, bytes: usize);
}

/// Reports progress through `tracing`.
#[derive(Debug, Default)]
pub struct LogProgress;

impl ProgressObserver for LogProgress {
    fn part_uploaded(&mut self, part_number: i32, etag: &str, bytes: usize) {
        info!(part_number, etag, bytes, "uploaded part");
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSummary {
    pub upload_id: String,
    pub bucket: String,
    pub key: String,
    pub parts: usize,
    pub bytes: u64,
    pub elapsed: Duration,
}

/// Runs one multipart upload: create, upload every part in order, then
/// complete. The first failure after the session exists aborts it.
pub struct UploadOrchestrator<C> {
    client: C,
    chunk_size: NonZeroUsize,
    cancel: CancellationToken,
    progress: Box<dyn ProgressObserver>,
    state: UploadState,
}

impl<C: StorageClient> UploadOrchestrator<C> {
    /// `chunk_size` is assumed to already satisfy the service's minimum part size.
    pub fn new(client: C, chunk_size: NonZeroUsize) -> Self {
        Self {
            client,
            chunk_size,
            cancel: CancellationToken::new(),
            progress: Box::new(LogProgress),
            state: UploadState::Idle,
        }
    }

    /// Cancellation is checked before each part; a part already in flight finishes.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_progress(mut self, observer: impl ProgressObserver + 'static) -> Self {
        self.progress = Box::new(observer);
        self
    }

    pub fn state(&self) -> UploadState {
        self.state
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    fn transition(&mut self, next: UploadState) {
        debug!(from = ?self.state, to = ?next, "upload state change");
        self.state = next;
    }

    pub async fn upload(
        &mut self,
        bucket: &str,
        key: &str,
        path: &Path,
    ) -> Result<UploadSummary, UploadError> {
        let start_time = Instant::now();

        let mut source = PartSource::open(path)
            .await
            .map_err(|source| UploadError::Open {
                path: path.to_path_buf(),
                source,
            })?;

        // nothing is open on the service yet, so these need no cleanup
        if source.is_empty() {
            return Err(ConfigError::EmptySource(path.to_path_buf()).into());
        }
        let part_count = source.part_count(self.chunk_size);
        if part_count > MAX_PARTS {
            return Err(ConfigError::TooManyParts {
                parts: part_count,
                chunk_size: self.chunk_size.get() as u64,
                max: MAX_PARTS,
            }
            .into());
        }

        let session = self.initiate(bucket, key).await?;
        let outcome = self.run_part_loop(&session, &mut source).await;
        let bytes = source.offset();
        source.close();

        let manifest = self.finalize(&session, outcome).await?;

        let elapsed = start_time.elapsed();
        info!(
            upload_id = session.upload_id(),
            parts = manifest.len(),
            bytes,
            ?elapsed,
            "upload complete: {} -> {}/{}",
            path.display(),
            bucket,
            key
        );
        Ok(UploadSummary {
            upload_id: session.upload_id,
            bucket: session.bucket,
            key: session.key,
            parts: manifest.len(),
            bytes,
            elapsed,
        })
    }

    pub async fn initiate(&mut self, bucket: &str, key: &str) -> Result<UploadSession, UploadError> {
        match self.client.create_session(bucket, key).await {
            Ok(upload_id) => {
                info!(upload_id = %upload_id, bucket, key, "created multipart upload");
                self.transition(UploadState::SessionOpen);
                Ok(UploadSession {
                    upload_id,
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                    chunk_size: self.chunk_size,
                })
            }
            Err(source) => {
                error!(bucket, key, error = %source, "failed to create multipart upload");
                self.transition(UploadState::Failed);
                Err(UploadError::Session { source })
            }
        }
    }

    /// Uploads every remaining part of `source` in order, numbering from 1.
    ///
    /// Stops at the first read or upload failure without attempting later
    /// parts. A source that yields no parts is reported as empty.
    pub async fn run_part_loop<R: AsyncRead + Unpin>(
        &mut self,
        session: &UploadSession,
        source: &mut PartSource<R>,
    ) -> Result<Vec<CompletedPartRecord>, UploadError> {
        let mut completed_parts = Vec::new();
        let mut part_number: i32 = 1;

        loop {
            if self.cancel.is_cancelled() {
                warn!(
                    upload_id = session.upload_id(),
                    part_number, "cancelled before part upload"
                );
                return Err(UploadError::Cancelled {
                    parts_uploaded: completed_parts.len(),
                });
            }

            let payload = match source.next_part(session.chunk_size).await {
                Ok(Some(payload)) => payload,
                Ok(None) => break,
                Err(err) => {
                    return Err(UploadError::Read {
                        part_number,
                        source: err,
                    })
                }
            };
            let bytes = payload.len();

            let etag = self
                .client
                .upload_part(
                    &session.bucket,
                    &session.key,
                    &session.upload_id,
                    part_number,
                    payload,
                )
                .await
                .map_err(|err| UploadError::PartUpload {
                    part_number,
                    source: err,
                })?;

            self.progress.part_uploaded(part_number, &etag, bytes);
            completed_parts.push(CompletedPartRecord::new(part_number, etag));
            part_number += 1;
        }

        // the file shrank to nothing after it was opened
        if completed_parts.is_empty() {
            return Err(ConfigError::EmptySource(source.path().to_path_buf()).into());
        }
        Ok(completed_parts)
    }

    /// Completes the session on success, aborts it on failure.
    ///
    /// A failed abort is logged and the original error is returned. A failed
    /// completion leaves the session open so its parts can still be committed.
    pub async fn finalize(
        &mut self,
        session: &UploadSession,
        outcome: Result<Vec<CompletedPartRecord>, UploadError>,
    ) -> Result<CompletionManifest, UploadError> {
        let parts = match outcome {
            Ok(parts) => parts,
            Err(err) => {
                warn!(
                    upload_id = session.upload_id(),
                    phase = %err.phase(),
                    error = %err,
                    "aborting multipart upload"
                );
                if let Err(abort_err) = self.abort(session).await {
                    warn!(
                        upload_id = session.upload_id(),
                        error = %abort_err,
                        "failed to abort multipart upload, parts may remain on the service"
                    );
                }
                return Err(err);
            }
        };

        self.transition(UploadState::PartsComplete);
        let manifest = CompletionManifest::from_parts(parts);
        debug_assert!(manifest.is_contiguous(), "part numbers must be 1..=N");

        match self
            .client
            .complete_session(&session.bucket, &session.key, &session.upload_id, &manifest)
            .await
        {
            Ok(()) => {
                self.transition(UploadState::Done);
                Ok(manifest)
            }
            Err(source) => {
                error!(
                    upload_id = session.upload_id(),
                    error = %source,
                    "completion failed, multipart upload left open for manual recovery"
                );
                self.transition(UploadState::CompletionFailed);
                Err(UploadError::Completion {
                    upload_id: session.upload_id.clone(),
                    source,
                })
            }
        }
    }

    /// Best-effort abort. Repeating it on an aborted session leaves the state unchanged.
    pub async fn abort(&mut self, session: &UploadSession) -> Result<(), StorageError> {
        if self.state != UploadState::Aborted {
            self.transition(UploadState::Aborting);
        }
        let result = self
            .client
            .abort_session(&session.bucket, &session.key, &session.upload_id)
            .await;
        if result.is_ok() {
            info!(upload_id = session.upload_id(), "aborted multipart upload");
        }
        self.transition(UploadState::Aborted);
        result
    }
}
