//! In-memory `StorageClient` that records every call, with failure injection.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use super::{CompletionManifest, StorageClient};
use crate::error::StorageError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Create { bucket: String, key: String },
    UploadPart { upload_id: String, part_number: i32, bytes: usize },
    Complete { upload_id: String, part_numbers: Vec<i32> },
    Abort { upload_id: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionStatus {
    Open,
    Completed,
    Aborted,
}

#[derive(Default)]
struct Inner {
    calls: Vec<Call>,
    next_id: u32,
    sessions: HashMap<String, SessionStatus>,
    parts: BTreeMap<i32, Bytes>,
    completed: Option<Vec<i32>>,
}

#[derive(Default)]
pub struct MockStorage {
    inner: Mutex<Inner>,
    fail_create: bool,
    fail_part: Option<i32>,
    fail_complete: bool,
    fail_abort: bool,
    cancel_after: Option<(i32, CancellationToken)>,
}

impl MockStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_create(mut self) -> Self {
        self.fail_create = true;
        self
    }

    pub fn failing_part(mut self, part_number: i32) -> Self {
        self.fail_part = Some(part_number);
        self
    }

    pub fn failing_complete(mut self) -> Self {
        self.fail_complete = true;
        self
    }

    pub fn failing_abort(mut self) -> Self {
        self.fail_abort = true;
        self
    }

    /// Cancels `token` once `part_number` has been accepted.
    pub fn cancel_after_part(mut self, part_number: i32, token: CancellationToken) -> Self {
        self.cancel_after = Some((part_number, token));
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.inner.lock().unwrap().calls.clone()
    }

    /// Part numbers of every upload attempt, failed ones included.
    pub fn uploaded_part_numbers(&self) -> Vec<i32> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::UploadPart { part_number, .. } => Some(part_number),
                _ => None,
            })
            .collect()
    }

    pub fn part_sizes(&self) -> Vec<usize> {
        self.inner
            .lock()
            .unwrap()
            .parts
            .values()
            .map(|p| p.len())
            .collect()
    }

    /// Stored part payloads concatenated in part-number order.
    pub fn assembled(&self) -> Vec<u8> {
        let inner = self.inner.lock().unwrap();
        inner
            .parts
            .values()
            .flat_map(|p| p.iter().copied())
            .collect()
    }

    /// Part numbers of the manifest the upload was completed with.
    pub fn completed_manifest(&self) -> Option<Vec<i32>> {
        self.inner.lock().unwrap().completed.clone()
    }

    pub fn abort_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, Call::Abort { .. }))
            .count()
    }

    pub fn is_open(&self, upload_id: &str) -> bool {
        self.inner.lock().unwrap().sessions.get(upload_id) == Some(&SessionStatus::Open)
    }
}

fn no_such_upload(upload_id: &str) -> StorageError {
    StorageError::service(
        "NoSuchUpload",
        format!("upload {upload_id} does not exist or is no longer open"),
    )
}

#[async_trait]
impl StorageClient for MockStorage {
    async fn create_session(&self, bucket: &str, key: &str) -> Result<String, StorageError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(Call::Create {
            bucket: bucket.to_string(),
            key: key.to_string(),
        });
        if self.fail_create {
            return Err(StorageError::service("NoSuchBucket", "The specified bucket does not exist"));
        }

        inner.next_id += 1;
        let upload_id = format!("upload-{}", inner.next_id);
        inner.sessions.insert(upload_id.clone(), SessionStatus::Open);
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        _bucket: &str,
        _key: &str,
        upload_id: &str,
        part_number: i32,
        payload: Bytes,
    ) -> Result<String, StorageError> {
        {
            let mut inner = self.inner.lock().unwrap();
            inner.calls.push(Call::UploadPart {
                upload_id: upload_id.to_string(),
                part_number,
                bytes: payload.len(),
            });
            if inner.sessions.get(upload_id) != Some(&SessionStatus::Open) {
                return Err(no_such_upload(upload_id));
            }
            if self.fail_part == Some(part_number) {
                return Err(StorageError::service(
                    "InternalError",
                    "We encountered an internal error. Please try again.",
                ));
            }
            inner.parts.insert(part_number, payload);
        }

        if let Some((after, token)) = &self.cancel_after {
            if *after == part_number {
                token.cancel();
            }
        }
        Ok(format!("\"etag-{part_number}\""))
    }

    async fn complete_session(
        &self,
        _bucket: &str,
        _key: &str,
        upload_id: &str,
        manifest: &CompletionManifest,
    ) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().unwrap();
        let part_numbers: Vec<i32> = manifest.iter().map(|p| p.part_number).collect();
        inner.calls.push(Call::Complete {
            upload_id: upload_id.to_string(),
            part_numbers: part_numbers.clone(),
        });
        if self.fail_complete {
            return Err(StorageError::service("SlowDown", "Please reduce your request rate."));
        }
        if inner.sessions.get(upload_id) != Some(&SessionStatus::Open) {
            return Err(no_such_upload(upload_id));
        }
        if manifest.is_empty() {
            return Err(StorageError::service(
                "MalformedXML",
                "The XML you provided was not well-formed or did not validate against our published schema",
            ));
        }

        inner.sessions.insert(upload_id.to_string(), SessionStatus::Completed);
        inner.completed = Some(part_numbers);
        Ok(())
    }

    async fn abort_session(
        &self,
        _bucket: &str,
        _key: &str,
        upload_id: &str,
    ) -> Result<(), StorageError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(Call::Abort {
            upload_id: upload_id.to_string(),
        });
        if self.fail_abort {
            return Err(StorageError::Transport("connection reset by peer".to_string()));
        }
        match inner.sessions.get(upload_id) {
            Some(SessionStatus::Open) => {
                inner.sessions.insert(upload_id.to_string(), SessionStatus::Aborted);
                inner.parts.clear();
                Ok(())
            }
            _ => Err(no_such_upload(upload_id)),
        }
    }
}
