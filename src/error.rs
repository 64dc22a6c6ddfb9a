//! Error types for a multipart upload run.

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Invalid or missing input, detected before any upload session exists.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must not be empty")]
    EmptyField(&'static str),

    #[error("chunk size {size} is below the minimum part size of {min} bytes")]
    ChunkSizeTooSmall { size: u64, min: u64 },

    #[error("chunk size {size} exceeds the maximum part size of {max} bytes")]
    ChunkSizeTooLarge { size: u64, max: u64 },

    #[error("source file {} is empty; a multipart upload needs at least one part", .0.display())]
    EmptySource(PathBuf),

    #[error("{parts} parts of {chunk_size} bytes exceed the limit of {max} parts, use a larger chunk size")]
    TooManyParts { parts: u64, chunk_size: u64, max: u64 },
}

/// Failure reported by the object store (or the transport in front of it).
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("{code}: {message}")]
    Service { code: String, message: String },

    #[error("request failed: {0}")]
    Transport(String),

    #[error("response is missing {0}")]
    MissingField(&'static str),
}

impl StorageError {
    pub fn service(code: impl Into<String>, message: impl Into<String>) -> Self {
        StorageError::Service {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Service error code, if the service returned one.
    pub fn code(&self) -> Option<&str> {
        match self {
            StorageError::Service { code, .. } => Some(code),
            _ => None,
        }
    }
}

/// The step of the upload protocol a failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadPhase {
    Config,
    Open,
    Create,
    Read,
    Upload,
    Complete,
    Cancel,
}

impl fmt::Display for UploadPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UploadPhase::Config => "config",
            UploadPhase::Open => "open",
            UploadPhase::Create => "create",
            UploadPhase::Read => "read",
            UploadPhase::Upload => "upload",
            UploadPhase::Complete => "complete",
            UploadPhase::Cancel => "cancel",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to open {}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to create multipart upload")]
    Session {
        #[source]
        source: StorageError,
    },

    #[error("failed to read part {part_number}")]
    Read {
        part_number: i32,
        #[source]
        source: io::Error,
    },

    #[error("part {part_number} upload failed")]
    PartUpload {
        part_number: i32,
        #[source]
        source: StorageError,
    },

    /// The session is still open on the service; its parts are kept.
    #[error("failed to complete multipart upload {upload_id}")]
    Completion {
        upload_id: String,
        #[source]
        source: StorageError,
    },

    #[error("upload cancelled after {parts_uploaded} parts")]
    Cancelled { parts_uploaded: usize },
}

impl UploadError {
    pub fn phase(&self) -> UploadPhase {
        match self {
            UploadError::Config(_) => UploadPhase::Config,
            UploadError::Open { .. } => UploadPhase::Open,
            UploadError::Session { .. } => UploadPhase::Create,
            UploadError::Read { .. } => UploadPhase::Read,
            UploadError::PartUpload { .. } => UploadPhase::Upload,
            UploadError::Completion { .. } => UploadPhase::Complete,
            UploadError::Cancelled { .. } => UploadPhase::Cancel,
        }
    }
}
