//! Sequential multipart upload of a single local file to S3.

pub mod config;
pub mod error;
pub mod logging;
pub mod part_source;
pub mod s3;

pub use error::{ConfigError, StorageError, UploadError, UploadPhase};
pub use part_source::PartSource;
pub use s3::{StorageClient, UploadOrchestrator, UploadSummary};
