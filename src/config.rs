//! Command-line arguments and their validation.

use std::num::NonZeroUsize;
use std::path::PathBuf;

use clap::Parser;

use crate::error::ConfigError;

const MIB: u64 = 1024 * 1024;
const GIB: u64 = 1024 * MIB;

/// S3 rejects any part but the last below this size.
pub const MIN_PART_SIZE: u64 = 5 * MIB;
pub const MAX_PART_SIZE: u64 = 5 * GIB;
pub const DEFAULT_PART_SIZE: u64 = 15 * MIB;
pub const MAX_PARTS: u64 = 10_000;

#[derive(Parser, Debug, Clone)]
#[command(
    author,
    version,
    about = "Upload a large file to S3 as a sequential multipart upload",
    long_about = None
)]
pub struct Args {
    /// Destination bucket
    #[arg(long, env = "AWSBUCKET")]
    pub bucket: String,

    /// Destination object key
    #[arg(long)]
    pub key: String,

    /// Local file to upload
    #[arg(long, value_name = "PATH")]
    pub file: PathBuf,

    /// Bytes per part (minimum 5 MiB, maximum 5 GiB)
    #[arg(long, value_name = "BYTES", default_value_t = DEFAULT_PART_SIZE)]
    pub chunk_size: u64,

    /// Region, falls back to the default provider chain and then us-east-1
    #[arg(long, env = "AWSREGION")]
    pub region: Option<String>,

    /// Custom endpoint for S3-compatible stores (uses path-style addressing)
    #[arg(long, env = "AWS_ENDPOINT_URL")]
    pub endpoint_url: Option<String>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json_logs: bool,
}

/// Validated inputs for one upload run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadConfig {
    pub bucket: String,
    pub key: String,
    pub file: PathBuf,
    pub chunk_size: NonZeroUsize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientConfig {
    pub region: Option<String>,
    pub endpoint_url: Option<String>,
}

impl Args {
    pub fn validate(&self) -> Result<UploadConfig, ConfigError> {
        let bucket = self.bucket.trim();
        if bucket.is_empty() {
            return Err(ConfigError::EmptyField("bucket"));
        }
        if self.key.trim().is_empty() {
            return Err(ConfigError::EmptyField("key"));
        }
        if self.file.as_os_str().is_empty() {
            return Err(ConfigError::EmptyField("file"));
        }
        let chunk_size = validate_chunk_size(self.chunk_size)?;

        Ok(UploadConfig {
            bucket: bucket.to_string(),
            key: self.key.clone(),
            file: self.file.clone(),
            chunk_size,
        })
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            region: non_empty(self.region.as_deref()),
            endpoint_url: non_empty(self.endpoint_url.as_deref()),
        }
    }
}

pub fn validate_chunk_size(size: u64) -> Result<NonZeroUsize, ConfigError> {
    if size < MIN_PART_SIZE {
        return Err(ConfigError::ChunkSizeTooSmall {
            size,
            min: MIN_PART_SIZE,
        });
    }
    if size > MAX_PART_SIZE {
        return Err(ConfigError::ChunkSizeTooLarge {
            size,
            max: MAX_PART_SIZE,
        });
    }
    usize::try_from(size)
        .ok()
        .and_then(NonZeroUsize::new)
        .ok_or(ConfigError::ChunkSizeTooLarge {
            size,
            max: usize::MAX as u64,
        })
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
