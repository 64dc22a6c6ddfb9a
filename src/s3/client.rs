use async_trait::async_trait;
use aws_config::meta::region::RegionProviderChain;
use aws_config::BehaviorVersion;
use aws_sdk_s3 as s3;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_types::region::Region;
use bytes::Bytes;
use s3::primitives::ByteStream;
use tracing::{debug, instrument};

use super::{CompletionManifest, StorageClient};
use crate::config::ClientConfig;
use crate::error::StorageError;

const DEFAULT_REGION: &str = "us-east-1";

/// Builds an S3 client from the ambient AWS configuration.
///
/// Region resolution: explicit region, then the default provider chain, then
/// `us-east-1`. A custom endpoint switches to path-style addressing, which
/// most S3-compatible stores expect.
pub async fn connect(config: &ClientConfig) -> s3::Client {
    let region_provider = RegionProviderChain::first_try(config.region.clone().map(Region::new))
        .or_default_provider()
        .or_else(Region::new(DEFAULT_REGION));
    let sdk_config = aws_config::defaults(BehaviorVersion::latest())
        .region(region_provider)
        .load()
        .await;

    let mut builder = s3::config::Builder::from(&sdk_config);
    if let Some(endpoint) = &config.endpoint_url {
        debug!(endpoint = %endpoint, "using custom S3 endpoint");
        builder = builder.endpoint_url(endpoint).force_path_style(true);
    }
    s3::Client::from_conf(builder.build())
}

fn storage_error<E, R>(err: SdkError<E, R>) -> StorageError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    match err.as_service_error() {
        Some(service) => StorageError::service(
            service.code().unwrap_or("Unknown"),
            service.message().unwrap_or("No message"),
        ),
        None => StorageError::Transport(DisplayErrorContext(&err).to_string()),
    }
}

fn completed_upload(manifest: &CompletionManifest) -> CompletedMultipartUpload {
    let parts = manifest
        .iter()
        .map(|part| {
            CompletedPart::builder()
                .part_number(part.part_number)
                .e_tag(part.etag.clone())
                .build()
        })
        .collect();

    CompletedMultipartUpload::builder()
        .set_parts(Some(parts))
        .build()
}

#[async_trait]
impl StorageClient for s3::Client {
    #[instrument(skip(self))]
    async fn create_session(&self, bucket: &str, key: &str) -> Result<String, StorageError> {
        let output = self
            .create_multipart_upload()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(storage_error)?;

        output
            .upload_id
            .ok_or(StorageError::MissingField("upload_id"))
    }

    #[instrument(skip(self, payload), fields(bytes = payload.len()))]
    async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
        payload: Bytes,
    ) -> Result<String, StorageError> {
        // inherent builder, not this trait method
        let output = s3::Client::upload_part(self)
            .body(ByteStream::from(payload))
            .bucket(bucket)
            .key(key)
            .part_number(part_number)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(storage_error)?;

        output.e_tag.ok_or(StorageError::MissingField("e_tag"))
    }

    #[instrument(skip(self, manifest), fields(parts = manifest.len()))]
    async fn complete_session(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        manifest: &CompletionManifest,
    ) -> Result<(), StorageError> {
        self.complete_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(completed_upload(manifest))
            .send()
            .await
            .map_err(storage_error)?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn abort_session(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
    ) -> Result<(), StorageError> {
        self.abort_multipart_upload()
            .bucket(bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(storage_error)?;
        Ok(())
    }
}
