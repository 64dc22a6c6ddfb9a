use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use s3mpu::config::Args;
use s3mpu::{logging, s3, UploadError, UploadOrchestrator, UploadSummary};

#[::tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    logging::init(&args.log_level, args.json_logs);

    match run(args).await {
        Ok(summary) => {
            println!(
                "success: {} -> {} | upload id: {} | parts: {} | bytes: {} | time elapsed: {:?}",
                summary.key,
                summary.bucket,
                summary.upload_id,
                summary.parts,
                summary.bytes,
                summary.elapsed
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            match err.downcast_ref::<UploadError>() {
                Some(upload_err) => eprintln!("error ({} phase): {err:#}", upload_err.phase()),
                None => eprintln!("error: {err:#}"),
            }
            if let Some(UploadError::Completion { upload_id, .. }) = err.downcast_ref::<UploadError>() {
                eprintln!(
                    "note: multipart upload {upload_id} is still open; complete or abort it manually"
                );
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> anyhow::Result<UploadSummary> {
    let config = args.validate().map_err(UploadError::from)?;
    let client = s3::client::connect(&args.client_config()).await;

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if should_exit_on_interrupt(&interrupt) {
                error!("second interrupt received, exiting without aborting the upload");
                std::process::exit(130);
            }
        }
    });

    let mut orchestrator =
        UploadOrchestrator::new(client, config.chunk_size).with_cancellation(cancel);
    let summary = orchestrator
        .upload(&config.bucket, &config.key, &config.file)
        .await
        .with_context(|| {
            format!(
                "uploading {} to s3://{}/{}",
                config.file.display(),
                config.bucket,
                config.key
            )
        })?;
    Ok(summary)
}

/// The first interrupt cancels the upload at the next part boundary; any
/// later one means the process should exit right away.
fn should_exit_on_interrupt(cancel: &CancellationToken) -> bool {
    if cancel.is_cancelled() {
        return true;
    }
    warn!("interrupt received, aborting before the next part (press Ctrl-C again to exit now)");
    cancel.cancel();
    false
}
