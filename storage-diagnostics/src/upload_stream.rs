use std::io::Cursor;
use std::sync::Arc;

use blob_store::{
    upload_stream, BlobServiceClient, ClientOptions, ContainerStore, LoggingObserver, TransferOptions,
    UploadSummary, DEFAULT_TIMEOUT,
};
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

use crate::config::UploadConfig;
use crate::errors::DiagResult;

const BUFFER_SEED: u64 = 0;

/// What a finished upload run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReport {
    pub container: String,
    pub uploaded: Vec<UploadSummary>,
    pub failed: usize,
}

/// Runs against the account named by the connection string, logging every
/// HTTP request the client makes.
pub async fn run(config: &UploadConfig) -> DiagResult<UploadReport> {
    log_config(config);

    let options = ClientOptions {
        timeout: DEFAULT_TIMEOUT,
        observer: Arc::new(LoggingObserver),
    };
    let service = BlobServiceClient::from_connection_string(&config.connection_string, options)?;
    let container = service.container_client(&container_name())?;

    run_with_store(Arc::new(container), config).await
}

/// Create the container, upload `iterations` blobs, delete the container.
pub async fn run_with_store(store: Arc<dyn ContainerStore>, config: &UploadConfig) -> DiagResult<UploadReport> {
    let container = store.name().to_string();

    tracing::info!("Creating container {}", container);
    store.create().await?;
    tracing::info!("Created container {}", container);

    let buffer = random_buffer(config.upload_size);
    let options = TransferOptions {
        chunk_size: config.buffer_size,
        max_concurrency: config.max_concurrency,
    };
    let mut names = BlobNames::default();
    let mut report = UploadReport {
        container: container.clone(),
        uploaded: Vec::with_capacity(config.iterations),
        failed: 0,
    };

    for i in 0..config.iterations {
        tracing::info!("Iteration {}", i);
        let blob = names.next_name();
        // Each iteration reads the same bytes through a fresh, forward-only reader.
        let mut reader = Cursor::new(buffer.as_slice());

        tracing::info!("Uploading blob {}", blob);
        match upload_stream(store.clone(), &blob, &mut reader, options).await {
            Ok(summary) => {
                tracing::info!("Uploaded blob {}", blob);
                report.uploaded.push(summary);
            }
            Err(e) if config.continue_on_error => {
                tracing::error!("Upload of blob {} failed: {}", blob, e);
                report.failed += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }

    tracing::info!("Deleting container {}", container);
    store.delete().await?;
    tracing::info!("Deleted container {}", container);

    Ok(report)
}

fn log_config(config: &UploadConfig) {
    tracing::info!("ITERATIONS: {}", config.iterations);
    tracing::info!("UPLOAD_SIZE: {}", config.upload_size);
    tracing::info!("BUFFER_SIZE: {}", config.buffer_size);
    tracing::info!("MAX_CONCURRENCY: {}", config.max_concurrency);
    tracing::info!("CONTINUE_ON_ERROR: {}", config.continue_on_error);
}

pub fn container_name() -> String {
    format!("container{}", Utc::now().timestamp_millis())
}

/// Hands out `blob{micros}` names that never repeat within one run.
#[derive(Debug, Default)]
pub struct BlobNames {
    last: i64,
}

impl BlobNames {
    pub fn next_name(&mut self) -> String {
        let now = Utc::now().timestamp_micros();
        self.last = if now > self.last { now } else { self.last + 1 };
        format!("blob{}", self.last)
    }
}

/// Same seed every run so uploads are reproducible.
pub fn random_buffer(len: usize) -> Vec<u8> {
    let mut buffer = vec![0u8; len];
    StdRng::seed_from_u64(BUFFER_SEED).fill_bytes(&mut buffer);
    buffer
}
