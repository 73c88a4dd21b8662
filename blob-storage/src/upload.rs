use std::io;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::errors::StorageResult;
use crate::store::ContainerStore;

pub const DEFAULT_CHUNK_SIZE: usize = 4 * 1024 * 1024;

/// Largest block the service accepts in one Put Block.
pub const MAX_BLOCK_SIZE: usize = 4000 * 1024 * 1024;

// Up-front reservation per chunk; larger chunks grow as bytes arrive.
const READ_RESERVE: usize = 1024 * 1024;

/// How a streaming upload splits and parallelizes its source.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransferOptions {
    /// Bytes per staged block. The final block may be shorter.
    pub chunk_size: usize,
    /// Upper bound on blocks being staged at the same time.
    pub max_concurrency: usize,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_concurrency: 1,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadSummary {
    pub blob_name: String,
    pub bytes: u64,
    pub blocks: usize,
}

/// Block ids of one blob must all have the same length, hence the padding.
pub fn block_id(prefix: &str, index: usize) -> String {
    STANDARD.encode(format!("{}{:06}", prefix, index))
}

/// Uploads everything `reader` yields as `blob_name`, staging it in blocks of
/// `chunk_size` and committing them once the reader is exhausted.
///
/// The reader is consumed sequentially and never seeked. At most
/// `max_concurrency` blocks are in flight; the first failed block aborts the
/// rest and fails the upload without committing anything.
pub async fn upload_stream<R>(
    store: Arc<dyn ContainerStore>,
    blob_name: &str,
    reader: &mut R,
    options: TransferOptions,
) -> StorageResult<UploadSummary>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let chunk_size = options.chunk_size.max(1);
    let max_in_flight = options.max_concurrency.max(1);
    let prefix = Uuid::new_v4().simple().to_string();

    let mut block_ids: Vec<String> = Vec::new();
    let mut in_flight: JoinSet<StorageResult<()>> = JoinSet::new();
    let mut bytes = 0u64;

    loop {
        while in_flight.len() >= max_in_flight {
            if let Some(staged) = in_flight.join_next().await {
                staged??;
            }
        }

        let chunk = read_chunk(reader, chunk_size).await?;
        if chunk.is_empty() {
            break;
        }
        bytes += chunk.len() as u64;

        let id = block_id(&prefix, block_ids.len());
        block_ids.push(id.clone());
        tracing::debug!(blob = blob_name, block = block_ids.len() - 1, len = chunk.len(), "staging block");

        let store = store.clone();
        let blob = blob_name.to_string();
        in_flight.spawn(async move { store.stage_block(&blob, &id, chunk).await });
    }

    while let Some(staged) = in_flight.join_next().await {
        staged??;
    }

    tracing::debug!(blob = blob_name, blocks = block_ids.len(), bytes, "committing block list");
    store.commit_blocks(blob_name, &block_ids).await?;

    Ok(UploadSummary {
        blob_name: blob_name.to_string(),
        bytes,
        blocks: block_ids.len(),
    })
}

// Fills up to `size` bytes; a shorter result means the reader hit EOF.
async fn read_chunk<R>(reader: &mut R, size: usize) -> io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut chunk = Vec::with_capacity(size.min(READ_RESERVE));
    (&mut *reader).take(size as u64).read_to_end(&mut chunk).await?;
    Ok(chunk)
}
