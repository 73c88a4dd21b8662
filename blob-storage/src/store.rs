use async_trait::async_trait;

use crate::errors::StorageResult;

/// A single container that blobs can be staged into block by block.
#[async_trait]
pub trait ContainerStore: Send + Sync {
    fn name(&self) -> &str;

    async fn create(&self) -> StorageResult<()>;

    async fn delete(&self) -> StorageResult<()>;

    /// Uploads one uncommitted block of `blob`.
    async fn stage_block(&self, blob: &str, block_id: &str, data: Vec<u8>) -> StorageResult<()>;

    /// Commits previously staged blocks, in the given order, as the content of `blob`.
    async fn commit_blocks(&self, blob: &str, block_ids: &[String]) -> StorageResult<()>;
}
