use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::errors::{StorageError, StorageResult};
use crate::store::ContainerStore;

/// Everything a `MemoryContainerStore` was asked to do, in order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreEvent {
    CreateContainer(String),
    StageBlock { blob: String, block_id: String, len: usize },
    CommitBlocks { blob: String, blocks: usize, bytes: u64 },
    DeleteContainer(String),
}

#[derive(Debug, Default)]
struct State {
    exists: bool,
    staged: HashMap<(String, String), Vec<u8>>,
    committed: BTreeMap<String, Vec<u8>>,
    events: Vec<StoreEvent>,
}

/// A test implementation of `ContainerStore` that keeps blobs in memory and
/// mimics the service's block semantics.
#[derive(Clone, Debug)]
pub struct MemoryContainerStore {
    name: String,
    state: Arc<Mutex<State>>,
    stage_delay: Duration,
    in_flight: Arc<AtomicUsize>,
    peak_in_flight: Arc<AtomicUsize>,
    pending_failures: Arc<AtomicUsize>,
}

impl MemoryContainerStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(Mutex::new(State::default())),
            stage_delay: Duration::ZERO,
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak_in_flight: Arc::new(AtomicUsize::new(0)),
            pending_failures: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Holds every staged block for `delay` so that concurrent stages overlap.
    pub fn with_stage_delay(mut self, delay: Duration) -> Self {
        self.stage_delay = delay;
        self
    }

    /// Makes the next `count` block stages fail with a server error.
    pub fn fail_next_stages(&self, count: usize) {
        self.pending_failures.store(count, Ordering::SeqCst);
    }

    pub fn events(&self) -> Vec<StoreEvent> {
        self.state().events.clone()
    }

    pub fn exists(&self) -> bool {
        self.state().exists
    }

    pub fn blob(&self, blob: &str) -> Option<Vec<u8>> {
        self.state().committed.get(blob).cloned()
    }

    /// Highest number of block stages observed running at once.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn state(&self) -> MutexGuard<'_, State> {
        match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn stage_now(&self, blob: &str, block_id: &str, data: Vec<u8>) -> StorageResult<()> {
        let take_failure = self
            .pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if take_failure {
            return Err(service_error(StatusCode::INTERNAL_SERVER_ERROR, "InternalError", "injected failure"));
        }

        let mut state = self.state();
        if !state.exists {
            return Err(container_not_found());
        }
        state.events.push(StoreEvent::StageBlock {
            blob: blob.to_string(),
            block_id: block_id.to_string(),
            len: data.len(),
        });
        state.staged.insert((blob.to_string(), block_id.to_string()), data);
        Ok(())
    }
}

struct InFlight(Arc<AtomicUsize>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ContainerStore for MemoryContainerStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn create(&self) -> StorageResult<()> {
        let mut state = self.state();
        if state.exists {
            return Err(service_error(StatusCode::CONFLICT, "ContainerAlreadyExists", "The specified container already exists."));
        }
        state.exists = true;
        state.events.push(StoreEvent::CreateContainer(self.name.clone()));
        Ok(())
    }

    async fn delete(&self) -> StorageResult<()> {
        let mut state = self.state();
        if !state.exists {
            return Err(container_not_found());
        }
        state.exists = false;
        state.staged.clear();
        state.committed.clear();
        state.events.push(StoreEvent::DeleteContainer(self.name.clone()));
        Ok(())
    }

    async fn stage_block(&self, blob: &str, block_id: &str, data: Vec<u8>) -> StorageResult<()> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlight(self.in_flight.clone());
        self.peak_in_flight.fetch_max(current, Ordering::SeqCst);

        if !self.stage_delay.is_zero() {
            tokio::time::sleep(self.stage_delay).await;
        }
        self.stage_now(blob, block_id, data)
    }

    async fn commit_blocks(&self, blob: &str, block_ids: &[String]) -> StorageResult<()> {
        let mut state = self.state();
        if !state.exists {
            return Err(container_not_found());
        }

        let mut content = Vec::new();
        for id in block_ids {
            match state.staged.get(&(blob.to_string(), id.clone())) {
                Some(block) => content.extend_from_slice(block),
                None => {
                    return Err(service_error(StatusCode::BAD_REQUEST, "InvalidBlockList", "The specified block list is invalid."))
                }
            }
        }
        state.staged.retain(|(staged_blob, _), _| staged_blob != blob);
        state.events.push(StoreEvent::CommitBlocks {
            blob: blob.to_string(),
            blocks: block_ids.len(),
            bytes: content.len() as u64,
        });
        state.committed.insert(blob.to_string(), content);
        Ok(())
    }
}

fn container_not_found() -> StorageError {
    service_error(StatusCode::NOT_FOUND, "ContainerNotFound", "The specified container does not exist.")
}

fn service_error(status: StatusCode, code: &str, message: &str) -> StorageError {
    StorageError::Service {
        status,
        code: code.to_string(),
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_commit_assembles_blocks_in_order() {
        let store = MemoryContainerStore::new("container1");
        store.create().await.unwrap();

        store.stage_block("blob", "b", b"world".to_vec()).await.unwrap();
        store.stage_block("blob", "a", b"hello ".to_vec()).await.unwrap();
        store
            .commit_blocks("blob", &["a".to_string(), "b".to_string()])
            .await
            .unwrap();

        assert_eq!(store.blob("blob").unwrap(), b"hello world");
    }

    #[tokio::test]
    async fn test_requires_existing_container() {
        let store = MemoryContainerStore::new("container1");
        let err = store.stage_block("blob", "a", vec![1]).await.unwrap_err();
        assert_eq!(err.service_code(), Some("ContainerNotFound"));

        store.create().await.unwrap();
        let err = store.create().await.unwrap_err();
        assert_eq!(err.service_code(), Some("ContainerAlreadyExists"));
    }

    #[tokio::test]
    async fn test_unknown_block_is_rejected() {
        let store = MemoryContainerStore::new("container1");
        store.create().await.unwrap();
        let err = store
            .commit_blocks("blob", &["missing".to_string()])
            .await
            .unwrap_err();
        assert_eq!(err.service_code(), Some("InvalidBlockList"));
    }

    #[tokio::test]
    async fn test_delete_drops_blobs() {
        let store = MemoryContainerStore::new("container1");
        store.create().await.unwrap();
        store.stage_block("blob", "a", vec![1, 2]).await.unwrap();
        store.commit_blocks("blob", &["a".to_string()]).await.unwrap();
        store.delete().await.unwrap();

        assert!(!store.exists());
        assert!(store.blob("blob").is_none());
        assert_eq!(
            store.events().last(),
            Some(&StoreEvent::DeleteContainer("container1".to_string()))
        );
    }

    #[tokio::test]
    async fn test_injected_failures_are_consumed() {
        let store = MemoryContainerStore::new("container1");
        store.create().await.unwrap();
        store.fail_next_stages(1);

        assert!(store.stage_block("blob", "a", vec![1]).await.is_err());
        assert!(store.stage_block("blob", "a", vec![1]).await.is_ok());
    }
}
