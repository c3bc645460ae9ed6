//! In-memory block store emulator.
//!
//! Enforces the same block limits as the remote store so the staging and
//! commit pipeline can be exercised without network access. Restaging an
//! identifier replaces its payload (last write wins).

use crate::error::{ErrorCode, StoreError, StoreResult};
use crate::traits::BlockStore;
use async_trait::async_trait;
use blockprobe_core::{
    BlockId, CommitRequest, LimitKind, MAX_BLOCK_LIST_LEN, MAX_UNCOMMITTED_BLOCKS, ObjectName,
    ObjectState,
};
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tracing::instrument;

/// Limits enforced by the emulator.
#[derive(Clone, Copy, Debug)]
pub struct MemoryLimits {
    /// Longest block list a commit may reference.
    pub max_block_list_len: usize,
    /// Most distinct uncommitted blocks an object may hold.
    pub max_uncommitted_blocks: usize,
    /// Classification reported when a commit list is too long.
    pub list_rejection: LimitKind,
}

impl Default for MemoryLimits {
    fn default() -> Self {
        Self {
            max_block_list_len: MAX_BLOCK_LIST_LEN,
            max_uncommitted_blocks: MAX_UNCOMMITTED_BLOCKS,
            list_rejection: LimitKind::CountExceedsLimit,
        }
    }
}

/// Call counters collected by the emulator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MemoryStats {
    pub stage_calls: u64,
    pub commit_calls: u64,
    pub delete_calls: u64,
    /// Highest number of stage calls observed executing at once.
    pub peak_concurrent_stages: usize,
}

#[derive(Debug, Default)]
struct ObjectRecord {
    uncommitted: HashMap<BlockId, Bytes>,
    committed_blocks: HashMap<BlockId, Bytes>,
    committed_list: Option<Vec<BlockId>>,
    snapshots: usize,
    deleted: bool,
}

impl ObjectRecord {
    fn is_present(&self) -> bool {
        self.committed_list.is_some() || !self.uncommitted.is_empty()
    }

    fn state(&self) -> ObjectState {
        if self.committed_list.is_some() {
            ObjectState::Committed
        } else if !self.uncommitted.is_empty() {
            ObjectState::HasUncommittedBlocks
        } else if self.deleted {
            ObjectState::Deleted
        } else {
            ObjectState::Absent
        }
    }
}

#[derive(Debug, Default)]
struct Faults {
    /// Stage calls allowed to succeed before every further call fails.
    stage_budget: Option<u64>,
    /// Deletes that report success without removing anything.
    sticky_deletes: usize,
}

/// In-process block store.
#[derive(Debug, Default)]
pub struct MemoryBlockStore {
    limits: MemoryLimits,
    objects: Mutex<HashMap<ObjectName, ObjectRecord>>,
    faults: Mutex<Faults>,
    stage_calls: AtomicU64,
    commit_calls: AtomicU64,
    delete_calls: AtomicU64,
    stages_in_flight: AtomicUsize,
    peak_concurrent_stages: AtomicUsize,
}

/// Decrements the in-flight stage gauge on every exit path.
struct InFlightGuard<'a>(&'a AtomicUsize);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MemoryBlockStore {
    /// Create an emulator with the store's default limits.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an emulator with custom limits.
    pub fn with_limits(limits: MemoryLimits) -> Self {
        Self {
            limits,
            ..Self::default()
        }
    }

    /// Let `n` more stage calls succeed, then fail every later one with an
    /// unclassified error.
    pub fn fail_stage_after(&self, n: u64) {
        self.lock_faults().stage_budget = Some(n);
    }

    /// Make the next `n` deletes report success while leaving state behind.
    pub fn sticky_deletes(&self, n: usize) {
        self.lock_faults().sticky_deletes = n;
    }

    /// Record a snapshot of the object's committed version.
    pub fn create_snapshot(&self, object: &ObjectName) -> StoreResult<()> {
        let mut objects = self.lock_objects();
        match objects.get_mut(object) {
            Some(record) if record.committed_list.is_some() => {
                record.snapshots += 1;
                Ok(())
            }
            _ => Err(not_found(object)),
        }
    }

    /// Current lifecycle state of an object.
    pub fn object_state(&self, object: &ObjectName) -> ObjectState {
        self.lock_objects()
            .get(object)
            .map(ObjectRecord::state)
            .unwrap_or(ObjectState::Absent)
    }

    /// Number of distinct uncommitted blocks held for an object.
    pub fn uncommitted_count(&self, object: &ObjectName) -> usize {
        self.lock_objects()
            .get(object)
            .map(|r| r.uncommitted.len())
            .unwrap_or(0)
    }

    /// Committed block list of an object, if it has a committed version.
    pub fn committed_blocks(&self, object: &ObjectName) -> Option<Vec<BlockId>> {
        self.lock_objects()
            .get(object)
            .and_then(|r| r.committed_list.clone())
    }

    /// Size in bytes of the committed version.
    pub fn committed_len(&self, object: &ObjectName) -> Option<u64> {
        let objects = self.lock_objects();
        let record = objects.get(object)?;
        let list = record.committed_list.as_ref()?;
        Some(
            list.iter()
                .filter_map(|id| record.committed_blocks.get(id))
                .map(|data| data.len() as u64)
                .sum(),
        )
    }

    pub fn stats(&self) -> MemoryStats {
        MemoryStats {
            stage_calls: self.stage_calls.load(Ordering::SeqCst),
            commit_calls: self.commit_calls.load(Ordering::SeqCst),
            delete_calls: self.delete_calls.load(Ordering::SeqCst),
            peak_concurrent_stages: self.peak_concurrent_stages.load(Ordering::SeqCst),
        }
    }

    fn lock_objects(&self) -> std::sync::MutexGuard<'_, HashMap<ObjectName, ObjectRecord>> {
        // A panic while holding the lock cannot leave a record half-written,
        // so a poisoned map is still consistent.
        self.objects.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_faults(&self) -> std::sync::MutexGuard<'_, Faults> {
        self.faults.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn take_stage_budget(&self) -> bool {
        let mut faults = self.lock_faults();
        match faults.stage_budget.as_mut() {
            None => true,
            Some(0) => false,
            Some(remaining) => {
                *remaining -= 1;
                true
            }
        }
    }

    fn take_sticky_delete(&self) -> bool {
        let mut faults = self.lock_faults();
        if faults.sticky_deletes > 0 {
            faults.sticky_deletes -= 1;
            true
        } else {
            false
        }
    }
}

fn not_found(object: &ObjectName) -> StoreError {
    StoreError::service(
        ErrorCode::BlobNotFound,
        404,
        format!("the specified blob does not exist: {object}"),
    )
}

#[async_trait]
impl BlockStore for MemoryBlockStore {
    #[instrument(skip(self, data), fields(backend = "memory", size = data.len()))]
    async fn stage_block(
        &self,
        object: &ObjectName,
        block_id: &BlockId,
        data: Bytes,
    ) -> StoreResult<()> {
        self.stage_calls.fetch_add(1, Ordering::SeqCst);
        let in_flight = self.stages_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlightGuard(&self.stages_in_flight);
        self.peak_concurrent_stages
            .fetch_max(in_flight, Ordering::SeqCst);

        // Give other stagers a chance to overlap, as network calls would.
        tokio::task::yield_now().await;

        if !self.take_stage_budget() {
            return Err(StoreError::Injected(format!(
                "stage of {block_id} on {object} failed"
            )));
        }

        let mut objects = self.lock_objects();
        let record = objects.entry(object.clone()).or_default();
        if !record.uncommitted.contains_key(block_id)
            && record.uncommitted.len() >= self.limits.max_uncommitted_blocks
        {
            return Err(StoreError::service(
                ErrorCode::BlockCountExceedsLimit,
                409,
                format!(
                    "the uncommitted block count cannot exceed the maximum limit of {} blocks",
                    self.limits.max_uncommitted_blocks
                ),
            ));
        }
        record.uncommitted.insert(block_id.clone(), data);
        record.deleted = false;
        Ok(())
    }

    #[instrument(skip(self, blocks), fields(backend = "memory", blocks = blocks.len()))]
    async fn commit_block_list(
        &self,
        object: &ObjectName,
        blocks: &CommitRequest,
    ) -> StoreResult<()> {
        self.commit_calls.fetch_add(1, Ordering::SeqCst);

        if blocks.len() > self.limits.max_block_list_len {
            let kind = self.limits.list_rejection;
            return Err(StoreError::service(
                kind.into(),
                match kind {
                    LimitKind::CountExceedsLimit => 409,
                    LimitKind::ListTooLong => 400,
                },
                format!(
                    "the block list may not contain more than {} blocks (got {})",
                    self.limits.max_block_list_len,
                    blocks.len()
                ),
            ));
        }

        let mut objects = self.lock_objects();
        let record = objects.entry(object.clone()).or_default();

        let mut resolved = HashMap::new();
        for id in blocks.iter() {
            if resolved.contains_key(id) {
                continue;
            }
            let data = record
                .uncommitted
                .get(id)
                .or_else(|| record.committed_blocks.get(id))
                .cloned()
                .ok_or_else(|| {
                    StoreError::service(
                        ErrorCode::InvalidBlockList,
                        400,
                        format!("block {id} is neither staged nor committed"),
                    )
                })?;
            resolved.insert(id.clone(), data);
        }

        record.committed_blocks = resolved;
        record.committed_list = Some(blocks.blocks().to_vec());
        record.uncommitted.clear();
        record.deleted = false;
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "memory"))]
    async fn delete(&self, object: &ObjectName, include_snapshots: bool) -> StoreResult<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);

        let mut objects = self.lock_objects();
        let record = match objects.get_mut(object) {
            Some(record) if record.is_present() => record,
            _ => return Err(not_found(object)),
        };

        if record.snapshots > 0 && !include_snapshots {
            return Err(StoreError::service(
                ErrorCode::SnapshotsPresent,
                409,
                "this operation is not permitted because the blob has snapshots",
            ));
        }

        if self.take_sticky_delete() {
            tracing::debug!(object = %object, "Injected sticky delete, leaving state behind");
            return Ok(());
        }

        *record = ObjectRecord {
            deleted: true,
            ..ObjectRecord::default()
        };
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "memory"))]
    async fn exists(&self, object: &ObjectName) -> StoreResult<bool> {
        Ok(self
            .lock_objects()
            .get(object)
            .is_some_and(ObjectRecord::is_present))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> (MemoryBlockStore, ObjectName, BlockId) {
        (
            MemoryBlockStore::new(),
            ObjectName::generate("testblob-"),
            BlockId::from_label("sameBlockId").unwrap(),
        )
    }

    #[tokio::test]
    async fn test_restaging_same_id_replaces_payload() {
        let (store, object, id) = fixture();
        store
            .stage_block(&object, &id, Bytes::from_static(b"first"))
            .await
            .unwrap();
        store
            .stage_block(&object, &id, Bytes::from_static(b"second!"))
            .await
            .unwrap();

        assert_eq!(store.uncommitted_count(&object), 1);
        assert_eq!(store.object_state(&object), ObjectState::HasUncommittedBlocks);

        store
            .commit_block_list(&object, &CommitRequest::single(&id))
            .await
            .unwrap();
        assert_eq!(store.committed_len(&object), Some(7));
        assert_eq!(store.stats().stage_calls, 2);
    }

    #[tokio::test]
    async fn test_commit_over_limit_leaves_object_uncommitted() {
        let (store, object, id) = fixture();
        store
            .stage_block(&object, &id, Bytes::from_static(b"data"))
            .await
            .unwrap();

        let err = store
            .commit_block_list(&object, &CommitRequest::repeated(&id, MAX_BLOCK_LIST_LEN + 1))
            .await
            .unwrap_err();

        assert_eq!(err.limit_kind(), Some(LimitKind::CountExceedsLimit));
        assert_eq!(store.object_state(&object), ObjectState::HasUncommittedBlocks);
        assert!(store.committed_blocks(&object).is_none());
    }

    #[tokio::test]
    async fn test_list_rejection_classification_is_configurable() {
        let store = MemoryBlockStore::with_limits(MemoryLimits {
            max_block_list_len: 4,
            list_rejection: LimitKind::ListTooLong,
            ..MemoryLimits::default()
        });
        let object = ObjectName::generate("testblob-");
        let id = BlockId::from_label("sameBlockId").unwrap();

        let err = store
            .commit_block_list(&object, &CommitRequest::repeated(&id, 5))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some(&ErrorCode::BlockListTooLong));
    }

    #[tokio::test]
    async fn test_commit_at_limit_with_repeated_id_succeeds() {
        let (store, object, id) = fixture();
        store
            .stage_block(&object, &id, Bytes::from_static(b"ab"))
            .await
            .unwrap();

        store
            .commit_block_list(&object, &CommitRequest::repeated(&id, MAX_BLOCK_LIST_LEN))
            .await
            .unwrap();

        assert_eq!(store.object_state(&object), ObjectState::Committed);
        assert_eq!(store.uncommitted_count(&object), 0);
        assert_eq!(store.committed_len(&object), Some(2 * MAX_BLOCK_LIST_LEN as u64));
    }

    #[tokio::test]
    async fn test_commit_unknown_block_is_unclassified() {
        let (store, object, _) = fixture();
        let other = BlockId::from_label("neverStaged").unwrap();

        let err = store
            .commit_block_list(&object, &CommitRequest::single(&other))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some(&ErrorCode::InvalidBlockList));
        assert_eq!(err.limit_kind(), None);
    }

    #[tokio::test]
    async fn test_uncommitted_limit_counts_distinct_ids() {
        let store = MemoryBlockStore::with_limits(MemoryLimits {
            max_uncommitted_blocks: 2,
            ..MemoryLimits::default()
        });
        let object = ObjectName::generate("testblob-");
        let ids: Vec<_> = ["a", "b", "c"]
            .iter()
            .map(|l| BlockId::from_label(l).unwrap())
            .collect();

        for _ in 0..5 {
            store
                .stage_block(&object, &ids[0], Bytes::from_static(b"x"))
                .await
                .unwrap();
        }
        store
            .stage_block(&object, &ids[1], Bytes::from_static(b"x"))
            .await
            .unwrap();
        let err = store
            .stage_block(&object, &ids[2], Bytes::from_static(b"x"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some(&ErrorCode::BlockCountExceedsLimit));
    }

    #[tokio::test]
    async fn test_delete_lifecycle() {
        let (store, object, id) = fixture();
        assert!(store.delete(&object, true).await.unwrap_err().is_not_found());
        assert_eq!(store.object_state(&object), ObjectState::Absent);

        store
            .stage_block(&object, &id, Bytes::from_static(b"x"))
            .await
            .unwrap();
        assert!(store.exists(&object).await.unwrap());

        store.delete(&object, true).await.unwrap();
        assert!(!store.exists(&object).await.unwrap());
        assert_eq!(store.object_state(&object), ObjectState::Deleted);
    }

    #[tokio::test]
    async fn test_delete_requires_snapshot_flag() {
        let (store, object, id) = fixture();
        store
            .stage_block(&object, &id, Bytes::from_static(b"x"))
            .await
            .unwrap();
        store
            .commit_block_list(&object, &CommitRequest::single(&id))
            .await
            .unwrap();
        store.create_snapshot(&object).unwrap();

        let err = store.delete(&object, false).await.unwrap_err();
        assert_eq!(err.code(), Some(&ErrorCode::SnapshotsPresent));

        store.delete(&object, true).await.unwrap();
        assert!(!store.exists(&object).await.unwrap());
    }

    #[tokio::test]
    async fn test_sticky_delete_leaves_state_once() {
        let (store, object, id) = fixture();
        store
            .stage_block(&object, &id, Bytes::from_static(b"x"))
            .await
            .unwrap();
        store.sticky_deletes(1);

        store.delete(&object, true).await.unwrap();
        assert!(store.exists(&object).await.unwrap());

        store.delete(&object, true).await.unwrap();
        assert!(!store.exists(&object).await.unwrap());
        assert_eq!(store.stats().delete_calls, 2);
    }

    #[tokio::test]
    async fn test_stage_fault_injection() {
        let (store, object, id) = fixture();
        store.fail_stage_after(1);

        store
            .stage_block(&object, &id, Bytes::from_static(b"x"))
            .await
            .unwrap();
        let err = store
            .stage_block(&object, &id, Bytes::from_static(b"x"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Injected(_)));
        assert_eq!(err.limit_kind(), None);
    }
}
