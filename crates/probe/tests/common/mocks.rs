use async_trait::async_trait;
use blockprobe_core::{BlockId, CommitRequest, LimitKind, ObjectName};
use blockprobe_storage::{BlockStore, ErrorCode, StoreError, StoreResult};
use bytes::Bytes;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// An over-limit rejection as the store would report it.
#[allow(dead_code)]
pub fn limit_error(kind: LimitKind) -> StoreError {
    StoreError::service(kind.into(), 409, format!("{kind}"))
}

/// The store's answer for a missing object.
#[allow(dead_code)]
pub fn not_found_error() -> StoreError {
    StoreError::service(ErrorCode::BlobNotFound, 404, "the specified blob does not exist")
}

/// A rejection outside the over-limit classifications.
#[allow(dead_code)]
pub fn other_error(code: &str) -> StoreError {
    StoreError::service(ErrorCode::from_code(code), 500, format!("{code} from mock"))
}

/// Store whose commit, delete and exists answers are scripted in order.
/// Unscripted commits and deletes succeed; unscripted exists returns false.
#[allow(dead_code)]
#[derive(Default)]
pub struct ScriptedStore {
    commits: Mutex<VecDeque<StoreResult<()>>>,
    deletes: Mutex<VecDeque<StoreResult<()>>>,
    exists: Mutex<VecDeque<bool>>,
    commit_lens: Mutex<Vec<usize>>,
    delete_count: Mutex<usize>,
    stage_count: Mutex<usize>,
}

#[allow(dead_code)]
impl ScriptedStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_commit(&self, result: StoreResult<()>) -> &Self {
        self.commits.lock().unwrap().push_back(result);
        self
    }

    pub fn push_delete(&self, result: StoreResult<()>) -> &Self {
        self.deletes.lock().unwrap().push_back(result);
        self
    }

    pub fn push_exists(&self, exists: bool) -> &Self {
        self.exists.lock().unwrap().push_back(exists);
        self
    }

    /// Lengths of the block lists submitted so far, in order.
    pub fn commit_lens(&self) -> Vec<usize> {
        self.commit_lens.lock().unwrap().clone()
    }

    pub fn delete_count(&self) -> usize {
        *self.delete_count.lock().unwrap()
    }

    pub fn stage_count(&self) -> usize {
        *self.stage_count.lock().unwrap()
    }
}

#[async_trait]
impl BlockStore for ScriptedStore {
    async fn stage_block(
        &self,
        _object: &ObjectName,
        _block_id: &BlockId,
        _data: Bytes,
    ) -> StoreResult<()> {
        *self.stage_count.lock().unwrap() += 1;
        Ok(())
    }

    async fn commit_block_list(
        &self,
        _object: &ObjectName,
        blocks: &CommitRequest,
    ) -> StoreResult<()> {
        self.commit_lens.lock().unwrap().push(blocks.len());
        self.commits.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }

    async fn delete(&self, _object: &ObjectName, _include_snapshots: bool) -> StoreResult<()> {
        *self.delete_count.lock().unwrap() += 1;
        self.deletes.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }

    async fn exists(&self, _object: &ObjectName) -> StoreResult<bool> {
        Ok(self.exists.lock().unwrap().pop_front().unwrap_or(false))
    }

    fn backend_name(&self) -> &'static str {
        "scripted"
    }
}
