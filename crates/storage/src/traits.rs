//! Storage trait definitions.

use crate::error::StoreResult;
use async_trait::async_trait;
use blockprobe_core::{BlockId, CommitRequest, ObjectName};
use bytes::Bytes;

/// Capability surface of a remote block-oriented object store.
///
/// Implementations are shared across many concurrent staging tasks and must
/// be safe to call from any of them.
#[async_trait]
pub trait BlockStore: Send + Sync + 'static {
    /// Stage one block's payload as an uncommitted block of `object`.
    async fn stage_block(
        &self,
        object: &ObjectName,
        block_id: &BlockId,
        data: Bytes,
    ) -> StoreResult<()>;

    /// Commit an ordered list of previously staged block ids.
    async fn commit_block_list(
        &self,
        object: &ObjectName,
        blocks: &CommitRequest,
    ) -> StoreResult<()>;

    /// Delete the object, including snapshots when requested.
    ///
    /// Returns a not-found error when the object does not exist.
    async fn delete(&self, object: &ObjectName, include_snapshots: bool) -> StoreResult<()>;

    /// Check if the object exists.
    async fn exists(&self, object: &ObjectName) -> StoreResult<bool>;

    /// Static identifier for the backend type, used in logs.
    fn backend_name(&self) -> &'static str;

    /// Verify the backend is reachable.
    ///
    /// The default implementation returns Ok(()), suitable for backends that
    /// don't need a connectivity check.
    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }
}
