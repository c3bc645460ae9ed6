//! Block store abstraction and backends for the uncommitted block probe.
//!
//! This crate provides:
//! - The [`BlockStore`] capability surface (stage, commit, delete, exists)
//! - A closed classification of store error codes
//! - Backends: an in-memory emulator and Azure Blob Storage over REST

pub mod backends;
pub mod error;
pub mod traits;

pub use backends::{azure::AzureBlobBackend, memory::MemoryBlockStore};
pub use error::{ErrorCode, StoreError, StoreResult};
pub use traits::BlockStore;

use blockprobe_core::config::StoreConfig;
use std::sync::Arc;
use std::time::Duration;

/// Create a block store from configuration.
pub fn from_config(config: &StoreConfig) -> StoreResult<Arc<dyn BlockStore>> {
    config.validate().map_err(StoreError::Config)?;

    match config {
        StoreConfig::Memory {
            max_block_list_len,
            max_uncommitted_blocks,
            list_rejection,
        } => {
            let store = MemoryBlockStore::with_limits(backends::memory::MemoryLimits {
                max_block_list_len: *max_block_list_len,
                max_uncommitted_blocks: *max_uncommitted_blocks,
                list_rejection: *list_rejection,
            });
            Ok(Arc::new(store))
        }
        StoreConfig::Azure {
            container_url,
            api_version,
            request_timeout_secs,
        } => {
            let backend = AzureBlobBackend::new(
                container_url,
                api_version.clone(),
                request_timeout_secs.map(Duration::from_secs),
            )?;
            Ok(Arc::new(backend))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blockprobe_core::{BlockId, LimitKind, ObjectName};
    use bytes::Bytes;

    #[tokio::test]
    async fn from_config_memory_ok() {
        let store = from_config(&StoreConfig::default()).unwrap();
        assert_eq!(store.backend_name(), "memory");

        let object = ObjectName::generate("testblob-");
        let id = BlockId::from_label("sameBlockId").unwrap();
        store
            .stage_block(&object, &id, Bytes::from_static(b"hi"))
            .await
            .unwrap();
        assert!(store.exists(&object).await.unwrap());
    }

    #[tokio::test]
    async fn from_config_azure_ok() {
        let config = StoreConfig::Azure {
            container_url: "https://acct.blob.core.windows.net/container?sv=2024&sig=abc"
                .to_string(),
            api_version: None,
            request_timeout_secs: Some(30),
        };

        let store = from_config(&config).unwrap();
        assert_eq!(store.backend_name(), "azure");
    }

    #[tokio::test]
    async fn from_config_rejects_invalid_limits() {
        let config = StoreConfig::Memory {
            max_block_list_len: 0,
            max_uncommitted_blocks: 10,
            list_rejection: LimitKind::CountExceedsLimit,
        };

        match from_config(&config) {
            Ok(_) => panic!("expected error"),
            Err(StoreError::Config(_)) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }
}
