//! Core domain types for the uncommitted block probe.
//!
//! This crate defines the data model shared by the storage backends and the
//! staging pipeline:
//! - Block identifiers and payload templates
//! - Commit requests (ordered block lists)
//! - Object names and lifecycle states
//! - Run configuration

pub mod block;
pub mod config;
pub mod error;
pub mod object;

pub use block::{BlockId, BlockPayload, CommitRequest, LimitKind};
pub use config::{AppConfig, FallbackList, ProbeConfig, StoreConfig};
pub use error::{Error, Result};
pub use object::{ObjectName, ObjectState};

/// Maximum number of entries a single commit may reference.
pub const MAX_BLOCK_LIST_LEN: usize = 50_000;

/// Maximum number of distinct uncommitted blocks an object may hold.
pub const MAX_UNCOMMITTED_BLOCKS: usize = 100_000;

/// Maximum length of a block id label before base64 encoding.
pub const MAX_BLOCK_ID_LEN: usize = 64;

/// Maximum size of a single staged block: 4000 MiB.
pub const MAX_BLOCK_SIZE: usize = 4000 * 1024 * 1024;
