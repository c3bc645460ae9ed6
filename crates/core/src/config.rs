//! Run configuration shared across crates.

use crate::block::{BlockId, LimitKind};
use crate::{MAX_BLOCK_LIST_LEN, MAX_BLOCK_SIZE, MAX_UNCOMMITTED_BLOCKS};
use serde::{Deserialize, Serialize};
use std::fmt;

/// In-flight payload copies above this many bytes draw a warning.
pub const PAYLOAD_MEMORY_WARN_BYTES: usize = 1024 * 1024 * 1024;

/// Which block list the fallback commit resubmits after the first rejection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackList {
    /// Resubmit the full oversized list. Expected to be rejected again.
    #[default]
    FullList,
    /// Submit a one-entry list with the shared identifier. Expected to commit.
    SingleBlock,
}

/// What a fallback choice is expected to produce.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FallbackExpectation {
    /// The store rejects the fallback with an over-limit classification.
    Rejection,
    /// The store commits the fallback list.
    Commit,
}

impl FallbackList {
    /// Expected outcome of the fallback commit under this choice.
    pub fn expectation(self) -> FallbackExpectation {
        match self {
            Self::FullList => FallbackExpectation::Rejection,
            Self::SingleBlock => FallbackExpectation::Commit,
        }
    }
}

impl fmt::Display for FallbackList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FullList => f.write_str("full_list"),
            Self::SingleBlock => f.write_str("single_block"),
        }
    }
}

impl std::str::FromStr for FallbackList {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full_list" | "full" => Ok(Self::FullList),
            "single_block" | "single" => Ok(Self::SingleBlock),
            other => Err(format!(
                "unknown fallback list '{other}' (expected full_list or single_block)"
            )),
        }
    }
}

/// Staging and commit scenario configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Number of blocks to stage and then reference in the commit.
    #[serde(default = "default_total_blocks")]
    pub total_blocks: u64,
    /// Blocks per fan-out/barrier batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,
    /// Maximum simultaneously in-flight staging calls.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Size of each staged block in bytes.
    #[serde(default = "default_block_size")]
    pub block_size: usize,
    /// Label the shared block id is derived from.
    #[serde(default = "default_block_label")]
    pub block_label: String,
    /// Prefix for the generated object name.
    #[serde(default = "default_object_prefix")]
    pub object_prefix: String,
    /// Block list used by the fallback commit.
    #[serde(default)]
    pub fallback: FallbackList,
    /// Log staging progress every N completed blocks.
    #[serde(default = "default_progress_interval")]
    pub progress_interval: u64,
}

fn default_total_blocks() -> u64 {
    101_000
}

fn default_batch_size() -> u64 {
    5000
}

fn default_concurrency() -> usize {
    50
}

fn default_block_size() -> usize {
    1024
}

fn default_block_label() -> String {
    "sameBlockId".to_string()
}

fn default_object_prefix() -> String {
    "testblob-".to_string()
}

fn default_progress_interval() -> u64 {
    1000
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            total_blocks: default_total_blocks(),
            batch_size: default_batch_size(),
            concurrency: default_concurrency(),
            block_size: default_block_size(),
            block_label: default_block_label(),
            object_prefix: default_object_prefix(),
            fallback: FallbackList::default(),
            progress_interval: default_progress_interval(),
        }
    }
}

impl ProbeConfig {
    /// Validate the scenario settings.
    ///
    /// Returns warnings for settings that run but weaken the scenario, and an
    /// error for settings that cannot run at all.
    pub fn validate(&self) -> Result<Vec<String>, String> {
        let mut warnings = Vec::new();

        if self.total_blocks == 0 {
            return Err("probe.total_blocks must be at least 1".to_string());
        }
        if usize::try_from(self.total_blocks).is_err() {
            return Err(format!(
                "probe.total_blocks {} exceeds platform limits",
                self.total_blocks
            ));
        }
        if self.batch_size == 0 {
            return Err("probe.batch_size must be at least 1".to_string());
        }
        if self.concurrency == 0 {
            return Err("probe.concurrency must be at least 1".to_string());
        }
        if self.block_size == 0 || self.block_size > MAX_BLOCK_SIZE {
            return Err(format!(
                "probe.block_size {} must be between 1 and {MAX_BLOCK_SIZE}",
                self.block_size
            ));
        }
        if self.progress_interval == 0 {
            return Err("probe.progress_interval must be at least 1".to_string());
        }
        BlockId::from_label(&self.block_label)
            .map_err(|e| format!("probe.block_label: {e}"))?;

        if self.concurrency as u64 >= self.batch_size {
            warnings.push(format!(
                "probe.concurrency={} is not below probe.batch_size={}; \
                 the batch barrier will throttle before the limiter does",
                self.concurrency, self.batch_size
            ));
        }
        if self.total_blocks as usize <= MAX_BLOCK_LIST_LEN {
            warnings.push(format!(
                "probe.total_blocks={} does not exceed the per-commit limit of {MAX_BLOCK_LIST_LEN}; \
                 the initial commit is expected to succeed",
                self.total_blocks
            ));
        }
        // Every admitted stager holds its own copy of the payload.
        let in_flight_bytes = self.block_size.saturating_mul(self.concurrency);
        if in_flight_bytes > PAYLOAD_MEMORY_WARN_BYTES {
            warnings.push(format!(
                "probe.block_size={} with probe.concurrency={} keeps up to {} MiB of payload \
                 copies in memory",
                self.block_size,
                self.concurrency,
                in_flight_bytes / (1024 * 1024)
            ));
        }

        Ok(warnings)
    }
}

/// Block store backend configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StoreConfig {
    /// In-process emulator enforcing the store limits.
    Memory {
        /// Longest block list a commit may reference.
        #[serde(default = "default_max_block_list_len")]
        max_block_list_len: usize,
        /// Most distinct uncommitted blocks an object may hold.
        #[serde(default = "default_max_uncommitted_blocks")]
        max_uncommitted_blocks: usize,
        /// Classification reported for an over-long commit.
        #[serde(default)]
        list_rejection: LimitKind,
    },
    /// Azure Blob Storage via a pre-authorized container URL.
    Azure {
        /// Container URL including its SAS query string.
        /// WARNING: the query string is a credential; prefer the
        /// BLOCKPROBE_STORE__CONTAINER_URL env var over config files.
        container_url: String,
        /// Value sent as `x-ms-version`.
        #[serde(default)]
        api_version: Option<String>,
        /// Per-request timeout in seconds (no timeout when unset).
        #[serde(default)]
        request_timeout_secs: Option<u64>,
    },
}

fn default_max_block_list_len() -> usize {
    MAX_BLOCK_LIST_LEN
}

fn default_max_uncommitted_blocks() -> usize {
    MAX_UNCOMMITTED_BLOCKS
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::Memory {
            max_block_list_len: default_max_block_list_len(),
            max_uncommitted_blocks: default_max_uncommitted_blocks(),
            list_rejection: LimitKind::default(),
        }
    }
}

impl StoreConfig {
    /// Validate store configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            StoreConfig::Memory {
                max_block_list_len,
                max_uncommitted_blocks,
                ..
            } => {
                if *max_block_list_len == 0 || *max_uncommitted_blocks == 0 {
                    return Err("memory store limits must be at least 1".to_string());
                }
                Ok(())
            }
            StoreConfig::Azure {
                container_url,
                request_timeout_secs,
                ..
            } => {
                if container_url.trim().is_empty() {
                    return Err("azure store requires container_url".to_string());
                }
                if !(container_url.starts_with("https://") || container_url.starts_with("http://"))
                {
                    return Err("azure container_url must be an http(s) URL".to_string());
                }
                if *request_timeout_secs == Some(0) {
                    return Err("azure request_timeout_secs cannot be 0".to_string());
                }
                Ok(())
            }
        }
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Scenario configuration.
    #[serde(default)]
    pub probe: ProbeConfig,
    /// Store backend configuration.
    #[serde(default)]
    pub store: StoreConfig,
}

impl AppConfig {
    /// Validate all sections, returning accumulated warnings.
    pub fn validate(&self) -> Result<Vec<String>, String> {
        self.store.validate()?;
        self.probe.validate()
    }
}
