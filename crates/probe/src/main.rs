//! blockprobe binary.

use anyhow::{Context, Result};
use blockprobe::{CommitState, Residual, Scenario};
use blockprobe_core::config::{AppConfig, FallbackList, StoreConfig};
use clap::Parser;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Stage many identical blocks against one object and observe how the store
/// handles committing more blocks than it allows.
#[derive(Parser, Debug)]
#[command(name = "blockprobe")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        env = "BLOCKPROBE_CONFIG",
        default_value = "config/probe.toml"
    )]
    config: String,

    /// Number of blocks to stage and commit
    #[arg(long)]
    total_blocks: Option<u64>,

    /// Blocks per batch
    #[arg(long)]
    batch_size: Option<u64>,

    /// Maximum concurrent staging calls
    #[arg(long)]
    concurrency: Option<usize>,

    /// Fallback commit list: full_list or single_block
    #[arg(long)]
    fallback: Option<FallbackList>,
}

impl Args {
    fn apply_overrides(&self, config: &mut AppConfig) {
        if let Some(total_blocks) = self.total_blocks {
            config.probe.total_blocks = total_blocks;
        }
        if let Some(batch_size) = self.batch_size {
            config.probe.batch_size = batch_size;
        }
        if let Some(concurrency) = self.concurrency {
            config.probe.concurrency = concurrency;
        }
        if let Some(fallback) = self.fallback {
            config.probe.fallback = fallback;
        }
    }
}

fn load_config(args: &Args) -> Result<AppConfig> {
    let config_path = std::path::Path::new(&args.config);
    let mut figment = Figment::new();

    if config_path.exists() {
        tracing::info!(config_path = %args.config, "Loading configuration from file");
        figment = figment.merge(Toml::file(&args.config));
    } else {
        tracing::debug!("No config file found at {}", args.config);
    }

    let mut config: AppConfig = figment
        .merge(Env::prefixed("BLOCKPROBE_").split("__"))
        .extract()
        .context("failed to load configuration")?;
    args.apply_overrides(&mut config);
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("blockprobe v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&args)?;
    let warnings = config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;
    for warning in &warnings {
        tracing::warn!("{warning}");
    }
    if matches!(config.store, StoreConfig::Memory { .. }) {
        tracing::warn!("Using the in-memory store emulator; configure [store] type = \"azure\" to probe a real store");
    }

    let store = blockprobe_storage::from_config(&config.store)
        .context("failed to initialize block store")?;
    store
        .health_check()
        .await
        .context("block store health check failed")?;

    let report = Scenario::new(store, config.probe.clone())
        .context("failed to prepare scenario")?
        .run()
        .await
        .context("scenario aborted")?;

    tracing::info!(
        object = %report.object,
        batches = report.staging.batches,
        staged = report.staging.staged,
        commit = report.commit.name(),
        "Scenario finished"
    );
    match &report.commit {
        CommitState::CommittedFullList => {
            tracing::warn!(
                blocks = config.probe.total_blocks,
                "Full block list was committed; no over-limit rejection observed"
            );
        }
        CommitState::FallbackAttempted {
            initial, outcome, ..
        } => {
            tracing::info!(
                initial = %initial,
                fallback = ?outcome,
                matched_expectation = ?report.commit.fallback_matched_expectation(),
                "Over-limit rejection observed"
            );
        }
        _ => {}
    }
    if let Some(cleanup) = &report.cleanup {
        match cleanup.residual {
            Residual::FullyDeleted => tracing::info!(
                attempts = cleanup.deletion_attempts,
                strict_delete = ?cleanup.strict_delete,
                "Cleanup left no residual state"
            ),
            Residual::StillPresent => tracing::warn!(
                attempts = cleanup.deletion_attempts,
                strict_delete = ?cleanup.strict_delete,
                "Residual state remains in the store"
            ),
        }
    }

    Ok(())
}
