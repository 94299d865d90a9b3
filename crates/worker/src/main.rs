//! sfc-queue entry point.
//!
//! Runs one queue command and exits; schedule `run` and `cleanup` from cron
//! or a systemd timer. Logging goes to stderr so `stats` output on stdout
//! stays machine-readable.

use anyhow::Result;
use clap::Parser;
use sfc_client::{HttpProbe, ProbeConfig, QueueRunner, RunContext};
use sfc_core::{CacheInvalidator, QueueAdmin, QueueStore, SqliteTagCache, WorkerConfig};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

mod cli;

use cli::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let cli = Cli::parse();
    let config = WorkerConfig::load()?;
    let store = QueueStore::open(&config.db_path).await?;
    let admin = QueueAdmin::new(store.clone());

    match cli.command {
        Command::Run { limit } => {
            let released = admin.release_stale(config.stale_claim_age()).await?;
            if released > 0 {
                tracing::warn!(released, "released abandoned claims before run");
            }

            let cache = SqliteTagCache::open(&config.cache_db_path).await?;
            let probe = HttpProbe::new(ProbeConfig::from(&config))?;
            let runner = QueueRunner::new(store, Arc::new(probe), CacheInvalidator::new(Arc::new(cache)));

            let ctx = RunContext::from_config(&config);
            tracing::info!(started_at = %ctx.started_at(), strategy = ?ctx.strategy(), "starting queue run");
            runner.run(&ctx, limit.unwrap_or(config.batch_limit)).await?;
        }
        Command::Cleanup => {
            admin.cleanup().await?;
        }
        Command::Enqueue { url, page_id } => {
            if !admin.enqueue_page(&url, page_id).await? {
                tracing::info!(url = %url, "already pending");
            }
        }
        Command::Stats => {
            let stats = store.stats().await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Command::Release { older_than_secs } => {
            let older_than = older_than_secs.map_or_else(|| config.stale_claim_age(), Duration::from_secs);
            let released = admin.release_stale(older_than).await?;
            tracing::info!(released, "released stale claims");
        }
    }

    Ok(())
}
