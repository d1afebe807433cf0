//! Block cache entrypoint: opens both tiers, reports status, shuts down.

use std::sync::Arc;

use mimalloc::MiMalloc;

use blockcache::cache::{BlockCache, StartState, SyncedTlfSet, TieredBlockCache};
use blockcache::config::Config;
use blockcache::storage::DiskTierOpener;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let health_check = std::env::args().any(|arg| arg == "--health-check");

    let config = Config::from_env()?;
    config.validate()?;

    tracing::info!(
        storage_root = %config.storage_root.display(),
        enable_sync_tier = config.enable_sync_tier,
        synced_tlfs = config.synced_tlfs.len(),
        "Block cache starting"
    );

    let synced = Arc::new(SyncedTlfSet::from_names(&config.synced_tlfs));
    let cache =
        TieredBlockCache::open(Arc::new(DiskTierOpener), synced, &config.storage_root).await?;

    if config.enable_sync_tier {
        cache.enable_sync_tier().await?;
    }

    let statuses = cache.status(&config.context()).await;

    let exit_code = if health_check {
        let healthy = !statuses.is_empty()
            && statuses
                .values()
                .all(|status| status.start_state == StartState::Started);
        if healthy { 0 } else { 1 }
    } else {
        println!("{}", serde_json::to_string_pretty(&statuses)?);
        0
    };

    cache.shutdown(&config.context()).await;
    tracing::info!(size = cache.size(), "Block cache shutdown complete");

    if exit_code != 0 {
        std::process::exit(exit_code);
    }
    Ok(())
}
