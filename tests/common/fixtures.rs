//! Disk-backed tiered cache fixtures.

use std::sync::Arc;
use std::time::Duration;

use blockcache::cache::{BlockId, BlockServerHalf, SyncedTlfSet, TieredBlockCache, TlfId};
use blockcache::storage::DiskTierOpener;
use tempfile::TempDir;

pub const SYNCED_TLF_NAME: &str = "/keybase/private/alice";
pub const PLAIN_TLF_NAME: &str = "/keybase/public/bob";

const POLL_INTERVAL_MS: u64 = 10;
const POLL_ATTEMPTS: usize = 300;

pub fn synced_tlf() -> TlfId {
    TlfId::from_name(SYNCED_TLF_NAME)
}

pub fn plain_tlf() -> TlfId {
    TlfId::from_name(PLAIN_TLF_NAME)
}

/// A block id and key half derived from `payload`.
pub fn block(payload: &[u8]) -> (BlockId, BlockServerHalf) {
    let key = blake3::derive_key("blockcache test server half", payload);
    (
        BlockId::from_content(payload),
        BlockServerHalf::from_bytes(key),
    )
}

/// Tiered cache over real disk tiers in a temp directory.
pub struct DiskHarness {
    pub cache: TieredBlockCache,
    pub synced: Arc<SyncedTlfSet>,
    _dir: TempDir,
}

impl DiskHarness {
    pub async fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let synced = Arc::new(SyncedTlfSet::from_names([SYNCED_TLF_NAME]));
        let cache = TieredBlockCache::open(Arc::new(DiskTierOpener), synced.clone(), dir.path())
            .await
            .expect("Failed to open tiered cache");
        Self {
            cache,
            synced,
            _dir: dir,
        }
    }

    pub async fn with_sync_tier() -> Self {
        let harness = Self::new().await;
        harness
            .cache
            .enable_sync_tier()
            .await
            .expect("Failed to enable sync tier");
        harness
    }

    pub fn root(&self) -> &std::path::Path {
        self._dir.path()
    }
}

/// Polls `cond` until it holds, for background work such as stale-copy cleanup.
pub async fn eventually<F, Fut>(mut cond: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..POLL_ATTEMPTS {
        if cond().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
    }
    panic!("condition not reached in time");
}
