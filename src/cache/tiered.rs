//! Tiered cache: working-set tier + optional sync tier behind one [`BlockCache`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::join_all;
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument};

use super::backend::{BlockCache, SyncedTlfs, TierOpener};
use super::context::CacheContext;
use super::error::{CacheError, CacheResult, DeleteError};
use super::types::{
    BlockCacheStatus, BlockId, BlockMetadata, BlockServerHalf, CachedBlock, DeleteStats, TierKind,
    TlfId,
};

type Tier = Arc<dyn BlockCache>;

/// Routes block cache operations across a working-set tier and a sync tier.
///
/// Blocks of synced TLFs live in the sync tier once it is enabled; everything
/// else lives in the working-set tier. A `put` moves a block to its
/// authoritative tier and removes the other copy in the background, and
/// lookups fall back to the other tier on a miss to cover that window.
pub struct TieredBlockCache {
    opener: Arc<dyn TierOpener>,
    synced: Arc<dyn SyncedTlfs>,
    storage_root: PathBuf,
    working_set: Tier,
    // Published at most once; readers see either nothing or a fully opened tier.
    sync: OnceCell<Tier>,
}

impl std::fmt::Debug for TieredBlockCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TieredBlockCache")
            .field("storage_root", &self.storage_root)
            .field("sync_enabled", &self.is_sync_tier_enabled())
            .finish_non_exhaustive()
    }
}

impl TieredBlockCache {
    /// Opens the working-set tier under `storage_root`. The sync tier starts disabled.
    #[instrument(skip_all, fields(storage_root = %storage_root.as_ref().display()))]
    pub async fn open(
        opener: Arc<dyn TierOpener>,
        synced: Arc<dyn SyncedTlfs>,
        storage_root: impl AsRef<Path>,
    ) -> CacheResult<Self> {
        let storage_root = storage_root.as_ref().to_path_buf();
        let root = storage_root.join(TierKind::WorkingSet.folder_name());
        let working_set = opener.open(TierKind::WorkingSet, &root).await?;

        info!(root = %root.display(), "Working-set block cache opened");

        Ok(Self {
            opener,
            synced,
            storage_root,
            working_set,
            sync: OnceCell::new(),
        })
    }

    /// Opens the sync tier if it is not open yet.
    ///
    /// Concurrent callers share one open attempt. On failure the tier stays
    /// disabled and a later call may retry.
    pub async fn enable_sync_tier(&self) -> CacheResult<()> {
        self.sync
            .get_or_try_init(|| async {
                let root = self.storage_root.join(TierKind::Sync.folder_name());
                let tier = self.opener.open(TierKind::Sync, &root).await?;
                info!(root = %root.display(), "Sync block cache enabled");
                Ok::<_, CacheError>(tier)
            })
            .await?;
        Ok(())
    }

    pub fn is_sync_tier_enabled(&self) -> bool {
        self.sync.initialized()
    }

    /// Direct access to one tier, bypassing routing.
    pub fn tier(&self, kind: TierKind) -> Option<&Tier> {
        match kind {
            TierKind::WorkingSet => Some(&self.working_set),
            TierKind::Sync => self.sync.get(),
        }
    }

    /// Enabled tiers in [`TierKind::ALL`] order.
    pub fn tiers(&self) -> impl Iterator<Item = (TierKind, &Tier)> {
        TierKind::ALL
            .into_iter()
            .filter_map(|kind| self.tier(kind).map(|tier| (kind, tier)))
    }

    /// Picks the tier that owns blocks of `tlf_id` and the one to fall back on.
    fn route(&self, tlf_id: &TlfId) -> ((TierKind, &Tier), Option<(TierKind, &Tier)>) {
        let working_set = (TierKind::WorkingSet, &self.working_set);
        let sync = self.sync.get().map(|tier| (TierKind::Sync, tier));
        match sync {
            Some(sync) if self.synced.is_synced(tlf_id) => (sync, Some(working_set)),
            _ => (working_set, sync),
        }
    }

    /// Removes `block_id` from `tier` in the background. The outcome is only logged.
    fn spawn_cleanup(&self, ctx: &CacheContext, kind: TierKind, tier: &Tier, block_id: BlockId) {
        let tier = Arc::clone(tier);
        let ctx = ctx.detached();
        tokio::spawn(async move {
            match tier.delete(&ctx, &[block_id]).await {
                Ok(stats) => debug!(
                    tier = %kind,
                    block_id = %block_id,
                    removed = stats.removed,
                    "Stale block copy cleaned up"
                ),
                Err(e) => debug!(
                    tier = %kind,
                    block_id = %block_id,
                    error = %e,
                    "Stale block cleanup failed; error discarded"
                ),
            }
        });
    }
}

#[async_trait]
impl BlockCache for TieredBlockCache {
    #[instrument(skip(self, ctx), fields(tlf_id = %tlf_id, block_id = %block_id))]
    async fn get(
        &self,
        ctx: &CacheContext,
        tlf_id: TlfId,
        block_id: BlockId,
    ) -> CacheResult<CachedBlock> {
        let ((primary_kind, primary), secondary) = self.route(&tlf_id);

        match primary.get(ctx, tlf_id, block_id).await {
            Err(e) if e.is_not_found() => match secondary {
                Some((secondary_kind, secondary)) => {
                    debug!(
                        primary = %primary_kind,
                        secondary = %secondary_kind,
                        "Primary tier miss, checking secondary tier"
                    );
                    secondary.get(ctx, tlf_id, block_id).await
                }
                None => Err(e),
            },
            result => result,
        }
    }

    #[instrument(skip(self, ctx), fields(block_id = %block_id))]
    async fn get_metadata(
        &self,
        ctx: &CacheContext,
        block_id: BlockId,
    ) -> CacheResult<BlockMetadata> {
        // Sync tier first whenever it exists, regardless of the block's TLF.
        if let Some(sync) = self.sync.get() {
            match sync.get_metadata(ctx, block_id).await {
                Err(e) if e.is_not_found() => {
                    debug!("Metadata not in sync tier, checking working set");
                }
                result => return result,
            }
        }
        self.working_set.get_metadata(ctx, block_id).await
    }

    #[instrument(
        skip(self, ctx, buf, server_half),
        fields(tlf_id = %tlf_id, block_id = %block_id, len = buf.len())
    )]
    async fn put(
        &self,
        ctx: &CacheContext,
        tlf_id: TlfId,
        block_id: BlockId,
        buf: &[u8],
        server_half: BlockServerHalf,
    ) -> CacheResult<()> {
        let ((target_kind, target), other) = self.route(&tlf_id);

        target
            .put(ctx, tlf_id, block_id, buf, server_half)
            .await?;
        debug!(tier = %target_kind, "Block stored");

        // Only after the write landed, so the block is never missing from both tiers.
        if let Some((other_kind, other)) = other {
            self.spawn_cleanup(ctx, other_kind, other, block_id);
        }
        Ok(())
    }

    #[instrument(skip(self, ctx, block_ids), fields(count = block_ids.len()))]
    async fn delete(
        &self,
        ctx: &CacheContext,
        block_ids: &[BlockId],
    ) -> Result<DeleteStats, DeleteError> {
        let working_set = self.working_set.delete(ctx, block_ids).await?;

        let Some(sync) = self.sync.get() else {
            return Ok(working_set);
        };

        match sync.delete(ctx, block_ids).await {
            Ok(synced) => Ok(working_set + synced),
            Err(e) => Err(DeleteError::new(working_set + e.completed, e.source)),
        }
    }

    #[instrument(skip(self, ctx), fields(block_id = %block_id))]
    async fn update_metadata(
        &self,
        ctx: &CacheContext,
        block_id: BlockId,
        metadata: BlockMetadata,
    ) -> CacheResult<()> {
        if let Some(sync) = self.sync.get() {
            match sync.update_metadata(ctx, block_id, metadata).await {
                Err(e) if e.is_not_found() => {
                    debug!("Block not in sync tier, updating working set");
                }
                result => return result,
            }
        }
        self.working_set
            .update_metadata(ctx, block_id, metadata)
            .await
    }

    fn size(&self) -> u64 {
        self.tiers().map(|(_, tier)| tier.size()).sum()
    }

    async fn status(&self, ctx: &CacheContext) -> HashMap<String, BlockCacheStatus> {
        let per_tier = join_all(self.tiers().map(|(_, tier)| tier.status(ctx))).await;
        per_tier.into_iter().flatten().collect()
    }

    async fn shutdown(&self, ctx: &CacheContext) {
        for (kind, tier) in self.tiers() {
            tier.shutdown(ctx).await;
            info!(tier = %kind, "Block cache tier shut down");
        }
    }
}
