use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use super::context::CacheContext;
use super::error::{CacheResult, DeleteError};
use super::types::{
    BlockCacheStatus, BlockId, BlockMetadata, BlockServerHalf, CachedBlock, DeleteStats, TierKind,
    TlfId,
};

#[async_trait]
/// Operations of a single on-disk block cache tier.
///
/// [`TieredBlockCache`](super::TieredBlockCache) implements this same trait, so
/// callers cannot tell one tier from two.
pub trait BlockCache: Send + Sync {
    /// Returns the block, its server half and whether a prefetch was triggered.
    async fn get(
        &self,
        ctx: &CacheContext,
        tlf_id: TlfId,
        block_id: BlockId,
    ) -> CacheResult<CachedBlock>;

    /// Returns prefetch metadata without reading the payload.
    async fn get_metadata(&self, ctx: &CacheContext, block_id: BlockId)
    -> CacheResult<BlockMetadata>;

    async fn put(
        &self,
        ctx: &CacheContext,
        tlf_id: TlfId,
        block_id: BlockId,
        buf: &[u8],
        server_half: BlockServerHalf,
    ) -> CacheResult<()>;

    /// Removes the listed blocks. Ids that are not cached are skipped.
    async fn delete(
        &self,
        ctx: &CacheContext,
        block_ids: &[BlockId],
    ) -> Result<DeleteStats, DeleteError>;

    async fn update_metadata(
        &self,
        ctx: &CacheContext,
        block_id: BlockId,
        metadata: BlockMetadata,
    ) -> CacheResult<()>;

    /// Bytes currently used.
    fn size(&self) -> u64;

    /// Status records keyed by tier status name.
    async fn status(&self, ctx: &CacheContext) -> HashMap<String, BlockCacheStatus>;

    async fn shutdown(&self, ctx: &CacheContext);
}

#[async_trait]
/// Creates the single-tier caches a tiered cache is composed of.
pub trait TierOpener: Send + Sync {
    /// Opens (creating if needed) the tier rooted at `root`.
    async fn open(&self, kind: TierKind, root: &Path) -> CacheResult<Arc<dyn BlockCache>>;
}

/// Answers whether a TLF is configured for background sync.
///
/// The answer may change between calls for the same TLF.
pub trait SyncedTlfs: Send + Sync {
    fn is_synced(&self, tlf_id: &TlfId) -> bool;
}
