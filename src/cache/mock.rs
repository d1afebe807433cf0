//! In-memory block cache tier + opener for tests.

use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::backend::{BlockCache, TierOpener};
use super::context::CacheContext;
use super::error::{CacheError, CacheResult, DeleteError};
use super::types::{
    BlockCacheStatus, BlockId, BlockMetadata, BlockServerHalf, CachedBlock, DeleteStats,
    StartState, TierKind, TlfId,
};

/// Operations of [`MemoryBlockCache`] that can be counted and failed on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOp {
    Get,
    GetMetadata,
    Put,
    Delete,
    UpdateMetadata,
}

#[derive(Debug, Clone)]
struct MemoryEntry {
    tlf_id: TlfId,
    buf: Vec<u8>,
    server_half: BlockServerHalf,
    metadata: BlockMetadata,
}

#[derive(Debug, Default)]
struct MemoryState {
    blocks: HashMap<BlockId, MemoryEntry>,
    faults: HashMap<MockOp, io::ErrorKind>,
    calls: HashMap<MockOp, usize>,
    status: BlockCacheStatus,
}

/// Single tier kept in a `HashMap`, with fault injection and call counters.
#[derive(Debug)]
pub struct MemoryBlockCache {
    kind: TierKind,
    state: Mutex<MemoryState>,
    shut_down: AtomicBool,
    shutdown_log: Option<ShutdownLog>,
}

type ShutdownLog = Arc<Mutex<Vec<TierKind>>>;

impl MemoryBlockCache {
    pub fn new(kind: TierKind) -> Self {
        Self {
            kind,
            state: Mutex::new(MemoryState::default()),
            shut_down: AtomicBool::new(false),
            shutdown_log: None,
        }
    }

    /// Appends this tier's kind to `log` when it is shut down.
    fn with_shutdown_log(kind: TierKind, log: ShutdownLog) -> Self {
        Self {
            shutdown_log: Some(log),
            ..Self::new(kind)
        }
    }

    /// Makes every subsequent `op` fail with an I/O error of `kind`.
    pub fn fail(&self, op: MockOp, kind: io::ErrorKind) {
        self.state.lock().faults.insert(op, kind);
    }

    pub fn clear_faults(&self) {
        self.state.lock().faults.clear();
    }

    /// Number of times `op` was invoked (including failed calls).
    pub fn calls(&self, op: MockOp) -> usize {
        self.state.lock().calls.get(&op).copied().unwrap_or(0)
    }

    /// Stores a block directly, bypassing counters and faults.
    pub fn insert(
        &self,
        tlf_id: TlfId,
        block_id: BlockId,
        buf: &[u8],
        server_half: BlockServerHalf,
    ) {
        self.state.lock().blocks.insert(
            block_id,
            MemoryEntry {
                tlf_id,
                buf: buf.to_vec(),
                server_half,
                metadata: BlockMetadata::default(),
            },
        );
    }

    pub fn contains(&self, block_id: &BlockId) -> bool {
        self.state.lock().blocks.contains_key(block_id)
    }

    /// TLF the block was stored under, if present.
    pub fn tlf_of(&self, block_id: &BlockId) -> Option<TlfId> {
        self.state.lock().blocks.get(block_id).map(|e| e.tlf_id)
    }

    pub fn len(&self) -> usize {
        self.state.lock().blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().blocks.is_empty()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    fn enter(&self, ctx: &CacheContext, op: MockOp) -> CacheResult<()> {
        let mut state = self.state.lock();
        *state.calls.entry(op).or_insert(0) += 1;
        drop(state);

        ctx.check()?;
        if self.is_shut_down() {
            return Err(CacheError::Shutdown);
        }
        if let Some(kind) = self.state.lock().faults.get(&op) {
            return Err(CacheError::Io(io::Error::from(*kind)));
        }
        Ok(())
    }
}

#[async_trait]
impl BlockCache for MemoryBlockCache {
    async fn get(
        &self,
        ctx: &CacheContext,
        _tlf_id: TlfId,
        block_id: BlockId,
    ) -> CacheResult<CachedBlock> {
        self.enter(ctx, MockOp::Get)?;
        let mut state = self.state.lock();
        let entry = state.blocks.get(&block_id).cloned();
        match entry {
            Some(entry) => {
                state.status.hits += 1;
                Ok(CachedBlock {
                    buf: entry.buf,
                    server_half: entry.server_half,
                    has_prefetched: entry.metadata.triggered_prefetch,
                })
            }
            None => {
                state.status.misses += 1;
                Err(CacheError::NoSuchBlock { block_id })
            }
        }
    }

    async fn get_metadata(
        &self,
        ctx: &CacheContext,
        block_id: BlockId,
    ) -> CacheResult<BlockMetadata> {
        self.enter(ctx, MockOp::GetMetadata)?;
        self.state
            .lock()
            .blocks
            .get(&block_id)
            .map(|entry| entry.metadata)
            .ok_or(CacheError::NoSuchBlock { block_id })
    }

    async fn put(
        &self,
        ctx: &CacheContext,
        tlf_id: TlfId,
        block_id: BlockId,
        buf: &[u8],
        server_half: BlockServerHalf,
    ) -> CacheResult<()> {
        self.enter(ctx, MockOp::Put)?;
        let mut state = self.state.lock();
        let metadata = state
            .blocks
            .get(&block_id)
            .map(|entry| entry.metadata)
            .unwrap_or_default();
        state.blocks.insert(
            block_id,
            MemoryEntry {
                tlf_id,
                buf: buf.to_vec(),
                server_half,
                metadata,
            },
        );
        state.status.puts += 1;
        Ok(())
    }

    async fn delete(
        &self,
        ctx: &CacheContext,
        block_ids: &[BlockId],
    ) -> Result<DeleteStats, DeleteError> {
        self.enter(ctx, MockOp::Delete)?;
        let mut state = self.state.lock();
        let mut stats = DeleteStats::default();
        for block_id in block_ids {
            if let Some(entry) = state.blocks.remove(block_id) {
                stats += DeleteStats::new(1, entry.buf.len() as u64);
            }
        }
        state.status.num_deleted += stats.removed as u64;
        state.status.size_deleted += stats.bytes_removed;
        Ok(stats)
    }

    async fn update_metadata(
        &self,
        ctx: &CacheContext,
        block_id: BlockId,
        metadata: BlockMetadata,
    ) -> CacheResult<()> {
        self.enter(ctx, MockOp::UpdateMetadata)?;
        let mut state = self.state.lock();
        let entry = state
            .blocks
            .get_mut(&block_id)
            .ok_or(CacheError::NoSuchBlock { block_id })?;
        entry.metadata = metadata;
        state.status.metadata_updates += 1;
        Ok(())
    }

    fn size(&self) -> u64 {
        self.state
            .lock()
            .blocks
            .values()
            .map(|entry| entry.buf.len() as u64)
            .sum()
    }

    async fn status(&self, _ctx: &CacheContext) -> HashMap<String, BlockCacheStatus> {
        let state = self.state.lock();
        let status = BlockCacheStatus {
            start_state: if self.is_shut_down() {
                StartState::Shutdown
            } else {
                StartState::Started
            },
            num_blocks: state.blocks.len() as u64,
            block_bytes: state.blocks.values().map(|e| e.buf.len() as u64).sum(),
            ..state.status.clone()
        };
        HashMap::from([(self.kind.status_name().to_string(), status)])
    }

    async fn shutdown(&self, _ctx: &CacheContext) {
        self.shut_down.store(true, Ordering::Release);
        if let Some(log) = &self.shutdown_log {
            log.lock().push(self.kind);
        }
    }
}

/// [`TierOpener`] handing out shared [`MemoryBlockCache`] instances.
///
/// Tests keep the `Arc`s from [`MockTierOpener::tier`] to inspect a tier
/// directly while the tiered cache routes through it.
#[derive(Debug)]
pub struct MockTierOpener {
    working_set: Arc<MemoryBlockCache>,
    sync: Arc<MemoryBlockCache>,
    failing: Mutex<HashSet<TierKind>>,
    opened: Mutex<Vec<(TierKind, PathBuf)>>,
    shutdowns: ShutdownLog,
    open_delay: Option<Duration>,
}

impl Default for MockTierOpener {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTierOpener {
    pub fn new() -> Self {
        let shutdowns = ShutdownLog::default();
        Self {
            working_set: Arc::new(MemoryBlockCache::with_shutdown_log(
                TierKind::WorkingSet,
                Arc::clone(&shutdowns),
            )),
            sync: Arc::new(MemoryBlockCache::with_shutdown_log(
                TierKind::Sync,
                Arc::clone(&shutdowns),
            )),
            failing: Mutex::new(HashSet::new()),
            opened: Mutex::new(Vec::new()),
            shutdowns,
            open_delay: None,
        }
    }

    /// Sleeps inside every `open`, widening races between concurrent openers.
    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = Some(delay);
        self
    }

    pub fn tier(&self, kind: TierKind) -> Arc<MemoryBlockCache> {
        match kind {
            TierKind::WorkingSet => Arc::clone(&self.working_set),
            TierKind::Sync => Arc::clone(&self.sync),
        }
    }

    pub fn set_fail_open(&self, kind: TierKind, fail: bool) {
        let mut failing = self.failing.lock();
        if fail {
            failing.insert(kind);
        } else {
            failing.remove(&kind);
        }
    }

    /// Every successful and failed `open` call, in order.
    pub fn opened(&self) -> Vec<(TierKind, PathBuf)> {
        self.opened.lock().clone()
    }

    pub fn open_count(&self, kind: TierKind) -> usize {
        self.opened.lock().iter().filter(|(k, _)| *k == kind).count()
    }

    /// Tiers in the order they were shut down.
    pub fn shutdown_order(&self) -> Vec<TierKind> {
        self.shutdowns.lock().clone()
    }
}

#[async_trait]
impl TierOpener for MockTierOpener {
    async fn open(&self, kind: TierKind, root: &Path) -> CacheResult<Arc<dyn BlockCache>> {
        self.opened.lock().push((kind, root.to_path_buf()));
        if let Some(delay) = self.open_delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.lock().contains(&kind) {
            return Err(CacheError::Init {
                path: root.to_path_buf(),
                reason: "injected open failure".to_string(),
            });
        }
        Ok(self.tier(kind))
    }
}
