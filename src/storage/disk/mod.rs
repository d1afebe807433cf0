//! Disk-backed single-tier block cache (file-per-block layout).
//!
//! Layout under the tier root:
//!
//! ```text
//! blocks/<first two hex chars>/<block id hex>.rkyv
//! ```
//!
//! Writes go through a temp file + fsync + rename, so a crash leaves either the
//! old entry, the new entry, or a stray `.rkyv.tmp` that the next open removes.


use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use rkyv::rancor::Error as RkyvError;
use rkyv::util::AlignedVec;
use rkyv::{from_bytes, to_bytes};
use tracing::{debug, info, warn};

use crate::cache::{
    BlockCache, BlockCacheStatus, BlockId, BlockMetadata, BlockServerHalf, CacheContext,
    CacheError, CacheResult, CachedBlock, DeleteError, DeleteStats, StartState, TierKind,
    TierOpener, TlfId,
};
use crate::constants::{BLOCKS_DIR_NAME, ENTRY_EXTENSION, SHARD_PREFIX_LEN, TEMP_ENTRY_EXTENSION};
use crate::storage::BlockEntry;

#[derive(Debug, Clone, Copy)]
struct IndexedBlock {
    bytes: u64,
    metadata: BlockMetadata,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    puts: AtomicU64,
    metadata_updates: AtomicU64,
    num_deleted: AtomicU64,
    size_deleted: AtomicU64,
}

impl Counters {
    #[inline]
    fn bump(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }
}

/// One cache tier stored as individual entry files under a root directory.
///
/// The in-memory index is rebuilt from disk on [`DiskBlockCache::open`], so
/// metadata lookups and size accounting never touch the filesystem.
pub struct DiskBlockCache {
    kind: TierKind,
    root: PathBuf,
    blocks_dir: PathBuf,
    index: RwLock<HashMap<BlockId, IndexedBlock>>,
    // Serializes put/delete/update so the index and files move together.
    write_lock: tokio::sync::Mutex<()>,
    counters: Counters,
    shut_down: AtomicBool,
}

impl std::fmt::Debug for DiskBlockCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskBlockCache")
            .field("kind", &self.kind)
            .field("root", &self.root)
            .field("blocks", &self.len())
            .finish_non_exhaustive()
    }
}

impl DiskBlockCache {
    /// Opens (creating if needed) the tier rooted at `root` and indexes its entries.
    ///
    /// Blocking; run it on a blocking thread from async code.
    pub fn open(kind: TierKind, root: impl Into<PathBuf>) -> CacheResult<Self> {
        let root = root.into();
        let blocks_dir = root.join(BLOCKS_DIR_NAME);

        let init_err = |e: io::Error| CacheError::Init {
            path: root.clone(),
            reason: e.to_string(),
        };
        fs::create_dir_all(&blocks_dir).map_err(init_err)?;
        let index = scan_blocks(&blocks_dir).map_err(init_err)?;

        info!(
            tier = %kind,
            root = %root.display(),
            blocks = index.len(),
            "Disk block cache opened"
        );

        Ok(Self {
            kind,
            root,
            blocks_dir,
            index: RwLock::new(index),
            write_lock: tokio::sync::Mutex::new(()),
            counters: Counters::default(),
            shut_down: AtomicBool::new(false),
        })
    }

    /// Number of indexed blocks.
    pub fn len(&self) -> usize {
        self.index.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.read().is_empty()
    }

    pub fn contains(&self, block_id: &BlockId) -> bool {
        self.index.read().contains_key(block_id)
    }

    /// Path of the entry file for `block_id` (whether or not it exists).
    pub fn entry_path(&self, block_id: &BlockId) -> PathBuf {
        entry_path(&self.blocks_dir, block_id)
    }

    /// Drops the index entry of a block whose file is gone.
    ///
    /// Runs under the write lock and re-checks the file, so an entry a
    /// concurrent `put` just wrote is kept.
    async fn forget_vanished(&self, block_id: &BlockId) {
        let _guard = self.write_lock.lock().await;
        if !self.entry_path(block_id).exists() {
            self.index.write().remove(block_id);
        }
    }

    fn ensure_open(&self, ctx: &CacheContext) -> CacheResult<()> {
        ctx.check()?;
        // Acquire: pairs with the Release store in shutdown().
        if self.shut_down.load(Ordering::Acquire) {
            return Err(CacheError::Shutdown);
        }
        Ok(())
    }
}

#[async_trait]
impl BlockCache for DiskBlockCache {
    async fn get(
        &self,
        ctx: &CacheContext,
        _tlf_id: TlfId,
        block_id: BlockId,
    ) -> CacheResult<CachedBlock> {
        self.ensure_open(ctx)?;

        if !self.contains(&block_id) {
            Counters::bump(&self.counters.misses, 1);
            return Err(CacheError::NoSuchBlock { block_id });
        }

        let path = self.entry_path(&block_id);
        match ctx.run(blocking(move || read_entry(&path))).await {
            Ok(entry) => {
                Counters::bump(&self.counters.hits, 1);
                Ok(CachedBlock {
                    server_half: entry.server_half(),
                    has_prefetched: entry.triggered_prefetch,
                    buf: entry.buf,
                })
            }
            Err(e) if is_missing_file(&e) => {
                warn!(tier = %self.kind, block_id = %block_id, "Indexed block file vanished");
                self.forget_vanished(&block_id).await;
                Counters::bump(&self.counters.misses, 1);
                Err(CacheError::NoSuchBlock { block_id })
            }
            Err(e) => Err(e),
        }
    }

    async fn get_metadata(
        &self,
        ctx: &CacheContext,
        block_id: BlockId,
    ) -> CacheResult<BlockMetadata> {
        self.ensure_open(ctx)?;
        self.index
            .read()
            .get(&block_id)
            .map(|indexed| indexed.metadata)
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
        let _guard = self.write_lock.lock().await;
        self.ensure_open(ctx)?;

        // Re-putting a block keeps its prefetch state.
        let metadata = self
            .index
            .read()
            .get(&block_id)
            .map(|indexed| indexed.metadata)
            .unwrap_or_default();

        let entry = BlockEntry::new(tlf_id, block_id, buf, server_half, metadata);
        let blocks_dir = self.blocks_dir.clone();
        // Past ensure_open the write runs to completion so the index matches disk.
        let bytes = blocking(move || write_entry(&blocks_dir, &entry)).await?;

        self.index
            .write()
            .insert(block_id, IndexedBlock { bytes, metadata });
        Counters::bump(&self.counters.puts, 1);
        debug!(tier = %self.kind, block_id = %block_id, bytes, "Block written");
        Ok(())
    }

    async fn delete(
        &self,
        ctx: &CacheContext,
        block_ids: &[BlockId],
    ) -> Result<DeleteStats, DeleteError> {
        let _guard = self.write_lock.lock().await;
        self.ensure_open(ctx)?;

        let mut stats = DeleteStats::default();
        for block_id in block_ids {
            let indexed = self.index.read().get(block_id).copied();
            let Some(indexed) = indexed else {
                continue;
            };

            // Checked between files only; a started removal is always indexed.
            if let Err(source) = ctx.check() {
                return Err(DeleteError::new(stats, source));
            }

            let path = self.entry_path(block_id);
            let removed = blocking(move || match fs::remove_file(&path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e.into()),
            })
            .await;
            if let Err(source) = removed {
                return Err(DeleteError::new(stats, source));
            }

            self.index.write().remove(block_id);
            Counters::bump(&self.counters.num_deleted, 1);
            Counters::bump(&self.counters.size_deleted, indexed.bytes);
            stats += DeleteStats::new(1, indexed.bytes);
        }

        Ok(stats)
    }

    async fn update_metadata(
        &self,
        ctx: &CacheContext,
        block_id: BlockId,
        metadata: BlockMetadata,
    ) -> CacheResult<()> {
        let _guard = self.write_lock.lock().await;
        self.ensure_open(ctx)?;

        if !self.contains(&block_id) {
            return Err(CacheError::NoSuchBlock { block_id });
        }

        let blocks_dir = self.blocks_dir.clone();
        let bytes = blocking(move || {
            let mut entry = read_entry(&entry_path(&blocks_dir, &block_id)).map_err(|e| {
                if is_missing_file(&e) {
                    CacheError::NoSuchBlock { block_id }
                } else {
                    e
                }
            })?;
            entry.set_metadata(metadata);
            write_entry(&blocks_dir, &entry)
        })
        .await?;

        self.index
            .write()
            .insert(block_id, IndexedBlock { bytes, metadata });
        Counters::bump(&self.counters.metadata_updates, 1);
        Ok(())
    }

    fn size(&self) -> u64 {
        self.index.read().values().map(|indexed| indexed.bytes).sum()
    }

    async fn status(&self, _ctx: &CacheContext) -> HashMap<String, BlockCacheStatus> {
        let (num_blocks, block_bytes) = {
            let index = self.index.read();
            let bytes = index.values().map(|indexed| indexed.bytes).sum();
            (index.len() as u64, bytes)
        };
        let start_state = if self.shut_down.load(Ordering::Acquire) {
            StartState::Shutdown
        } else {
            StartState::Started
        };

        let status = BlockCacheStatus {
            start_state,
            num_blocks,
            block_bytes,
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            puts: self.counters.puts.load(Ordering::Relaxed),
            metadata_updates: self.counters.metadata_updates.load(Ordering::Relaxed),
            num_deleted: self.counters.num_deleted.load(Ordering::Relaxed),
            size_deleted: self.counters.size_deleted.load(Ordering::Relaxed),
        };
        HashMap::from([(self.kind.status_name().to_string(), status)])
    }

    async fn shutdown(&self, _ctx: &CacheContext) {
        // Wait out in-flight writes so no entry is half-indexed.
        let _guard = self.write_lock.lock().await;
        // Release: publishes the shutdown to ensure_open()/status().
        self.shut_down.store(true, Ordering::Release);
        info!(tier = %self.kind, root = %self.root.display(), "Disk block cache shut down");
    }
}

/// [`TierOpener`] that opens a [`DiskBlockCache`] per tier.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiskTierOpener;

#[async_trait]
impl TierOpener for DiskTierOpener {
    async fn open(&self, kind: TierKind, root: &Path) -> CacheResult<Arc<dyn BlockCache>> {
        let root = root.to_path_buf();
        let cache = blocking(move || DiskBlockCache::open(kind, root)).await?;
        Ok(Arc::new(cache))
    }
}

async fn blocking<T, F>(f: F) -> CacheResult<T>
where
    F: FnOnce() -> CacheResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(CacheError::background_task)?
}

fn is_missing_file(err: &CacheError) -> bool {
    matches!(err, CacheError::Io(e) if e.kind() == io::ErrorKind::NotFound)
}

fn shard_dir(blocks_dir: &Path, block_id: &BlockId) -> PathBuf {
    let hex = block_id.to_hex();
    blocks_dir.join(&hex[..SHARD_PREFIX_LEN])
}

fn entry_path(blocks_dir: &Path, block_id: &BlockId) -> PathBuf {
    shard_dir(blocks_dir, block_id).join(format!("{}.{}", block_id.to_hex(), ENTRY_EXTENSION))
}

fn temp_entry_path(blocks_dir: &Path, block_id: &BlockId) -> PathBuf {
    shard_dir(blocks_dir, block_id).join(format!(
        "{}.{}",
        block_id.to_hex(),
        TEMP_ENTRY_EXTENSION
    ))
}

fn read_entry(path: &Path) -> CacheResult<BlockEntry> {
    let bytes = fs::read(path)?;

    // rkyv validation needs aligned input; a plain Vec<u8> gives no guarantee.
    let mut aligned: AlignedVec = AlignedVec::with_capacity(bytes.len());
    aligned.extend_from_slice(&bytes);

    let entry = from_bytes::<BlockEntry, RkyvError>(&aligned)
        .map_err(|e| CacheError::Serialization(format!("{}: {}", path.display(), e)))?;
    if !entry.verify() {
        return Err(CacheError::Serialization(format!(
            "{}: checksum mismatch",
            path.display()
        )));
    }
    Ok(entry)
}

/// Writes `entry` atomically and returns the on-disk size.
fn write_entry(blocks_dir: &Path, entry: &BlockEntry) -> CacheResult<u64> {
    let block_id = entry.block_id();
    fs::create_dir_all(shard_dir(blocks_dir, &block_id))?;

    let bytes =
        to_bytes::<RkyvError>(entry).map_err(|e| CacheError::Serialization(format!("{:?}", e)))?;

    let temp_path = temp_entry_path(blocks_dir, &block_id);
    let final_path = entry_path(blocks_dir, &block_id);

    {
        let mut file = File::create(&temp_path)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
    }

    fs::rename(&temp_path, &final_path)?;
    Ok(bytes.len() as u64)
}

/// Rebuilds the index from the entry files under `blocks_dir`.
///
/// Stray temp files are removed; unreadable or mislabelled entries are skipped.
fn scan_blocks(blocks_dir: &Path) -> io::Result<HashMap<BlockId, IndexedBlock>> {
    let mut index = HashMap::new();
    let temp_suffix = format!(".{}", TEMP_ENTRY_EXTENSION);

    for shard in fs::read_dir(blocks_dir)? {
        let shard = shard?.path();
        if !shard.is_dir() {
            continue;
        }

        for file in fs::read_dir(&shard)? {
            let path = file?.path();

            if let Some(name) = path.file_name().and_then(|n| n.to_str())
                && name.ends_with(&temp_suffix)
            {
                if let Err(e) = fs::remove_file(&path) {
                    warn!(path = %path.display(), error = %e, "Failed to remove stale temp entry");
                }
                continue;
            }

            let Some(block_id) = path
                .extension()
                .filter(|ext| *ext == ENTRY_EXTENSION)
                .and(path.file_stem())
                .and_then(|stem| stem.to_str())
                .and_then(BlockId::from_hex)
            else {
                continue;
            };

            match read_entry(&path) {
                Ok(entry) if entry.block_id() == block_id => {
                    let bytes = fs::metadata(&path)?.len();
                    index.insert(
                        block_id,
                        IndexedBlock {
                            bytes,
                            metadata: entry.metadata(),
                        },
                    );
                }
                Ok(_) => {
                    warn!(
                        path = %path.display(),
                        "Entry file name does not match its block id, skipping"
                    );
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Unreadable cache entry, skipping");
                }
            }
        }
    }

    Ok(index)
}
