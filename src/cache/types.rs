use std::fmt;
use std::ops::{Add, AddAssign};

use serde::Serialize;

use crate::constants::{
    BLOCK_ID_LEN, SERVER_HALF_LEN, SYNC_CACHE_FOLDER_NAME, SYNC_STATUS_NAME,
    WORKING_SET_CACHE_FOLDER_NAME, WORKING_SET_STATUS_NAME,
};
use crate::hashing::{hash_block, hash_tlf_name};

/// Content-addressed identity of an immutable block.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId([u8; BLOCK_ID_LEN]);

impl BlockId {
    #[inline]
    pub const fn from_bytes(bytes: [u8; BLOCK_ID_LEN]) -> Self {
        Self(bytes)
    }

    /// Derives the id of a block from its payload.
    #[inline]
    pub fn from_content(buf: &[u8]) -> Self {
        Self(hash_block(buf))
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8; BLOCK_ID_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        blake3::Hash::from(self.0).to_hex().to_string()
    }

    /// Parses a 64-character hex string. Returns `None` on any malformed input.
    pub fn from_hex(hex: &str) -> Option<Self> {
        blake3::Hash::from_hex(hex)
            .ok()
            .map(|hash| Self(*hash.as_bytes()))
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockId({})", self.to_hex())
    }
}

/// Identifier of a top-level folder (the namespace a block belongs to).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TlfId(u64);

impl TlfId {
    #[inline]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Derives a TLF id from its canonical name (e.g. `/keybase/private/alice`).
    #[inline]
    pub fn from_name(name: &str) -> Self {
        Self(hash_tlf_name(name))
    }

    #[inline]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TlfId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Server-side half of a block's crypt key. Opaque to the cache.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockServerHalf([u8; SERVER_HALF_LEN]);

impl BlockServerHalf {
    #[inline]
    pub const fn from_bytes(bytes: [u8; SERVER_HALF_LEN]) -> Self {
        Self(bytes)
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8; SERVER_HALF_LEN] {
        &self.0
    }
}

// Key material never goes to logs.
impl fmt::Debug for BlockServerHalf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BlockServerHalf(..)")
    }
}

/// Prefetch bookkeeping stored next to each block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BlockMetadata {
    /// A prefetch of this block's children has been triggered.
    pub triggered_prefetch: bool,
    /// That prefetch has completed.
    pub finished_prefetch: bool,
}

impl BlockMetadata {
    pub const fn new(triggered_prefetch: bool, finished_prefetch: bool) -> Self {
        Self {
            triggered_prefetch,
            finished_prefetch,
        }
    }
}

/// A block as returned by a cache lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedBlock {
    pub buf: Vec<u8>,
    pub server_half: BlockServerHalf,
    /// Mirrors [`BlockMetadata::triggered_prefetch`] at read time.
    pub has_prefetched: bool,
}

/// Blocks and bytes removed by a delete.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteStats {
    pub removed: usize,
    pub bytes_removed: u64,
}

impl DeleteStats {
    pub const fn new(removed: usize, bytes_removed: u64) -> Self {
        Self {
            removed,
            bytes_removed,
        }
    }
}

impl Add for DeleteStats {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            removed: self.removed + rhs.removed,
            bytes_removed: self.bytes_removed + rhs.bytes_removed,
        }
    }
}

impl AddAssign for DeleteStats {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StartState {
    #[default]
    Started,
    Shutdown,
}

/// Per-tier status snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BlockCacheStatus {
    pub start_state: StartState,
    pub num_blocks: u64,
    pub block_bytes: u64,
    pub hits: u64,
    pub misses: u64,
    pub puts: u64,
    pub metadata_updates: u64,
    pub num_deleted: u64,
    pub size_deleted: u64,
}

/// The role a single-tier cache plays inside the tiered cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TierKind {
    WorkingSet,
    Sync,
}

impl TierKind {
    /// Every tier, in the order aggregate operations visit them.
    pub const ALL: [TierKind; 2] = [TierKind::WorkingSet, TierKind::Sync];

    #[inline]
    pub fn folder_name(&self) -> &'static str {
        match self {
            TierKind::WorkingSet => WORKING_SET_CACHE_FOLDER_NAME,
            TierKind::Sync => SYNC_CACHE_FOLDER_NAME,
        }
    }

    #[inline]
    pub fn status_name(&self) -> &'static str {
        match self {
            TierKind::WorkingSet => WORKING_SET_STATUS_NAME,
            TierKind::Sync => SYNC_STATUS_NAME,
        }
    }
}

impl fmt::Display for TierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TierKind::WorkingSet => f.write_str("working_set"),
            TierKind::Sync => f.write_str("sync"),
        }
    }
}
