//! Two-tier disk block cache (used by the `blockcache` binary and integration tests).
//!
//! # Public API Surface
//!
//! ## Core Types
//! - [`BlockCache`] - Contract every tier and the tiered cache implement
//! - [`TieredBlockCache`] - Routes between the working-set and sync tiers
//! - [`CacheContext`] - Cancellation and deadline for one call
//! - [`CacheError`], [`DeleteError`] - Failure kinds
//!
//! ## Storage
//! - [`DiskBlockCache`], [`DiskTierOpener`] - File-per-block tier engine
//! - [`BlockEntry`] - On-disk entry format
//!
//! ## Configuration
//! - [`Config`], [`ConfigError`] - `KBFS_CACHE_*` environment settings
//! - [`SyncedTlfSet`] - Which TLFs are in sync mode
//!
//! ## Test/Mock Support
//! Mock implementations are available behind `#[cfg(any(test, feature = "mock"))]`.

pub mod cache;
pub mod config;
pub mod constants;
pub mod hashing;
pub mod storage;

pub use cache::{
    BlockCache, BlockCacheStatus, BlockId, BlockMetadata, BlockServerHalf, CacheContext,
    CacheError, CacheResult, CachedBlock, DeleteError, DeleteStats, StartState, SyncedTlfSet,
    SyncedTlfs, TierKind, TierOpener, TieredBlockCache, TlfId,
};
#[cfg(any(test, feature = "mock"))]
pub use cache::{MemoryBlockCache, MockOp, MockTierOpener};

pub use config::{Config, ConfigError};
pub use constants::{SYNC_CACHE_FOLDER_NAME, WORKING_SET_CACHE_FOLDER_NAME};
pub use hashing::{hash_block, hash_tlf_name, hash_to_u64};
pub use storage::{BlockEntry, DiskBlockCache, DiskTierOpener};
