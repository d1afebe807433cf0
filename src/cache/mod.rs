//! Block cache contract, tier routing and test doubles.

pub mod backend;
pub mod context;
pub mod error;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod synced;
pub mod tiered;
pub mod types;


pub use backend::{BlockCache, SyncedTlfs, TierOpener};
pub use context::CacheContext;
pub use error::{CacheError, CacheResult, DeleteError};
#[cfg(any(test, feature = "mock"))]
pub use mock::{MemoryBlockCache, MockOp, MockTierOpener};
pub use synced::SyncedTlfSet;
pub use tiered::TieredBlockCache;
pub use types::{
    BlockCacheStatus, BlockId, BlockMetadata, BlockServerHalf, CachedBlock, DeleteStats,
    StartState, TierKind, TlfId,
};
