//! Cross-cutting, shared constants.
//!
//! The folder names are part of the on-disk layout; changing them orphans
//! existing caches.

/// Sub-directory of the storage root holding the working-set tier.
pub const WORKING_SET_CACHE_FOLDER_NAME: &str = "kbfs_block_cache";

/// Sub-directory of the storage root holding the sync tier.
pub const SYNC_CACHE_FOLDER_NAME: &str = "kbfs_sync_cache";

/// Status-map key reported by the working-set tier.
pub const WORKING_SET_STATUS_NAME: &str = "WorkingSetBlockCache";

/// Status-map key reported by the sync tier.
pub const SYNC_STATUS_NAME: &str = "SyncBlockCache";

pub const BLOCK_ID_LEN: usize = 32;
pub const SERVER_HALF_LEN: usize = 32;

/// Directory (inside a tier root) holding the per-block entry files.
pub const BLOCKS_DIR_NAME: &str = "blocks";

pub const ENTRY_EXTENSION: &str = "rkyv";
pub const TEMP_ENTRY_EXTENSION: &str = "rkyv.tmp";

/// Hex characters of the block id used as the fan-out directory name.
pub const SHARD_PREFIX_LEN: usize = 2;
