//! On-disk storage: the persisted entry model and the single-tier disk engine.

pub mod disk;
mod model;

pub use disk::{DiskBlockCache, DiskTierOpener};
pub use model::ArchivedBlockEntry;
pub use model::BlockEntry;
