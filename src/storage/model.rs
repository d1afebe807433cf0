//! Storage model types.

use rkyv::{Archive, Deserialize, Serialize};

use crate::cache::{BlockId, BlockMetadata, BlockServerHalf, TlfId};
use crate::hashing::hash_entry_content;

/// One cached block as persisted on disk (rkyv bytes, one file per block).
///
/// # Example
/// ```rust
/// use blockcache::storage::BlockEntry;
///
/// let entry = BlockEntry {
///     block_id: [1; 32],
///     tlf_id: 7,
///     buf: b"hello".to_vec(),
///     server_half: [0; 32],
///     checksum: [0; 32],
///     triggered_prefetch: false,
///     finished_prefetch: false,
///     stored_at: 0,
/// };
/// assert!(!entry.verify());
/// ```
#[derive(Archive, Deserialize, Serialize, Debug, PartialEq, Clone)]
pub struct BlockEntry {
    pub block_id: [u8; 32],
    pub tlf_id: u64,
    pub buf: Vec<u8>,
    pub server_half: [u8; 32],
    /// BLAKE3 over tlf id, server half and payload.
    pub checksum: [u8; 32],
    pub triggered_prefetch: bool,
    pub finished_prefetch: bool,
    /// Unix timestamp of the last write.
    pub stored_at: i64,
}

impl BlockEntry {
    pub fn new(
        tlf_id: TlfId,
        block_id: BlockId,
        buf: &[u8],
        server_half: BlockServerHalf,
        metadata: BlockMetadata,
    ) -> Self {
        Self {
            block_id: *block_id.as_bytes(),
            tlf_id: tlf_id.as_u64(),
            buf: buf.to_vec(),
            server_half: *server_half.as_bytes(),
            checksum: hash_entry_content(tlf_id.as_u64(), buf, server_half.as_bytes()),
            triggered_prefetch: metadata.triggered_prefetch,
            finished_prefetch: metadata.finished_prefetch,
            stored_at: chrono::Utc::now().timestamp(),
        }
    }

    /// Returns `true` if the checksum matches the stored content.
    pub fn verify(&self) -> bool {
        self.checksum == hash_entry_content(self.tlf_id, &self.buf, &self.server_half)
    }

    pub fn block_id(&self) -> BlockId {
        BlockId::from_bytes(self.block_id)
    }

    pub fn server_half(&self) -> BlockServerHalf {
        BlockServerHalf::from_bytes(self.server_half)
    }

    pub fn metadata(&self) -> BlockMetadata {
        BlockMetadata::new(self.triggered_prefetch, self.finished_prefetch)
    }

    pub fn set_metadata(&mut self, metadata: BlockMetadata) {
        self.triggered_prefetch = metadata.triggered_prefetch;
        self.finished_prefetch = metadata.finished_prefetch;
    }
}
