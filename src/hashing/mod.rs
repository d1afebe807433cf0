use blake3::Hasher;

/// Content hash used as a block's identity.
#[inline]
pub fn hash_block(data: &[u8]) -> [u8; 32] {
    *blake3::hash(data).as_bytes()
}

/// Computes a 64-bit hash of the input data using BLAKE3, truncated from 256 bits.
///
/// Only used for namespace identifiers, where the set of names on one client is
/// small enough that the ~2^32 birthday bound is irrelevant. Block identity
/// always uses the full 32-byte output of [`hash_block`].
#[inline]
pub fn hash_to_u64(data: &[u8]) -> u64 {
    let hash = blake3::hash(data);
    let bytes: [u8; 8] = hash.as_bytes()[0..8]
        .try_into()
        .expect("BLAKE3 always produces at least 8 bytes");
    u64::from_le_bytes(bytes)
}

#[inline]
pub fn hash_tlf_name(name: &str) -> u64 {
    hash_to_u64(name.as_bytes())
}

/// Hashes a block payload together with its key material.
///
/// Used by the disk engine to detect an entry file whose contents were
/// replaced underneath it.
#[inline]
pub fn hash_entry_content(tlf_id: u64, buf: &[u8], server_half: &[u8; 32]) -> [u8; 32] {
    let mut hasher = Hasher::new();
    hasher.update(&tlf_id.to_le_bytes());
    hasher.update(server_half);
    hasher.update(buf);
    *hasher.finalize().as_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_hash_block_determinism() {
        let block = b"immutable block payload";

        let hash1 = hash_block(block);
        let hash2 = hash_block(block);

        assert_eq!(hash1, hash2);
    }

    #[test]
    fn test_hash_block_uniqueness() {
        let blocks = [
            b"block-a".as_slice(),
            b"block-b".as_slice(),
            b"BLOCK-A".as_slice(),
            b"block-a ".as_slice(),
        ];

        let hashes: Vec<_> = blocks.iter().map(|b| hash_block(b)).collect();
        let unique_hashes: HashSet<_> = hashes.iter().collect();

        assert_eq!(unique_hashes.len(), blocks.len());
    }

    #[test]
    fn test_hash_block_empty_input() {
        let hash = hash_block(b"");
        assert!(!hash.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_hash_tlf_name_matches_u64_hash() {
        assert_eq!(hash_tlf_name("/keybase/private/alice"), hash_to_u64(b"/keybase/private/alice"));
        assert_ne!(
            hash_tlf_name("/keybase/private/alice"),
            hash_tlf_name("/keybase/public/alice")
        );
    }

    #[test]
    fn test_hash_entry_content_sensitivity() {
        let half = [7u8; 32];
        let base = hash_entry_content(1, b"payload", &half);

        assert_ne!(base, hash_entry_content(2, b"payload", &half));
        assert_ne!(base, hash_entry_content(1, b"payload!", &half));
        assert_ne!(base, hash_entry_content(1, b"payload", &[8u8; 32]));
        assert_eq!(base, hash_entry_content(1, b"payload", &half));
    }
}
