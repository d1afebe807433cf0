//! Tiered cache over real disk tiers.

mod common;

use std::sync::Arc;

use blockcache::cache::{BlockCache, BlockMetadata, CacheContext, CacheError, StartState, TierKind};
use blockcache::constants::{SYNC_CACHE_FOLDER_NAME, WORKING_SET_CACHE_FOLDER_NAME};
use common::fixtures::{DiskHarness, block, eventually, plain_tlf, synced_tlf};

fn tier(h: &DiskHarness, kind: TierKind) -> Arc<dyn BlockCache> {
    Arc::clone(h.cache.tier(kind).expect("tier enabled"))
}

#[tokio::test]
async fn test_tier_folders_created_under_root() {
    let h = DiskHarness::new().await;
    assert!(h.root().join(WORKING_SET_CACHE_FOLDER_NAME).is_dir());
    assert!(!h.root().join(SYNC_CACHE_FOLDER_NAME).exists());

    h.cache.enable_sync_tier().await.expect("enable");

    assert!(h.root().join(SYNC_CACHE_FOLDER_NAME).is_dir());
}

#[tokio::test]
async fn test_synced_put_moves_block_out_of_working_set() {
    let h = DiskHarness::with_sync_tier().await;
    let ctx = CacheContext::new();
    let tlf = synced_tlf();
    let (id, key) = block(b"hello");

    // Copy written while the TLF was still in the working set.
    tier(&h, TierKind::WorkingSet)
        .put(&ctx, tlf, id, b"hello", key)
        .await
        .expect("seed working set");

    h.cache
        .put(&ctx, tlf, id, b"hello", key)
        .await
        .expect("put");
    let got = h.cache.get(&ctx, tlf, id).await.expect("get");

    assert_eq!(got.buf, b"hello");
    assert_eq!(got.server_half, key);
    assert!(!got.has_prefetched);

    let working_set = tier(&h, TierKind::WorkingSet);
    eventually(|| {
        let working_set = Arc::clone(&working_set);
        async move {
            matches!(
                working_set.get(&CacheContext::new(), tlf, id).await,
                Err(CacheError::NoSuchBlock { .. })
            )
        }
    })
    .await;

    let sync = tier(&h, TierKind::Sync);
    assert_eq!(sync.get(&ctx, tlf, id).await.expect("sync copy").buf, b"hello");
}

#[tokio::test]
async fn test_put_without_sync_tier_lands_in_working_set() {
    let h = DiskHarness::new().await;
    let ctx = CacheContext::new();
    let tlf = synced_tlf();
    let (id, key) = block(b"x");

    h.cache.put(&ctx, tlf, id, b"x", key).await.expect("put");
    let got = h.cache.get(&ctx, tlf, id).await.expect("get");

    assert_eq!(got.buf, b"x");
    assert_eq!(got.server_half, key);
    assert!(!got.has_prefetched);
    assert_eq!(h.cache.size(), tier(&h, TierKind::WorkingSet).size());
    assert!(h.cache.size() > 0);
}

#[tokio::test]
async fn test_unsynced_block_read_back_after_tlf_becomes_synced() {
    let h = DiskHarness::with_sync_tier().await;
    let ctx = CacheContext::new();
    let tlf = plain_tlf();
    let (id, key) = block(b"before sync");

    h.cache
        .put(&ctx, tlf, id, b"before sync", key)
        .await
        .expect("put");
    h.synced.set_synced(tlf, true);

    let got = h.cache.get(&ctx, tlf, id).await.expect("fallback get");
    assert_eq!(got.buf, b"before sync");
}

#[tokio::test]
async fn test_absent_block_is_not_found() {
    let h = DiskHarness::with_sync_tier().await;
    let (id, _) = block(b"never written");

    let result = h.cache.get(&CacheContext::new(), synced_tlf(), id).await;

    assert!(matches!(result, Err(CacheError::NoSuchBlock { .. })));
}

#[tokio::test]
async fn test_metadata_update_reaches_the_tier_holding_the_block() {
    let h = DiskHarness::with_sync_tier().await;
    let ctx = CacheContext::new();
    let (id, key) = block(b"prefetch me");

    h.cache
        .put(&ctx, plain_tlf(), id, b"prefetch me", key)
        .await
        .expect("put");
    h.cache
        .update_metadata(&ctx, id, BlockMetadata::new(true, true))
        .await
        .expect("update");

    assert_eq!(
        h.cache.get_metadata(&ctx, id).await.expect("metadata"),
        BlockMetadata::new(true, true)
    );
    assert!(
        h.cache
            .get(&ctx, plain_tlf(), id)
            .await
            .expect("get")
            .has_prefetched
    );
}

#[tokio::test]
async fn test_delete_removes_copies_from_both_tiers() {
    let h = DiskHarness::with_sync_tier().await;
    let ctx = CacheContext::new();
    let (id, key) = block(b"doubled");
    let working_set = tier(&h, TierKind::WorkingSet);
    let sync = tier(&h, TierKind::Sync);
    working_set
        .put(&ctx, plain_tlf(), id, b"doubled", key)
        .await
        .expect("seed ws");
    sync.put(&ctx, synced_tlf(), id, b"doubled", key)
        .await
        .expect("seed sync");
    let expected_bytes = working_set.size() + sync.size();

    let stats = h.cache.delete(&ctx, &[id]).await.expect("delete");

    assert_eq!(stats.removed, 2);
    assert_eq!(stats.bytes_removed, expected_bytes);
    assert_eq!(h.cache.size(), 0);
}

#[tokio::test]
async fn test_size_is_sum_of_tiers() {
    let h = DiskHarness::with_sync_tier().await;
    let ctx = CacheContext::new();
    let (a, key_a) = block(b"synced block");
    let (b, key_b) = block(b"plain block");

    h.cache
        .put(&ctx, synced_tlf(), a, b"synced block", key_a)
        .await
        .expect("put a");
    h.cache
        .put(&ctx, plain_tlf(), b, b"plain block", key_b)
        .await
        .expect("put b");

    let ws = tier(&h, TierKind::WorkingSet).size();
    let sync = tier(&h, TierKind::Sync).size();
    assert!(ws > 0 && sync > 0);
    assert_eq!(h.cache.size(), ws + sync);
}

#[tokio::test]
async fn test_status_and_shutdown_cover_both_tiers() {
    let h = DiskHarness::with_sync_tier().await;
    let ctx = CacheContext::new();

    let statuses = h.cache.status(&ctx).await;
    assert_eq!(statuses.len(), 2);
    assert!(
        statuses
            .values()
            .all(|status| status.start_state == StartState::Started)
    );

    h.cache.shutdown(&ctx).await;

    let statuses = h.cache.status(&ctx).await;
    assert!(
        statuses
            .values()
            .all(|status| status.start_state == StartState::Shutdown)
    );
    let (id, key) = block(b"too late");
    assert!(matches!(
        h.cache.put(&ctx, plain_tlf(), id, b"too late", key).await,
        Err(CacheError::Shutdown)
    ));
}

#[tokio::test]
async fn test_blocks_survive_reopen() {
    let dir = tempfile::TempDir::new().expect("temp dir");
    let synced = Arc::new(blockcache::cache::SyncedTlfSet::from_names([
        common::fixtures::SYNCED_TLF_NAME,
    ]));
    let ctx = CacheContext::new();
    let (id, key) = block(b"durable");

    {
        let cache = blockcache::cache::TieredBlockCache::open(
            Arc::new(blockcache::storage::DiskTierOpener),
            synced.clone(),
            dir.path(),
        )
        .await
        .expect("open");
        cache.enable_sync_tier().await.expect("enable");
        cache
            .put(&ctx, synced_tlf(), id, b"durable", key)
            .await
            .expect("put");
        cache.shutdown(&ctx).await;
    }

    let reopened = blockcache::cache::TieredBlockCache::open(
        Arc::new(blockcache::storage::DiskTierOpener),
        synced,
        dir.path(),
    )
    .await
    .expect("reopen");
    reopened.enable_sync_tier().await.expect("enable");

    let got = reopened.get(&ctx, synced_tlf(), id).await.expect("get");
    assert_eq!(got.buf, b"durable");
    assert_eq!(got.server_half, key);
}

#[tokio::test]
async fn test_deadline_exceeded_is_passed_through() {
    let h = DiskHarness::with_sync_tier().await;
    let ctx = CacheContext::new().deadline_at(std::time::Instant::now());
    let (id, key) = block(b"late");

    let result = h.cache.put(&ctx, synced_tlf(), id, b"late", key).await;

    assert!(matches!(result, Err(CacheError::DeadlineExceeded)));
}
