//! End-to-end lifecycle scenarios exercised through the public
//! `ShardManager` API: creation, sealing, crash/replay recovery (with and
//! without a durable superblock already in place), corrupt-entry handling,
//! and multi-shard follower catch-up.

mod common;

use common::{init_test_tracing, FakeChunkSelector, FakeReplicationDevice, FakeSuperblockStore};
use shard_manager::{
    BlockIds, ChunkId, Lsn, PgId, ShardInfo, ShardManager, ShardManagerConfig, ShardManagerError,
    ShardState,
};
use std::sync::Arc;

fn build_manager(block_size: usize) -> (Arc<ShardManager>, Arc<FakeReplicationDevice>) {
    let config = ShardManagerConfig::new(16, 1 << 30);
    let chunk_selector = FakeChunkSelector::new();
    let superblock_store = FakeSuperblockStore::new();
    let manager = Arc::new(ShardManager::new(config, chunk_selector, superblock_store));
    let device = FakeReplicationDevice::new(block_size);
    device.attach(&manager);
    (manager, device)
}

#[tokio::test]
async fn s1_create_then_seal() {
    init_test_tracing();
    let (manager, device) = build_manager(64);
    manager.register_pg(PgId(7), None);
    manager.set_replication_handle(PgId(7), device.clone());

    let created = manager.create_shard(PgId(7), 1 << 20).await.unwrap();
    assert_eq!(created.state, ShardState::Open);
    assert_eq!(created.total_capacity_bytes, 1 << 20);
    assert_eq!(created.available_capacity_bytes, 1 << 20);
    assert_eq!(created.deleted_capacity_bytes, 0);
    assert_eq!(created.id.sequence(16), 1);
    assert_eq!(created.id.placement_group(16), PgId(7));

    let chunk_before_seal = manager.get_shard_chunk(created.id).expect("chunk bound at CREATE");

    let sealed = manager.seal_shard(created.clone()).await.unwrap();
    assert_eq!(sealed.state, ShardState::Sealed);
    assert_eq!(sealed.id, created.id);

    assert_eq!(manager.get_shard_chunk(created.id), Some(chunk_before_seal));
}

#[tokio::test]
async fn s2_unknown_pg() {
    let (manager, _device) = build_manager(64);
    let err = manager.create_shard(PgId(999), 1024).await.unwrap_err();
    assert_eq!(err, ShardManagerError::UnknownPg(PgId(999)));
}

#[tokio::test]
async fn pg_registered_without_handle_is_not_ready() {
    let (manager, _device) = build_manager(64);
    manager.register_pg(PgId(1), None);
    let err = manager.create_shard(PgId(1), 1024).await.unwrap_err();
    assert_eq!(err, ShardManagerError::PgNotReady(PgId(1)));
}

#[tokio::test]
async fn s3_replay_without_superblock() {
    let (leader, device) = build_manager(64);
    leader.register_pg(PgId(1), None);
    leader.set_replication_handle(PgId(1), device.clone());
    let created = leader.create_shard(PgId(1), 4096).await.unwrap();

    // A fresh replica: new directory, new chunk selector, new superblock
    // store, but the same underlying device (it already has the bytes the
    // leader wrote — standing in for the replicated log's durable copy).
    let config = ShardManagerConfig::new(16, 1 << 30);
    let follower_chunk_selector = FakeChunkSelector::new();
    let follower_superblocks = FakeSuperblockStore::new();
    let follower = Arc::new(ShardManager::new(
        config,
        follower_chunk_selector.clone(),
        follower_superblocks.clone(),
    ));
    follower.register_pg(PgId(1), Some(device.clone() as Arc<dyn shard_manager::ReplicationDevice>));

    let entries = device.log.lock().clone();
    assert_eq!(entries.len(), 1);
    for entry in &entries {
        follower.on_commit(entry.lsn, &entry.header, None, entry.blk_ids, None).await;
    }

    assert_eq!(follower.get_shard_chunk(created.id), leader.get_shard_chunk(created.id));
    assert!(follower_chunk_selector.busy.lock().contains(&follower.get_shard_chunk(created.id).unwrap()));
    assert_eq!(follower_superblocks.blobs.lock().len(), 1);
}

#[tokio::test]
async fn s4_replay_with_shard_already_present_is_a_no_op() {
    // Unlike S3, the superblock was already durably written before the
    // crash. Model that by having the follower recover from the same
    // durable superblock store the leader wrote to, rather than a fresh
    // empty one — bootstrap must populate the shard from it before any
    // replay commit arrives.
    let config = ShardManagerConfig::new(16, 1 << 30);
    let chunk_selector = FakeChunkSelector::new();
    let superblocks = FakeSuperblockStore::new();
    let leader = Arc::new(ShardManager::new(config, chunk_selector, superblocks.clone()));
    let device = FakeReplicationDevice::new(64);
    device.attach(&leader);
    leader.register_pg(PgId(1), None);
    leader.set_replication_handle(PgId(1), device.clone());

    let created = leader.create_shard(PgId(1), 4096).await.unwrap();
    assert_eq!(superblocks.blobs.lock().len(), 1);

    let follower_config = ShardManagerConfig::new(16, 1 << 30);
    let follower_chunk_selector = FakeChunkSelector::new();
    let follower = Arc::new(ShardManager::new(follower_config, follower_chunk_selector.clone(), superblocks.clone()));
    follower.register_pg(PgId(1), Some(device.clone() as Arc<dyn shard_manager::ReplicationDevice>));

    follower.bootstrap().await.unwrap();
    assert_eq!(follower.get_shard_chunk(created.id), leader.get_shard_chunk(created.id));
    assert!(follower_chunk_selector.busy.lock().contains(&follower.get_shard_chunk(created.id).unwrap()));
    let seq_after_bootstrap = follower.directory().shard_sequence_num(PgId(1)).unwrap();

    // The CREATE commit now replays against a directory that already knows
    // the shard: observed as already present, so it advances (redundantly)
    // the sequence number and nothing else — no second superblock write, no
    // second chunk selection.
    let entry = device.log.lock()[0].clone();
    follower.on_commit(entry.lsn, &entry.header, None, entry.blk_ids, None).await;

    assert_eq!(follower.directory().shard_sequence_num(PgId(1)), Some(seq_after_bootstrap));
    assert_eq!(superblocks.blobs.lock().len(), 1);
}

#[tokio::test]
async fn s5_corrupt_entry_is_reported_and_skipped() {
    use shard_manager::codec::{self, Header, MsgType};

    let (manager, device) = build_manager(64);
    manager.register_pg(PgId(1), None);
    manager.set_replication_handle(PgId(1), device.clone());

    let info = ShardInfo::new_open(
        shard_manager::ShardId::compose(PgId(1), 1, 16),
        PgId(1),
        1024,
        1,
    );
    let payload = codec::frame(codec::encode_payload(&info), 64);
    let mut header = Header::new(MsgType::CreateShard, PgId(1), info.id, &payload);
    header.seal();
    let mut header_bytes = header.encode().to_vec();
    // Zero out the payload_crc field (offset 2 + 8 + 8 = 18) without
    // re-sealing: this reproduces "a committed entry arrives with
    // payload_crc zeroed" from S5.
    header_bytes[18..22].copy_from_slice(&[0, 0, 0, 0]);
    let retampered = Header::decode(&header_bytes).unwrap();
    assert!(retampered.corrupted(), "zeroing payload_crc must also invalidate header_crc");

    let blk_ids = BlockIds { chunk_id: ChunkId(1), block_offset: 0 };
    manager.on_commit(Lsn(1), &header_bytes, Some(payload), blk_ids, None).await;

    // The shard must not have been materialized by the corrupt entry.
    assert_eq!(manager.get_shard_chunk(info.id), None);

    // A subsequent, valid entry still applies normally.
    let created = manager.create_shard(PgId(1), 2048).await.unwrap();
    assert_eq!(created.state, ShardState::Open);
}

#[tokio::test]
async fn s6_follower_catch_up() {
    init_test_tracing();
    let (leader, device) = build_manager(64);
    leader.register_pg(PgId(1), None);
    leader.set_replication_handle(PgId(1), device.clone());

    let mut created = Vec::new();
    for _ in 0..5 {
        created.push(leader.create_shard(PgId(1), 4096).await.unwrap());
    }
    assert_eq!(leader.directory().shard_sequence_num(PgId(1)), Some(5));

    let config = ShardManagerConfig::new(16, 1 << 30);
    let follower = Arc::new(ShardManager::new(config, FakeChunkSelector::new(), FakeSuperblockStore::new()));
    follower.register_pg(PgId(1), Some(device.clone() as Arc<dyn shard_manager::ReplicationDevice>));

    let entries = device.log.lock().clone();
    assert_eq!(entries.len(), 5);
    for entry in &entries {
        follower.on_commit(entry.lsn, &entry.header, None, entry.blk_ids, None).await;
    }

    assert_eq!(follower.directory().shard_sequence_num(PgId(1)), Some(5));
    for info in &created {
        assert_eq!(follower.get_shard_chunk(info.id), leader.get_shard_chunk(info.id));
    }
}

#[tokio::test]
async fn shard_ids_are_unique_and_monotonic_within_a_pg() {
    let (manager, device) = build_manager(64);
    manager.register_pg(PgId(1), None);
    manager.set_replication_handle(PgId(1), device);

    let mut prev_seq = 0u64;
    let mut seen = std::collections::HashSet::new();
    for _ in 0..16 {
        let info = manager.create_shard(PgId(1), 1024).await.unwrap();
        let seq = info.id.sequence(16);
        assert!(seq > prev_seq);
        assert!(seen.insert(info.id));
        prev_seq = seq;
    }
}
