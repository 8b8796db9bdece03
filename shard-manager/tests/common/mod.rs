//! Fakes for the replication device, chunk selector, and superblock store
//! this core consumes, shared by the integration tests in this directory.

use async_trait::async_trait;
use parking_lot::Mutex;
use shard_manager::{
    BlockIds, ChunkId, ChunkSelector, Lsn, ReplicationDevice, ReplicationError, ShardManager,
    ShardSuperblockKey, SuperblockError, SuperblockStore,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Once, Weak};

/// Installs a `tracing` subscriber once per test binary, controlled by
/// `RUST_LOG` same as the rest of the workspace. Call at the top of a test
/// when its `tracing::debug!`/`warn!` output is worth seeing on failure.
pub fn init_test_tracing() {
    static ONCE: Once = Once::new();
    ONCE.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// A replication device whose "commit" happens synchronously, in line,
/// inside `async_alloc_write` — steady-state semantics with no real
/// network or disk involved. It also keeps an append-only log of
/// `(header, value, blk_ids)` so tests can replay entries into a second,
/// fresh `ShardManager` to exercise the restart-replay path.
pub struct FakeReplicationDevice {
    block_size: usize,
    manager: Mutex<Weak<ShardManager>>,
    next_lsn: AtomicU64,
    next_chunk: AtomicU64,
    storage: Mutex<HashMap<u64, Vec<u8>>>,
    pub log: Mutex<Vec<LogEntry>>,
}

#[derive(Clone)]
pub struct LogEntry {
    pub lsn: Lsn,
    pub header: Vec<u8>,
    pub blk_ids: BlockIds,
}

impl FakeReplicationDevice {
    pub fn new(block_size: usize) -> Arc<Self> {
        Arc::new(FakeReplicationDevice {
            block_size,
            manager: Mutex::new(Weak::new()),
            next_lsn: AtomicU64::new(1),
            next_chunk: AtomicU64::new(1),
            storage: Mutex::new(HashMap::new()),
            log: Mutex::new(Vec::new()),
        })
    }

    /// Ties this device back to the manager that owns it, breaking the
    /// construction cycle (the manager must exist before it can register a
    /// PG with a handle back to a device that calls into it).
    pub fn attach(&self, manager: &Arc<ShardManager>) {
        *self.manager.lock() = Arc::downgrade(manager);
    }
}

#[async_trait]
impl ReplicationDevice for FakeReplicationDevice {
    fn block_size(&self) -> usize {
        self.block_size
    }

    async fn async_alloc_write(
        &self,
        header: Vec<u8>,
        _key: Vec<u8>,
        value: Vec<u8>,
        ctx: Option<shard_manager::ProposerContext>,
    ) -> Result<(), ReplicationError> {
        let chunk = self.next_chunk.fetch_add(1, Ordering::SeqCst);
        let blk_ids = BlockIds { chunk_id: ChunkId(chunk), block_offset: 0 };
        self.storage.lock().insert(chunk, value.clone());
        let lsn = Lsn(self.next_lsn.fetch_add(1, Ordering::SeqCst));
        self.log.lock().push(LogEntry { lsn, header: header.clone(), blk_ids });

        let manager = self.manager.lock().upgrade().expect("device used before attach()");
        manager.on_commit(lsn, &header, Some(value), blk_ids, ctx).await;
        Ok(())
    }

    async fn async_read(&self, blk_ids: BlockIds, _size: usize) -> Result<Vec<u8>, ReplicationError> {
        self.storage
            .lock()
            .get(&blk_ids.chunk_id.0)
            .cloned()
            .ok_or_else(|| ReplicationError(format!("no block stored for chunk {}", blk_ids.chunk_id)))
    }
}

pub struct FakeChunkSelector {
    pub busy: Mutex<HashSet<ChunkId>>,
}

impl FakeChunkSelector {
    pub fn new() -> Arc<Self> {
        Arc::new(FakeChunkSelector { busy: Mutex::new(HashSet::new()) })
    }
}

impl ChunkSelector for FakeChunkSelector {
    fn select_specific_chunk(&self, chunk_id: ChunkId) {
        self.busy.lock().insert(chunk_id);
    }

    fn release_chunk(&self, chunk_id: ChunkId) {
        self.busy.lock().remove(&chunk_id);
    }
}

pub struct FakeSuperblockStore {
    pub blobs: Mutex<HashMap<ShardSuperblockKey, Vec<u8>>>,
}

impl FakeSuperblockStore {
    pub fn new() -> Arc<Self> {
        Arc::new(FakeSuperblockStore { blobs: Mutex::new(HashMap::new()) })
    }
}

#[async_trait]
impl SuperblockStore for FakeSuperblockStore {
    async fn create_shard_superblock(
        &self,
        key: ShardSuperblockKey,
        size: usize,
    ) -> Result<(), SuperblockError> {
        self.blobs.lock().insert(key, vec![0u8; size]);
        Ok(())
    }

    async fn write_shard_superblock(
        &self,
        key: ShardSuperblockKey,
        bytes: Vec<u8>,
    ) -> Result<(), SuperblockError> {
        self.blobs.lock().insert(key, bytes);
        Ok(())
    }

    async fn load_all_shard_superblocks(&self) -> Result<Vec<(ShardSuperblockKey, Vec<u8>)>, SuperblockError> {
        Ok(self.blobs.lock().iter().map(|(k, v)| (*k, v.clone())).collect())
    }
}
