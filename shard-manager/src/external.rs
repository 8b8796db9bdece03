//! Contracts for the three collaborators this core consumes but does not
//! implement: the per-PG replication log, the process-wide chunk selector,
//! and the superblock store. These traits are the seam, not a reference
//! implementation (fakes for testing live in `tests/common`).

use async_trait::async_trait;
use shard_manager_primitives::{ChunkId, ShardInfo, ShardManagerError};
use std::fmt;
use tokio::sync::oneshot;

/// Log sequence number assigned by the replication device to a committed
/// entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Lsn(pub u64);

/// The block ids a committed log entry carries for its payload. During
/// restart replay these are the only way to recover a payload that was not
/// delivered in hand.
#[derive(Debug, Clone, Copy)]
pub struct BlockIds {
    pub chunk_id: ChunkId,
    pub block_offset: u64,
}

impl BlockIds {
    /// The chunk a CREATE binds to.
    pub fn chunk_num(&self) -> ChunkId {
        self.chunk_id
    }
}

#[derive(Debug, thiserror::Error)]
#[error("replication device error: {0}")]
pub struct ReplicationError(pub String);

#[derive(Debug, thiserror::Error)]
#[error("superblock store error: {0}")]
pub struct SuperblockError(pub String);

/// The opaque handle a proposer's in-flight request hands to the
/// replication device at submission time, and gets back unchanged at commit
/// time. On the leader it resolves the caller's future; on followers it is
/// never constructed, so the committer's `ctx` parameter is `None`.
pub struct ProposerContext(pub(crate) oneshot::Sender<Result<ShardInfo, ShardManagerError>>);

/// Per-PG object providing append and read access to the replicated log.
/// Consumed, never implemented, by this core.
#[async_trait]
pub trait ReplicationDevice: Send + Sync {
    /// Block size in bytes; payload buffers are padded to a multiple of
    /// this and allocated with the device's required alignment.
    fn block_size(&self) -> usize;

    /// Submits `(header, key, value)` for replication. Resolves once the
    /// device has accepted the append locally; the actual commit is
    /// delivered later, out of band, via the committer's `on_commit`, which
    /// the device must hand `ctx` back to unchanged (leader only; `None` on
    /// followers).
    async fn async_alloc_write(
        &self,
        header: Vec<u8>,
        key: Vec<u8>,
        value: Vec<u8>,
        ctx: Option<ProposerContext>,
    ) -> Result<(), ReplicationError>;

    /// Reads a previously-written payload back by block ids, used by the
    /// committer during restart replay when the commit callback did not
    /// carry the payload in hand.
    async fn async_read(&self, blk_ids: BlockIds, size: usize) -> Result<Vec<u8>, ReplicationError>;
}

/// Process-wide chunk allocator. Both calls are idempotent on repeated
/// CREATE/SEAL replays.
pub trait ChunkSelector: Send + Sync {
    fn select_specific_chunk(&self, chunk_id: ChunkId);
    fn release_chunk(&self, chunk_id: ChunkId);
}

/// Named-blob key/value store for shard superblocks, family `"shard"`.
#[async_trait]
pub trait SuperblockStore: Send + Sync {
    /// Atomically allocates a fresh blob of `size` bytes for `key`. Called
    /// once, the first time a shard's superblock is durably created; later
    /// updates to the same shard go through `write_shard_superblock` alone.
    async fn create_shard_superblock(
        &self,
        key: ShardSuperblockKey,
        size: usize,
    ) -> Result<(), SuperblockError>;

    async fn write_shard_superblock(
        &self,
        key: ShardSuperblockKey,
        bytes: Vec<u8>,
    ) -> Result<(), SuperblockError>;

    /// Enumerates every durable blob in the `"shard"` family, returned with
    /// its key. Used once at startup to repopulate the directory before any
    /// log replay commit is processed — the superblock is the source of
    /// truth for a shard across a restart.
    async fn load_all_shard_superblocks(&self) -> Result<Vec<(ShardSuperblockKey, Vec<u8>)>, SuperblockError>;
}

/// Key identifying a shard's superblock within the `"shard"` blob family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShardSuperblockKey(pub shard_manager_primitives::ShardId);

impl fmt::Display for ShardSuperblockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "shard/{}", self.0)
    }
}
