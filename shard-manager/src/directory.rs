//! Directory: the concurrent in-memory indices that let the data path
//! locate a shard's chunk, plus the PG-level bookkeeping (sequence counter,
//! replication handle, "any allocated chunk" cache) the ID Allocator and
//! Committer operate on.
//!
//! Locking discipline: a PG-level lock guards the PG map and each PG's
//! `shard_sequence_num`/`any_allocated_chunk_id`/`shard_count`; a separate,
//! independent shard-level lock guards the shard map and every individual
//! shard mutation. Because these are two distinct top-level maps rather than
//! one nested inside the other, a plain lookup or a SEAL (which only
//! mutates a shard entry) takes exactly one lock. The two are acquired
//! together, PG before shard, only where a single commit must update both
//! maps atomically: CREATE commit and superblock-recovery bootstrap.

use crate::external::ReplicationDevice;
use crate::id_allocator;
use parking_lot::RwLock;
use shard_manager_primitives::{ChunkId, PgId, ShardId, ShardInfo, ShardManagerConfig, ShardManagerError};
use std::collections::HashMap;
use std::sync::Arc;

/// A live shard's mutable state.
#[derive(Debug, Clone)]
pub struct ShardEntry {
    pub info: ShardInfo,
    pub chunk_id: ChunkId,
}

/// Directory-side state for one placement group. Holds no shard data
/// itself — only the bookkeeping the PG lock is responsible for.
pub struct PgEntry {
    pub pg_id: PgId,
    replication_handle: Option<Arc<dyn ReplicationDevice>>,
    shard_sequence_num: u64,
    shard_count: usize,
    any_allocated_chunk_id: Option<ChunkId>,
}

impl PgEntry {
    fn new(pg_id: PgId, replication_handle: Option<Arc<dyn ReplicationDevice>>) -> Self {
        PgEntry {
            pg_id,
            replication_handle,
            shard_sequence_num: 0,
            shard_count: 0,
            any_allocated_chunk_id: None,
        }
    }
}

/// Outcome of applying a committed CREATE.
pub enum CreateOutcome {
    /// The shard did not exist; it was inserted and bound to `chunk_id`.
    Inserted { chunk_id: ChunkId },
    /// The shard already existed — idempotent replay, no new state.
    AlreadyExists,
}

/// Outcome of applying a committed SEAL.
pub enum SealOutcome {
    /// The shard was `Open` and is now `Sealed`; its bound chunk should be
    /// released.
    Applied { chunk_id: ChunkId },
    /// The shard was already `Sealed` — idempotent replay, no-op.
    AlreadySealed,
}

pub struct Directory {
    config: ShardManagerConfig,
    pgs: RwLock<HashMap<PgId, PgEntry>>,
    shards: RwLock<HashMap<ShardId, ShardEntry>>,
}

impl Directory {
    pub fn new(config: ShardManagerConfig) -> Self {
        Directory { config, pgs: RwLock::new(HashMap::new()), shards: RwLock::new(HashMap::new()) }
    }

    pub fn config(&self) -> &ShardManagerConfig {
        &self.config
    }

    /// Registers a placement group with the directory. PG membership
    /// negotiation is out of scope for this core; this is the seam through
    /// which an external membership component hands a PG to the core, with
    /// or without a replication handle ready yet.
    pub fn register_pg(&self, pg_id: PgId, replication_handle: Option<Arc<dyn ReplicationDevice>>) {
        self.pgs.write().entry(pg_id).or_insert_with(|| PgEntry::new(pg_id, replication_handle));
    }

    /// Attaches a replication handle to a PG that was registered without
    /// one, moving it out of `PG_NOT_READY`.
    pub fn set_replication_handle(&self, pg_id: PgId, handle: Arc<dyn ReplicationDevice>) {
        if let Some(pg) = self.pgs.write().get_mut(&pg_id) {
            pg.replication_handle = Some(handle);
        }
    }

    /// Resolves the PG's replication handle, distinguishing an unknown PG
    /// from one that is registered but has no handle attached yet.
    pub fn replication_handle(
        &self,
        pg_id: PgId,
    ) -> Result<Arc<dyn ReplicationDevice>, ShardManagerError> {
        let pgs = self.pgs.read();
        let pg = pgs.get(&pg_id).ok_or(ShardManagerError::UnknownPg(pg_id))?;
        pg.replication_handle.clone().ok_or(ShardManagerError::PgNotReady(pg_id))
    }

    /// Takes the PG lock, pre-increments the sequence, composes the id.
    /// Only ever called on the leader, before proposal.
    pub fn allocate_shard_id(&self, pg_id: PgId) -> ShardId {
        let mut pgs = self.pgs.write();
        let pg = pgs.get_mut(&pg_id).expect("allocate_shard_id called for an unregistered PG");
        id_allocator::allocate(pg_id, &mut pg.shard_sequence_num, &self.config)
    }

    /// Applies a committed CREATE. Takes the PG lock and the shard lock
    /// together, PG first — one of the two places in the directory that
    /// needs both at once, because a fresh shard must advance the PG's
    /// sequence counter and appear in the shard map atomically.
    pub fn apply_create(
        &self,
        pg_id: PgId,
        shard_id: ShardId,
        info: ShardInfo,
        chunk_id: ChunkId,
    ) -> CreateOutcome {
        let seq = shard_id.sequence(self.config.shard_width());
        let mut pgs = self.pgs.write();
        let mut shards = self.shards.write();
        let pg = pgs.get_mut(&pg_id).expect("CREATE commit for an unregistered PG");

        // Followers catch up here regardless of whether this is a fresh
        // insert or an idempotent replay.
        pg.shard_sequence_num = pg.shard_sequence_num.max(seq);

        if shards.contains_key(&shard_id) {
            return CreateOutcome::AlreadyExists;
        }

        shards.insert(shard_id, ShardEntry { info, chunk_id });
        pg.shard_count += 1;
        pg.any_allocated_chunk_id.get_or_insert(chunk_id);
        CreateOutcome::Inserted { chunk_id }
    }

    /// Applies a committed SEAL. Only the shard lock is needed: a shard's
    /// membership in a PG is fixed forever at CREATE time, so sealing never
    /// touches PG-level bookkeeping.
    pub fn apply_seal(&self, shard_id: ShardId, committed: ShardInfo) -> SealOutcome {
        let mut shards = self.shards.write();
        let entry = shards
            .get_mut(&shard_id)
            .expect("SEAL commit for a shard whose CREATE was never observed");
        if entry.info.is_sealed() {
            return SealOutcome::AlreadySealed;
        }
        let chunk_id = entry.chunk_id;
        entry.info = committed;
        SealOutcome::Applied { chunk_id }
    }

    /// Steady-state lookup: one lock, no PG map involvement.
    pub fn get_shard_chunk(&self, shard_id: ShardId) -> Option<ChunkId> {
        self.shards.read().get(&shard_id).map(|entry| entry.chunk_id)
    }

    /// A placement hint cached on the PG entry, not guaranteed authoritative.
    pub fn get_any_chunk_id(&self, pg_id: PgId) -> Option<ChunkId> {
        self.pgs.read().get(&pg_id).and_then(|pg| pg.any_allocated_chunk_id)
    }

    /// Number of live shards in a PG, for data-path callers that need more
    /// than a single chunk hint. A running count on the PG entry rather
    /// than an enumeration of the shard map, so this stays a single PG-lock
    /// read.
    pub fn pg_shard_count(&self, pg_id: PgId) -> Option<usize> {
        self.pgs.read().get(&pg_id).map(|pg| pg.shard_count)
    }

    pub fn shard_sequence_num(&self, pg_id: PgId) -> Option<u64> {
        self.pgs.read().get(&pg_id).map(|pg| pg.shard_sequence_num)
    }

    pub fn shard_info(&self, shard_id: ShardId) -> Option<ShardInfo> {
        self.shards.read().get(&shard_id).map(|entry| entry.info.clone())
    }

    /// Inserts a shard recovered from a durable superblock directly into the
    /// directory, bypassing the CREATE-commit path. Registers the PG if it
    /// has not been registered yet. Takes both locks together, PG first,
    /// the same as CREATE commit, since recovery also establishes a shard
    /// and advances its PG's sequence counter atomically. Only valid before
    /// any log replay commit is processed; panics on a duplicate shard id,
    /// which would mean the superblock store itself holds inconsistent
    /// state.
    pub fn bootstrap_insert(&self, pg_id: PgId, shard_id: ShardId, info: ShardInfo, chunk_id: ChunkId) {
        let seq = shard_id.sequence(self.config.shard_width());
        let mut pgs = self.pgs.write();
        let mut shards = self.shards.write();
        let pg = pgs.entry(pg_id).or_insert_with(|| PgEntry::new(pg_id, None));

        pg.shard_sequence_num = pg.shard_sequence_num.max(seq);
        assert!(
            shards.insert(shard_id, ShardEntry { info, chunk_id }).is_none(),
            "duplicate shard id {shard_id} recovered from durable superblocks"
        );
        pg.shard_count += 1;
        pg.any_allocated_chunk_id.get_or_insert(chunk_id);
    }
}
