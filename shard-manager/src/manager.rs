//! `ShardManager`: the single concrete facade a replica wires up, combining
//! a `Directory`, a `Proposer`, and a `Committer` behind one directly
//! callable API — create/seal shards, look up their chunk bindings, and
//! feed the replication device's commit callback into the committer.

use crate::clock::{Clock, SystemClock};
use crate::committer::Committer;
use crate::external::{
    BlockIds, ChunkSelector, Lsn, ProposerContext, ReplicationDevice, SuperblockError, SuperblockStore,
};
use crate::proposer::Proposer;
use crate::{codec, Directory};
use shard_manager_primitives::{ChunkId, PgId, ShardId, ShardInfo, ShardManagerConfig, ShardManagerError};
use std::sync::Arc;

pub struct ShardManager {
    directory: Arc<Directory>,
    proposer: Proposer,
    committer: Committer,
}

impl ShardManager {
    pub fn new(
        config: ShardManagerConfig,
        chunk_selector: Arc<dyn ChunkSelector>,
        superblock_store: Arc<dyn SuperblockStore>,
    ) -> Self {
        Self::with_clock(config, chunk_selector, superblock_store, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: ShardManagerConfig,
        chunk_selector: Arc<dyn ChunkSelector>,
        superblock_store: Arc<dyn SuperblockStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let directory = Arc::new(Directory::new(config));
        let proposer = Proposer::new(directory.clone(), clock);
        let committer = Committer::new(directory.clone(), chunk_selector, superblock_store);
        ShardManager { directory, proposer, committer }
    }

    pub fn register_pg(&self, pg_id: PgId, replication_handle: Option<Arc<dyn ReplicationDevice>>) {
        self.directory.register_pg(pg_id, replication_handle);
    }

    /// Repopulates the directory from every durable shard superblock. Must
    /// be called once at startup, after the superblock store is available
    /// and before any commit callback from log replay is delivered — the
    /// superblock is the source of truth for a shard on restart, and a
    /// replay commit for an already-recovered shard must observe it already
    /// present rather than materialize it a second time.
    pub async fn bootstrap(&self) -> Result<(), SuperblockError> {
        self.committer.bootstrap().await
    }

    pub fn set_replication_handle(&self, pg_id: PgId, handle: Arc<dyn ReplicationDevice>) {
        self.directory.set_replication_handle(pg_id, handle);
    }

    pub async fn create_shard(&self, pg_id: PgId, size_bytes: u64) -> Result<ShardInfo, ShardManagerError> {
        self.proposer.create_shard(pg_id, size_bytes).await
    }

    pub async fn seal_shard(&self, info: ShardInfo) -> Result<ShardInfo, ShardManagerError> {
        self.proposer.seal_shard(info).await
    }

    pub fn get_shard_chunk(&self, shard_id: ShardId) -> Option<ChunkId> {
        self.directory.get_shard_chunk(shard_id)
    }

    pub fn get_any_chunk_id(&self, pg_id: PgId) -> Option<ChunkId> {
        self.directory.get_any_chunk_id(pg_id)
    }

    pub fn max_shard_size(&self) -> u64 {
        self.directory.config().max_shard_size()
    }

    pub fn max_shard_num_in_pg(&self) -> u64 {
        self.directory.config().max_shard_num_in_pg()
    }

    /// Entry point for a replication device's commit callback — see
    /// `Committer::on_commit`.
    pub async fn on_commit(
        &self,
        lsn: Lsn,
        header_bytes: &[u8],
        payload: Option<Vec<u8>>,
        blk_ids: BlockIds,
        ctx: Option<ProposerContext>,
    ) {
        let header = match codec::Header::decode(header_bytes) {
            Ok(header) => header,
            Err(_) => {
                tracing::warn!(?lsn, "commit callback carried an unparseable header, skipping");
                if let Some(ctx) = ctx {
                    let _ = ctx.0.send(Err(ShardManagerError::CrcMismatch));
                }
                return;
            }
        };
        self.committer.on_commit(lsn, header, payload, blk_ids, ctx).await
    }

    pub fn directory(&self) -> &Arc<Directory> {
        &self.directory
    }
}
