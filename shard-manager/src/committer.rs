//! Committer: applies committed log entries to the directory and the shard
//! superblocks. Runs both on live commit (payload in hand) and during
//! restart replay (payload fetched from block ids). Idempotent; must never
//! crash on a corrupt entry.

use crate::codec::{self, Header, MsgType};
use crate::directory::{CreateOutcome, Directory, SealOutcome};
use crate::external::{
    BlockIds, ChunkSelector, Lsn, ProposerContext, ShardSuperblockKey, SuperblockError, SuperblockStore,
};
use shard_manager_primitives::{ChunkId, ShardId, ShardInfo, ShardManagerError};
use std::sync::Arc;
use tracing::{debug, error, warn};

pub struct Committer {
    directory: Arc<Directory>,
    chunk_selector: Arc<dyn ChunkSelector>,
    superblock_store: Arc<dyn SuperblockStore>,
}

impl Committer {
    pub fn new(
        directory: Arc<Directory>,
        chunk_selector: Arc<dyn ChunkSelector>,
        superblock_store: Arc<dyn SuperblockStore>,
    ) -> Self {
        Committer { directory, chunk_selector, superblock_store }
    }

    /// Invoked by the replication device for every committed entry, on
    /// every replica, in both steady state and restart replay.
    ///
    /// `payload` carries the value in hand on the steady-state commit path;
    /// it is `None` during restart replay, in which case this fetches it
    /// from `blk_ids` via the PG's replication device.
    pub async fn on_commit(
        &self,
        lsn: Lsn,
        header: Header,
        payload: Option<Vec<u8>>,
        blk_ids: BlockIds,
        ctx: Option<ProposerContext>,
    ) {
        if header.corrupted() {
            warn!(?lsn, "commit carries a corrupted header, skipping");
            resolve(ctx, Err(ShardManagerError::CrcMismatch));
            return;
        }

        let payload = match payload {
            Some(bytes) => bytes,
            None => match self.fetch_payload_for_replay(&header, blk_ids).await {
                Some(bytes) => bytes,
                None => return,
            },
        };

        if crc32fast::hash(&payload) != header.payload_crc {
            warn!(?lsn, shard_id = %header.shard_id, "commit carries a payload CRC mismatch, skipping");
            resolve(ctx, Err(ShardManagerError::CrcMismatch));
            return;
        }

        let info = match codec::decode_payload(&payload) {
            Ok(info) => info,
            Err(e) => {
                warn!(?lsn, shard_id = %header.shard_id, "commit payload failed to decode, skipping");
                resolve(ctx, Err(e));
                return;
            }
        };

        match header.msg_type {
            MsgType::CreateShard => self.apply_create(lsn, header, info, blk_ids, ctx).await,
            MsgType::SealShard => self.apply_seal(lsn, header, info, ctx).await,
        }
    }

    /// Restart-replay payload fetch. No locks are held across this
    /// suspension point. A failed read is logged and skipped: if the
    /// superblock was already written before the crash it will be recovered
    /// independently at startup; if not, the log remains source of truth
    /// and a later replay attempt retries.
    async fn fetch_payload_for_replay(&self, header: &Header, blk_ids: BlockIds) -> Option<Vec<u8>> {
        let device = match self.directory.replication_handle(header.pg_id) {
            Ok(device) => device,
            Err(_) => {
                error!(pg_id = %header.pg_id, "replay commit for a PG with no replication handle");
                return None;
            }
        };
        match device.async_read(blk_ids, header.payload_size as usize).await {
            Ok(bytes) => {
                debug!(shard_id = %header.shard_id, "recovered payload from block ids during replay");
                Some(bytes)
            }
            Err(e) => {
                warn!(shard_id = %header.shard_id, error = %e, "replay payload read failed, skipping entry");
                None
            }
        }
    }

    async fn apply_create(
        &self,
        lsn: Lsn,
        header: Header,
        info: ShardInfo,
        blk_ids: BlockIds,
        ctx: Option<ProposerContext>,
    ) {
        let chunk_id = blk_ids.chunk_num();
        match self.directory.apply_create(header.pg_id, header.shard_id, info.clone(), chunk_id) {
            CreateOutcome::Inserted { chunk_id } => {
                debug!(?lsn, shard_id = %header.shard_id, %chunk_id, "materialized new shard");
                self.create_superblock(header.shard_id, &info, chunk_id).await;
                // No-op in steady state (the chunk was marked busy at
                // proposal time); during replay this is what rebuilds the
                // chunk selector's busy set.
                self.chunk_selector.select_specific_chunk(chunk_id);
            }
            CreateOutcome::AlreadyExists => {
                debug!(?lsn, shard_id = %header.shard_id, "CREATE already applied, idempotent skip");
            }
        }
        resolve(ctx, Ok(info));
    }

    async fn apply_seal(&self, lsn: Lsn, header: Header, info: ShardInfo, ctx: Option<ProposerContext>) {
        match self.directory.apply_seal(header.shard_id, info.clone()) {
            SealOutcome::Applied { chunk_id } => {
                debug!(?lsn, shard_id = %header.shard_id, %chunk_id, "sealed shard");
                self.chunk_selector.release_chunk(chunk_id);
                self.write_superblock(header.shard_id, &info, chunk_id).await;
            }
            SealOutcome::AlreadySealed => {
                debug!(?lsn, shard_id = %header.shard_id, "SEAL already applied, idempotent skip");
            }
        }
        resolve(ctx, Ok(info));
    }

    /// First durable write for a shard: allocates its superblock blob, then
    /// fills it. Called only from the `Inserted` branch of a CREATE apply.
    async fn create_superblock(&self, shard_id: ShardId, info: &ShardInfo, chunk_id: ChunkId) {
        let bytes = encode_superblock(info, chunk_id);
        let key = ShardSuperblockKey(shard_id);
        self.superblock_store
            .create_shard_superblock(key, bytes.len())
            .await
            .unwrap_or_else(|e| panic!("fatal superblock create failure for {shard_id}: {e}"));
        self.write_superblock_bytes(key, bytes).await;
    }

    async fn write_superblock(&self, shard_id: ShardId, info: &ShardInfo, chunk_id: ChunkId) {
        let bytes = encode_superblock(info, chunk_id);
        self.write_superblock_bytes(ShardSuperblockKey(shard_id), bytes).await;
    }

    async fn write_superblock_bytes(&self, key: ShardSuperblockKey, bytes: Vec<u8>) {
        // Superblock writes are synchronous from the committer's
        // perspective and expected to succeed or abort.
        self.superblock_store
            .write_shard_superblock(key, bytes)
            .await
            .unwrap_or_else(|e| panic!("fatal superblock write failure for {}: {e}", key.0));
    }

    /// Repopulates the directory from every durable superblock. Must run to
    /// completion before any log replay commit is processed: a replay of a
    /// CREATE whose shard was already recovered here must observe it
    /// already present rather than materialize it a second time. A shard
    /// recovered in the `Open` state has its chunk marked busy again, since
    /// the in-memory chunk selector holds no state across a restart;
    /// `Sealed` shards already released theirs before the crash.
    pub async fn bootstrap(&self) -> Result<(), SuperblockError> {
        for (key, bytes) in self.superblock_store.load_all_shard_superblocks().await? {
            let superblock: Superblock =
                serde_json::from_slice(&bytes).expect("durable superblock failed to decode");
            self.directory.bootstrap_insert(
                superblock.info.placement_group,
                key.0,
                superblock.info.clone(),
                superblock.chunk_id,
            );
            if !superblock.info.is_sealed() {
                self.chunk_selector.select_specific_chunk(superblock.chunk_id);
            }
        }
        Ok(())
    }
}

/// Superblock contents: every `ShardInfo` field plus `chunk_id`.
#[derive(serde::Serialize, serde::Deserialize)]
struct Superblock {
    #[serde(flatten)]
    info: ShardInfo,
    chunk_id: ChunkId,
}

fn encode_superblock(info: &ShardInfo, chunk_id: ChunkId) -> Vec<u8> {
    serde_json::to_vec(&Superblock { info: info.clone(), chunk_id }).expect("Superblock always serializes")
}

fn resolve(ctx: Option<ProposerContext>, result: Result<ShardInfo, ShardManagerError>) {
    if let Some(ctx) = ctx {
        // The receiver may already be gone if the caller cancelled; that's
        // fine, the commit still happened, its result is just discarded.
        let _ = ctx.0.send(result);
    }
}
