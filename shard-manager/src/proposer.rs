//! Proposer: assembles a CREATE/SEAL proposal and submits it to the
//! replicated log, returning a future the committer resolves on local
//! commit.

use crate::clock::Clock;
use crate::codec::{self, Header, MsgType};
use crate::directory::Directory;
use crate::external::{ProposerContext, ReplicationDevice};
use shard_manager_primitives::{PgId, ShardInfo, ShardManagerError};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, warn};

pub struct Proposer {
    directory: Arc<Directory>,
    clock: Arc<dyn Clock>,
}

impl Proposer {
    pub fn new(directory: Arc<Directory>, clock: Arc<dyn Clock>) -> Self {
        Proposer { directory, clock }
    }

    /// Allocates a shard id, builds a fresh `OPEN` `ShardInfo`, and submits
    /// a CREATE proposal. Resolves once this replica observes the entry
    /// commit.
    pub async fn create_shard(
        &self,
        pg_id: PgId,
        size_bytes: u64,
    ) -> Result<ShardInfo, ShardManagerError> {
        let device = match self.directory.replication_handle(pg_id) {
            Ok(device) => device,
            Err(e) => {
                warn!(%pg_id, error = %e, "create_shard: PG not available");
                return Err(e);
            }
        };
        let shard_id = self.directory.allocate_shard_id(pg_id);
        let now = self.clock.now_micros();
        let info = ShardInfo::new_open(shard_id, pg_id, size_bytes, now);
        info.check_invariants();
        debug!(%pg_id, %shard_id, size_bytes, "proposing CREATE_SHARD");

        let header = build_header(MsgType::CreateShard, &info, device.block_size());
        submit(device.as_ref(), header, &info).await
    }

    /// Copies the supplied `ShardInfo` with `state = SEALED` and submits a
    /// SEAL proposal. `last_modified_time` is carried through unchanged —
    /// sealing is purely a state transition; a caller that wants an updated
    /// timestamp on seal should stamp it before calling this.
    pub async fn seal_shard(&self, info: ShardInfo) -> Result<ShardInfo, ShardManagerError> {
        let device = match self.directory.replication_handle(info.placement_group) {
            Ok(device) => device,
            Err(e) => {
                warn!(pg_id = %info.placement_group, error = %e, "seal_shard: PG not available");
                return Err(e);
            }
        };
        let sealed = info.sealed();
        debug!(shard_id = %sealed.id, "proposing SEAL_SHARD");

        let header = build_header(MsgType::SealShard, &sealed, device.block_size());
        submit(device.as_ref(), header, &sealed).await
    }
}

fn build_header(msg_type: MsgType, info: &ShardInfo, block_size: usize) -> (Header, Vec<u8>) {
    let payload = codec::frame(codec::encode_payload(info), block_size);
    let mut header = Header::new(msg_type, info.placement_group, info.id, &payload);
    header.seal();
    (header, payload)
}

async fn submit(
    device: &dyn ReplicationDevice,
    (header, payload): (Header, Vec<u8>),
    info: &ShardInfo,
) -> Result<ShardInfo, ShardManagerError> {
    let (tx, rx) = oneshot::channel();
    let ctx = ProposerContext(tx);
    let header_bytes = header.encode().to_vec();
    device
        .async_alloc_write(header_bytes.clone(), header_bytes, payload, Some(ctx))
        .await
        .unwrap_or_else(|e| panic!("replication device rejected append for {}: {e}", info.id));

    rx.await.expect("replication device dropped the proposer context without committing")
}
