//! ID allocator: composes a fresh shard id from a PG's pre-incremented
//! sequence counter. Only the leader allocates; followers adopt the id
//! carried in the replicated payload (`directory::apply_create` is where
//! followers catch their `shard_sequence_num` up).

use shard_manager_primitives::{PgId, ShardId, ShardManagerConfig};

/// Pre-increments `shard_sequence_num` and composes the new id. Panics if
/// the PG's sequence space is exhausted — a programming error (the PG
/// should have been retired or split long before `1 << W` shards), not a
/// recoverable condition.
pub fn allocate(
    pg_id: PgId,
    shard_sequence_num: &mut u64,
    config: &ShardManagerConfig,
) -> ShardId {
    let next_seq = *shard_sequence_num + 1;
    assert!(
        next_seq < config.max_shard_num_in_pg(),
        "placement group {pg_id} exhausted its shard sequence space"
    );
    *shard_sequence_num = next_seq;
    ShardId::compose(pg_id, next_seq, config.shard_width())
}
