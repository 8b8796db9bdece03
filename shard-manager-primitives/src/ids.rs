use serde::{Deserialize, Serialize};
use std::fmt;

/// A placement group identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PgId(pub u64);

impl fmt::Display for PgId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A shard identifier: the high bits carry the owning placement group, the
/// low `shard_width` bits carry the per-PG monotonic sequence.
///
/// The split point is not encoded in the value itself — every caller that
/// decomposes a `ShardId` must supply the same `shard_width` the directory
/// was constructed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ShardId(pub u64);

impl ShardId {
    /// Composes a shard id from a placement group and a per-PG sequence.
    pub fn compose(pg_id: PgId, sequence: u64, shard_width: u32) -> Self {
        debug_assert!(sequence < (1u64 << shard_width), "sequence overflows shard_width");
        ShardId((pg_id.0 << shard_width) | sequence)
    }

    /// Extracts the per-PG sequence: `id & ((1 << shard_width) - 1)`.
    pub fn sequence(&self, shard_width: u32) -> u64 {
        self.0 & ((1u64 << shard_width) - 1)
    }

    /// Extracts the owning placement group.
    pub fn placement_group(&self, shard_width: u32) -> PgId {
        PgId(self.0 >> shard_width)
    }
}

impl fmt::Display for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A unit of raw storage managed by the chunk selector, bound to a shard at
/// CREATE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkId(pub u64);

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
