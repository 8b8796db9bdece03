use crate::ids::{PgId, ShardId};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a shard. `Sealed` is terminal: once reached, a shard
/// must never be observed back in `Open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShardState {
    Open,
    Sealed,
}

/// The logical record for a shard, as carried in CREATE/SEAL proposals and
/// persisted in the shard superblock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShardInfo {
    pub id: ShardId,
    pub placement_group: PgId,
    pub state: ShardState,
    /// Monotonic wallclock microseconds at the origin replica.
    pub created_time: u64,
    pub last_modified_time: u64,
    pub total_capacity_bytes: u64,
    pub available_capacity_bytes: u64,
    pub deleted_capacity_bytes: u64,
}

impl ShardInfo {
    /// Builds the `ShardInfo` for a fresh CREATE: `available = total`,
    /// `deleted = 0`, `state = Open`.
    pub fn new_open(
        id: ShardId,
        placement_group: PgId,
        size_bytes: u64,
        now_micros: u64,
    ) -> Self {
        ShardInfo {
            id,
            placement_group,
            state: ShardState::Open,
            created_time: now_micros,
            last_modified_time: now_micros,
            total_capacity_bytes: size_bytes,
            available_capacity_bytes: size_bytes,
            deleted_capacity_bytes: 0,
        }
    }

    /// Returns a copy with `state = Sealed`. `last_modified_time` is
    /// intentionally left unchanged here — it is the proposer's job to
    /// stamp it, not the seal transition itself.
    pub fn sealed(&self) -> Self {
        let mut next = self.clone();
        next.state = ShardState::Sealed;
        next
    }

    /// Checks the invariants a well-formed record must satisfy. Violations
    /// are a programming error in whichever caller assembled the record,
    /// not a recoverable condition.
    pub fn check_invariants(&self) {
        assert!(
            self.available_capacity_bytes <= self.total_capacity_bytes,
            "available_capacity_bytes exceeds total_capacity_bytes"
        );
        assert!(
            self.deleted_capacity_bytes <= self.total_capacity_bytes,
            "deleted_capacity_bytes exceeds total_capacity_bytes"
        );
        assert!(
            self.last_modified_time >= self.created_time,
            "last_modified_time precedes created_time"
        );
    }

    pub fn is_sealed(&self) -> bool {
        matches!(self.state, ShardState::Sealed)
    }
}
