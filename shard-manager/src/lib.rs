//! The replicated shard lifecycle core: fingerprinting, proposing,
//! committing, and recovering CREATE/SEAL operations for shards inside a
//! placement group, so that every replica converges on the same shard set,
//! sequence counter, and chunk binding — across crashes mid-commit and log
//! replay after restart.

pub mod clock;
pub mod codec;
pub mod committer;
pub mod directory;
pub mod external;
mod id_allocator;
pub mod manager;
pub mod proposer;

pub use clock::{Clock, FakeClock, SystemClock};
pub use committer::Committer;
pub use directory::Directory;
pub use external::{
    BlockIds, ChunkSelector, Lsn, ProposerContext, ReplicationDevice, ReplicationError,
    ShardSuperblockKey, SuperblockError, SuperblockStore,
};
pub use manager::ShardManager;
pub use proposer::Proposer;

pub use shard_manager_primitives::{
    ChunkId, PgId, ShardId, ShardInfo, ShardManagerConfig, ShardManagerError, ShardState,
    MAX_SHARD_SIZE_BYTES, RESERVED_SEQUENCE,
};
