use crate::ids::PgId;

/// Caller-visible, recoverable error kinds. Every other failure mode named in
/// the core (missing PG at commit, missing shard on SEAL commit, duplicate
/// shard-id insertion, sequence exhaustion) is a broken invariant in the
/// replicated log and aborts the process instead of surfacing here.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ShardManagerError {
    #[error("unknown placement group {0}")]
    UnknownPg(PgId),
    #[error("placement group {0} has no replication handle yet")]
    PgNotReady(PgId),
    #[error("CRC mismatch decoding shard operation")]
    CrcMismatch,
}
