//! Wire format for a shard operation: a fixed framing `Header` plus a
//! self-describing `ShardInfo` payload, persisted together through the
//! replication log.

use bytes::{Buf, BufMut, BytesMut};
use shard_manager_primitives::{PgId, ShardId, ShardInfo, ShardManagerError};

/// Size of the encoded header, in bytes:
/// `msg_type(2) + pg_id(8) + shard_id(8) + payload_size(4) + payload_crc(4) + header_crc(4)`.
pub const HEADER_LEN: usize = 2 + 8 + 8 + 4 + 4 + 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MsgType {
    CreateShard = 1,
    SealShard = 2,
}

impl MsgType {
    fn to_u16(self) -> u16 {
        self as u16
    }

    fn from_u16(v: u16) -> Option<Self> {
        match v {
            1 => Some(MsgType::CreateShard),
            2 => Some(MsgType::SealShard),
            _ => None,
        }
    }
}

/// The fixed framing header. `header_crc` is only meaningful once `seal()`
/// has been called.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub msg_type: MsgType,
    pub pg_id: PgId,
    pub shard_id: ShardId,
    pub payload_size: u32,
    pub payload_crc: u32,
    header_crc: u32,
}

impl Header {
    /// Builds an unsealed header over an already-padded payload. Call
    /// `seal()` before encoding it onto the wire.
    pub fn new(msg_type: MsgType, pg_id: PgId, shard_id: ShardId, padded_payload: &[u8]) -> Self {
        Header {
            msg_type,
            pg_id,
            shard_id,
            payload_size: padded_payload.len() as u32,
            payload_crc: crc32fast::hash(padded_payload),
            header_crc: 0,
        }
    }

    /// Finalizes `header_crc` as the CRC32-IEEE of all preceding header
    /// bytes.
    pub fn seal(&mut self) {
        self.header_crc = crc32fast::hash(&self.preimage());
    }

    /// `true` if the header's self-check fails — a header CRC mismatch.
    pub fn corrupted(&self) -> bool {
        crc32fast::hash(&self.preimage()) != self.header_crc
    }

    fn preimage(&self) -> [u8; HEADER_LEN - 4] {
        let mut buf = BytesMut::with_capacity(HEADER_LEN - 4);
        buf.put_u16_le(self.msg_type.to_u16());
        buf.put_u64_le(self.pg_id.0);
        buf.put_u64_le(self.shard_id.0);
        buf.put_u32_le(self.payload_size);
        buf.put_u32_le(self.payload_crc);
        let mut out = [0u8; HEADER_LEN - 4];
        out.copy_from_slice(&buf);
        out
    }

    /// Encodes the sealed header to its fixed-size wire form.
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut buf = BytesMut::with_capacity(HEADER_LEN);
        buf.extend_from_slice(&self.preimage());
        buf.put_u32_le(self.header_crc);
        let mut out = [0u8; HEADER_LEN];
        out.copy_from_slice(&buf);
        out
    }

    /// Decodes a header from its wire form without judging corruption —
    /// callers must call `corrupted()` themselves. A commit path must not
    /// bail out early on a decode error; a malformed `msg_type` is treated
    /// the same as a CRC mismatch by the caller.
    pub fn decode(bytes: &[u8]) -> Result<Self, ShardManagerError> {
        if bytes.len() != HEADER_LEN {
            return Err(ShardManagerError::CrcMismatch);
        }
        let mut buf = bytes;
        let msg_type_raw = buf.get_u16_le();
        let pg_id = PgId(buf.get_u64_le());
        let shard_id = ShardId(buf.get_u64_le());
        let payload_size = buf.get_u32_le();
        let payload_crc = buf.get_u32_le();
        let header_crc = buf.get_u32_le();
        let msg_type = match MsgType::from_u16(msg_type_raw) {
            Some(t) => t,
            // An unrecognized opcode is indistinguishable from corruption
            // from the caller's point of view: report it as such rather
            // than panicking on unknown wire data.
            None => return Err(ShardManagerError::CrcMismatch),
        };
        Ok(Header { msg_type, pg_id, shard_id, payload_size, payload_crc, header_crc })
    }
}

/// Encodes a `ShardInfo` to its self-describing textual payload (keyed
/// JSON).
pub fn encode_payload(info: &ShardInfo) -> Vec<u8> {
    serde_json::to_vec(info).expect("ShardInfo always serializes")
}

/// Decodes a `ShardInfo` from a (possibly zero-padded) payload buffer.
pub fn decode_payload(padded: &[u8]) -> Result<ShardInfo, ShardManagerError> {
    let trimmed_len = padded.iter().rposition(|&b| b != 0).map(|i| i + 1).unwrap_or(0);
    serde_json::from_slice(&padded[..trimmed_len]).map_err(|_| ShardManagerError::CrcMismatch)
}

/// Pads `payload` with zeros up to a multiple of `block_size`. `payload_crc`
/// must always be computed over the result of this, trailing zeros
/// included.
pub fn frame(mut payload: Vec<u8>, block_size: usize) -> Vec<u8> {
    if block_size == 0 {
        return payload;
    }
    let remainder = payload.len() % block_size;
    if remainder != 0 {
        payload.resize(payload.len() + (block_size - remainder), 0);
    }
    payload
}
