//! On-disk layout of the mapped key-value log.
//!
//! All integers are little endian.
//!
//! ```text
//! Header (20 bytes)
//! Offset  Size  Field
//! ------  ----  -----
//! 0       4     magic ("GKVL")
//! 4       2     format version
//! 6       2     reserved (zero)
//! 8       8     generation (bumped by every compaction)
//! 16      4     crc32 over bytes 4..16
//!
//! Record (11-byte header + key + value)
//! 0       1     op (1 = put, 2 = delete)
//! 1       2     key_len
//! 3       4     value_len
//! 7       4     crc32 over op + key_len + value_len + key + value
//! 11      N     key (UTF-8)
//! 11+N    M     value
//! ```

// Lengths are bounded by the u16/u32 checks in `encode_record`
#![allow(clippy::cast_possible_truncation)]

use crate::storage::error::{StorageError, StorageResult};

/// Magic bytes at the start of every log file.
pub const LOG_MAGIC: &[u8; 4] = b"GKVL";
/// Current log format version.
pub const LOG_VERSION: u16 = 1;
/// Size of the file header.
pub const HEADER_SIZE: usize = 20;
/// Size of the fixed part of a record.
pub const RECORD_HEADER_SIZE: usize = 11;

const OP_PUT: u8 = 1;
const OP_DELETE: u8 = 2;

/// Decoded log file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogHeader {
    /// Incremented every time the log is rewritten by compaction.
    pub generation: u64,
}

impl LogHeader {
    /// Encodes the header.
    #[must_use]
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(LOG_MAGIC);
        buf[4..6].copy_from_slice(&LOG_VERSION.to_le_bytes());
        buf[8..16].copy_from_slice(&self.generation.to_le_bytes());
        let crc = crc32fast::hash(&buf[4..16]);
        buf[16..20].copy_from_slice(&crc.to_le_bytes());
        buf
    }

    /// Decodes and validates a header.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer is short, the magic or checksum do not
    /// match, or the version is unknown.
    pub fn decode(bytes: &[u8]) -> StorageResult<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(StorageError::CorruptedHeader(format!(
                "expected {HEADER_SIZE} bytes, found {}",
                bytes.len()
            )));
        }
        if &bytes[0..4] != LOG_MAGIC {
            return Err(StorageError::CorruptedHeader("bad magic".to_string()));
        }
        let stored_crc = read_u32(bytes, 16);
        if crc32fast::hash(&bytes[4..16]) != stored_crc {
            return Err(StorageError::CorruptedHeader(
                "checksum mismatch".to_string(),
            ));
        }
        let version = u16::from_le_bytes([bytes[4], bytes[5]]);
        if version != LOG_VERSION {
            return Err(StorageError::UnsupportedFormatVersion(version));
        }
        Ok(Self {
            generation: read_u64(bytes, 8),
        })
    }
}

/// One mutation in the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogOp<'a> {
    /// `key` now holds `value`.
    Put {
        /// Key written.
        key: &'a str,
        /// Value bytes.
        value: &'a [u8],
    },
    /// `key` was removed.
    Delete {
        /// Key removed.
        key: &'a str,
    },
}

impl LogOp<'_> {
    /// Key touched by this operation.
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::Put { key, .. } | Self::Delete { key } => *key,
        }
    }
}

/// Encodes one record.
///
/// # Errors
///
/// Returns an error if the key or value exceed the record length fields.
pub fn encode_record(op: &LogOp<'_>) -> StorageResult<Vec<u8>> {
    let (code, key, value): (u8, &str, &[u8]) = match op {
        LogOp::Put { key, value } => (OP_PUT, *key, *value),
        LogOp::Delete { key } => (OP_DELETE, *key, &[][..]),
    };
    if key.len() > usize::from(u16::MAX) {
        return Err(StorageError::KeyTooLarge(key.len() as u64));
    }
    if u32::try_from(value.len()).is_err() {
        return Err(StorageError::ValueTooLarge(value.len() as u64));
    }

    let mut buf = Vec::with_capacity(RECORD_HEADER_SIZE + key.len() + value.len());
    buf.push(code);
    buf.extend_from_slice(&(key.len() as u16).to_le_bytes());
    buf.extend_from_slice(&(value.len() as u32).to_le_bytes());
    buf.extend_from_slice(&[0u8; 4]);
    buf.extend_from_slice(key.as_bytes());
    buf.extend_from_slice(value);

    let crc = record_crc(&buf[0..7], &buf[RECORD_HEADER_SIZE..]);
    buf[7..11].copy_from_slice(&crc.to_le_bytes());
    Ok(buf)
}

/// Result of replaying a region of the log.
#[derive(Debug)]
pub struct Replay<'a> {
    /// Valid operations, in file order.
    pub ops: Vec<LogOp<'a>>,
    /// Bytes consumed by valid records.
    pub consumed: usize,
    /// Whether replay stopped before the end of the region.
    pub torn: bool,
}

/// Decodes records from `bytes` until the end or the first record that is
/// truncated or fails validation.
#[must_use]
pub fn replay(bytes: &[u8]) -> Replay<'_> {
    let mut ops = Vec::new();
    let mut offset = 0;

    while offset < bytes.len() {
        match decode_record(&bytes[offset..]) {
            Some((op, len)) => {
                ops.push(op);
                offset += len;
            }
            None => break,
        }
    }

    Replay {
        ops,
        consumed: offset,
        torn: offset < bytes.len(),
    }
}

fn decode_record(bytes: &[u8]) -> Option<(LogOp<'_>, usize)> {
    if bytes.len() < RECORD_HEADER_SIZE {
        return None;
    }
    let code = bytes[0];
    let key_len = usize::from(u16::from_le_bytes([bytes[1], bytes[2]]));
    let value_len = read_u32(bytes, 3) as usize;
    let total = RECORD_HEADER_SIZE
        .checked_add(key_len)?
        .checked_add(value_len)?;
    if bytes.len() < total {
        return None;
    }

    let body = &bytes[RECORD_HEADER_SIZE..total];
    if record_crc(&bytes[0..7], body) != read_u32(bytes, 7) {
        return None;
    }

    let key = std::str::from_utf8(&body[..key_len]).ok()?;
    let op = match code {
        OP_PUT => LogOp::Put {
            key,
            value: &body[key_len..],
        },
        OP_DELETE if value_len == 0 => LogOp::Delete { key },
        _ => return None,
    };
    Some((op, total))
}

fn record_crc(fixed: &[u8], body: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(fixed);
    hasher.update(body);
    hasher.finalize()
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[at..at + 4]);
    u32::from_le_bytes(buf)
}

fn read_u64(bytes: &[u8], at: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[at..at + 8]);
    u64::from_le_bytes(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_round_trip() {
        let header = LogHeader { generation: 7 };
        let bytes = header.encode();
        assert_eq!(&bytes[0..4], LOG_MAGIC);
        assert_eq!(LogHeader::decode(&bytes).expect("decode"), header);
    }

    #[test]
    fn test_header_rejects_bad_checksum() {
        let mut bytes = LogHeader { generation: 1 }.encode();
        bytes[9] ^= 0xFF;
        match LogHeader::decode(&bytes) {
            Err(StorageError::CorruptedHeader(_)) => {}
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_header_rejects_unknown_version() {
        let mut bytes = LogHeader { generation: 1 }.encode();
        bytes[4..6].copy_from_slice(&9u16.to_le_bytes());
        let crc = crc32fast::hash(&bytes[4..16]);
        bytes[16..20].copy_from_slice(&crc.to_le_bytes());
        match LogHeader::decode(&bytes) {
            Err(StorageError::UnsupportedFormatVersion(9)) => {}
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_replay_stops_at_torn_tail() {
        let mut log = encode_record(&LogOp::Put {
            key: "device_id",
            value: b"\"abc\"",
        })
        .expect("encode");
        log.extend(encode_record(&LogOp::Delete { key: "config" }).expect("encode"));
        let valid_len = log.len();

        let partial = encode_record(&LogOp::Put {
            key: "config",
            value: b"{}",
        })
        .expect("encode");
        log.extend_from_slice(&partial[..partial.len() - 1]);

        let replayed = replay(&log);
        assert_eq!(replayed.ops.len(), 2);
        assert_eq!(replayed.ops[0].key(), "device_id");
        assert_eq!(replayed.ops[1], LogOp::Delete { key: "config" });
        assert_eq!(replayed.consumed, valid_len);
        assert!(replayed.torn);
    }

    #[test]
    fn test_replay_stops_at_flipped_byte() {
        let mut log = encode_record(&LogOp::Put {
            key: "config",
            value: b"{\"a\":1}",
        })
        .expect("encode");
        let last = log.len() - 1;
        log[last] ^= 0x01;

        let replayed = replay(&log);
        assert!(replayed.ops.is_empty());
        assert_eq!(replayed.consumed, 0);
        assert!(replayed.torn);
    }

    #[test]
    fn test_corrupt_record_ends_replay_before_later_records() {
        let mut log = encode_record(&LogOp::Put {
            key: "device_id",
            value: b"\"abc\"",
        })
        .expect("encode");
        let first_len = log.len();
        log.extend(
            encode_record(&LogOp::Put {
                key: "config",
                value: b"{}",
            })
            .expect("encode"),
        );
        log.extend(encode_record(&LogOp::Delete { key: "device_id" }).expect("encode"));
        log[first_len + RECORD_HEADER_SIZE] ^= 0x20;

        let replayed = replay(&log);
        assert_eq!(replayed.ops.len(), 1);
        assert_eq!(replayed.ops[0].key(), "device_id");
        assert_eq!(replayed.consumed, first_len);
        assert!(replayed.torn);
    }

    #[test]
    fn test_oversized_key_is_rejected() {
        let key = "k".repeat(usize::from(u16::MAX) + 1);
        match encode_record(&LogOp::Delete { key: &key }) {
            Err(StorageError::KeyTooLarge(len)) => assert_eq!(len, key.len() as u64),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
