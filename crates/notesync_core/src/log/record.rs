//! On-disk framing of change log entries.
//!
//! ```text
//! | magic "NSLG" (4) | version u16 (2) | length u32 (4) | CBOR entry | crc32 (4) |
//! ```
//!
//! Integers are little-endian. The CRC covers everything before it.

use crate::change::ChangeLogEntry;
use crate::error::{CoreError, CoreResult};

/// Magic bytes opening every frame.
pub const LOG_MAGIC: [u8; 4] = *b"NSLG";

/// Current frame format version.
pub const LOG_VERSION: u16 = 1;

/// magic (4) + version (2) + length (4)
const HEADER_SIZE: usize = 10;

const CRC_SIZE: usize = 4;

/// Result of scanning a byte buffer for frames.
#[derive(Debug, Clone, Default)]
pub struct FrameScan {
    /// Decoded entries, in file order.
    pub entries: Vec<ChangeLogEntry>,
    /// Length of the prefix made of complete, valid frames.
    pub valid_len: u64,
    /// True if bytes after `valid_len` form an incomplete frame.
    pub torn_tail: bool,
}

/// Encodes one entry as a complete frame.
///
/// # Errors
///
/// Returns [`CoreError::Encode`] if CBOR encoding fails or the payload
/// exceeds the 4 GiB length field.
pub fn encode_frame(entry: &ChangeLogEntry) -> CoreResult<Vec<u8>> {
    let mut payload = Vec::new();
    ciborium::into_writer(entry, &mut payload).map_err(|e| CoreError::Encode(e.to_string()))?;
    let len = u32::try_from(payload.len())
        .map_err(|_| CoreError::Encode("change log entry too large".into()))?;

    let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len() + CRC_SIZE);
    frame.extend_from_slice(&LOG_MAGIC);
    frame.extend_from_slice(&LOG_VERSION.to_le_bytes());
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(&payload);
    let crc = compute_crc32(&frame);
    frame.extend_from_slice(&crc.to_le_bytes());
    Ok(frame)
}

/// Decodes every complete frame in `bytes`.
///
/// An incomplete final frame (a write interrupted mid-way) ends the scan
/// and is reported through [`FrameScan::torn_tail`]. A bad magic, unknown
/// version, CRC mismatch or undecodable body anywhere is corruption.
///
/// # Errors
///
/// Returns [`CoreError::LogCorruption`] with the offset of the bad frame.
pub fn decode_frames(bytes: &[u8]) -> CoreResult<FrameScan> {
    let mut scan = FrameScan::default();
    let mut offset = 0usize;

    while offset < bytes.len() {
        let rest = &bytes[offset..];
        if rest.len() < HEADER_SIZE {
            scan.torn_tail = true;
            break;
        }
        let at = offset as u64;
        if rest[0..4] != LOG_MAGIC {
            return Err(CoreError::log_corruption(at, "bad frame magic"));
        }
        let version = u16::from_le_bytes([rest[4], rest[5]]);
        if version != LOG_VERSION {
            return Err(CoreError::log_corruption(
                at,
                format!("unsupported frame version {version}"),
            ));
        }
        let len = u32::from_le_bytes([rest[6], rest[7], rest[8], rest[9]]) as usize;
        let total = HEADER_SIZE + len + CRC_SIZE;
        if rest.len() < total {
            scan.torn_tail = true;
            break;
        }

        let body_end = HEADER_SIZE + len;
        let stored = u32::from_le_bytes([
            rest[body_end],
            rest[body_end + 1],
            rest[body_end + 2],
            rest[body_end + 3],
        ]);
        let computed = compute_crc32(&rest[..body_end]);
        if stored != computed {
            return Err(CoreError::log_corruption(
                at,
                format!("crc mismatch: stored {stored:#010x}, computed {computed:#010x}"),
            ));
        }

        let entry: ChangeLogEntry = ciborium::from_reader(&rest[HEADER_SIZE..body_end])
            .map_err(|e| CoreError::log_corruption(at, format!("undecodable entry: {e}")))?;
        scan.entries.push(entry);
        offset += total;
        scan.valid_len = offset as u64;
    }

    Ok(scan)
}

/// Computes the IEEE CRC32 of `data`.
pub fn compute_crc32(data: &[u8]) -> u32 {
    const TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                crc = if crc & 1 != 0 {
                    (crc >> 1) ^ 0xEDB8_8320
                } else {
                    crc >> 1
                };
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    !data.iter().fold(0xFFFF_FFFF_u32, |crc, &byte| {
        (crc >> 8) ^ TABLE[((crc ^ u32::from(byte)) & 0xFF) as usize]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::Operation;
    use crate::entity::{EntityKind, NotePayload};

    fn entry(sequence: u64) -> ChangeLogEntry {
        ChangeLogEntry {
            sequence,
            kind: EntityKind::Note,
            entity_id: "n1".into(),
            operation: Operation::Create,
            before: None,
            after: Some(NotePayload::new("draft", "").into()),
            resulting_version: sequence,
            origin: "c1".into(),
            applied_at: 1_700_000_000_000,
        }
    }

    #[test]
    fn crc32_check_value() {
        assert_eq!(compute_crc32(b"123456789"), 0xCBF4_3926);
        assert_eq!(compute_crc32(b""), 0);
    }

    #[test]
    fn frames_decode_in_order() {
        let mut bytes = encode_frame(&entry(1)).unwrap();
        bytes.extend(encode_frame(&entry(2)).unwrap());
        let scan = decode_frames(&bytes).unwrap();
        assert_eq!(scan.entries.len(), 2);
        assert_eq!(scan.entries[1], entry(2));
        assert_eq!(scan.valid_len, bytes.len() as u64);
        assert!(!scan.torn_tail);
    }

    #[test]
    fn torn_tail_is_tolerated() {
        let first = encode_frame(&entry(1)).unwrap();
        let second = encode_frame(&entry(2)).unwrap();
        let mut bytes = first.clone();
        bytes.extend_from_slice(&second[..second.len() - 3]);
        let scan = decode_frames(&bytes).unwrap();
        assert_eq!(scan.entries.len(), 1);
        assert_eq!(scan.valid_len, first.len() as u64);
        assert!(scan.torn_tail);
    }

    #[test]
    fn short_header_is_torn_tail() {
        let mut bytes = encode_frame(&entry(1)).unwrap();
        bytes.extend_from_slice(b"NSL");
        let scan = decode_frames(&bytes).unwrap();
        assert_eq!(scan.entries.len(), 1);
        assert!(scan.torn_tail);
    }

    #[test]
    fn crc_mismatch_is_fatal() {
        let mut bytes = encode_frame(&entry(1)).unwrap();
        bytes[HEADER_SIZE + 2] ^= 0xFF;
        let err = decode_frames(&bytes).unwrap_err();
        assert!(matches!(err, CoreError::LogCorruption { offset: 0, .. }));
    }

    #[test]
    fn bad_magic_is_fatal() {
        let mut bytes = encode_frame(&entry(1)).unwrap();
        let second_at = bytes.len();
        bytes.extend(encode_frame(&entry(2)).unwrap());
        bytes[second_at] = b'X';
        let err = decode_frames(&bytes).unwrap_err();
        assert!(
            matches!(err, CoreError::LogCorruption { offset, .. } if offset == second_at as u64)
        );
    }
}
