//! `LogMetadata` — the fixed 24-byte, big-endian chunk descriptor (§3).
//!
//! One of these is produced per chunk written to a segment and bundled,
//! in sequence order, into a [`crate::metadata::MetadataRecord`].

use crate::error::CodecError;

/// Fixed on-disk width of an encoded [`LogMetadata`].
pub const LOG_METADATA_LEN: usize = 24;

/// Describes one chunk of one logical write: which segment holds it, where,
/// how big, its position in the record's chunk sequence, and its CRC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogMetadata {
    pub segment_id: u32,
    pub size: u32,
    pub sequence: u32,
    pub crc: u32,
    pub offset: u64,
}

impl LogMetadata {
    /// Encodes to the normative 24-byte big-endian layout:
    /// `SegmentID:u32 | Size:u32 | Sequence:u32 | CRC:u32 | Offset:u64`.
    pub fn encode(&self) -> [u8; LOG_METADATA_LEN] {
        let mut buf = [0u8; LOG_METADATA_LEN];
        buf[0..4].copy_from_slice(&self.segment_id.to_be_bytes());
        buf[4..8].copy_from_slice(&self.size.to_be_bytes());
        buf[8..12].copy_from_slice(&self.sequence.to_be_bytes());
        buf[12..16].copy_from_slice(&self.crc.to_be_bytes());
        buf[16..24].copy_from_slice(&self.offset.to_be_bytes());
        buf
    }

    /// Decodes a 24-byte big-endian buffer produced by [`Self::encode`].
    pub fn decode(buf: &[u8]) -> Result<Self, CodecError> {
        if buf.len() < LOG_METADATA_LEN {
            return Err(CodecError::TooShort {
                need: LOG_METADATA_LEN,
                got: buf.len(),
            });
        }
        Ok(Self {
            segment_id: u32::from_be_bytes(buf[0..4].try_into().unwrap()),
            size: u32::from_be_bytes(buf[4..8].try_into().unwrap()),
            sequence: u32::from_be_bytes(buf[8..12].try_into().unwrap()),
            crc: u32::from_be_bytes(buf[12..16].try_into().unwrap()),
            offset: u64::from_be_bytes(buf[16..24].try_into().unwrap()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_exact_layout() {
        let m = LogMetadata {
            segment_id: 1,
            size: 100,
            sequence: 10,
            crc: 12_345_678,
            offset: 1_234_567_890,
        };
        let expected: [u8; LOG_METADATA_LEN] = [
            0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x64, 0x00, 0x00, 0x00, 0x0a, 0x00, 0xbc,
            0x61, 0x4e, 0x00, 0x00, 0x00, 0x00, 0x49, 0x96, 0x02, 0xd2,
        ];
        assert_eq!(m.encode(), expected);
    }

    #[test]
    fn round_trip() {
        let m = LogMetadata {
            segment_id: 7,
            size: 4096,
            sequence: 3,
            crc: 0xdead_beef,
            offset: 99_999,
        };
        let encoded = m.encode();
        let decoded = LogMetadata::decode(&encoded).unwrap();
        assert_eq!(m, decoded);
    }

    #[test]
    fn decode_rejects_short_buffer() {
        let err = LogMetadata::decode(&[0u8; 10]).unwrap_err();
        assert!(matches!(err, CodecError::TooShort { need: 24, got: 10 }));
    }
}
