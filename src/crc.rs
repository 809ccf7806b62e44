//! CRC-32/IEEE checksum (§4.2) — the same polynomial ZIP and Ethernet use.
//!
//! Deterministic, stateless, used only to detect on-disk corruption of a
//! chunk's bytes. Backed by `crc32fast`, the crate `nexus_wal::segment`
//! already depends on for its own per-record CRC.

use crc32fast::Hasher;

/// Computes the CRC-32/IEEE checksum of `bytes`.
pub fn crc32(bytes: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(bytes);
    hasher.finalize()
}

/// Returns whether `bytes` recomputes to the given checksum.
pub fn crc32_matches(bytes: &[u8], expected: u32) -> bool {
    crc32(bytes) == expected
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pinned_test_data_checksum() {
        assert_eq!(crc32(b"test data"), 3_540_561_586);
    }

    #[test]
    fn is_match_detects_mismatch() {
        let crc = crc32(b"test data");
        assert!(crc32_matches(b"test data", crc));
        assert!(!crc32_matches(b"test data", crc + 1));
    }

    #[test]
    fn empty_input_is_deterministic() {
        assert_eq!(crc32(b""), crc32(b""));
    }
}
