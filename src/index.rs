//! Index file (§4.5): a dense, fixed-20-byte-entry array mapping a logical
//! record index to the byte location of its metadata record. Little-endian,
//! unlike the metadata file — deliberately, per spec §6's endianness table.

use crate::byte_file::{ensure_parent_dir, ByteFile, OsByteFile};
use crate::error::{ByteFileError, CodecError, SegmentError};

/// Fixed on-disk width of an encoded [`IndexEntry`].
pub const INDEX_ENTRY_LEN: usize = 20;

/// Points a logical index at its metadata record's location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    pub index: i64,
    pub metadata_offset: i64,
    pub metadata_size: u32,
}

impl IndexEntry {
    /// Encodes to the normative 20-byte little-endian layout:
    /// `Index:i64 | MetadataOffset:i64 | MetadataSize:u32`.
    pub fn encode(&self) -> [u8; INDEX_ENTRY_LEN] {
        let mut buf = [0u8; INDEX_ENTRY_LEN];
        buf[0..8].copy_from_slice(&self.index.to_le_bytes());
        buf[8..16].copy_from_slice(&self.metadata_offset.to_le_bytes());
        buf[16..20].copy_from_slice(&self.metadata_size.to_le_bytes());
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self, CodecError> {
        if buf.len() != INDEX_ENTRY_LEN {
            return Err(CodecError::TooShort {
                need: INDEX_ENTRY_LEN,
                got: buf.len(),
            });
        }
        Ok(Self {
            index: i64::from_le_bytes(buf[0..8].try_into().unwrap()),
            metadata_offset: i64::from_le_bytes(buf[8..16].try_into().unwrap()),
            metadata_size: u32::from_le_bytes(buf[16..20].try_into().unwrap()),
        })
    }
}

/// Appends and reads fixed-width `IndexEntry` records.
pub struct IndexFile {
    file: Box<dyn ByteFile>,
    /// Number of entries appended so far — also the next logical index that
    /// will be returned by a write (see SPEC_FULL.md §9 resolution 1: the
    /// first successful write returns index 0, the append position, not
    /// `last_index + 1`).
    entry_count: u64,
    sync_after_write: bool,
}

impl IndexFile {
    pub fn open(
        path: impl AsRef<std::path::Path>,
        sync_after_write: bool,
    ) -> Result<Self, SegmentError> {
        let path = path.as_ref();
        ensure_parent_dir(path).map_err(ByteFileError::Io)?;
        let file = OsByteFile::open(path)?;
        let size = file.size()?;
        let entry_count = size / INDEX_ENTRY_LEN as u64;
        Ok(Self {
            file: Box::new(file),
            entry_count,
            sync_after_write,
        })
    }

    /// Always syncs on write; use [`Self::open`] to control that.
    pub fn with_byte_file(file: Box<dyn ByteFile>, entry_count: u64) -> Self {
        Self {
            file,
            entry_count,
            sync_after_write: true,
        }
    }

    /// Appends `entry`, syncs unless `sync_after_write` is disabled, and
    /// caches it as the last entry.
    pub fn write(&mut self, entry: &IndexEntry) -> Result<(), SegmentError> {
        self.file.write(&entry.encode())?;
        if self.sync_after_write {
            self.file.sync()?;
        }
        self.entry_count += 1;
        Ok(())
    }

    /// Reads the entry at logical index `k`, located at byte offset `k*20`.
    pub fn read(&self, k: i64) -> Result<IndexEntry, SegmentError> {
        let offset = (k as u64) * INDEX_ENTRY_LEN as u64;
        let buf = self.file.read_at(offset, INDEX_ENTRY_LEN)?;
        Ok(IndexEntry::decode(&buf)?)
    }

    /// Number of entries appended so far (0 if none).
    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }

    /// Logical index of the last written entry, or `None` if the file is
    /// empty.
    pub fn last_index(&self) -> Option<i64> {
        self.entry_count.checked_sub(1).map(|v| v as i64)
    }

    /// Truncates the last entry, if any exists; no-op otherwise.
    pub fn rollback(&mut self) -> Result<(), SegmentError> {
        if self.entry_count == 0 {
            return Ok(());
        }
        self.entry_count -= 1;
        let target = self.entry_count * INDEX_ENTRY_LEN as u64;
        self.file.truncate(target)?;
        Ok(())
    }

    pub fn close(&mut self) -> Result<(), SegmentError> {
        self.file.close()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::byte_file::MemByteFile;
    use tempfile::TempDir;

    #[test]
    fn byte_exact_layout() {
        let entry = IndexEntry {
            index: 1,
            metadata_offset: 100,
            metadata_size: 200,
        };
        let expected: [u8; INDEX_ENTRY_LEN] = [
            0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x64, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0xc8, 0x00, 0x00, 0x00,
        ];
        assert_eq!(entry.encode(), expected);
    }

    #[test]
    fn round_trip() {
        let entry = IndexEntry {
            index: 42,
            metadata_offset: 9001,
            metadata_size: 4096,
        };
        assert_eq!(IndexEntry::decode(&entry.encode()).unwrap(), entry);
    }

    #[test]
    fn last_index_tracks_appends_and_rollback() {
        let mem = MemByteFile::new("index");
        let mut file = IndexFile::with_byte_file(Box::new(mem), 0);
        assert_eq!(file.last_index(), None);

        file.write(&IndexEntry {
            index: 0,
            metadata_offset: 0,
            metadata_size: 36,
        })
        .unwrap();
        assert_eq!(file.last_index(), Some(0));

        file.write(&IndexEntry {
            index: 1,
            metadata_offset: 36,
            metadata_size: 36,
        })
        .unwrap();
        assert_eq!(file.last_index(), Some(1));

        let first = file.read(0).unwrap();
        assert_eq!(first.metadata_offset, 0);

        file.rollback().unwrap();
        assert_eq!(file.last_index(), Some(0));

        // Rolling back with nothing left beyond entry 0 still works, then a
        // second rollback empties the file.
        file.rollback().unwrap();
        assert_eq!(file.last_index(), None);
    }

    #[test]
    fn rollback_on_empty_file_is_noop() {
        let mem = MemByteFile::new("index");
        let mut file = IndexFile::with_byte_file(Box::new(mem), 0);
        file.rollback().unwrap();
        assert_eq!(file.last_index(), None);
    }

    #[test]
    fn open_reopens_existing_file_and_recovers_entry_count() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("index");
        {
            let mut file = IndexFile::open(&path, true).unwrap();
            file.write(&IndexEntry {
                index: 0,
                metadata_offset: 0,
                metadata_size: 36,
            })
            .unwrap();
            file.write(&IndexEntry {
                index: 1,
                metadata_offset: 36,
                metadata_size: 36,
            })
            .unwrap();
        }
        let reopened = IndexFile::open(&path, true).unwrap();
        assert_eq!(reopened.last_index(), Some(1));
    }

    #[test]
    fn sync_after_write_false_skips_sync() {
        let mem = MemByteFile::new("index");
        mem.fail_next_sync();
        let mut file = IndexFile {
            file: Box::new(mem),
            entry_count: 0,
            sync_after_write: false,
        };
        // The injected sync failure would surface here if `write` synced
        // unconditionally; with the flag off it must not be consulted.
        assert!(file
            .write(&IndexEntry {
                index: 0,
                metadata_offset: 0,
                metadata_size: 36,
            })
            .is_ok());
    }
}
