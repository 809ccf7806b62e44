//! Segment (§4.3): one append-only OS file per numeric segment id, holding
//! raw payload bytes back-to-back with no framing. Framing lives entirely in
//! the metadata file.
//!
//! `open` seeds `size`/`offset` from the file's current on-disk length, so
//! reopening a directory with existing segment data resumes appending at the
//! true end of file instead of overwriting it (SPEC_FULL.md §9 resolution 2
//! still keeps segment-*content* crash recovery — reconciling a torn last
//! write — out of scope; this is just correct placement on a clean reopen).
//! Grounded on `nexus_wal::wal::WalEngine::discover_segments`'s stat-on-open
//! behavior and the original `internal/file.File` constructor, generalized
//! from one record per append to one arbitrary-length chunk per append, and
//! on `internal/segment/segment.go`'s `Append`/`Read` pair.

use std::path::{Path, PathBuf};

use crate::byte_file::{ensure_parent_dir, ByteFile, OsByteFile};
use crate::crc::crc32;
use crate::error::{ByteFileError, SegmentError};
use crate::record::LogMetadata;

pub(crate) const SEGMENT_FILE_PREFIX: &str = "segment_";

/// Builds the on-disk filename for segment `id` under `base_path`.
pub fn segment_path(base_path: &Path, id: u32) -> PathBuf {
    base_path.join(format!("{SEGMENT_FILE_PREFIX}{id}"))
}

/// An append-only, randomly-readable payload store with a numeric id.
pub struct Segment {
    id: u32,
    size: u64,
    offset: u64,
    file: Box<dyn ByteFile>,
    sync_after_write: bool,
}

impl Segment {
    /// Opens (creating if absent) `segment_<id>` under `base_path`, seeding
    /// `size`/`offset` from the file's current length so a reopened segment
    /// with existing data keeps appending past it rather than from zero.
    pub fn open(id: u32, base_path: &Path, sync_after_write: bool) -> Result<Self, SegmentError> {
        let path = segment_path(base_path, id);
        ensure_parent_dir(&path).map_err(ByteFileError::Io)?;
        let file = OsByteFile::open(&path)?;
        let existing_size = file.size()?;
        Ok(Self {
            id,
            size: existing_size,
            offset: existing_size,
            file: Box::new(file),
            sync_after_write,
        })
    }

    /// Construct directly over an arbitrary [`ByteFile`] starting empty
    /// (used by the orchestrator's own tests to inject a `MemByteFile`).
    pub fn with_byte_file(id: u32, file: Box<dyn ByteFile>) -> Self {
        Self {
            id,
            size: 0,
            offset: 0,
            file,
            sync_after_write: true,
        }
    }

    /// Appends `payload` (one chunk of a logical write), syncs unless
    /// `sync_after_write` is disabled, and returns the [`LogMetadata`] chunk
    /// descriptor the caller should fold into the enclosing `MetadataRecord`.
    pub fn append(&mut self, payload: &[u8], sequence: u32) -> Result<LogMetadata, SegmentError> {
        let offset_before = self.offset;
        self.file.write(payload)?;
        if self.sync_after_write {
            self.file.sync()?;
        }

        let crc = crc32(payload);
        let metadata = LogMetadata {
            segment_id: self.id,
            size: payload.len() as u32,
            sequence,
            crc,
            offset: offset_before,
        };

        self.offset += payload.len() as u64;
        self.size += payload.len() as u64;
        Ok(metadata)
    }

    /// Random-reads `len` bytes at `offset`. Chunk reassembly happens at the
    /// orchestrator level, not here.
    pub fn read(&self, offset: u64, len: usize) -> Result<Vec<u8>, SegmentError> {
        Ok(self.file.read_at(offset, len)?)
    }

    /// Random-reads `len` bytes at `offset` and verifies they recompute to
    /// `expected_crc`, raising [`SegmentError::CrcMismatch`] otherwise.
    pub fn read_verified(
        &self,
        offset: u64,
        len: usize,
        expected_crc: u32,
    ) -> Result<Vec<u8>, SegmentError> {
        let bytes = self.read(offset, len)?;
        let actual = crc32(&bytes);
        if actual != expected_crc {
            return Err(SegmentError::CrcMismatch {
                segment_id: self.id,
                offset,
                expected: expected_crc,
                actual,
            });
        }
        Ok(bytes)
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    /// Bytes written to this segment, including any seeded from an existing
    /// on-disk file at `open`.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Cumulative write offset within the file (equals `size` for a fresh
    /// segment; kept distinct because spec §3 names both).
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn sync(&mut self) -> Result<(), SegmentError> {
        self.file.sync()?;
        Ok(())
    }

    pub fn close(&mut self) -> Result<(), SegmentError> {
        self.file.close()?;
        Ok(())
    }
}
