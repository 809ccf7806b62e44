//! Segment set: owns the active segment and the segment-id counter, creates
//! new segments on rotation, and opens past segments on demand for reads.
//!
//! Grounded on `nexus_wal::wal::WalEngine`'s `ensure_active_writer` /
//! `rotate_segment` pair, generalized from "one event per append, rotate
//! when the segment crosses its size limit" to "one or more chunks per
//! logical write, rotate mid-write when a chunk would overflow the active
//! segment" (spec §4.6.1's chunk-size policy). `open` additionally discovers
//! the highest-numbered `segment_<id>` file already on disk — mirroring
//! `WalEngine::discover_segments` and the Go `internal/file.File`
//! constructor's stat-on-open — so a reopened storage directory resumes
//! appending to the right segment instead of silently restarting at 0.

use std::path::{Path, PathBuf};

use crate::error::{ByteFileError, SegmentError};
use crate::segment::{Segment, SEGMENT_FILE_PREFIX};

/// Owns the currently writable segment and hands out read-only handles to
/// older, already-rotated-past segments.
pub struct SegmentSet {
    base_path: PathBuf,
    active: Segment,
    next_id: u32,
    sync_after_write: bool,
}

/// Highest `<id>` among `segment_<id>` files already present under
/// `base_path`, or `None` if the directory has no segment files yet.
fn discover_max_segment_id(base_path: &Path) -> Result<Option<u32>, SegmentError> {
    let mut max_id = None;
    let entries = match std::fs::read_dir(base_path) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(ByteFileError::Io(e).into()),
    };
    for entry in entries {
        let entry = entry.map_err(ByteFileError::Io)?;
        let name = entry.file_name();
        let Some(id_str) = name.to_string_lossy().strip_prefix(SEGMENT_FILE_PREFIX) else {
            continue;
        };
        if let Ok(id) = id_str.parse::<u32>() {
            max_id = Some(max_id.map_or(id, |m: u32| m.max(id)));
        }
    }
    Ok(max_id)
}

impl SegmentSet {
    /// Opens the highest-numbered existing segment as active, or `segment_0`
    /// if `base_path` has none yet.
    pub fn open(base_path: &Path, sync_after_write: bool) -> Result<Self, SegmentError> {
        let active_id = discover_max_segment_id(base_path)?.unwrap_or(0);
        let active = Segment::open(active_id, base_path, sync_after_write)?;
        Ok(Self {
            base_path: base_path.to_path_buf(),
            active,
            next_id: active_id + 1,
            sync_after_write,
        })
    }

    /// The currently writable segment.
    pub fn active(&mut self) -> &mut Segment {
        &mut self.active
    }

    pub fn active_id(&self) -> u32 {
        self.active.id()
    }

    /// Closes/syncs the active segment and opens a fresh one, becoming the
    /// new active segment. Returns the new segment's id.
    pub fn rotate(&mut self) -> Result<u32, SegmentError> {
        self.active.sync()?;
        let new_id = self.next_id;
        self.next_id += 1;
        self.active = Segment::open(new_id, &self.base_path, self.sync_after_write)?;
        Ok(new_id)
    }

    /// Reads `len` bytes at `offset` from segment `id`. Reuses the active
    /// segment's handle when `id` matches it (avoiding a second open file
    /// descriptor on the same path); otherwise opens a short-lived read-only
    /// handle to the historical segment.
    pub fn read(&self, id: u32, offset: u64, len: usize) -> Result<Vec<u8>, SegmentError> {
        if id == self.active.id() {
            return self.active.read(offset, len);
        }
        let handle = Segment::open(id, &self.base_path, self.sync_after_write)?;
        handle.read(offset, len)
    }

    /// As [`Self::read`], but verifies the chunk's CRC-32 before returning.
    pub fn read_verified(
        &self,
        id: u32,
        offset: u64,
        len: usize,
        expected_crc: u32,
    ) -> Result<Vec<u8>, SegmentError> {
        if id == self.active.id() {
            return self.active.read_verified(offset, len, expected_crc);
        }
        let handle = Segment::open(id, &self.base_path, self.sync_after_write)?;
        handle.read_verified(offset, len, expected_crc)
    }

    pub fn close(&mut self) -> Result<(), SegmentError> {
        self.active.close()
    }
}
