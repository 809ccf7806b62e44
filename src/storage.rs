//! Storage orchestrator (§4.6): the public API. Coordinates the segment
//! set, metadata file, and index file; enforces the write saga's rollback
//! protocol; serializes concurrent access behind one readers-writer lock.
//!
//! Grounded on `nexus_wal::wal::WalEngine` for the open/rotate/lock shape,
//! generalized from "one record per append" to "one logical write split
//! across N chunks" per the original `wal.go`'s `Storage` interface.

use std::path::{Path, PathBuf};

use parking_lot::RwLock;

use crate::error::{SegmentError, StorageError};
use crate::index::{IndexEntry, IndexFile};
use crate::metadata::{MetadataFile, MetadataRecord};
use crate::record::LogMetadata;
use crate::segment_set::SegmentSet;

/// Construction-time configuration (§6 "Configuration").
#[derive(Debug, Clone)]
pub struct StorageOptions {
    /// Base directory; must exist (or be creatable) before `open`.
    pub path: PathBuf,
    /// Maximum bytes per segment; governs the chunk-size policy (§4.6.1).
    pub segment_file_size: u64,
    /// Whether each write issues an fsync-equivalent. Defaults to `true`;
    /// set `false` to relax durability for benchmarking.
    pub sync_after_write: bool,
}

impl StorageOptions {
    pub fn new(path: impl Into<PathBuf>, segment_file_size: u64) -> Self {
        Self {
            path: path.into(),
            segment_file_size,
            sync_after_write: true,
        }
    }

    fn validate(&self) -> Result<(), StorageError> {
        if self.segment_file_size == 0 {
            return Err(StorageError::Config(
                "segment_file_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

struct StorageInner {
    segments: SegmentSet,
    metadata: MetadataFile,
    index: IndexFile,
    closed: bool,
}

/// The durable, append-only write-ahead log's public handle.
pub struct Storage {
    options: StorageOptions,
    inner: RwLock<StorageInner>,
}

impl Storage {
    /// Opens (creating if absent) a storage directory at `options.path`.
    /// Reopening a directory with existing data resumes the active segment
    /// at its true on-disk length and the index at its true entry count
    /// rather than restarting numbering from zero.
    pub fn open(options: StorageOptions) -> Result<Self, StorageError> {
        options.validate()?;
        std::fs::create_dir_all(&options.path)?;

        let segments = SegmentSet::open(&options.path, options.sync_after_write)?;
        let metadata = MetadataFile::open(metadata_path(&options.path), options.sync_after_write)?;
        let index = IndexFile::open(index_path(&options.path), options.sync_after_write)?;

        tracing::debug!(
            path = %options.path.display(),
            segment_file_size = options.segment_file_size,
            last_index = ?index.last_index(),
            "storage opened"
        );

        Ok(Self {
            options,
            inner: RwLock::new(StorageInner {
                segments,
                metadata,
                index,
                closed: false,
            }),
        })
    }

    /// Writes `payload`, splitting it across one or more segment chunks per
    /// the chunk-size policy (§4.6.1), and returns its logical index.
    ///
    /// On a failure at the metadata step, the index file is (trivially)
    /// rolled back and the error is returned. On a failure at the index
    /// step, the metadata record just written is rolled back; if that
    /// rollback itself fails, both errors are combined (§7).
    pub fn write(&self, payload: &[u8]) -> Result<i64, StorageError> {
        let mut inner = self.inner.write();
        if inner.closed {
            return Err(StorageError::Lifecycle);
        }

        let k = inner.index.entry_count() as i64;
        let chunks = split_and_append(
            &mut inner.segments,
            payload,
            self.options.segment_file_size,
        )?;

        let record = MetadataRecord::new(k as u64, chunks);
        let metadata_offset = match inner.metadata.write(&record) {
            Ok(offset) => offset,
            Err(e) => {
                // Nothing beyond segment bytes is externally observable yet;
                // the index rollback is a contractual no-op at this stage.
                inner.index.rollback()?;
                return Err(e.into());
            }
        };

        let entry = IndexEntry {
            index: k,
            metadata_offset: metadata_offset as i64,
            metadata_size: record.encoded_len() as u32,
        };
        if let Err(e) = inner.index.write(&entry) {
            return match inner.metadata.rollback() {
                Ok(()) => Err(e.into()),
                Err(rollback_err) => Err(StorageError::with_rollback_failure(
                    e.into(),
                    rollback_err.into(),
                )),
            };
        }

        tracing::trace!(index = k, chunks = record.chunks.len(), "write committed");
        Ok(k)
    }

    /// Reads the complete payload previously returned by `write`. Each
    /// chunk's CRC-32 is reverified against its recorded checksum; a
    /// mismatch surfaces as [`crate::error::SegmentError::CrcMismatch`]
    /// (wrapped in `StorageError::Segment`).
    pub fn read(&self, index: i64) -> Result<Vec<u8>, StorageError> {
        let inner = self.inner.read();
        if inner.closed {
            return Err(StorageError::Lifecycle);
        }

        let entry = inner.index.read(index)?;
        let record = match inner
            .metadata
            .read(entry.metadata_offset as u64, entry.metadata_size)
        {
            Ok(record) => record,
            Err(SegmentError::Codec(e)) => {
                return Err(StorageError::Corruption(format!(
                    "malformed metadata record for index {index}: {e}"
                )));
            }
            Err(e) => return Err(e.into()),
        };

        let mut chunks = record.chunks;
        chunks.sort_by_key(|c| c.sequence);

        let mut buf = Vec::new();
        for chunk in &chunks {
            let bytes = inner.segments.read_verified(
                chunk.segment_id,
                chunk.offset,
                chunk.size as usize,
                chunk.crc,
            )?;
            buf.extend_from_slice(&bytes);
        }
        Ok(buf)
    }

    /// Forces an out-of-band fsync of the active segment.
    pub fn sync(&self) -> Result<(), StorageError> {
        let mut inner = self.inner.write();
        if inner.closed {
            return Err(StorageError::Lifecycle);
        }
        inner.segments.active().sync()?;
        Ok(())
    }

    /// `true` while open and usable; `false` once `close` has run.
    pub fn health_check(&self) -> bool {
        !self.inner.read().closed
    }

    /// Logical index of the last successful write, or `None` if empty.
    pub fn last_index(&self) -> Option<i64> {
        self.inner.read().index.last_index()
    }

    /// Flushes and closes all three files plus the active segment.
    pub fn close(&self) -> Result<(), StorageError> {
        let mut inner = self.inner.write();
        if inner.closed {
            return Ok(());
        }
        inner.segments.close()?;
        inner.metadata.close()?;
        inner.index.close()?;
        inner.closed = true;
        tracing::debug!(path = %self.options.path.display(), "storage closed");
        Ok(())
    }
}

fn metadata_path(base: &Path) -> PathBuf {
    base.join("metadata")
}

fn index_path(base: &Path) -> PathBuf {
    base.join("index")
}

/// Implements the chunk-size policy (§4.6.1): split `payload` across one or
/// more chunks, appending each to the active segment and rotating the
/// segment set whenever a chunk would otherwise overflow it.
fn split_and_append(
    segments: &mut SegmentSet,
    payload: &[u8],
    segment_file_size: u64,
) -> Result<Vec<LogMetadata>, StorageError> {
    let mut chunks = Vec::new();
    let mut cursor = 0usize;
    let mut remaining = payload.len() as u64;
    let mut sequence = 0u32;

    // A zero-length payload still produces exactly one (empty) chunk so the
    // round-trip and chunking-coverage invariants hold uniformly.
    if payload.is_empty() {
        let meta = segments.active().append(&[], 0)?;
        return Ok(vec![meta]);
    }

    while remaining > 0 {
        let used = segments.active().size();
        let (len, rotate_after) = if remaining > segment_file_size {
            (segment_file_size, true)
        } else if remaining + used > segment_file_size {
            (segment_file_size - used, true)
        } else {
            (remaining, false)
        };

        if len == 0 {
            // Active segment is already full; rotate before placing any
            // bytes into the (now empty) new segment.
            segments.rotate()?;
            continue;
        }

        let len = len as usize;
        let chunk_bytes = &payload[cursor..cursor + len];
        let meta = segments.active().append(chunk_bytes, sequence)?;
        chunks.push(meta);

        cursor += len;
        remaining -= len as u64;
        sequence += 1;

        if rotate_after {
            segments.rotate()?;
        }
    }

    Ok(chunks)
}
