//! Error kinds shared across the storage engine's layers.
//!
//! Each layer gets its own narrow enum; the orchestrator composes them into
//! [`StorageError`] via `#[from]`, the way `nexus_wal::wal::WalError` composes
//! `nexus_wal::segment::SegmentError` in the sibling crate this was built from.

use std::io;
use thiserror::Error;

/// Errors from the raw byte-file abstraction (§4.1).
#[derive(Debug, Error)]
pub enum ByteFileError {
    #[error("file not found: {0}")]
    NotFound(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("short write: wrote {written} of {requested} bytes")]
    ShortWrite { written: usize, requested: usize },
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Errors from chunk/record/index encode-decode and segment I/O.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("buffer too short: need at least {need} bytes, got {got}")]
    TooShort { need: usize, got: usize },
    #[error("record size {total} is not 12 + 24*N for any integer N")]
    MisalignedChunkCount { total: u32 },
}

/// Errors surfaced by the segment layer.
#[derive(Debug, Error)]
pub enum SegmentError {
    #[error(transparent)]
    ByteFile(#[from] ByteFileError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("CRC mismatch in segment {segment_id} at offset {offset}: expected {expected:#010x}, got {actual:#010x}")]
    CrcMismatch {
        segment_id: u32,
        offset: u64,
        expected: u32,
        actual: u32,
    },
}

/// The orchestrator's public error type.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("storage is closed")]
    Lifecycle,
    #[error(transparent)]
    Segment(#[from] SegmentError),
    #[error(transparent)]
    ByteFile(#[from] ByteFileError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("decoded structure failed an invariant check: {0}")]
    Corruption(String),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// A later saga step failed and a compensating rollback of an earlier
    /// step also failed; both errors are preserved so the operator sees the
    /// full picture (spec §7: "compensation failure is combined").
    #[error("write failed ({original}) and rollback also failed ({rollback})")]
    Saga {
        original: Box<StorageError>,
        rollback: Box<StorageError>,
    },
}

impl StorageError {
    /// Combine an original failure with a rollback failure into one error,
    /// per the saga-compensation contract in spec §7.
    pub fn with_rollback_failure(original: StorageError, rollback: StorageError) -> Self {
        StorageError::Saga {
            original: Box::new(original),
            rollback: Box::new(rollback),
        }
    }
}
