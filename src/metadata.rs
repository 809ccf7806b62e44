//! Metadata file (§4.4): variable-length records, each describing one
//! logical write's ordered list of chunk descriptors.
//!
//! On-disk record layout, fixed per spec §9 Open Question 4 (the original Go
//! implementation's `buf[8:]`-vs-12-byte-header ambiguity): a 12-byte header
//! — `[0..4)=Size:u32 BE`, `[4..12)=Index:u64 BE` — followed by `N` 24-byte
//! [`LogMetadata`](crate::record::LogMetadata) entries in sequence order.

use crate::byte_file::{ensure_parent_dir, ByteFile, OsByteFile};
use crate::error::{ByteFileError, CodecError, SegmentError};
use crate::record::{LogMetadata, LOG_METADATA_LEN};

/// Byte width of the metadata record header (Size:u32 + Index:u64).
pub const METADATA_HEADER_LEN: usize = 12;

/// One logical write's full chunk list, as stored in the metadata file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataRecord {
    pub index: u64,
    pub chunks: Vec<LogMetadata>,
}

impl MetadataRecord {
    pub fn new(index: u64, chunks: Vec<LogMetadata>) -> Self {
        Self { index, chunks }
    }

    /// Total encoded length: `12 + 24 * chunks.len()`.
    pub fn encoded_len(&self) -> usize {
        METADATA_HEADER_LEN + self.chunks.len() * LOG_METADATA_LEN
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        buf.extend_from_slice(&(self.encoded_len() as u32).to_be_bytes());
        buf.extend_from_slice(&self.index.to_be_bytes());
        for chunk in &self.chunks {
            buf.extend_from_slice(&chunk.encode());
        }
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self, CodecError> {
        if buf.len() < METADATA_HEADER_LEN {
            return Err(CodecError::TooShort {
                need: METADATA_HEADER_LEN,
                got: buf.len(),
            });
        }
        let total_size = u32::from_be_bytes(buf[0..4].try_into().unwrap());
        let index = u64::from_be_bytes(buf[4..12].try_into().unwrap());

        if (total_size as usize) < METADATA_HEADER_LEN {
            return Err(CodecError::MisalignedChunkCount { total: total_size });
        }
        let body_len = total_size as usize - METADATA_HEADER_LEN;
        if body_len % LOG_METADATA_LEN != 0 {
            return Err(CodecError::MisalignedChunkCount { total: total_size });
        }
        let chunk_count = body_len / LOG_METADATA_LEN;

        if buf.len() < total_size as usize {
            return Err(CodecError::TooShort {
                need: total_size as usize,
                got: buf.len(),
            });
        }

        let mut chunks = Vec::with_capacity(chunk_count);
        for i in 0..chunk_count {
            let start = METADATA_HEADER_LEN + i * LOG_METADATA_LEN;
            let end = start + LOG_METADATA_LEN;
            chunks.push(LogMetadata::decode(&buf[start..end])?);
        }

        Ok(Self { index, chunks })
    }
}

/// Appends and reads `MetadataRecord`s, tracking the running append offset
/// so callers get back the byte offset a just-written record began at (used
/// to build the corresponding `IndexEntry`).
pub struct MetadataFile {
    file: Box<dyn ByteFile>,
    offset: u64,
    last_record_len: Option<u64>,
    sync_after_write: bool,
}

impl MetadataFile {
    pub fn open(
        path: impl AsRef<std::path::Path>,
        sync_after_write: bool,
    ) -> Result<Self, SegmentError> {
        let path = path.as_ref();
        ensure_parent_dir(path).map_err(ByteFileError::Io)?;
        let file = OsByteFile::open(path)?;
        let offset = file.size()?;
        Ok(Self {
            file: Box::new(file),
            offset,
            last_record_len: None,
            sync_after_write,
        })
    }

    /// Construct directly over an arbitrary [`ByteFile`] (used by storage
    /// orchestrator tests to inject a [`crate::byte_file::MemByteFile`]).
    /// Always syncs on write; use [`Self::open`] to control that.
    pub fn with_byte_file(file: Box<dyn ByteFile>, offset: u64) -> Self {
        Self {
            file,
            offset,
            last_record_len: None,
            sync_after_write: true,
        }
    }

    /// Appends `record`, syncs unless `sync_after_write` is disabled, and
    /// returns the byte offset it begins at.
    pub fn write(&mut self, record: &MetadataRecord) -> Result<u64, SegmentError> {
        let begin = self.offset;
        let buf = record.encode();
        self.file.write(&buf)?;
        if self.sync_after_write {
            self.file.sync()?;
        }
        self.offset += buf.len() as u64;
        self.last_record_len = Some(buf.len() as u64);
        Ok(begin)
    }

    pub fn read(&self, offset: u64, len: u32) -> Result<MetadataRecord, SegmentError> {
        let buf = self.file.read_at(offset, len as usize)?;
        Ok(MetadataRecord::decode(&buf)?)
    }

    pub fn last_offset(&self) -> u64 {
        self.offset
    }

    /// Undoes the last append by truncating exactly the last record's
    /// encoded length. No-op if nothing has been written yet.
    pub fn rollback(&mut self) -> Result<(), SegmentError> {
        let Some(len) = self.last_record_len.take() else {
            return Ok(());
        };
        let target = self.offset.saturating_sub(len);
        self.file.truncate(target)?;
        self.offset = target;
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

    fn sample_chunk(seq: u32) -> LogMetadata {
        LogMetadata {
            segment_id: 0,
            size: 5,
            sequence: seq,
            crc: 42,
            offset: (seq as u64) * 5,
        }
    }

    #[test]
    fn encode_decode_round_trip() {
        let record = MetadataRecord::new(3, vec![sample_chunk(0), sample_chunk(1)]);
        let encoded = record.encode();
        assert_eq!(encoded.len(), record.encoded_len());
        let decoded = MetadataRecord::decode(&encoded).unwrap();
        assert_eq!(record, decoded);
    }

    #[test]
    fn rejects_misaligned_body() {
        let mut buf = vec![0u8; METADATA_HEADER_LEN];
        buf[0..4].copy_from_slice(&(METADATA_HEADER_LEN as u32 + 10).to_be_bytes());
        buf.extend_from_slice(&[0u8; 10]);
        let err = MetadataRecord::decode(&buf).unwrap_err();
        assert!(matches!(err, CodecError::MisalignedChunkCount { .. }));
    }

    #[test]
    fn write_read_and_rollback_on_mem_backend() {
        let mem = MemByteFile::new("metadata");
        let mut file = MetadataFile::with_byte_file(Box::new(mem), 0);

        let r1 = MetadataRecord::new(0, vec![sample_chunk(0)]);
        let off1 = file.write(&r1).unwrap();
        assert_eq!(off1, 0);

        let r2 = MetadataRecord::new(1, vec![sample_chunk(0), sample_chunk(1)]);
        let off2 = file.write(&r2).unwrap();
        assert_eq!(off2, r1.encoded_len() as u64);

        let read_back = file.read(off2, r2.encoded_len() as u32).unwrap();
        assert_eq!(read_back, r2);

        file.rollback().unwrap();
        assert_eq!(file.last_offset(), off2);

        let read_first = file.read(off1, r1.encoded_len() as u32).unwrap();
        assert_eq!(read_first, r1);
    }

    #[test]
    fn rollback_without_writes_is_noop() {
        let mem = MemByteFile::new("metadata");
        let mut file = MetadataFile::with_byte_file(Box::new(mem), 0);
        file.rollback().unwrap();
        assert_eq!(file.last_offset(), 0);
    }

    #[test]
    fn sync_after_write_false_skips_sync() {
        let mem = MemByteFile::new("metadata");
        mem.fail_next_sync();
        let mut file = MetadataFile {
            file: Box::new(mem),
            offset: 0,
            last_record_len: None,
            sync_after_write: false,
        };
        // The injected sync failure would surface here if `write` synced
        // unconditionally; with the flag off it must not be consulted.
        assert!(file.write(&MetadataRecord::new(0, vec![sample_chunk(0)])).is_ok());
    }

    #[test]
    fn open_reopens_existing_file_at_its_size() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("metadata");
        {
            let mut file = MetadataFile::open(&path, true).unwrap();
            file.write(&MetadataRecord::new(0, vec![sample_chunk(0)]))
                .unwrap();
        }
        let reopened = MetadataFile::open(&path, true).unwrap();
        assert!(reopened.last_offset() > 0);
    }
}
