//! Byte-file abstraction (§4.1).
//!
//! A narrow append/read-at/sync/truncate interface over a single file,
//! uniform enough that the storage orchestrator never touches `std::fs`
//! directly. [`OsByteFile`] is the production backend; [`MemByteFile`] is an
//! in-process backend used by the orchestrator's own unit tests to inject
//! short writes and sync failures without touching disk — the "dynamic file
//! abstraction" called for in the design notes, grounded in the trait split
//! between `kimberlite-io::IoBackend` and its `SyncBackend` impl, generalized
//! from a handle-registry backend to one backend instance per open file
//! (matching the simpler one-`Segment`-one-file model this engine uses).

use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::ByteFileError;

/// Uniform operations over one append-only, randomly-readable file.
pub trait ByteFile: Send + Sync {
    /// Appends `bytes` to the end of the file. Errors (including short
    /// writes) must NOT be silently swallowed — partial writes are reported
    /// as [`ByteFileError::ShortWrite`].
    fn write(&mut self, bytes: &[u8]) -> Result<(), ByteFileError>;

    /// Reads exactly `len` bytes starting at `offset`.
    fn read_at(&self, offset: u64, len: usize) -> Result<Vec<u8>, ByteFileError>;

    /// Flushes OS buffers to stable storage.
    fn sync(&mut self) -> Result<(), ByteFileError>;

    /// Current file size in bytes.
    fn size(&self) -> Result<u64, ByteFileError>;

    /// Truncates the file to exactly `n` bytes.
    fn truncate(&mut self, n: u64) -> Result<(), ByteFileError>;

    /// The path this handle was opened against.
    fn path(&self) -> &Path;

    /// Releases the underlying resource. Implementations should sync first.
    fn close(&mut self) -> Result<(), ByteFileError>;
}

/// Production backend: one `std::fs::File`, opened create-or-append,
/// read-writable, exactly as spec §4.1 requires.
pub struct OsByteFile {
    file: File,
    path: PathBuf,
}

impl OsByteFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ByteFileError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| map_open_error(e, &path))?;
        Ok(Self { file, path })
    }
}

fn map_open_error(e: io::Error, path: &Path) -> ByteFileError {
    match e.kind() {
        ErrorKind::NotFound => ByteFileError::NotFound(path.display().to_string()),
        ErrorKind::PermissionDenied => {
            ByteFileError::PermissionDenied(path.display().to_string())
        }
        _ => ByteFileError::Io(e),
    }
}

impl ByteFile for OsByteFile {
    fn write(&mut self, bytes: &[u8]) -> Result<(), ByteFileError> {
        use std::io::{Seek, SeekFrom, Write};
        self.file.seek(SeekFrom::End(0))?;
        let written = self.file.write(bytes)?;
        if written != bytes.len() {
            return Err(ByteFileError::ShortWrite {
                written,
                requested: bytes.len(),
            });
        }
        Ok(())
    }

    fn read_at(&self, offset: u64, len: usize) -> Result<Vec<u8>, ByteFileError> {
        let mut buf = vec![0u8; len];
        #[cfg(unix)]
        {
            use std::os::unix::fs::FileExt;
            self.file.read_exact_at(&mut buf, offset)?;
        }
        #[cfg(not(unix))]
        {
            use std::io::{Read, Seek, SeekFrom};
            let mut file = self.file.try_clone()?;
            file.seek(SeekFrom::Start(offset))?;
            file.read_exact(&mut buf)?;
        }
        Ok(buf)
    }

    fn sync(&mut self) -> Result<(), ByteFileError> {
        self.file.sync_all()?;
        Ok(())
    }

    fn size(&self) -> Result<u64, ByteFileError> {
        Ok(self.file.metadata()?.len())
    }

    fn truncate(&mut self, n: u64) -> Result<(), ByteFileError> {
        self.file.set_len(n)?;
        Ok(())
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn close(&mut self) -> Result<(), ByteFileError> {
        self.sync()
    }
}

/// In-memory backend used only by this crate's own tests. Supports fault
/// injection (`fail_next_write`, `fail_next_sync`) to exercise the
/// rollback-atomicity property (spec §8, property 5) deterministically.
pub struct MemByteFile {
    path: PathBuf,
    inner: Mutex<Vec<u8>>,
    fail_next_write: Mutex<bool>,
    fail_next_sync: Mutex<bool>,
}

impl MemByteFile {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            inner: Mutex::new(Vec::new()),
            fail_next_write: Mutex::new(false),
            fail_next_sync: Mutex::new(false),
        }
    }

    /// Arranges for the next `write` call to fail with a short write.
    pub fn fail_next_write(&self) {
        *self.fail_next_write.lock().unwrap() = true;
    }

    /// Arranges for the next `sync` call to fail.
    pub fn fail_next_sync(&self) {
        *self.fail_next_sync.lock().unwrap() = true;
    }
}

impl ByteFile for MemByteFile {
    fn write(&mut self, bytes: &[u8]) -> Result<(), ByteFileError> {
        let mut should_fail = self.fail_next_write.lock().unwrap();
        if *should_fail {
            *should_fail = false;
            return Err(ByteFileError::ShortWrite {
                written: 0,
                requested: bytes.len(),
            });
        }
        drop(should_fail);
        self.inner.lock().unwrap().extend_from_slice(bytes);
        Ok(())
    }

    fn read_at(&self, offset: u64, len: usize) -> Result<Vec<u8>, ByteFileError> {
        let buf = self.inner.lock().unwrap();
        let start = offset as usize;
        let end = start + len;
        if end > buf.len() {
            return Err(ByteFileError::Io(io::Error::new(
                ErrorKind::UnexpectedEof,
                "read past end of in-memory file",
            )));
        }
        Ok(buf[start..end].to_vec())
    }

    fn sync(&mut self) -> Result<(), ByteFileError> {
        let mut should_fail = self.fail_next_sync.lock().unwrap();
        if *should_fail {
            *should_fail = false;
            return Err(ByteFileError::Io(io::Error::other("simulated sync failure")));
        }
        Ok(())
    }

    fn size(&self) -> Result<u64, ByteFileError> {
        Ok(self.inner.lock().unwrap().len() as u64)
    }

    fn truncate(&mut self, n: u64) -> Result<(), ByteFileError> {
        self.inner.lock().unwrap().truncate(n as usize);
        Ok(())
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn close(&mut self) -> Result<(), ByteFileError> {
        Ok(())
    }
}

/// Ensures the parent directory of `path` exists before a file is opened
/// there. Used by [`OsByteFile`] callers in the segment/metadata/index
/// layers so `Storage::open` can create the base directory on first run.
pub fn ensure_parent_dir(path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}
