//! File-backed buffer.
//!
//! Content lives in a regular file and is handed out one staging block at a
//! time, so a consumer walking `chunk` never pulls the whole file into
//! memory. Persistent buffers keep their file on drop (the cache relies on
//! this); temporary ones delete it.

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};

use super::{BufferImpl, Chunk};
use crate::error::{BufferError, Result};

/// Default staging block size.
pub const DEFAULT_BLOCK_SIZE: usize = 8192;

pub struct FileBackedBuffer {
    path: PathBuf,
    file: Mutex<File>,
    size: u64,
    block_size: usize,
    persistent: bool,
}

impl FileBackedBuffer {
    /// Create (or truncate) a persistent buffer at `path`.
    pub fn create<P: AsRef<Path>>(path: P, block_size: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        debug!("Created file buffer at {}", path.display());
        Ok(Self::from_parts(path, file, 0, block_size, true))
    }

    /// Open an existing file as a persistent buffer.
    pub fn open<P: AsRef<Path>>(path: P, block_size: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        let size = file.metadata()?.len();
        debug!("Opened file buffer at {} ({} bytes)", path.display(), size);
        Ok(Self::from_parts(path, file, size, block_size, true))
    }

    /// Create a uniquely named buffer in `dir` that is deleted on drop.
    pub fn temporary<P: AsRef<Path>>(dir: P, block_size: usize) -> Result<Self> {
        let path = dir
            .as_ref()
            .join(format!("databuffer-{}.tmp", uuid::Uuid::new_v4()));
        let mut buf = Self::create(path, block_size)?;
        buf.persistent = false;
        Ok(buf)
    }

    fn from_parts(path: PathBuf, file: File, size: u64, block_size: usize, persistent: bool) -> Self {
        Self {
            path,
            file: Mutex::new(file),
            size,
            block_size: block_size.max(1),
            persistent,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn is_persistent(&self) -> bool {
        self.persistent
    }

    /// Keep the backing file after the buffer is dropped.
    pub fn persist(&mut self) {
        self.persistent = true;
    }

    /// Flush written data to disk.
    pub fn sync(&self) -> Result<()> {
        self.file.lock().sync_data()?;
        Ok(())
    }

    /// Length of the staged range starting at `pos`: up to the end of the
    /// block containing it, bounded by the buffer size.
    fn staged_len(&self, pos: u64) -> u64 {
        let block = self.block_size as u64;
        (block - pos % block).min(self.size - pos)
    }

    fn read_at(&self, pos: u64, dst: &mut [u8]) -> io::Result<usize> {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(pos))?;
        let mut filled = 0;
        while filled < dst.len() {
            match file.read(&mut dst[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }
}

impl fmt::Debug for FileBackedBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileBackedBuffer")
            .field("path", &self.path)
            .field("size", &self.size)
            .field("block_size", &self.block_size)
            .field("persistent", &self.persistent)
            .finish()
    }
}

impl Drop for FileBackedBuffer {
    fn drop(&mut self) {
        if self.persistent {
            return;
        }
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!("Failed to remove temporary buffer {}: {}", self.path.display(), e);
            }
        }
    }
}

impl BufferImpl for FileBackedBuffer {
    fn size(&self) -> u64 {
        self.size
    }

    fn read(&self, pos: u64, dst: &mut [u8]) -> u64 {
        if pos >= self.size {
            return 0;
        }
        let len = (dst.len() as u64).min(self.size - pos) as usize;
        match self.read_at(pos, &mut dst[..len]) {
            Ok(n) => n as u64,
            Err(e) => {
                error!("Read from {} at {} failed: {}", self.path.display(), pos, e);
                0
            }
        }
    }

    /// A failed write that grew the file truncates it back to its old
    /// length. Bytes overwritten in place below the old length before the
    /// failure are not restored.
    fn write(&mut self, pos: u64, src: &[u8]) -> Result<u64> {
        let end = pos
            .checked_add(src.len() as u64)
            .ok_or_else(|| BufferError::exhausted(u64::MAX, "write range overflows"))?;

        let old_size = self.size;
        let mut file = self.file.lock();
        let result = (|| -> io::Result<()> {
            if end > old_size {
                // Extending first zero-fills the gap and surfaces ENOSPC
                // before any byte is overwritten.
                file.set_len(end)?;
            }
            file.seek(SeekFrom::Start(pos))?;
            file.write_all(src)
        })();

        if let Err(e) = result {
            if end > old_size {
                if let Err(restore) = file.set_len(old_size) {
                    error!("Failed to restore {} to {} bytes: {}", self.path.display(), old_size, restore);
                }
            }
            return Err(match BufferError::from(e) {
                BufferError::StorageExhausted { reason, .. } => BufferError::exhausted(end, reason),
                other => other,
            });
        }

        drop(file);
        self.size = self.size.max(end);
        Ok(src.len() as u64)
    }

    fn at(&self, pos: u64) -> Result<u8> {
        if pos >= self.size {
            return Err(BufferError::OutOfRange {
                pos,
                size: self.size,
            });
        }
        let mut byte = [0u8; 1];
        match self.read_at(pos, &mut byte)? {
            1 => Ok(byte[0]),
            _ => Err(BufferError::Io {
                message: format!("{} is shorter than {} bytes", self.path.display(), self.size),
            }),
        }
    }

    fn chunk(&self, pos: u64) -> Chunk<'_> {
        if pos >= self.size {
            return Chunk::empty();
        }
        let len = self.staged_len(pos) as usize;
        let mut block = BytesMut::zeroed(len);
        match self.read_at(pos, &mut block) {
            Ok(n) => {
                block.truncate(n);
                Chunk::Staged(block.freeze())
            }
            Err(e) => {
                error!("Staging block of {} at {} failed: {}", self.path.display(), pos, e);
                Chunk::Staged(Bytes::new())
            }
        }
    }

    fn segment(&self, pos: u64) -> (u64, u64) {
        if pos >= self.size {
            return (self.size, self.size);
        }
        (pos, pos + self.staged_len(pos))
    }

    fn resize(&mut self, size: u64) -> Result<()> {
        self.file.lock().set_len(size).map_err(|e| match BufferError::from(e) {
            BufferError::StorageExhausted { reason, .. } => BufferError::exhausted(size, reason),
            other => other,
        })?;
        self.size = size;
        Ok(())
    }

    fn filename(&self) -> Option<&Path> {
        Some(&self.path)
    }

    fn copy(&self) -> Result<Box<dyn BufferImpl>> {
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let mut copy = FileBackedBuffer::temporary(dir, self.block_size)?;
        let mut pos = 0;
        while pos < self.size {
            let chunk = self.chunk(pos);
            if chunk.is_empty() {
                return Err(BufferError::Io {
                    message: format!("{} ended early at {} bytes", self.path.display(), pos),
                });
            }
            copy.write(pos, &chunk)?;
            pos += chunk.len() as u64;
        }
        debug!("Copied {} into {}", self.path.display(), copy.path.display());
        Ok(Box::new(copy))
    }
}
