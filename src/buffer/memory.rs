//! Contiguous in-memory buffer.

use parking_lot::{RwLock, RwLockReadGuard};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use super::{find_in, is_trimmable, BufferImpl, Chunk};
use crate::error::{BufferError, Result};

/// Buffer backed by one growable vector.
///
/// The vector is itself shared: [`InMemoryBuffer::share`] produces a second
/// implementation over the same bytes, while [`BufferImpl::copy`] duplicates
/// them.
pub struct InMemoryBuffer {
    data: Arc<RwLock<Vec<u8>>>,
    limit: Option<u64>,
}

impl InMemoryBuffer {
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(Vec::new())),
            limit: None,
        }
    }

    /// Buffer of `size` zero bytes.
    pub fn with_size(size: u64) -> Result<Self> {
        let mut buf = Self::new();
        buf.resize(size)?;
        Ok(buf)
    }

    /// Refuse to grow past `limit` bytes; such writes and resizes fail with
    /// `StorageExhausted`.
    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Shallow duplicate aliasing the same storage.
    pub fn share(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
            limit: self.limit,
        }
    }

    /// Borrow the whole content.
    pub fn as_slice(&self) -> RwLockReadGuard<'_, Vec<u8>> {
        self.data.read_recursive()
    }

    /// Validate that the buffer may grow to `requested` bytes and return it
    /// as an index.
    fn check_growth(&self, requested: u64) -> Result<usize> {
        if let Some(limit) = self.limit {
            if requested > limit {
                return Err(BufferError::exhausted(
                    requested,
                    format!("in-memory limit of {} bytes", limit),
                ));
            }
        }
        usize::try_from(requested)
            .map_err(|_| BufferError::exhausted(requested, "size exceeds address space"))
    }
}

impl Default for InMemoryBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Vec<u8>> for InMemoryBuffer {
    fn from(data: Vec<u8>) -> Self {
        Self {
            data: Arc::new(RwLock::new(data)),
            limit: None,
        }
    }
}

impl fmt::Debug for InMemoryBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryBuffer")
            .field("size", &self.size())
            .field("limit", &self.limit)
            .finish()
    }
}

/// Grow `data` to `new_len` zero-filled bytes, reserving first so a failed
/// allocation leaves it unchanged.
fn grow(data: &mut Vec<u8>, new_len: usize) -> Result<()> {
    if new_len > data.len() {
        data.try_reserve(new_len - data.len())
            .map_err(|e| BufferError::exhausted(new_len as u64, e.to_string()))?;
        data.resize(new_len, 0);
    }
    Ok(())
}

impl BufferImpl for InMemoryBuffer {
    fn size(&self) -> u64 {
        self.data.read_recursive().len() as u64
    }

    fn read(&self, pos: u64, dst: &mut [u8]) -> u64 {
        let data = self.data.read_recursive();
        let size = data.len() as u64;
        if pos >= size {
            return 0;
        }
        let start = pos as usize;
        let len = dst.len().min(data.len() - start);
        dst[..len].copy_from_slice(&data[start..start + len]);
        len as u64
    }

    fn write(&mut self, pos: u64, src: &[u8]) -> Result<u64> {
        let len = src.len() as u64;
        let end = pos
            .checked_add(len)
            .ok_or_else(|| BufferError::exhausted(u64::MAX, "write range overflows"))?;

        let mut data = self.data.write();
        if end > data.len() as u64 {
            let new_len = self.check_growth(end)?;
            grow(&mut data, new_len)?;
        }
        let start = pos as usize;
        data[start..start + src.len()].copy_from_slice(src);
        Ok(len)
    }

    fn at(&self, pos: u64) -> Result<u8> {
        let data = self.data.read_recursive();
        usize::try_from(pos)
            .ok()
            .and_then(|i| data.get(i).copied())
            .ok_or(BufferError::OutOfRange {
                pos,
                size: data.len() as u64,
            })
    }

    fn find(&self, begin: u64, end: u64, needle: &[u8]) -> u64 {
        let data = self.data.read_recursive();
        let size = data.len() as u64;
        if needle.is_empty() {
            return begin;
        }
        let end = end.min(size);
        if begin >= end {
            return size;
        }
        find_in(&data[begin as usize..end as usize], needle)
            .map(|offset| begin + offset as u64)
            .unwrap_or(size)
    }

    fn trim(&self, begin: u64, end: u64) -> (u64, u64) {
        let data = self.data.read_recursive();
        let end = end.min(data.len() as u64);
        if begin >= end {
            return (end, end);
        }
        let range = &data[begin as usize..end as usize];
        let Some(first) = range.iter().position(|&b| !is_trimmable(b)) else {
            return (end, end);
        };
        // `first` exists, so a last non-trimmable byte exists too.
        let last = range.iter().rposition(|&b| !is_trimmable(b)).unwrap_or(first);
        (begin + first as u64, begin + last as u64 + 1)
    }

    fn chunk(&self, pos: u64) -> Chunk<'_> {
        let data = self.data.read_recursive();
        if pos >= data.len() as u64 {
            return Chunk::empty();
        }
        Chunk::Borrowed(RwLockReadGuard::map(data, |v| &v[pos as usize..]))
    }

    fn segment(&self, pos: u64) -> (u64, u64) {
        let size = self.size();
        (pos.min(size), size)
    }

    fn resize(&mut self, size: u64) -> Result<()> {
        let new_len = self.check_growth(size)?;
        let mut data = self.data.write();
        if new_len < data.len() {
            data.truncate(new_len);
        } else {
            grow(&mut data, new_len)?;
        }
        Ok(())
    }

    fn filename(&self) -> Option<&Path> {
        None
    }

    fn copy(&self) -> Result<Box<dyn BufferImpl>> {
        let data = self.data.read_recursive();
        let mut copied = Vec::new();
        copied
            .try_reserve_exact(data.len())
            .map_err(|e| BufferError::exhausted(data.len() as u64, e.to_string()))?;
        copied.extend_from_slice(&data);
        Ok(Box::new(Self {
            data: Arc::new(RwLock::new(copied)),
            limit: self.limit,
        }))
    }
}
