//! Polymorphic byte buffers.
//!
//! Every call site works with a [`DataBuffer`] handle. The handle refers to a
//! [`BufferImpl`] by shared ownership: cloning a handle aliases the same
//! storage, and writes through one alias are visible through all of them.
//! [`DataBuffer::copy`] is the only way to obtain an independent buffer.
//!
//! Two implementations exist: [`InMemoryBuffer`], backed by one contiguous
//! vector, and [`FileBackedBuffer`], backed by an open file and read through
//! fixed-size staging blocks.

use bytes::Bytes;
use parking_lot::{MappedRwLockReadGuard, RwLock, RwLockReadGuard};
use std::fmt;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{BufferError, Result};

pub mod file;
pub mod memory;
pub mod utils;

pub use file::FileBackedBuffer;
pub use memory::InMemoryBuffer;

/// Block size used when walking a buffer backwards during `trim`.
const TRIM_SCAN_BLOCK: usize = 512;

/// Bytes dropped by `trim`: ASCII space, `\t`, `\n`, `\v`, `\f` and `\r`.
pub fn is_trimmable(byte: u8) -> bool {
    matches!(byte, b' ' | b'\t' | b'\n' | 0x0b | 0x0c | b'\r')
}

/// Contiguous bytes available at a position, up to the next physical
/// boundary of the underlying storage.
///
/// In-memory buffers hand out a borrowed slice of their storage; file-backed
/// buffers hand out an owned staging block.
pub enum Chunk<'a> {
    Borrowed(MappedRwLockReadGuard<'a, [u8]>),
    Staged(Bytes),
}

impl Chunk<'_> {
    /// The empty view returned at or past the end of a buffer.
    pub fn empty() -> Self {
        Chunk::Staged(Bytes::new())
    }

    /// Detach the chunk from the buffer it came from. Staged blocks are
    /// returned as is; borrowed slices are copied.
    pub fn into_bytes(self) -> Bytes {
        match self {
            Chunk::Borrowed(slice) => Bytes::copy_from_slice(&slice),
            Chunk::Staged(bytes) => bytes,
        }
    }
}

impl Deref for Chunk<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            Chunk::Borrowed(slice) => slice,
            Chunk::Staged(bytes) => bytes,
        }
    }
}

impl fmt::Debug for Chunk<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Chunk::Borrowed(_) => "Borrowed",
            Chunk::Staged(_) => "Staged",
        };
        f.debug_struct("Chunk")
            .field("kind", &kind)
            .field("len", &self.len())
            .finish()
    }
}

/// Storage strategy behind a [`DataBuffer`].
///
/// Positions and lengths are logical `u64` offsets. Only `at`, `write` and
/// `resize` report errors; every other position-based operation clamps or
/// returns a sentinel instead.
pub trait BufferImpl: Send + Sync + fmt::Debug {
    /// Current logical length.
    fn size(&self) -> u64;

    /// Copy bytes starting at `pos` into `dst` and return how many were
    /// copied: `min(dst.len(), size - pos)`, or 0 when `pos >= size`.
    fn read(&self, pos: u64, dst: &mut [u8]) -> u64;

    /// Write `src` at `pos`, growing the buffer to `pos + src.len()` when
    /// needed. A gap between the old end and `pos` is filled with zeros.
    /// On failure the size is left unchanged; the in-memory implementation
    /// also leaves every byte untouched.
    fn write(&mut self, pos: u64, src: &[u8]) -> Result<u64>;

    /// The byte at `pos`.
    fn at(&self, pos: u64) -> Result<u8> {
        let mut byte = [0u8; 1];
        if self.read(pos, &mut byte) == 1 {
            Ok(byte[0])
        } else {
            Err(BufferError::OutOfRange {
                pos,
                size: self.size(),
            })
        }
    }

    /// Lowest position in `[begin, end)` where `needle` matches entirely
    /// inside the range, or `size()` when there is no match. An empty needle
    /// matches at `begin`.
    fn find(&self, begin: u64, end: u64, needle: &[u8]) -> u64 {
        find_by_chunks(self, begin, end, needle)
    }

    /// Sub-range of `[begin, end)` without leading and trailing trimmable
    /// bytes. Does not modify the buffer.
    fn trim(&self, begin: u64, end: u64) -> (u64, u64) {
        trim_by_chunks(self, begin, end)
    }

    /// Contiguous view starting at `pos`. Empty when `pos >= size`.
    fn chunk(&self, pos: u64) -> Chunk<'_>;

    /// Logical range covered by `chunk(pos)`.
    fn segment(&self, pos: u64) -> (u64, u64);

    /// Set the logical length, truncating or zero-extending.
    fn resize(&mut self, size: u64) -> Result<()>;

    /// Backing file, if any.
    fn filename(&self) -> Option<&Path>;

    /// Independent deep copy.
    fn copy(&self) -> Result<Box<dyn BufferImpl>>;
}

/// Naive search over a contiguous haystack.
pub(crate) fn find_in(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Search by walking chunks, carrying `needle.len() - 1` bytes across block
/// boundaries so matches that straddle two blocks are found.
fn find_by_chunks<B: BufferImpl + ?Sized>(buf: &B, begin: u64, end: u64, needle: &[u8]) -> u64 {
    let size = buf.size();
    if needle.is_empty() {
        return begin;
    }
    let end = end.min(size);
    let needle_len = needle.len() as u64;
    if begin >= end || end - begin < needle_len {
        return size;
    }

    let mut window: Vec<u8> = Vec::with_capacity(needle.len() * 2);
    let mut window_start = begin;
    let mut pos = begin;
    while pos < end {
        let chunk = buf.chunk(pos);
        if chunk.is_empty() {
            break;
        }
        let take = (chunk.len() as u64).min(end - pos) as usize;
        window.extend_from_slice(&chunk[..take]);
        pos += take as u64;

        if let Some(offset) = find_in(&window, needle) {
            return window_start + offset as u64;
        }

        let keep = (needle.len() - 1).min(window.len());
        let dropped = window.len() - keep;
        window.drain(..dropped);
        window_start += dropped as u64;
    }
    size
}

fn trim_by_chunks<B: BufferImpl + ?Sized>(buf: &B, begin: u64, end: u64) -> (u64, u64) {
    let end = end.min(buf.size());
    if begin >= end {
        return (begin.min(end), begin.min(end));
    }

    let mut start = begin;
    'forward: while start < end {
        let chunk = buf.chunk(start);
        if chunk.is_empty() {
            break;
        }
        let take = (chunk.len() as u64).min(end - start) as usize;
        for &byte in &chunk[..take] {
            if !is_trimmable(byte) {
                break 'forward;
            }
            start += 1;
        }
    }
    if start == end {
        return (start, start);
    }

    // A non-trimmable byte exists at `start`, so the backward scan stops
    // before crossing it.
    let mut stop = end;
    let mut block = [0u8; TRIM_SCAN_BLOCK];
    'backward: while stop > start {
        let len = (stop - start).min(TRIM_SCAN_BLOCK as u64) as usize;
        let from = stop - len as u64;
        let read = buf.read(from, &mut block[..len]) as usize;
        if read < len {
            break;
        }
        for &byte in block[..len].iter().rev() {
            if !is_trimmable(byte) {
                break 'backward;
            }
            stop -= 1;
        }
    }
    (start, stop)
}

/// Shared handle to a buffer implementation.
///
/// Cloning is cheap and aliases the same storage. The implementation is
/// released when the last handle is dropped.
///
/// Mutators take `&mut self`, so a [`BufferView`] borrowed from a handle
/// rules out writes through that same handle for as long as it lives.
#[derive(Clone)]
pub struct DataBuffer {
    inner: Arc<RwLock<Box<dyn BufferImpl>>>,
}

impl DataBuffer {
    /// Create an empty in-memory buffer.
    pub fn new() -> Self {
        Self::from_impl(InMemoryBuffer::new())
    }

    /// Create an in-memory buffer of `size` zero bytes.
    pub fn with_size(size: u64) -> Result<Self> {
        Ok(Self::from_impl(InMemoryBuffer::with_size(size)?))
    }

    /// Wrap an existing implementation.
    pub fn from_impl<B: BufferImpl + 'static>(imp: B) -> Self {
        Self::from_boxed(Box::new(imp))
    }

    pub fn from_boxed(imp: Box<dyn BufferImpl>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(imp)),
        }
    }

    pub fn size(&self) -> u64 {
        self.inner.read_recursive().size()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn read(&self, pos: u64, dst: &mut [u8]) -> u64 {
        self.inner.read_recursive().read(pos, dst)
    }

    pub fn write(&mut self, pos: u64, src: &[u8]) -> Result<u64> {
        self.inner.write().write(pos, src)
    }

    /// Write `src` at the current end of the buffer.
    pub fn append(&mut self, src: &[u8]) -> Result<u64> {
        let mut imp = self.inner.write();
        let end = imp.size();
        imp.write(end, src)
    }

    pub fn at(&self, pos: u64) -> Result<u8> {
        self.inner.read_recursive().at(pos)
    }

    pub fn find(&self, begin: u64, end: u64, needle: &[u8]) -> u64 {
        self.inner.read_recursive().find(begin, end, needle)
    }

    pub fn trim(&self, begin: u64, end: u64) -> (u64, u64) {
        self.inner.read_recursive().trim(begin, end)
    }

    pub fn segment(&self, pos: u64) -> (u64, u64) {
        self.inner.read_recursive().segment(pos)
    }

    pub fn resize(&mut self, size: u64) -> Result<()> {
        self.inner.write().resize(size)
    }

    /// Backing file path, cloned out of the implementation.
    pub fn filename(&self) -> Option<PathBuf> {
        self.inner.read_recursive().filename().map(Path::to_path_buf)
    }

    /// Deep copy into a new, unaliased handle.
    pub fn copy(&self) -> Result<Self> {
        let copied = self.inner.read_recursive().copy()?;
        Ok(Self::from_boxed(copied))
    }

    /// Lock the buffer for reading and borrow chunk views from it.
    ///
    /// The view borrows the handle, so the handle cannot be written through
    /// until the view is dropped:
    ///
    /// ```compile_fail
    /// use databuffer::DataBuffer;
    ///
    /// let mut buf = DataBuffer::from("body");
    /// let view = buf.view();
    /// buf.write(0, b"B").unwrap();
    /// drop(view);
    /// ```
    ///
    /// Clones are separate handles to the same storage and are not covered by
    /// that borrow. A writer on a clone waits until every view is dropped, so
    /// a thread must not write through a clone while it holds a view itself.
    pub fn view(&self) -> BufferView<'_> {
        BufferView {
            guard: self.inner.read_recursive(),
        }
    }

    /// Read the whole buffer into a vector.
    ///
    /// Fails with `Io` when the storage yields fewer than `size()` bytes.
    pub fn to_vec(&self) -> Result<Vec<u8>> {
        let view = self.view();
        let size = view.size();
        let mut out = Vec::with_capacity(size as usize);
        for chunk in view.chunks() {
            out.extend_from_slice(&chunk);
        }
        if out.len() as u64 != size {
            return Err(BufferError::truncated(out.len() as u64, size));
        }
        Ok(out)
    }

    /// True when both handles alias the same implementation.
    pub fn ptr_eq(a: &DataBuffer, b: &DataBuffer) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }
}

impl Default for DataBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DataBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DataBuffer").field(&*self.inner.read_recursive()).finish()
    }
}

impl From<Vec<u8>> for DataBuffer {
    fn from(data: Vec<u8>) -> Self {
        Self::from_impl(InMemoryBuffer::from(data))
    }
}

impl From<&[u8]> for DataBuffer {
    fn from(data: &[u8]) -> Self {
        Self::from(data.to_vec())
    }
}

impl From<&str> for DataBuffer {
    fn from(data: &str) -> Self {
        Self::from(data.as_bytes())
    }
}

/// Read-locked access to a buffer's implementation.
pub struct BufferView<'a> {
    guard: RwLockReadGuard<'a, Box<dyn BufferImpl>>,
}

impl<'a> BufferView<'a> {
    /// Iterate over consecutive chunks from position 0 to the end.
    ///
    /// Iteration also stops at the first empty chunk, which a file-backed
    /// buffer returns when its file is shorter than `size()`. Callers that
    /// need every byte compare the total length with `size()` afterwards.
    pub fn chunks(&self) -> Chunks<'_> {
        Chunks {
            buf: &**self.guard,
            pos: 0,
        }
    }

    /// Write every byte of the viewed buffer into `target` from position 0.
    ///
    /// `target` must not alias the viewed buffer.
    pub(crate) fn copy_to(&self, target: &mut DataBuffer) -> Result<u64> {
        let size = self.size();
        let mut pos = 0;
        for chunk in self.chunks() {
            target.write(pos, &chunk)?;
            pos += chunk.len() as u64;
        }
        if pos != size {
            return Err(BufferError::truncated(pos, size));
        }
        Ok(size)
    }
}

impl Deref for BufferView<'_> {
    type Target = dyn BufferImpl;

    fn deref(&self) -> &Self::Target {
        &**self.guard
    }
}

/// Iterator produced by [`BufferView::chunks`].
pub struct Chunks<'a> {
    buf: &'a dyn BufferImpl,
    pos: u64,
}

impl<'a> Iterator for Chunks<'a> {
    type Item = Chunk<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.buf.size() {
            return None;
        }
        let chunk = self.buf.chunk(self.pos);
        if chunk.is_empty() {
            return None;
        }
        self.pos += chunk.len() as u64;
        Some(chunk)
    }
}
