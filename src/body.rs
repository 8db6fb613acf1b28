//! Request body accumulation.
//!
//! Bodies are read through a staging buffer and written at increasing
//! positions into a [`DataBuffer`]. Small bodies stay in memory; once a body
//! crosses the configured threshold it moves into a temporary file buffer.

use bytes::BytesMut;
use std::io::{self, Read};
use std::path::PathBuf;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

use crate::buffer::{DataBuffer, FileBackedBuffer, InMemoryBuffer};
use crate::config::BodyConfig;
use crate::error::{BufferError, Result};

/// Staging buffer size classes
const STAGING_SIZES: &[usize] = &[1024, 4096, 8192, 16384, 32768, 65536];

/// Get a staging buffer with at least `min_size` bytes of capacity.
pub fn staging_buffer(min_size: usize) -> BytesMut {
    let size = STAGING_SIZES
        .iter()
        .find(|&&size| size >= min_size)
        .copied()
        .unwrap_or_else(|| min_size.next_power_of_two().max(4096));

    BytesMut::with_capacity(size)
}

/// Reads request bodies into buffers, spilling large ones to disk.
#[derive(Debug, Clone)]
pub struct BodyReader {
    memory_threshold: u64,
    max_size: Option<u64>,
    spill_dir: PathBuf,
    block_size: usize,
}

impl BodyReader {
    pub fn new(config: &BodyConfig) -> Self {
        Self {
            memory_threshold: config.memory_threshold,
            max_size: config.max_size,
            spill_dir: config.spill_dir(),
            block_size: config.block_size.max(1),
        }
    }

    /// Read `reader` to the end.
    pub fn read_from<R: Read>(&self, mut reader: R) -> Result<DataBuffer> {
        let mut acc = Accumulator::new(self);
        let mut staging = staging_buffer(self.block_size);
        staging.resize(staging.capacity(), 0);
        loop {
            let n = match reader.read(&mut staging) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            acc.push(&staging[..n])?;
        }
        Ok(acc.finish())
    }

    /// Read an async `reader` to the end.
    pub async fn read_from_async<R: AsyncRead + Unpin>(&self, mut reader: R) -> Result<DataBuffer> {
        let mut acc = Accumulator::new(self);
        let mut staging = staging_buffer(self.block_size);
        loop {
            staging.clear();
            let n = reader.read_buf(&mut staging).await?;
            if n == 0 {
                break;
            }
            acc.push(&staging)?;
        }
        Ok(acc.finish())
    }
}

struct Accumulator<'a> {
    reader: &'a BodyReader,
    buf: DataBuffer,
    size: u64,
    spilled: bool,
}

impl<'a> Accumulator<'a> {
    fn new(reader: &'a BodyReader) -> Self {
        Self {
            reader,
            // The threshold also caps the in-memory stage itself.
            buf: DataBuffer::from_impl(InMemoryBuffer::new().with_limit(reader.memory_threshold)),
            size: 0,
            spilled: false,
        }
    }

    fn push(&mut self, data: &[u8]) -> Result<()> {
        let new_size = self.size + data.len() as u64;
        if let Some(limit) = self.reader.max_size {
            if new_size > limit {
                let err = BufferError::BodyTooLarge {
                    size: new_size,
                    limit,
                };
                err.log();
                return Err(err);
            }
        }
        if !self.spilled && new_size > self.reader.memory_threshold {
            self.spill()?;
        }
        self.buf.write(self.size, data)?;
        self.size = new_size;
        Ok(())
    }

    /// Move everything accumulated so far into a temporary file buffer.
    fn spill(&mut self) -> Result<()> {
        let file = FileBackedBuffer::temporary(&self.reader.spill_dir, self.reader.block_size)?;
        let mut target = DataBuffer::from_impl(file);
        self.buf.view().copy_to(&mut target)?;
        debug!(
            "Spilled {} byte request body to {}",
            self.size,
            target.filename().unwrap_or_default().display()
        );
        self.buf = target;
        self.spilled = true;
        Ok(())
    }

    fn finish(self) -> DataBuffer {
        debug!("Read {} byte request body (spilled: {})", self.size, self.spilled);
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::TempDir;

    fn reader(dir: &TempDir, memory_threshold: u64, max_size: Option<u64>) -> BodyReader {
        BodyReader::new(&BodyConfig {
            memory_threshold,
            max_size,
            spill_dir: Some(dir.path().to_path_buf()),
            block_size: 16,
        })
    }

    #[test]
    fn test_staging_size_classes() {
        assert_eq!(staging_buffer(1).capacity(), 1024);
        assert_eq!(staging_buffer(5000).capacity(), 8192);
        assert_eq!(staging_buffer(65536).capacity(), 65536);
        assert_eq!(staging_buffer(100_000).capacity(), 131072);
    }

    #[test]
    fn test_small_body_stays_in_memory() {
        let dir = TempDir::new().unwrap();
        let body = reader(&dir, 1024, None)
            .read_from(Cursor::new(b"user=alice".to_vec()))
            .unwrap();
        assert_eq!(body.to_vec().unwrap(), b"user=alice");
        assert!(body.filename().is_none());
    }

    #[test]
    fn test_large_body_spills_to_file() {
        let dir = TempDir::new().unwrap();
        let payload: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();
        let body = reader(&dir, 100, None)
            .read_from(Cursor::new(payload.clone()))
            .unwrap();

        let path = body.filename().expect("spilled body has a file");
        assert!(path.starts_with(dir.path()));
        assert_eq!(body.size(), 5000);
        assert_eq!(body.to_vec().unwrap(), payload);

        drop(body);
        assert!(!path.exists());
    }

    #[test]
    fn test_body_too_large() {
        let dir = TempDir::new().unwrap();
        let err = reader(&dir, 10, Some(20))
            .read_from(Cursor::new(vec![b'x'; 21]))
            .unwrap_err();
        assert!(matches!(err, BufferError::BodyTooLarge { limit: 20, .. }));
    }

    #[test]
    fn test_body_at_threshold_stays_in_memory() {
        let dir = TempDir::new().unwrap();
        let body = reader(&dir, 64, None)
            .read_from(Cursor::new(vec![b'y'; 64]))
            .unwrap();
        assert!(body.filename().is_none());
        assert_eq!(body.size(), 64);
    }

    #[tokio::test]
    async fn test_async_read_spills() {
        let dir = TempDir::new().unwrap();
        let payload = vec![b'a'; 3000];
        let body = reader(&dir, 1000, Some(4096))
            .read_from_async(&payload[..])
            .await
            .unwrap();
        assert!(body.filename().is_some());
        assert_eq!(body.to_vec().unwrap(), payload);
    }
}
