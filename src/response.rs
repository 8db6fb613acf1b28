//! Writing buffers to response sinks.
//!
//! Both writers drive the chunk loop: start at position 0 and advance by the
//! length of each chunk until the end of the buffer.

use std::io::Write;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::buffer::DataBuffer;
use crate::error::{BufferError, Result};

/// Write the whole buffer to `out` and return the number of bytes written.
pub fn write_body<W: Write>(buf: &DataBuffer, out: &mut W) -> Result<u64> {
    let view = buf.view();
    let size = view.size();
    let mut pos = 0;
    while pos < size {
        let chunk = view.chunk(pos);
        if chunk.is_empty() {
            return Err(BufferError::truncated(pos, size));
        }
        out.write_all(&chunk)?;
        pos += chunk.len() as u64;
    }
    out.flush()?;
    Ok(pos)
}

/// Async counterpart of [`write_body`].
///
/// The buffer is only locked while a chunk is detached, never across an
/// `.await`.
pub async fn write_body_async<W: AsyncWrite + Unpin>(buf: &DataBuffer, out: &mut W) -> Result<u64> {
    let mut pos = 0;
    loop {
        let (bytes, size) = {
            let view = buf.view();
            let size = view.size();
            if pos >= size {
                break;
            }
            (view.chunk(pos).into_bytes(), size)
        };
        if bytes.is_empty() {
            return Err(BufferError::truncated(pos, size));
        }
        out.write_all(&bytes).await?;
        pos += bytes.len() as u64;
    }
    out.flush().await?;
    Ok(pos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{BufferImpl, FileBackedBuffer};
    use tempfile::TempDir;

    #[test]
    fn test_write_memory_body() {
        let buf = DataBuffer::from("<html>ok</html>");
        let mut out: Vec<u8> = Vec::new();
        assert_eq!(write_body(&buf, &mut out).unwrap(), 15);
        assert_eq!(out, b"<html>ok</html>");
    }

    #[test]
    fn test_write_empty_body() {
        let mut out: Vec<u8> = Vec::new();
        assert_eq!(write_body(&DataBuffer::new(), &mut out).unwrap(), 0);
        assert!(out.is_empty());
    }

    #[test]
    fn test_write_file_body_in_blocks() {
        let dir = TempDir::new().unwrap();
        let mut file = FileBackedBuffer::temporary(dir.path(), 3).unwrap();
        file.write(0, b"abcdefgh").unwrap();
        let buf = DataBuffer::from_impl(file);

        assert_eq!(buf.view().chunks().count(), 3);
        let mut out: Vec<u8> = Vec::new();
        assert_eq!(write_body(&buf, &mut out).unwrap(), 8);
        assert_eq!(out, b"abcdefgh");
    }

    #[tokio::test]
    async fn test_write_body_async() {
        let buf = DataBuffer::from("async body");
        let mut out: Vec<u8> = Vec::new();
        assert_eq!(write_body_async(&buf, &mut out).await.unwrap(), 10);
        assert_eq!(out, b"async body");
    }
}
