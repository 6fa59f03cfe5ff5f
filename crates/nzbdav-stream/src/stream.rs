//! Core read and seek traits.
//!
//! Dropping a stream disposes it. Implementations must make drop cheap and
//! non-blocking; anything that has to keep running (draining a connection,
//! for instance) is moved to a background task.

use async_trait::async_trait;
use nzbdav_common::{Error, Result};

const DISCARD_CHUNK: usize = 64 * 1024;

/// An asynchronous source of bytes.
#[async_trait]
pub trait ReadStream: Send {
    /// Read up to `buf.len()` bytes. `Ok(0)` means end of stream.
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Fill `buf` completely or fail with `UnexpectedEof`.
    async fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.read(&mut buf[filled..]).await?;
            if n == 0 {
                return Err(Error::unexpected_eof(format!(
                    "stream ended after {filled} of {} bytes",
                    buf.len()
                )));
            }
            filled += n;
        }
        Ok(())
    }

    /// Skip up to `count` bytes, returning how many were skipped.
    ///
    /// Returns less than `count` only when the stream ends first.
    async fn discard(&mut self, count: u64) -> Result<u64> {
        let mut scratch = vec![0u8; DISCARD_CHUNK.min(count as usize)];
        let mut remaining = count;
        while remaining > 0 {
            let want = scratch.len().min(remaining as usize);
            let n = self.read(&mut scratch[..want]).await?;
            if n == 0 {
                break;
            }
            remaining -= n as u64;
        }
        Ok(count - remaining)
    }

    /// Read everything that is left into `out`.
    async fn read_to_end(&mut self, out: &mut Vec<u8>) -> Result<usize> {
        let mut chunk = vec![0u8; DISCARD_CHUNK];
        let mut total = 0;
        loop {
            let n = self.read(&mut chunk).await?;
            if n == 0 {
                return Ok(total);
            }
            out.extend_from_slice(&chunk[..n]);
            total += n;
        }
    }
}

/// A stream with a known length that can be repositioned.
///
/// `seek` only records the new position; the next `read` does whatever work
/// is needed to resume from there.
pub trait SeekableStream: ReadStream {
    /// Total length in bytes.
    fn len(&self) -> u64;

    /// Current read position.
    fn position(&self) -> u64;

    /// Move to an absolute position. Seeking past the end is an error.
    fn seek(&mut self, position: u64) -> Result<u64>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A boxed, type-erased stream.
pub type BoxedStream = Box<dyn ReadStream>;

/// A boxed, type-erased seekable stream.
pub type BoxedSeekableStream = Box<dyn SeekableStream>;

#[async_trait]
impl<S: ReadStream + ?Sized> ReadStream for Box<S> {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        (**self).read(buf).await
    }

    async fn discard(&mut self, count: u64) -> Result<u64> {
        (**self).discard(count).await
    }
}

impl<S: SeekableStream + ?Sized> SeekableStream for Box<S> {
    fn len(&self) -> u64 {
        (**self).len()
    }

    fn position(&self) -> u64 {
        (**self).position()
    }

    fn seek(&mut self, position: u64) -> Result<u64> {
        (**self).seek(position)
    }
}

/// Validate a seek target against a stream length.
pub(crate) fn check_seek(position: u64, len: u64) -> Result<u64> {
    if position > len {
        return Err(Error::invalid_input(format!(
            "cannot seek to {position}, stream length is {len}"
        )));
    }
    Ok(position)
}
