//! Length-bounded stream.

use async_trait::async_trait;
use nzbdav_common::Result;

use crate::stream::ReadStream;

/// Ends the wrapped stream after `limit` bytes.
pub struct LimitedStream<S> {
    inner: S,
    remaining: u64,
}

impl<S: ReadStream> LimitedStream<S> {
    pub fn new(inner: S, limit: u64) -> Self {
        Self {
            inner,
            remaining: limit,
        }
    }

    /// Bytes left before the limit is reached.
    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

#[async_trait]
impl<S: ReadStream> ReadStream for LimitedStream<S> {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        let max = buf.len().min(self.remaining.min(usize::MAX as u64) as usize);
        let n = self.inner.read(&mut buf[..max]).await?;
        self.remaining -= n as u64;
        Ok(n)
    }

    async fn discard(&mut self, count: u64) -> Result<u64> {
        let skipped = self.inner.discard(count.min(self.remaining)).await?;
        self.remaining -= skipped;
        Ok(skipped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStream;

    #[tokio::test]
    async fn test_truncates_at_limit() {
        let mut stream = LimitedStream::new(MemoryStream::new(b"0123456789".to_vec()), 4);
        let mut out = Vec::new();
        stream.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"0123");
        assert_eq!(stream.remaining(), 0);
    }

    #[tokio::test]
    async fn test_limit_beyond_inner_length() {
        let mut stream = LimitedStream::new(MemoryStream::new(b"abc".to_vec()), 10);
        let mut out = Vec::new();
        stream.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"abc");
        assert_eq!(stream.remaining(), 7);
    }

    #[tokio::test]
    async fn test_discard_respects_limit() {
        let mut stream = LimitedStream::new(MemoryStream::new(vec![0u8; 100]), 10);
        assert_eq!(stream.discard(50).await.unwrap(), 10);
        let mut buf = [0u8; 4];
        assert_eq!(stream.read(&mut buf).await.unwrap(), 0);
    }
}
