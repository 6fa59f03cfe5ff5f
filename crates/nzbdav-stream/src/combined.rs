//! Concatenation of lazily obtained sub-streams.

use async_trait::async_trait;
use futures::stream::{BoxStream, Stream, StreamExt};
use nzbdav_common::Result;

use crate::stream::{BoxedStream, ReadStream};

/// Presents a sequence of sub-streams as one continuous stream.
///
/// Sub-streams are pulled from `streams` only when the previous one is
/// exhausted, and each is dropped as soon as it reaches its end.
pub struct CombinedStream {
    streams: BoxStream<'static, Result<BoxedStream>>,
    current: Option<BoxedStream>,
}

impl CombinedStream {
    pub fn new<S>(streams: S) -> Self
    where
        S: Stream<Item = Result<BoxedStream>> + Send + 'static,
    {
        Self {
            streams: streams.boxed(),
            current: None,
        }
    }

    /// Make sure `current` holds a stream, pulling the next one if needed.
    /// Returns false once the sequence is exhausted.
    async fn advance(&mut self) -> Result<bool> {
        if self.current.is_some() {
            return Ok(true);
        }
        match self.streams.next().await {
            Some(next) => {
                self.current = Some(next?);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl ReadStream for CombinedStream {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while self.advance().await? {
            if let Some(current) = self.current.as_mut() {
                let n = current.read(buf).await?;
                if n > 0 {
                    return Ok(n);
                }
            }
            self.current = None;
        }
        Ok(0)
    }

    async fn discard(&mut self, count: u64) -> Result<u64> {
        let mut remaining = count;
        while remaining > 0 && self.advance().await? {
            if let Some(current) = self.current.as_mut() {
                let skipped = current.discard(remaining).await?;
                remaining -= skipped;
                if remaining == 0 {
                    break;
                }
            }
            self.current = None;
        }
        Ok(count - remaining)
    }
}
