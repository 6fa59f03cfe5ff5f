//! Seekable stream over an owned byte buffer.

use async_trait::async_trait;
use bytes::Bytes;
use nzbdav_common::Result;

use crate::stream::{check_seek, ReadStream, SeekableStream};

/// In-memory stream, used for decoded segments and in tests.
#[derive(Debug, Clone)]
pub struct MemoryStream {
    data: Bytes,
    position: u64,
}

impl MemoryStream {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            position: 0,
        }
    }
}

#[async_trait]
impl ReadStream for MemoryStream {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let start = (self.position as usize).min(self.data.len());
        let n = buf.len().min(self.data.len() - start);
        buf[..n].copy_from_slice(&self.data[start..start + n]);
        self.position += n as u64;
        Ok(n)
    }

    async fn discard(&mut self, count: u64) -> Result<u64> {
        let skipped = count.min(self.len().saturating_sub(self.position));
        self.position += skipped;
        Ok(skipped)
    }
}

impl SeekableStream for MemoryStream {
    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn seek(&mut self, position: u64) -> Result<u64> {
        self.position = check_seek(position, self.len())?;
        Ok(self.position)
    }
}
