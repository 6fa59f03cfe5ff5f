//! Seekable stream over a stored archive member.

use std::sync::Arc;

use async_trait::async_trait;
use nzbdav_common::{Error, RarPart, Result};
use nzbdav_nntp::NntpClient;
use nzbdav_stream::{LimitedStream, ReadStream, SeekableStream};

use super::NzbFileStream;

/// Reads a member whose bytes are stored in windows of one or more volumes.
///
/// Each window is served as a length-limited slice of the volume's file
/// stream. Members rarely span more than a handful of volumes, so the
/// window holding a position is found by a linear scan.
pub struct RarFileStream {
    client: Arc<dyn NntpClient>,
    parts: Vec<RarPart>,
    file_size: u64,
    concurrency: usize,
    position: u64,
    inner: Option<LimitedStream<NzbFileStream>>,
}

impl RarFileStream {
    pub fn new(client: Arc<dyn NntpClient>, parts: Vec<RarPart>, concurrency: usize) -> Self {
        let file_size = parts.iter().map(|p| p.byte_count).sum();
        Self {
            client,
            parts,
            file_size,
            concurrency: concurrency.max(1),
            position: 0,
            inner: None,
        }
    }

    /// Open the window holding `position`.
    fn open_at(&self, position: u64) -> Result<LimitedStream<NzbFileStream>> {
        let mut window_start = 0u64;
        for part in &self.parts {
            let window_end = window_start + part.byte_count;
            if position < window_end {
                let within = position - window_start;
                let mut volume = NzbFileStream::new(
                    self.client.clone(),
                    part.segment_ids.clone(),
                    part.part_size,
                    self.concurrency,
                );
                volume.seek(part.offset + within)?;
                return Ok(LimitedStream::new(volume, part.byte_count - within));
            }
            window_start = window_end;
        }
        Err(Error::invalid_input(format!(
            "position {position} is past the end of a {} byte member",
            self.file_size
        )))
    }
}

#[async_trait]
impl ReadStream for RarFileStream {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while self.position < self.file_size {
            if self.inner.is_none() {
                self.inner = Some(self.open_at(self.position)?);
            }
            let Some(inner) = self.inner.as_mut() else {
                break;
            };
            let n = inner.read(buf).await?;
            if n > 0 {
                self.position += n as u64;
                return Ok(n);
            }
            if inner.remaining() > 0 {
                return Err(Error::unexpected_eof(format!(
                    "archive volume ended {} bytes early",
                    inner.remaining()
                )));
            }
            // Window exhausted; move on to the next volume.
            self.inner = None;
        }
        Ok(0)
    }
}

impl SeekableStream for RarFileStream {
    fn len(&self) -> u64 {
        self.file_size
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn seek(&mut self, position: u64) -> Result<u64> {
        if position > self.file_size {
            return Err(Error::invalid_input(format!(
                "cannot seek to {position} in a member of {} bytes",
                self.file_size
            )));
        }
        if position != self.position {
            self.inner = None;
            self.position = position;
        }
        Ok(position)
    }
}
