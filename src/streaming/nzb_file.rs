//! Seekable stream over the segments of one posted file.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use nzbdav_common::{Error, Result};
use nzbdav_nntp::{NntpClient, SegmentStream};
use nzbdav_stream::interpolation::{self, ByteRange};
use nzbdav_stream::{BoxedStream, CombinedStream, Prefetch, ReadStream, SeekableStream};
use tokio_util::sync::{CancellationToken, DropGuard};

/// Reads a file by concatenating its segments, fetching up to
/// `concurrency` segments ahead of the reader.
///
/// Seeking is lazy: the next read locates the segment holding the target
/// offset by interpolation search over segment headers, starts fetching
/// from there and discards the bytes before the target.
pub struct NzbFileStream {
    client: Arc<dyn NntpClient>,
    segment_ids: Arc<[String]>,
    file_size: u64,
    concurrency: usize,
    position: u64,
    inner: Option<CombinedStream>,
    first_segment: Option<SegmentStream>,
    cancel: CancellationToken,
    _cancel_on_drop: DropGuard,
}

impl NzbFileStream {
    pub fn new(
        client: Arc<dyn NntpClient>,
        segment_ids: Vec<String>,
        file_size: u64,
        concurrency: usize,
    ) -> Self {
        let cancel = CancellationToken::new();
        Self {
            client,
            segment_ids: segment_ids.into(),
            file_size,
            concurrency: concurrency.max(1),
            position: 0,
            inner: None,
            first_segment: None,
            _cancel_on_drop: cancel.clone().drop_guard(),
            cancel,
        }
    }

    /// Start from an already fetched first segment. A read from offset 0
    /// consumes it instead of fetching the segment again.
    pub fn with_first_segment(mut self, first: SegmentStream) -> Self {
        self.first_segment = Some(first);
        self
    }

    /// Tie the stream's fetches to `parent`, so cancelling it aborts reads.
    pub fn with_cancellation(mut self, parent: &CancellationToken) -> Self {
        let cancel = parent.child_token();
        self._cancel_on_drop = cancel.clone().drop_guard();
        self.cancel = cancel;
        self
    }

    pub fn segment_count(&self) -> usize {
        self.segment_ids.len()
    }

    /// Build the inner stream positioned at `offset`.
    async fn open_at(&mut self, offset: u64) -> Result<CombinedStream> {
        let (start_index, skip) = if offset == 0 {
            (0, 0)
        } else {
            let found = locate(
                self.client.clone(),
                self.segment_ids.clone(),
                self.file_size,
                offset,
                self.cancel.clone(),
            )
            .await?;
            (found.index, offset - found.range.start)
        };
        tracing::trace!(offset, segment = start_index, skip, "opening file stream");

        let first = if start_index == 0 {
            self.first_segment.take()
        } else {
            self.first_segment = None;
            None
        };
        let fetch_from = if first.is_some() { 1 } else { start_index };

        let client = self.client.clone();
        let ids = self.segment_ids.clone();
        let cancel = self.cancel.clone();
        let fetches = (fetch_from..ids.len()).map(move |i| {
            let client = client.clone();
            let id = ids[i].clone();
            let cancel = cancel.clone();
            async move {
                let segment = client.get_segment_stream(&id, &cancel).await?;
                Ok::<BoxedStream, Error>(Box::new(segment))
            }
        });
        let prefetch = Prefetch::new(fetches, self.concurrency)?;

        let head = stream::iter(first.map(|s| Ok(Box::new(s) as BoxedStream)));
        let mut combined = CombinedStream::new(head.chain(prefetch));

        if skip > 0 {
            let skipped = combined.discard(skip).await?;
            if skipped < skip {
                return Err(Error::unexpected_eof(format!(
                    "segment ended {} bytes before offset {offset}",
                    skip - skipped
                )));
            }
        }
        Ok(combined)
    }
}

/// Find the segment holding `offset` from segment headers alone.
async fn locate(
    client: Arc<dyn NntpClient>,
    ids: Arc<[String]>,
    file_size: u64,
    offset: u64,
    cancel: CancellationToken,
) -> Result<interpolation::SearchResult> {
    let count = ids.len();
    let probe_cancel = cancel.clone();
    interpolation::find(
        offset,
        0..count,
        ByteRange::new(0, file_size),
        move |i| {
            let client = client.clone();
            let id = ids[i].clone();
            let cancel = probe_cancel.clone();
            async move {
                let header = client.get_segment_yenc_header(&id, &cancel).await?;
                header.byte_range()
            }
        },
        &cancel,
    )
    .await
}

#[async_trait]
impl ReadStream for NzbFileStream {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let remaining = self.file_size.saturating_sub(self.position);
        if buf.is_empty() || remaining == 0 {
            return Ok(0);
        }
        if self.inner.is_none() {
            let inner = self.open_at(self.position).await?;
            self.inner = Some(inner);
        }
        let Some(inner) = self.inner.as_mut() else {
            return Ok(0);
        };

        let want = buf.len().min(usize::try_from(remaining).unwrap_or(usize::MAX));
        let n = inner.read(&mut buf[..want]).await?;
        if n == 0 {
            return Err(Error::unexpected_eof(format!(
                "segments ended at {} of {} bytes",
                self.position, self.file_size
            )));
        }
        self.position += n as u64;
        Ok(n)
    }
}

impl SeekableStream for NzbFileStream {
    fn len(&self) -> u64 {
        self.file_size
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn seek(&mut self, position: u64) -> Result<u64> {
        if position > self.file_size {
            return Err(Error::invalid_input(format!(
                "cannot seek to {position} in a file of {} bytes",
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
