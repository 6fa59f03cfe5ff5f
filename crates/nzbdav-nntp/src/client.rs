//! The command surface shared by every client layer.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nzbdav_common::Result;
use nzbdav_stream::{BoxedStream, ReadStream};
use tokio_util::sync::CancellationToken;

use crate::yenc::YencHeader;

/// A decoded segment together with its yEnc header.
pub struct SegmentStream {
    header: YencHeader,
    inner: BoxedStream,
}

impl SegmentStream {
    pub fn new(header: YencHeader, inner: BoxedStream) -> Self {
        Self { header, inner }
    }

    pub fn header(&self) -> &YencHeader {
        &self.header
    }
}

#[async_trait]
impl ReadStream for SegmentStream {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.inner.read(buf).await
    }

    async fn discard(&mut self, count: u64) -> Result<u64> {
        self.inner.discard(count).await
    }
}

/// Usenet reader operations. Every call observes `cancel`.
#[async_trait]
pub trait NntpClient: Send + Sync {
    /// Whether the article exists on the server.
    async fn stat(&self, segment_id: &str, cancel: &CancellationToken) -> Result<bool>;

    /// The server's clock.
    async fn date(&self, cancel: &CancellationToken) -> Result<DateTime<Utc>>;

    /// Fetch and decode one segment.
    ///
    /// The returned stream drains itself in the background if dropped early.
    async fn get_segment_stream(
        &self,
        segment_id: &str,
        cancel: &CancellationToken,
    ) -> Result<SegmentStream>;

    /// Fetch only the yEnc header of a segment.
    async fn get_segment_yenc_header(
        &self,
        segment_id: &str,
        cancel: &CancellationToken,
    ) -> Result<YencHeader> {
        let stream = self.get_segment_stream(segment_id, cancel).await?;
        Ok(stream.header().clone())
    }

    /// Size of the file a list of segments belongs to, from the first
    /// segment's header. An empty list has size 0.
    async fn get_file_size(
        &self,
        segment_ids: &[String],
        cancel: &CancellationToken,
    ) -> Result<u64> {
        match segment_ids.first() {
            Some(first) => Ok(self.get_segment_yenc_header(first, cancel).await?.file_size),
            None => Ok(0),
        }
    }

    /// Resolves once no body transfer is in progress on this client.
    async fn wait_for_ready(&self, cancel: &CancellationToken) -> Result<()>;
}

#[async_trait]
impl<C: NntpClient + ?Sized> NntpClient for Arc<C> {
    async fn stat(&self, segment_id: &str, cancel: &CancellationToken) -> Result<bool> {
        (**self).stat(segment_id, cancel).await
    }

    async fn date(&self, cancel: &CancellationToken) -> Result<DateTime<Utc>> {
        (**self).date(cancel).await
    }

    async fn get_segment_stream(
        &self,
        segment_id: &str,
        cancel: &CancellationToken,
    ) -> Result<SegmentStream> {
        (**self).get_segment_stream(segment_id, cancel).await
    }

    async fn get_segment_yenc_header(
        &self,
        segment_id: &str,
        cancel: &CancellationToken,
    ) -> Result<YencHeader> {
        (**self).get_segment_yenc_header(segment_id, cancel).await
    }

    async fn get_file_size(
        &self,
        segment_ids: &[String],
        cancel: &CancellationToken,
    ) -> Result<u64> {
        (**self).get_file_size(segment_ids, cancel).await
    }

    async fn wait_for_ready(&self, cancel: &CancellationToken) -> Result<()> {
        (**self).wait_for_ready(cancel).await
    }
}
