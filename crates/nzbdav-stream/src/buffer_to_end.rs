//! Eager background draining of an upstream stream.

use async_trait::async_trait;
use bytes::Bytes;
use nzbdav_common::Result;
use tokio::sync::mpsc;

use crate::stream::ReadStream;

const CHUNK_SIZE: usize = 16 * 1024;

/// Default number of chunks buffered ahead of the reader.
pub const DEFAULT_CAPACITY: usize = 64;

/// Copies an upstream stream into a bounded in-memory queue from a background
/// task.
///
/// The upstream is always read to its end, even when this stream is dropped
/// early. Bytes produced after the reader is gone are discarded. The upstream
/// is dropped exactly once, by the pump task, after it reports EOF or an
/// error. Protocol connections rely on this to become reusable.
pub struct BufferToEndStream {
    chunks: mpsc::Receiver<Result<Bytes>>,
    current: Bytes,
    finished: bool,
}

impl BufferToEndStream {
    /// Must be called within a tokio runtime.
    pub fn new<S>(source: S, capacity: usize) -> Self
    where
        S: ReadStream + 'static,
    {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        tokio::spawn(pump(source, tx));
        Self {
            chunks: rx,
            current: Bytes::new(),
            finished: false,
        }
    }
}

async fn pump<S: ReadStream>(mut source: S, tx: mpsc::Sender<Result<Bytes>>) {
    let mut tx = Some(tx);
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        match source.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                if let Some(sender) = &tx {
                    if sender.send(Ok(Bytes::copy_from_slice(&buf[..n]))).await.is_err() {
                        tracing::trace!("reader dropped, draining upstream");
                        tx = None;
                    }
                }
            }
            Err(e) => {
                if let Some(sender) = tx.take() {
                    let _ = sender.send(Err(e)).await;
                } else {
                    tracing::debug!(error = %e, "upstream failed while draining");
                }
                break;
            }
        }
    }
    drop(source);
}

#[async_trait]
impl ReadStream for BufferToEndStream {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while self.current.is_empty() {
            if self.finished {
                return Ok(0);
            }
            match self.chunks.recv().await {
                Some(Ok(chunk)) => self.current = chunk,
                Some(Err(e)) => {
                    self.finished = true;
                    return Err(e);
                }
                None => self.finished = true,
            }
        }
        let n = buf.len().min(self.current.len());
        buf[..n].copy_from_slice(&self.current.split_to(n));
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStream;
    use nzbdav_common::Error;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    /// Counts bytes read and records when it is dropped.
    struct Tracked {
        inner: MemoryStream,
        read: Arc<AtomicUsize>,
        drops: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ReadStream for Tracked {
        async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
            let len = buf.len().min(1000);
            let n = self.inner.read(&mut buf[..len]).await?;
            self.read.fetch_add(n, Ordering::SeqCst);
            Ok(n)
        }
    }

    impl Drop for Tracked {
        fn drop(&mut self) {
            self.drops.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Failing(AtomicBool);

    #[async_trait]
    impl ReadStream for Failing {
        async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
            if self.0.swap(true, Ordering::SeqCst) {
                Err(Error::protocol("connection reset"))
            } else {
                buf[0] = 7;
                Ok(1)
            }
        }
    }

    #[tokio::test]
    async fn test_passes_bytes_through() {
        let data: Vec<u8> = (0..50_000u32).map(|i| (i % 251) as u8).collect();
        let mut stream = BufferToEndStream::new(MemoryStream::new(data.clone()), 2);
        let mut out = Vec::new();
        stream.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, data);
    }

    #[tokio::test]
    async fn test_drains_upstream_after_early_drop() {
        let read = Arc::new(AtomicUsize::new(0));
        let drops = Arc::new(AtomicUsize::new(0));
        let source = Tracked {
            inner: MemoryStream::new(vec![1u8; 100_000]),
            read: read.clone(),
            drops: drops.clone(),
        };
        let mut stream = BufferToEndStream::new(source, 1);
        let mut buf = [0u8; 10];
        stream.read(&mut buf).await.unwrap();
        drop(stream);

        for _ in 0..100 {
            if drops.load(Ordering::SeqCst) > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(read.load(Ordering::SeqCst), 100_000);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_upstream_error_reaches_reader() {
        let mut stream = BufferToEndStream::new(Failing(AtomicBool::new(false)), 4);
        let mut buf = [0u8; 4];
        assert_eq!(stream.read(&mut buf).await.unwrap(), 1);
        assert!(matches!(stream.read(&mut buf).await, Err(Error::Protocol(_))));
        assert_eq!(stream.read(&mut buf).await.unwrap(), 0);
    }
}
