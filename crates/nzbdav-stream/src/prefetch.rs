//! Bounded-concurrency, order-preserving prefetch.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::future::{BoxFuture, FutureExt};
use futures::Stream;
use nzbdav_common::{Error, Result};
use tokio::task::JoinHandle;

type Task<T> = BoxFuture<'static, Result<T>>;

/// Runs up to `concurrency` fetches ahead of the consumer and yields their
/// results in submission order.
///
/// The first fetch is spawned in the constructor so the first byte arrives as
/// early as possible. Dropping a `Prefetch` detaches the running fetches; they
/// finish in the background and their results are dropped, which disposes
/// any streams they produced.
pub struct Prefetch<T> {
    pending: Box<dyn Iterator<Item = Task<T>> + Send>,
    running: VecDeque<JoinHandle<Result<T>>>,
    concurrency: usize,
}

impl<T: Send + 'static> Prefetch<T> {
    /// Must be called within a tokio runtime.
    pub fn new<I, F>(tasks: I, concurrency: usize) -> Result<Self>
    where
        I: IntoIterator<Item = F>,
        I::IntoIter: Send + 'static,
        F: Future<Output = Result<T>> + Send + 'static,
    {
        if concurrency < 1 {
            return Err(Error::invalid_input("prefetch concurrency must be at least 1"));
        }
        let mut prefetch = Self {
            pending: Box::new(tasks.into_iter().map(|task| task.boxed())),
            running: VecDeque::with_capacity(concurrency),
            concurrency,
        };
        prefetch.spawn_next();
        Ok(prefetch)
    }

    fn spawn_next(&mut self) -> bool {
        match self.pending.next() {
            Some(task) => {
                self.running.push_back(tokio::spawn(task));
                true
            }
            None => false,
        }
    }

    fn fill(&mut self) {
        while self.running.len() < self.concurrency && self.spawn_next() {}
    }

    /// Fetches currently running or completed but not yet yielded.
    pub fn in_flight(&self) -> usize {
        self.running.len()
    }
}

impl<T: Send + 'static> Stream for Prefetch<T> {
    type Item = Result<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        this.fill();
        let Some(front) = this.running.front_mut() else {
            return Poll::Ready(None);
        };
        match Pin::new(front).poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(joined) => {
                this.running.pop_front();
                this.fill();
                let result = match joined {
                    Ok(result) => result,
                    Err(e) if e.is_cancelled() => Err(Error::Cancelled),
                    Err(e) => Err(Error::internal(format!("prefetch task failed: {e}"))),
                };
                Poll::Ready(Some(result))
            }
        }
    }
}
