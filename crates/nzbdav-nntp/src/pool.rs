//! Generic pool of reusable connections.
//!
//! Connections are created lazily by a caller-supplied factory, capped by a
//! semaphore, reused most-recently-returned first, and reaped by a background
//! sweeper once idle for longer than the idle timeout.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::future::BoxFuture;
use nzbdav_common::{Error, Result};
use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Default time a connection may sit idle before it is destroyed.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Creates a new connection. Receives the caller's cancellation token.
pub type ConnectionFactory<T> =
    Arc<dyn Fn(CancellationToken) -> BoxFuture<'static, Result<T>> + Send + Sync>;

struct Pooled<T> {
    conn: T,
    last_touched: Instant,
}

struct Shared<T> {
    idle: Mutex<Vec<Pooled<T>>>,
    gate: Arc<Semaphore>,
    factory: ConnectionFactory<T>,
    idle_timeout: Duration,
    max_connections: usize,
    live: AtomicUsize,
    shutdown: CancellationToken,
}

impl<T> Shared<T> {
    fn destroy(&self, conn: T) {
        drop(conn);
        self.live.fetch_sub(1, Ordering::SeqCst);
    }

    /// Evict expired idle connections, keeping survivors in their order.
    fn sweep(&self) {
        let expired: Vec<Pooled<T>> = {
            let mut idle = self.idle.lock();
            let (fresh, expired): (Vec<_>, Vec<_>) = std::mem::take(&mut *idle)
                .into_iter()
                .partition(|p| p.last_touched.elapsed() < self.idle_timeout);
            *idle = fresh;
            expired
        };
        if !expired.is_empty() {
            tracing::debug!(count = expired.len(), "evicting idle connections");
        }
        for pooled in expired {
            self.destroy(pooled.conn);
        }
    }
}

/// A bounded pool of connections of type `T`.
///
/// Dropping the pool shuts it down.
pub struct ConnectionPool<T: Send + 'static> {
    shared: Arc<Shared<T>>,
}

impl<T: Send + 'static> ConnectionPool<T> {
    /// Create a pool and start its idle sweeper.
    ///
    /// Must be called within a tokio runtime.
    pub fn new(
        max_connections: usize,
        idle_timeout: Duration,
        factory: ConnectionFactory<T>,
    ) -> Result<Self> {
        if max_connections < 1 {
            return Err(Error::invalid_input("connection pool needs at least one connection"));
        }
        let shared = Arc::new(Shared {
            idle: Mutex::new(Vec::with_capacity(max_connections)),
            gate: Arc::new(Semaphore::new(max_connections)),
            factory,
            idle_timeout,
            max_connections,
            live: AtomicUsize::new(0),
            shutdown: CancellationToken::new(),
        });
        tokio::spawn(sweeper(
            Arc::downgrade(&shared),
            shared.shutdown.clone(),
            idle_timeout / 2,
        ));
        Ok(Self { shared })
    }

    /// Borrow a connection, waiting for a free slot if the pool is at its limit.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<ConnectionGuard<T>> {
        let shared = &self.shared;
        if shared.shutdown.is_cancelled() {
            return Err(Error::PoolShutdown);
        }

        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            _ = shared.shutdown.cancelled() => return Err(Error::PoolShutdown),
            permit = shared.gate.clone().acquire_owned() => {
                permit.map_err(|_| Error::PoolShutdown)?
            }
        };

        loop {
            let candidate = shared.idle.lock().pop();
            match candidate {
                Some(pooled) if pooled.last_touched.elapsed() < shared.idle_timeout => {
                    return Ok(ConnectionGuard::new(pooled.conn, shared.clone(), permit));
                }
                Some(stale) => shared.destroy(stale.conn),
                None => break,
            }
        }

        // The permit is released on any early return below.
        let conn = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            conn = (shared.factory)(cancel.clone()) => conn?,
        };
        shared.live.fetch_add(1, Ordering::SeqCst);
        Ok(ConnectionGuard::new(conn, shared.clone(), permit))
    }

    /// Stop the sweeper, destroy idle connections, and refuse further use.
    ///
    /// Connections still borrowed are destroyed when their guard drops.
    pub fn shutdown(&self) {
        // Flag and drain under the idle lock so a concurrent return either
        // lands before the drain or sees the flag.
        let drained = {
            let mut idle = self.shared.idle.lock();
            if self.shared.shutdown.is_cancelled() {
                return;
            }
            self.shared.shutdown.cancel();
            std::mem::take(&mut *idle)
        };
        self.shared.gate.close();
        tracing::debug!(idle = drained.len(), "connection pool shut down");
        for pooled in drained {
            self.shared.destroy(pooled.conn);
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.shared.shutdown.is_cancelled()
    }

    pub fn max_connections(&self) -> usize {
        self.shared.max_connections
    }

    /// Connections currently alive, borrowed or idle.
    pub fn live_connections(&self) -> usize {
        self.shared.live.load(Ordering::SeqCst)
    }

    pub fn idle_connections(&self) -> usize {
        self.shared.idle.lock().len()
    }

    /// Slots that could be acquired without waiting.
    pub fn available(&self) -> usize {
        self.shared.gate.available_permits()
    }
}

impl<T: Send + 'static> Drop for ConnectionPool<T> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn sweeper<T>(shared: Weak<Shared<T>>, shutdown: CancellationToken, period: Duration) {
    let period = period.max(Duration::from_millis(10));
    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(period) => {}
        }
        let Some(shared) = shared.upgrade() else {
            break;
        };
        shared.sweep();
    }
}

/// A borrowed connection. Returns itself to the pool when dropped, or is
/// destroyed if the pool has been shut down in the meantime.
pub struct ConnectionGuard<T> {
    conn: Option<T>,
    shared: Arc<Shared<T>>,
    _permit: OwnedSemaphorePermit,
}

impl<T> ConnectionGuard<T> {
    fn new(conn: T, shared: Arc<Shared<T>>, permit: OwnedSemaphorePermit) -> Self {
        Self {
            conn: Some(conn),
            shared,
            _permit: permit,
        }
    }

    /// Destroy the connection instead of returning it to the pool.
    pub fn discard(mut self) {
        if let Some(conn) = self.conn.take() {
            self.shared.destroy(conn);
        }
    }
}

impl<T> std::ops::Deref for ConnectionGuard<T> {
    type Target = T;

    fn deref(&self) -> &T {
        // Only taken in drop.
        self.conn.as_ref().unwrap_or_else(|| unreachable!())
    }
}

impl<T> std::ops::DerefMut for ConnectionGuard<T> {
    fn deref_mut(&mut self) -> &mut T {
        self.conn.as_mut().unwrap_or_else(|| unreachable!())
    }
}

impl<T> Drop for ConnectionGuard<T> {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };
        let mut idle = self.shared.idle.lock();
        if self.shared.shutdown.is_cancelled() {
            drop(idle);
            self.shared.destroy(conn);
            return;
        }
        idle.push(Pooled {
            conn,
            last_touched: Instant::now(),
        });
        // The permit is released after this, once the connection is idle.
    }
}
