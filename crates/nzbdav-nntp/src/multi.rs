//! Client that fans commands out over a pool of single-connection clients.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nzbdav_common::{Error, Result};
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

use crate::client::{NntpClient, SegmentStream};
use crate::pool::{ConnectionGuard, ConnectionPool};

/// Runs each command on a pooled client.
///
/// After a successful command the pooled client is only returned once it
/// reports ready, i.e. once any body stream it handed out has been drained.
/// A client whose command failed is returned immediately, unless the failure
/// broke the connection, in which case it is destroyed.
pub struct MultiConnectionClient<C: NntpClient + 'static> {
    pool: RwLock<Arc<ConnectionPool<C>>>,
}

impl<C: NntpClient + 'static> MultiConnectionClient<C> {
    pub fn new(pool: ConnectionPool<C>) -> Self {
        Self {
            pool: RwLock::new(Arc::new(pool)),
        }
    }

    /// Install a new pool and shut the old one down.
    ///
    /// Connections borrowed from the old pool finish their work and are
    /// destroyed when returned.
    pub fn update_connection_pool(&self, pool: ConnectionPool<C>) {
        let old = std::mem::replace(&mut *self.pool.write(), Arc::new(pool));
        old.shutdown();
        tracing::info!(
            max_connections = self.pool.read().max_connections(),
            "usenet connection pool replaced"
        );
    }

    /// The pool currently in use.
    pub fn current_pool(&self) -> Arc<ConnectionPool<C>> {
        self.pool.read().clone()
    }

    async fn acquire(&self, cancel: &CancellationToken) -> Result<ConnectionGuard<C>> {
        let pool = self.current_pool();
        pool.acquire(cancel).await
    }
}

/// Return `guard` to its pool once the client is ready again.
fn release<C: NntpClient + 'static, T>(guard: ConnectionGuard<C>, result: &Result<T>) {
    match result {
        Ok(_) => {
            tokio::spawn(async move {
                match guard.wait_for_ready(&CancellationToken::new()).await {
                    Ok(()) => drop(guard),
                    Err(e) => {
                        tracing::debug!(error = %e, "pooled client failed to become ready");
                        guard.discard();
                    }
                }
            });
        }
        Err(e) if breaks_connection(e) => {
            tracing::debug!(error = %e, "discarding broken usenet connection");
            guard.discard();
        }
        Err(_) => drop(guard),
    }
}

/// Errors after which a connection cannot be trusted to be in sync.
fn breaks_connection(error: &Error) -> bool {
    matches!(
        error,
        Error::Protocol(_) | Error::Io(_) | Error::Timeout(_) | Error::Internal(_)
    )
}

#[async_trait]
impl<C: NntpClient + 'static> NntpClient for MultiConnectionClient<C> {
    async fn stat(&self, segment_id: &str, cancel: &CancellationToken) -> Result<bool> {
        let client = self.acquire(cancel).await?;
        let result = client.stat(segment_id, cancel).await;
        release(client, &result);
        result
    }

    async fn date(&self, cancel: &CancellationToken) -> Result<DateTime<Utc>> {
        let client = self.acquire(cancel).await?;
        let result = client.date(cancel).await;
        release(client, &result);
        result
    }

    async fn get_segment_stream(
        &self,
        segment_id: &str,
        cancel: &CancellationToken,
    ) -> Result<SegmentStream> {
        let client = self.acquire(cancel).await?;
        let result = client.get_segment_stream(segment_id, cancel).await;
        release(client, &result);
        result
    }

    async fn wait_for_ready(&self, _cancel: &CancellationToken) -> Result<()> {
        Ok(())
    }
}
