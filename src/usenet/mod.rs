//! Usenet access for the rest of the application.
//!
//! [`UsenetStreamingClient`] owns the provider connection pool and hands
//! out logical file streams over it. The pool is rebuilt whenever the
//! connection settings change at runtime.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use nzbdav_common::{Error, RarPart, Result};
use nzbdav_nntp::pool::DEFAULT_IDLE_TIMEOUT;
use nzbdav_nntp::{
    CachingClient, ConnectionFactory, ConnectionPool, MultiConnectionClient, NntpClient,
    SingleConnectionClient,
};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::sync::CancellationToken;

use crate::config::manager::UsenetSettings;
use crate::config::{ConfigChange, ConfigManager};
use crate::streaming::{NzbFileStream, RarFileStream};

type PooledClient = MultiConnectionClient<SingleConnectionClient>;

/// Build a connection factory that connects and, if a user is configured,
/// authenticates.
pub fn connection_factory(settings: UsenetSettings) -> ConnectionFactory<SingleConnectionClient> {
    let settings = Arc::new(settings);
    Arc::new(move |cancel: CancellationToken| {
        let settings = settings.clone();
        async move {
            let client = SingleConnectionClient::connect(
                &settings.host,
                settings.port,
                settings.use_ssl,
                &cancel,
            )
            .await
            .inspect_err(|e| tracing::warn!(host = %settings.host, error = %e, "usenet connect failed"))?;
            if !settings.user.is_empty() {
                client
                    .authenticate(&settings.user, &settings.pass, &cancel)
                    .await
                    .inspect_err(|e| tracing::warn!(user = %settings.user, error = %e, "usenet login failed"))?;
            }
            Ok::<_, Error>(client)
        }
        .boxed()
    })
}

fn build_pool(settings: &UsenetSettings) -> Result<ConnectionPool<SingleConnectionClient>> {
    let pool = ConnectionPool::new(
        settings.connections,
        DEFAULT_IDLE_TIMEOUT,
        connection_factory(settings.clone()),
    )?;
    tracing::info!(
        host = %settings.host,
        port = settings.port,
        use_ssl = settings.use_ssl,
        connections = settings.connections,
        "usenet connection pool created"
    );
    Ok(pool)
}

pub struct UsenetStreamingClient {
    client: Arc<dyn NntpClient>,
    connections_per_stream: Arc<AtomicUsize>,
}

impl UsenetStreamingClient {
    /// Connect to the provider described by `config` and follow its
    /// changes. Must be called within a tokio runtime.
    pub fn new(config: Arc<ConfigManager>) -> Result<Self> {
        let pooled = Arc::new(PooledClient::new(build_pool(&config.usenet_settings())?));
        let connections_per_stream = Arc::new(AtomicUsize::new(config.connections_per_stream()));

        tokio::spawn(follow_config(
            config.clone(),
            config.subscribe(),
            Arc::downgrade(&pooled),
            connections_per_stream.clone(),
            build_pool,
        ));

        Ok(Self {
            client: Arc::new(CachingClient::new(pooled)),
            connections_per_stream,
        })
    }

    /// Wrap an existing client.
    pub fn with_client(client: Arc<dyn NntpClient>, connections_per_stream: usize) -> Self {
        Self {
            client,
            connections_per_stream: Arc::new(AtomicUsize::new(connections_per_stream.max(1))),
        }
    }

    pub fn client(&self) -> Arc<dyn NntpClient> {
        self.client.clone()
    }

    pub fn connections_per_stream(&self) -> usize {
        self.connections_per_stream.load(Ordering::Relaxed)
    }

    pub async fn server_date(&self, cancel: &CancellationToken) -> Result<DateTime<Utc>> {
        self.client.date(cancel).await
    }

    /// Whether every segment exists on the provider.
    ///
    /// All segments are checked concurrently; the first missing one
    /// cancels the remaining checks.
    pub async fn check_file_health(
        &self,
        segment_ids: &[String],
        cancel: &CancellationToken,
    ) -> Result<bool> {
        let checks = cancel.child_token();
        let _stop_on_return = checks.clone().drop_guard();

        let mut pending: FuturesUnordered<_> = segment_ids
            .iter()
            .map(|id| {
                let client = self.client.clone();
                let id = id.clone();
                let checks = checks.clone();
                // Spawned so a running STAT finishes on its connection even
                // after we stop waiting for it.
                tokio::spawn(async move { client.stat(&id, &checks).await.map(|found| (id, found)) })
            })
            .collect();

        while let Some(joined) = pending.next().await {
            let (id, found) =
                joined.map_err(|e| Error::internal(format!("health check task failed: {e}")))??;
            if !found {
                tracing::debug!(segment = %id, "missing segment found during health check");
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// A seekable stream over a plain file.
    pub fn file_stream(&self, segment_ids: Vec<String>, file_size: u64) -> NzbFileStream {
        NzbFileStream::new(
            self.client.clone(),
            segment_ids,
            file_size,
            self.connections_per_stream(),
        )
    }

    /// A seekable stream over an archive member.
    pub fn rar_file_stream(&self, parts: Vec<RarPart>) -> RarFileStream {
        RarFileStream::new(self.client.clone(), parts, self.connections_per_stream())
    }
}

/// Apply configuration changes until the client is dropped.
///
/// Connection setting changes install a pool made by `build`.
async fn follow_config<C, B>(
    config: Arc<ConfigManager>,
    changes: broadcast::Receiver<ConfigChange>,
    pooled: std::sync::Weak<MultiConnectionClient<C>>,
    connections_per_stream: Arc<AtomicUsize>,
    build: B,
) where
    C: NntpClient + 'static,
    B: Fn(&UsenetSettings) -> Result<ConnectionPool<C>>,
{
    let mut changes = BroadcastStream::new(changes);
    while let Some(change) = changes.next().await {
        let Ok(change) = change else {
            // Lagged; the next event carries a full snapshot anyway.
            continue;
        };
        let Some(pooled) = pooled.upgrade() else {
            break;
        };

        connections_per_stream.store(config.connections_per_stream(), Ordering::Relaxed);
        if !change.affects_usenet_connection() {
            continue;
        }
        match build(&config.usenet_settings()) {
            Ok(pool) => pooled.update_connection_pool(pool),
            Err(e) => tracing::error!(error = %e, "failed to rebuild usenet connection pool"),
        }
    }
}
