//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`] which wires an in-memory DB, default config, an
//! in-memory usenet provider and the full [`AppContext`]. Requests are sent
//! to the router in-process with `tower::ServiceExt::oneshot`.

#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use nzbdav::config::{Config, ConfigManager};
use nzbdav::queue::QueueManager;
use nzbdav::server::{create_router, AppContext};
use nzbdav::usenet::UsenetStreamingClient;
use nzbdav_db::{get_conn, init_memory_pool, DbPool, PooledConnection};
use nzbdav_nntp::mock::MemoryClient;

/// Test harness wrapping a fully-constructed [`AppContext`] backed by an
/// in-memory database and provider.
pub struct TestHarness {
    pub ctx: AppContext,
    pub db: DbPool,
    pub provider: Arc<MemoryClient>,
}

impl TestHarness {
    /// Create a harness serving the articles of `provider`.
    pub fn new(provider: MemoryClient) -> Self {
        Self::with_config(Config::default(), provider)
    }

    pub fn with_config(config: Config, provider: MemoryClient) -> Self {
        let db = init_memory_pool().expect("failed to create in-memory pool");
        let provider = Arc::new(provider);
        let config = Arc::new(ConfigManager::new(&config));
        let usenet = Arc::new(UsenetStreamingClient::with_client(
            provider.clone(),
            config.connections_per_stream(),
        ));
        let queue = Arc::new(QueueManager::new(db.clone(), usenet.clone(), config.clone()));

        let ctx = AppContext {
            db: db.clone(),
            config,
            usenet,
            queue,
        };
        Self { ctx, db, provider }
    }

    pub fn router(&self) -> Router {
        create_router(self.ctx.clone())
    }

    /// A pooled connection. The in-memory pool holds a single connection,
    /// so drop it before sending requests.
    pub fn conn(&self) -> PooledConnection {
        get_conn(&self.db).expect("failed to get connection")
    }

    /// Send a request and collect the whole response.
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, HeaderMap, Vec<u8>) {
        let response = self.router().oneshot(request).await.expect("request failed");
        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .into_body()
            .collect()
            .await
            .expect("failed to read body")
            .to_bytes()
            .to_vec();
        (status, headers, body)
    }

    pub async fn get(&self, uri: &str, range: Option<&str>) -> (StatusCode, HeaderMap, Vec<u8>) {
        let mut builder = Request::builder().uri(uri);
        if let Some(range) = range {
            builder = builder.header("range", range);
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }
}

/// Build an NZB document posting each `(file name, segment ids)` pair.
pub fn nzb_document<S: AsRef<[String]>>(files: &[(&str, S)]) -> Vec<u8> {
    let mut doc = String::from(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n\
         <nzb xmlns=\"http://www.newzbin.com/DTD/2003/nzb\">\n",
    );
    for (name, ids) in files {
        let ids = ids.as_ref();
        doc.push_str(&format!(
            "  <file poster=\"tester@example\" date=\"1704067200\" subject=\"[1/1] - &quot;{name}&quot; yEnc (1/{})\">\n",
            ids.len()
        ));
        doc.push_str("    <groups><group>alt.binaries.test</group></groups>\n    <segments>\n");
        for (i, id) in ids.iter().enumerate() {
            doc.push_str(&format!(
                "      <segment bytes=\"1000\" number=\"{}\">{id}</segment>\n",
                i + 1
            ));
        }
        doc.push_str("    </segments>\n  </file>\n");
    }
    doc.push_str("</nzb>\n");
    doc.into_bytes()
}

/// Deterministic filler bytes.
pub fn data(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 253) as u8).collect()
}
