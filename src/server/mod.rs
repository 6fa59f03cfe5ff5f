use crate::config::ConfigManager;
use crate::queue::QueueManager;
use crate::streaming;
use crate::usenet::UsenetStreamingClient;
use anyhow::{Context, Result};
use axum::{
    http::{header, Method, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use nzbdav_db::DbPool;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

mod error;
pub mod routes_api;

pub use error::AppError;

/// Shared application context
#[derive(Clone)]
pub struct AppContext {
    pub db: DbPool,
    pub config: Arc<ConfigManager>,
    pub usenet: Arc<UsenetStreamingClient>,
    pub queue: Arc<QueueManager>,
}

/// Create the Axum router with all routes
pub fn create_router(ctx: AppContext) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::RANGE]);

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", routes_api::api_routes())
        .nest("/items", streaming::items_router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

async fn health_check() -> impl IntoResponse {
    StatusCode::OK
}

/// Serve `ctx` on `host:port` until a shutdown signal arrives.
pub async fn start_server(host: &str, port: u16, ctx: AppContext) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .context("Invalid server address")?;

    let app = create_router(ctx);

    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => {}
            Err(e) => {
                tracing::error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
