mod cli;
mod processor;

use nzbdav::{
    config::{self, ConfigManager},
    queue::QueueManager,
    server::{self, AppContext},
    usenet::{self, UsenetStreamingClient},
};
use nzbdav_db::init_pool;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

async fn start_server(
    host: Option<String>,
    port: Option<u16>,
    config_path: Option<&std::path::Path>,
) -> Result<()> {
    // Load config
    let mut config = config::load_config_or_default(config_path)?;

    // Override host/port from CLI if specified
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    tracing::info!("Starting nzbdav server");

    // Determine data directory from config path or current directory
    let data_dir = config_path
        .and_then(|p| p.parent())
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_default());

    // Initialize database
    let db_path = match &config.database.path {
        Some(path) => std::path::PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).as_ref()),
        None => data_dir.join("nzbdav.db"),
    };
    let db_path_str = db_path.to_string_lossy();
    tracing::info!("Initializing database at {}", db_path_str);
    let db_pool = init_pool(&db_path_str)?;

    let config_manager = Arc::new(ConfigManager::load(&config, db_pool.clone())?);
    let usenet = Arc::new(
        UsenetStreamingClient::new(config_manager.clone())
            .context("Failed to create usenet connection pool")?,
    );
    let queue = Arc::new(QueueManager::new(
        db_pool.clone(),
        usenet.clone(),
        config_manager.clone(),
    ));

    // Create shutdown channel for job processor
    let (shutdown_tx, shutdown_rx) = tokio::sync::mpsc::channel::<()>(1);

    // Start job processor
    let job_processor = processor::JobProcessor::new(queue.clone(), shutdown_rx);
    let processor_handle = tokio::spawn(job_processor.run());

    let ctx = AppContext {
        db: db_pool,
        config: config_manager,
        usenet,
        queue: queue.clone(),
    };
    let server_result = server::start_server(&config.server.host, config.server.port, ctx).await;

    // Cleanup
    tracing::info!("Shutting down...");
    queue.shutdown().await;
    let _ = shutdown_tx.send(()).await;
    let _ = processor_handle.await;

    server_result
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "nzbdav=trace,nzbdav_nntp=debug,nzbdav_stream=debug,nzbdav_parser=debug,nzbdav_db=debug,tower_http=debug".to_string()
        } else {
            "nzbdav=debug,nzbdav_nntp=info,tower_http=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .init();

    match cli.command {
        Commands::Start { host, port } => {
            // Create tokio runtime
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(start_server(host, port, cli.config.as_deref()))
        }
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::CheckConnection => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(check_connection(cli.config.as_deref()))
        }
        Commands::Version => {
            println!("nzbdav {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn validate_config(path: Option<&std::path::Path>) -> Result<()> {
    match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            println!("  Server: {}:{}", config.server.host, config.server.port);
            println!(
                "  Usenet: {}:{} (ssl: {}, connections: {})",
                config.usenet.host, config.usenet.port, config.usenet.use_ssl, config.usenet.connections
            );
            println!("  Categories: {}", config.api.categories);
        }
        None => {
            println!("No config file specified, using defaults");
            let config = config::Config::default();
            println!("Default config:");
            println!("  Server: {}:{}", config.server.host, config.server.port);
        }
    }

    Ok(())
}

async fn check_connection(config_path: Option<&std::path::Path>) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    if config.usenet.host.is_empty() {
        anyhow::bail!("No usenet host configured");
    }

    let settings = ConfigManager::new(&config).usenet_settings();
    println!("Connecting to {}:{}...", settings.host, settings.port);

    let factory = usenet::connection_factory(settings);
    let cancel = CancellationToken::new();
    let client = factory(cancel.clone())
        .await
        .context("Failed to connect to usenet provider")?;
    let date = nzbdav_nntp::NntpClient::date(&client, &cancel)
        .await
        .context("DATE command failed")?;

    println!("✓ Connected");
    println!("  Server time: {}", date.to_rfc3339());
    Ok(())
}
