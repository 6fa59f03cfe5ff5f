pub mod manager;
mod types;

pub use manager::{ConfigChange, ConfigManager};
pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    let default_paths = [
        "./config.toml",
        "./nzbdav.toml",
        "~/.config/nzbdav/config.toml",
        "/etc/nzbdav/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            tracing::debug!("Using config file {:?}", path);
            return load_config(path);
        }
    }

    Ok(Config::default())
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    if config.server.port == 0 {
        anyhow::bail!("Server port cannot be 0");
    }

    if config.usenet.connections < 1 {
        anyhow::bail!("usenet.connections must be at least 1");
    }

    if config.usenet.connections_per_stream < 1 {
        anyhow::bail!("usenet.connections_per_stream must be at least 1");
    }

    if config.usenet.host.is_empty() {
        tracing::warn!("No usenet host configured; streaming and ingestion will fail");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_config() {
        let file = write_config(
            r#"
            [server]
            port = 3000

            [usenet]
            host = "news.example.com"
            connections = 20
            "#,
        );
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.usenet.connections, 20);
    }

    #[test]
    fn test_rejects_zero_port() {
        let file = write_config("[server]\nport = 0\n");
        let err = load_config(file.path()).unwrap_err();
        assert!(err.to_string().contains("port"));
    }

    #[test]
    fn test_rejects_zero_connections() {
        let file = write_config("[usenet]\nconnections = 0\n");
        assert!(load_config(file.path()).is_err());

        let file = write_config("[usenet]\nconnections_per_stream = 0\n");
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn test_malformed_file_has_context() {
        let file = write_config("[server\nport = 1");
        let err = load_config(file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_missing_explicit_path_is_an_error() {
        let err = load_config_or_default(Some(Path::new("/nonexistent/nzbdav.toml"))).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
