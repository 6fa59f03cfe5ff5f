use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub usenet: UsenetConfig,

    #[serde(default)]
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// SQLite file. Relative to the data directory when not absolute;
    /// defaults to `nzbdav.db` there.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UsenetConfig {
    #[serde(default)]
    pub host: String,

    #[serde(default = "default_usenet_port")]
    pub port: u16,

    #[serde(default)]
    pub use_ssl: bool,

    #[serde(default)]
    pub user: String,

    #[serde(default)]
    pub pass: String,

    /// Maximum simultaneous connections to the provider.
    #[serde(default = "default_connections")]
    pub connections: usize,

    /// Segments fetched ahead of the reader for each open file stream.
    #[serde(default = "default_connections_per_stream")]
    pub connections_per_stream: usize,
}

fn default_usenet_port() -> u16 {
    119
}
fn default_connections() -> usize {
    10
}
fn default_connections_per_stream() -> usize {
    1
}

impl Default for UsenetConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_usenet_port(),
            use_ssl: false,
            user: String::new(),
            pass: String::new(),
            connections: default_connections(),
            connections_per_stream: default_connections_per_stream(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
    /// Comma separated list of accepted queue categories.
    #[serde(default = "default_categories")]
    pub categories: String,

    /// Fail jobs that produce no video file.
    #[serde(default = "default_true")]
    pub ensure_importable_video: bool,
}

fn default_categories() -> String {
    "audio,software,tv,movies".to_string()
}
fn default_true() -> bool {
    true
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            categories: default_categories(),
            ensure_importable_video: default_true(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_document() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.usenet.port, 119);
        assert_eq!(config.usenet.connections, 10);
        assert_eq!(config.usenet.connections_per_stream, 1);
        assert!(!config.usenet.use_ssl);
        assert_eq!(config.api.categories, "audio,software,tv,movies");
        assert!(config.api.ensure_importable_video);
        assert!(config.database.path.is_none());
    }

    #[test]
    fn test_partial_sections() {
        let config: Config = toml::from_str(
            r#"
            [usenet]
            host = "news.example.com"
            port = 563
            use_ssl = true

            [api]
            ensure_importable_video = false
            "#,
        )
        .unwrap();
        assert_eq!(config.usenet.host, "news.example.com");
        assert_eq!(config.usenet.port, 563);
        assert!(config.usenet.use_ssl);
        assert_eq!(config.usenet.connections, 10);
        assert!(!config.api.ensure_importable_video);
        assert_eq!(config.api.categories, "audio,software,tv,movies");
    }
}
