//! Runtime key/value configuration.
//!
//! Values are seeded from the TOML file, overridden by rows persisted in the
//! `config_items` table, and may be changed at runtime. Every update is
//! broadcast to subscribers as a [`ConfigChange`].

use std::collections::HashMap;

use nzbdav_common::{Error, Result};
use nzbdav_db::queries::config as config_queries;
use nzbdav_db::{get_conn, DbPool};
use parking_lot::RwLock;
use tokio::sync::broadcast;

use super::Config;

pub const USENET_HOST: &str = "usenet.host";
pub const USENET_PORT: &str = "usenet.port";
pub const USENET_USE_SSL: &str = "usenet.use-ssl";
pub const USENET_USER: &str = "usenet.user";
pub const USENET_PASS: &str = "usenet.pass";
pub const USENET_CONNECTIONS: &str = "usenet.connections";
pub const USENET_CONNECTIONS_PER_STREAM: &str = "usenet.connections-per-stream";
pub const API_CATEGORIES: &str = "api.categories";
pub const API_ENSURE_IMPORTABLE_VIDEO: &str = "api.ensure-importable-video";

/// Keys that require a new connection pool when they change.
const USENET_CONNECTION_KEYS: [&str; 6] = [
    USENET_HOST,
    USENET_PORT,
    USENET_USE_SSL,
    USENET_USER,
    USENET_PASS,
    USENET_CONNECTIONS,
];

/// Emitted after [`ConfigManager::update_values`].
#[derive(Debug, Clone)]
pub struct ConfigChange {
    /// The keys written by this update with their new values.
    pub changed: HashMap<String, String>,
    /// Every value after the update.
    pub snapshot: HashMap<String, String>,
}

impl ConfigChange {
    /// Whether the update touched a key the connection pool is built from.
    pub fn affects_usenet_connection(&self) -> bool {
        USENET_CONNECTION_KEYS
            .iter()
            .any(|key| self.changed.contains_key(*key))
    }
}

/// Provider connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsenetSettings {
    pub host: String,
    pub port: u16,
    pub use_ssl: bool,
    pub user: String,
    pub pass: String,
    pub connections: usize,
}

pub struct ConfigManager {
    values: RwLock<HashMap<String, String>>,
    events: broadcast::Sender<ConfigChange>,
    db: Option<DbPool>,
}

impl ConfigManager {
    /// A manager holding only the file values. Updates are not persisted.
    pub fn new(config: &Config) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            values: RwLock::new(seed_values(config)),
            events,
            db: None,
        }
    }

    /// Seed from `config`, then apply persisted overrides from `db`.
    pub fn load(config: &Config, db: DbPool) -> Result<Self> {
        let mut values = seed_values(config);
        let conn = get_conn(&db)?;
        let stored = config_queries::get_config_items(&conn)?;
        drop(conn);
        if !stored.is_empty() {
            tracing::debug!(count = stored.len(), "applying persisted config overrides");
        }
        values.extend(stored);

        let (events, _) = broadcast::channel(16);
        Ok(Self {
            values: RwLock::new(values),
            events,
            db: Some(db),
        })
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.values.read().get(key).cloned()
    }

    pub fn snapshot(&self) -> HashMap<String, String> {
        self.values.read().clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConfigChange> {
        self.events.subscribe()
    }

    /// Validate, persist and apply `items`, then notify subscribers.
    pub fn update_values(&self, items: Vec<(String, String)>) -> Result<()> {
        for (key, value) in &items {
            validate_value(key, value)?;
        }

        if let Some(db) = &self.db {
            let conn = get_conn(db)?;
            config_queries::upsert_config_items(&conn, &items)?;
        }

        let changed: HashMap<String, String> = items.into_iter().collect();
        let snapshot = {
            let mut values = self.values.write();
            values.extend(changed.clone());
            values.clone()
        };

        tracing::info!(
            keys = ?changed.keys().collect::<Vec<_>>(),
            "configuration updated"
        );
        // No subscribers is fine.
        let _ = self.events.send(ConfigChange { changed, snapshot });
        Ok(())
    }

    pub fn usenet_settings(&self) -> UsenetSettings {
        let values = self.values.read();
        UsenetSettings {
            host: values.get(USENET_HOST).cloned().unwrap_or_default(),
            port: parse_or(&values, USENET_PORT, 119),
            use_ssl: parse_or(&values, USENET_USE_SSL, false),
            user: values.get(USENET_USER).cloned().unwrap_or_default(),
            pass: values.get(USENET_PASS).cloned().unwrap_or_default(),
            connections: parse_or(&values, USENET_CONNECTIONS, 10usize).max(1),
        }
    }

    /// Read-ahead depth for file streams.
    pub fn connections_per_stream(&self) -> usize {
        parse_or(&self.values.read(), USENET_CONNECTIONS_PER_STREAM, 1usize).max(1)
    }

    pub fn categories(&self) -> Vec<String> {
        self.get(API_CATEGORIES)
            .unwrap_or_default()
            .split(',')
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect()
    }

    pub fn ensure_importable_video(&self) -> bool {
        parse_or(&self.values.read(), API_ENSURE_IMPORTABLE_VIDEO, true)
    }
}

fn seed_values(config: &Config) -> HashMap<String, String> {
    let usenet = &config.usenet;
    [
        (USENET_HOST, usenet.host.clone()),
        (USENET_PORT, usenet.port.to_string()),
        (USENET_USE_SSL, usenet.use_ssl.to_string()),
        (USENET_USER, usenet.user.clone()),
        (USENET_PASS, usenet.pass.clone()),
        (USENET_CONNECTIONS, usenet.connections.to_string()),
        (
            USENET_CONNECTIONS_PER_STREAM,
            usenet.connections_per_stream.to_string(),
        ),
        (API_CATEGORIES, config.api.categories.clone()),
        (
            API_ENSURE_IMPORTABLE_VIDEO,
            config.api.ensure_importable_video.to_string(),
        ),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

fn parse_or<T: std::str::FromStr>(values: &HashMap<String, String>, key: &str, default: T) -> T {
    match values.get(key).map(|v| v.trim().parse()) {
        Some(Ok(value)) => value,
        Some(Err(_)) => {
            tracing::warn!(key, "ignoring unparseable config value");
            default
        }
        None => default,
    }
}

fn validate_value(key: &str, value: &str) -> Result<()> {
    let valid = match key {
        USENET_PORT => value.parse::<u16>().map(|p| p != 0).unwrap_or(false),
        USENET_CONNECTIONS | USENET_CONNECTIONS_PER_STREAM => {
            value.parse::<usize>().map(|n| n >= 1).unwrap_or(false)
        }
        USENET_USE_SSL | API_ENSURE_IMPORTABLE_VIDEO => value.parse::<bool>().is_ok(),
        _ => true,
    };
    if valid {
        Ok(())
    } else {
        Err(Error::invalid_input(format!(
            "invalid value `{value}` for `{key}`"
        )))
    }
}
