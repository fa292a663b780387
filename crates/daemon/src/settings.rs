//! Daemon configuration
//!
//! Sources, lowest priority first: built-in defaults, an optional TOML file
//! (`REALTY_CONFIG`, else `realty.toml` in the working directory), then
//! `REALTY_*` environment variables with `__` between nested keys
//! (`REALTY_QUEUE__GLOBAL_CONCURRENCY=8`, `REALTY_PORTALS__IDEALISTA__API_KEY=...`).

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use realty_core::application::queue::constants::{
    DEFAULT_GLOBAL_CONCURRENCY, DEFAULT_PER_PORTAL_CONCURRENCY, DEFAULT_RETRY_BASE_DELAY_MS,
    DEFAULT_RETRY_JITTER, DEFAULT_RETRY_MAX_DELAY_MS,
};
use realty_core::application::{QueueConfig, RetryPolicy};
use realty_core::domain::job::DEFAULT_MAX_ATTEMPTS;
use realty_core::domain::{Portal, PortalSettings};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

const CONFIG_PATH_ENV: &str = "REALTY_CONFIG";
const DEFAULT_CONFIG_FILE: &str = "realty.toml";
const ENV_PREFIX: &str = "REALTY";
const DB_FILE_NAME: &str = "publisher.db";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// SQLite file; defaults to the platform data directory
    pub database_path: Option<PathBuf>,
    pub rpc: RpcSettings,
    pub queue: QueueSettings,
    pub retry: RetrySettings,
    pub log: LogSettings,
    pub portals: HashMap<String, PortalEntry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RpcSettings {
    pub host: String,
    pub port: u16,
}

impl Default for RpcSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9630,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueueSettings {
    pub global_concurrency: usize,
    pub per_portal_concurrency: usize,
    pub adapter_timeout_ms: u64,
    pub poll_interval_ms: u64,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            global_concurrency: DEFAULT_GLOBAL_CONCURRENCY,
            per_portal_concurrency: DEFAULT_PER_PORTAL_CONCURRENCY,
            adapter_timeout_ms: 30_000,
            poll_interval_ms: 250,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: DEFAULT_RETRY_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_RETRY_MAX_DELAY_MS,
            jitter: DEFAULT_RETRY_JITTER,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub format: LogFormat,
    /// Daily rolling JSON log files are written here when set
    pub directory: Option<PathBuf>,
}

/// One `[portals.<name>]` table
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PortalEntry {
    pub enabled: bool,
    pub base_url: String,
    pub api_key: Option<String>,
    pub account_id: Option<String>,
    pub request_timeout_ms: Option<u64>,
    /// Overrides `queue.per_portal_concurrency` for this portal
    pub concurrency: Option<usize>,
    pub options: serde_json::Map<String, serde_json::Value>,
}

impl Default for PortalEntry {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: String::new(),
            api_key: None,
            account_id: None,
            request_timeout_ms: None,
            concurrency: None,
            options: serde_json::Map::new(),
        }
    }
}

impl PortalEntry {
    pub fn settings(&self) -> PortalSettings {
        PortalSettings {
            account_id: self.account_id.clone(),
            options: self.options.clone(),
        }
    }
}

impl Settings {
    /// Load from the config file and the process environment
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV).ok();
        let required = path.is_some();
        let path = path.unwrap_or_else(|| DEFAULT_CONFIG_FILE.to_string());

        let config = Config::builder()
            .add_source(File::with_name(&path).required(required))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            // Flat shorthand kept for parity with the usual deploy scripts
            .set_override_option("log.format", std::env::var("REALTY_LOG_FORMAT").ok())?
            .build()
            .with_context(|| format!("Failed to load configuration ({})", path))?;

        config
            .try_deserialize()
            .context("Invalid configuration")
    }

    /// Parse a TOML document on top of the defaults
    pub fn from_toml(source: &str) -> Result<Self> {
        Config::builder()
            .add_source(File::from_str(source, FileFormat::Toml))
            .build()?
            .try_deserialize()
            .context("Invalid configuration")
    }

    pub fn database_url(&self) -> String {
        let path = self.database_path.clone().unwrap_or_else(default_database_path);
        format!("sqlite://{}", path.display())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry.max_attempts,
            Duration::from_millis(self.retry.base_delay_ms),
            Duration::from_millis(self.retry.max_delay_ms),
        )
        .with_jitter(self.retry.jitter)
    }

    pub fn queue_config(&self) -> Result<QueueConfig> {
        let mut portal_concurrency = HashMap::new();
        for (portal, entry) in self.enabled_portals()? {
            if let Some(limit) = entry.concurrency {
                portal_concurrency.insert(portal, limit);
            }
        }

        Ok(QueueConfig {
            global_concurrency: self.queue.global_concurrency,
            per_portal_concurrency: self.queue.per_portal_concurrency,
            portal_concurrency,
            adapter_timeout: Duration::from_millis(self.queue.adapter_timeout_ms),
            poll_interval: Duration::from_millis(self.queue.poll_interval_ms),
            retry: self.retry_policy(),
        })
    }

    /// Enabled portal tables, keyed by the parsed portal. Unknown names fail
    /// the whole load.
    pub fn enabled_portals(&self) -> Result<Vec<(Portal, &PortalEntry)>> {
        let mut enabled = Vec::new();
        for (name, entry) in &self.portals {
            let portal: Portal = name
                .parse()
                .with_context(|| format!("Unknown portal in configuration: {}", name))?;
            if entry.enabled {
                enabled.push((portal, entry));
            }
        }
        enabled.sort_by_key(|(portal, _)| portal.as_str());
        Ok(enabled)
    }
}

fn default_database_path() -> PathBuf {
    directories::ProjectDirs::from("com", "realty", "realty-publisher")
        .map(|dirs| dirs.data_dir().join(DB_FILE_NAME))
        .unwrap_or_else(|| PathBuf::from(DB_FILE_NAME))
}
