//! Configuration parsing for the market indexer.
//!
//! The indexer reads its settings from a single JSON config file. The
//! top-level structure holds the index store settings, the bulk flush policy,
//! and the list of markets to follow.
//!
//! # Example config
//!
//! ```json
//! {
//!   "elastic": {
//!     "hosts": ["http://127.0.0.1:9200"],
//!     "user": "elastic",
//!     "password": "changeme",
//!     "sniff": false,
//!     "index": "gdax"
//!   },
//!   "bulk": { "batch_size": 500, "workers": 2, "flush_interval_sec": 5, "stats_enabled": true },
//!   "markets": ["BTC-USD", "ETH-USD"],
//!   "log_level": "debug"
//! }
//! ```

use std::time::Duration;

use serde::Deserialize;

use crate::error::GmiError;

/// Default exchange streaming endpoint.
pub const DEFAULT_FEED_URL: &str = "wss://ws-feed.gdax.com";

/// Top-level application config, deserialized from a JSON file.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Index store connection and target index.
    pub elastic: ElasticConfig,

    /// Bulk flush policy.
    #[serde(default)]
    pub bulk: BulkConfig,

    /// Markets to subscribe (e.g. `["BTC-USD"]`).
    pub markets: Vec<String>,

    /// Exchange streaming endpoint.
    #[serde(default = "default_feed_url")]
    pub feed_url: String,

    /// Delay before a failed stream is relaunched.
    #[serde(default = "default_restart_backoff_sec")]
    pub restart_backoff_sec: u64,

    /// `info` (default) or `debug`.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Optional directory for daily-rotating log files.
    pub log_dir: Option<String>,
}

/// Index store settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ElasticConfig {
    #[serde(default = "default_hosts")]
    pub hosts: Vec<String>,
    pub user: Option<String>,
    pub password: Option<String>,

    /// Discover cluster nodes via `/_nodes/http` at startup.
    #[serde(default)]
    pub sniff: bool,

    /// Target index name.
    pub index: String,

    /// Schema template used when the index does not exist yet.
    #[serde(default = "default_template_path")]
    pub template_path: String,

    /// Emit `_type` in bulk action lines (clusters before 7.x).
    #[serde(default = "default_true")]
    pub mapping_types: bool,

    #[serde(default = "default_request_timeout_sec")]
    pub request_timeout_sec: u64,
}

impl ElasticConfig {
    /// Returns basic-auth credentials when both user and password are set.
    pub fn credentials(&self) -> Option<(String, String)> {
        match (&self.user, &self.password) {
            (Some(u), Some(p)) if !u.is_empty() => Some((u.clone(), p.clone())),
            _ => None,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_sec)
    }
}

/// Bulk flush policy.
#[derive(Debug, Clone, Deserialize)]
pub struct BulkConfig {
    /// Flush once this many operations are queued.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Maximum number of flushes in flight.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Flush a non-empty batch after this many seconds without a flush.
    #[serde(default = "default_flush_interval_sec")]
    pub flush_interval_sec: u64,

    /// Keep cumulative flush counters.
    #[serde(default)]
    pub stats_enabled: bool,
}

impl BulkConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_sec)
    }
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            workers: default_workers(),
            flush_interval_sec: default_flush_interval_sec(),
            stats_enabled: false,
        }
    }
}

impl AppConfig {
    pub fn restart_backoff(&self) -> Duration {
        Duration::from_secs(self.restart_backoff_sec)
    }

    /// Check the invariants the pipeline relies on.
    pub fn validate(&self) -> Result<(), GmiError> {
        if self.elastic.index.trim().is_empty() {
            return Err(GmiError::Config("elastic.index must not be empty".into()));
        }
        if self.elastic.hosts.is_empty() {
            return Err(GmiError::Config("elastic.hosts must list at least one endpoint".into()));
        }
        if self.elastic.user.is_some() != self.elastic.password.is_some() {
            return Err(GmiError::Config("elastic.user and elastic.password must be set together".into()));
        }
        if self.markets.is_empty() {
            return Err(GmiError::Config("markets must list at least one market".into()));
        }
        if self.bulk.batch_size == 0 {
            return Err(GmiError::Config("bulk.batch_size must be at least 1".into()));
        }
        if self.bulk.workers == 0 {
            return Err(GmiError::Config("bulk.workers must be at least 1".into()));
        }
        if self.bulk.flush_interval_sec == 0 {
            return Err(GmiError::Config("bulk.flush_interval_sec must be at least 1".into()));
        }
        Ok(())
    }
}

fn default_feed_url() -> String {
    DEFAULT_FEED_URL.to_string()
}

fn default_restart_backoff_sec() -> u64 {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_hosts() -> Vec<String> {
    vec!["http://127.0.0.1:9200".to_string()]
}

fn default_template_path() -> String {
    "elastic-template.json".to_string()
}

fn default_true() -> bool {
    true
}

fn default_request_timeout_sec() -> u64 {
    30
}

fn default_batch_size() -> usize {
    1000
}

fn default_workers() -> usize {
    1
}

fn default_flush_interval_sec() -> u64 {
    1
}

/// Load, parse, and validate a JSON config file.
pub fn load_config(path: &std::path::Path) -> anyhow::Result<AppConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| GmiError::Config(format!("unable to read {}: {e}", path.display())))?;
    let config: AppConfig = serde_json::from_str(&content)
        .map_err(|e| GmiError::Config(format!("unable to parse {}: {e}", path.display())))?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const MINIMAL: &str = r#"{ "elastic": { "index": "gdax" }, "markets": ["BTC-USD"] }"#;

    #[test]
    fn defaults_applied() {
        let cfg: AppConfig = serde_json::from_str(MINIMAL).unwrap();
        assert_eq!(cfg.feed_url, DEFAULT_FEED_URL);
        assert_eq!(cfg.log_level, "info");
        assert_eq!(cfg.restart_backoff(), Duration::from_secs(10));
        assert_eq!(cfg.bulk.batch_size, 1000);
        assert_eq!(cfg.bulk.workers, 1);
        assert_eq!(cfg.bulk.flush_interval(), Duration::from_secs(1));
        assert!(!cfg.bulk.stats_enabled);
        assert_eq!(cfg.elastic.hosts, vec!["http://127.0.0.1:9200"]);
        assert_eq!(cfg.elastic.template_path, "elastic-template.json");
        assert!(cfg.elastic.mapping_types);
        assert!(!cfg.elastic.sniff);
        assert!(cfg.elastic.credentials().is_none());
        cfg.validate().unwrap();
    }

    #[test]
    fn credentials_need_both_halves() {
        let mut cfg: AppConfig = serde_json::from_str(MINIMAL).unwrap();
        cfg.elastic.user = Some("elastic".into());
        assert!(cfg.validate().is_err());
        cfg.elastic.password = Some("secret".into());
        cfg.validate().unwrap();
        assert_eq!(cfg.elastic.credentials(), Some(("elastic".into(), "secret".into())));
    }

    #[test]
    fn rejects_empty_markets_and_zero_batch() {
        let mut cfg: AppConfig = serde_json::from_str(MINIMAL).unwrap();
        cfg.markets.clear();
        assert!(matches!(cfg.validate(), Err(GmiError::Config(_))));

        let mut cfg: AppConfig = serde_json::from_str(MINIMAL).unwrap();
        cfg.bulk.batch_size = 0;
        assert!(cfg.validate().is_err());

        let mut cfg: AppConfig = serde_json::from_str(MINIMAL).unwrap();
        cfg.bulk.flush_interval_sec = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "elastic": {{ "hosts": ["http://es:9200"], "index": "gdax", "sniff": true }},
                "bulk": {{ "batch_size": 3, "workers": 2, "flush_interval_sec": 5, "stats_enabled": true }},
                "markets": ["BTC-USD", "ETH-USD"],
                "log_level": "debug"
            }}"#
        )
        .unwrap();

        let cfg = load_config(file.path()).unwrap();
        assert_eq!(cfg.markets, vec!["BTC-USD", "ETH-USD"]);
        assert_eq!(cfg.bulk.batch_size, 3);
        assert_eq!(cfg.bulk.workers, 2);
        assert!(cfg.bulk.stats_enabled);
        assert!(cfg.elastic.sniff);
        assert_eq!(cfg.log_level, "debug");
    }

    #[test]
    fn load_missing_file_is_config_error() {
        let err = load_config(std::path::Path::new("/nonexistent/config.json")).unwrap_err();
        assert!(err.to_string().contains("config error"));
    }
}
