//! # Configuration Module
//!
//! Everything a running beacon needs to know, as one value.
//!
//! [`BeaconConfig`] is built by the CLI (flags with `BEACON_*` environment fallbacks) or directly
//! in code and passed to [`Beacon::start`](crate::beacon::Beacon::start). There is no global
//! state: the started beacon owns the log writer and the store session derived from it.
//!
//! Defaults:
//!
//! | Setting | Default |
//! |---|---|
//! | listen address | `127.0.0.1:1338` |
//! | log file | `./queries.log` |
//! | counter store | `127.0.0.1:6379` |
//! | per-request debug event | on |
//! | shutdown flush timeout | 5 s |

use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_LISTEN_HOST: &str = "127.0.0.1";
pub const DEFAULT_LISTEN_PORT: u16 = 1338;
pub const DEFAULT_LOG_FILE: &str = "queries.log";
pub const DEFAULT_STORE_HOST: &str = "127.0.0.1";
pub const DEFAULT_STORE_PORT: u16 = 6379;

/// Connection parameters of the counter store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub host: String,
    pub port: u16,
    pub connect_timeout: Duration,
}

impl StoreConfig {
    /// `redis://host:port/`, with IPv6 literals bracketed (`redis://[::1]:6379/`)
    pub fn url(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("redis://[{}]:{}/", self.host, self.port)
        } else {
            format!("redis://{}:{}/", self.host, self.port)
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_STORE_HOST.to_string(),
            port: DEFAULT_STORE_PORT,
            connect_timeout: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeaconConfig {
    pub listen_host: String,
    pub listen_port: u16,
    /// Directory holding the log file
    pub log_dir: PathBuf,
    /// File name of the JSON-lines log inside `log_dir`
    pub log_file: String,
    pub store: StoreConfig,
    /// Emit an `info` event for every request
    pub debug_requests: bool,
    /// How long shutdown waits for queued log lines and increments
    pub flush_timeout: Duration,
}

impl BeaconConfig {
    pub fn log_path(&self) -> PathBuf {
        self.log_dir.join(&self.log_file)
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.listen_host, self.listen_port)
    }
}

impl Default for BeaconConfig {
    fn default() -> Self {
        Self {
            listen_host: DEFAULT_LISTEN_HOST.to_string(),
            listen_port: DEFAULT_LISTEN_PORT,
            log_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            log_file: DEFAULT_LOG_FILE.to_string(),
            store: StoreConfig::default(),
            debug_requests: true,
            flush_timeout: Duration::from_secs(5),
        }
    }
}
