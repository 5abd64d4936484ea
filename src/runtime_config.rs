//! # Runtime Configuration Module
//!
//! Environment-driven tuning of the `may` coroutine runtime that serves HTTP connections.
//!
//! ## Environment Variables
//!
//! ### `BEACON_STACK_SIZE`
//!
//! Stack size of each connection coroutine. Accepts decimal (`32768`) or hexadecimal (`0x8000`).
//!
//! Default: `0x8000` (32 KB). Request handling is shallow, so this rarely needs raising;
//! memory use is roughly `stack_size × open connections`.
//!
//! ### `BEACON_WORKERS`
//!
//! Number of `may` scheduler threads. Default: the runtime's own default (number of CPUs).
//!
//! ## Usage
//!
//! ```rust
//! use beacon::runtime_config::RuntimeConfig;
//!
//! let config = RuntimeConfig::from_env();
//! config.apply();
//! ```

use std::env;
use tracing::debug;

const DEFAULT_STACK_SIZE: usize = 0x8000;

/// Runtime configuration loaded from environment variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Stack size for coroutines in bytes
    pub stack_size: usize,
    /// Scheduler threads, `None` keeps may's default
    pub workers: Option<usize>,
}

impl RuntimeConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let stack_size = env::var("BEACON_STACK_SIZE")
            .ok()
            .and_then(|val| parse_size(&val))
            .unwrap_or(DEFAULT_STACK_SIZE);
        let workers = env::var("BEACON_WORKERS")
            .ok()
            .and_then(|val| val.parse().ok())
            .filter(|&n: &usize| n > 0);
        RuntimeConfig {
            stack_size,
            workers,
        }
    }

    /// Push the settings into `may::config()`. Must run before the server starts.
    pub fn apply(&self) {
        let may_config = may::config();
        may_config.set_stack_size(self.stack_size);
        if let Some(workers) = self.workers {
            may_config.set_workers(workers);
        }
        debug!(stack_size = self.stack_size, workers = ?self.workers, "Coroutine runtime configured");
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            stack_size: DEFAULT_STACK_SIZE,
            workers: None,
        }
    }
}

fn parse_size(val: &str) -> Option<usize> {
    match val.strip_prefix("0x") {
        Some(hex) => usize::from_str_radix(hex, 16).ok(),
        None => val.parse().ok(),
    }
}
