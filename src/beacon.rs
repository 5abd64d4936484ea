//! # Beacon Module
//!
//! Per-request orchestration of a tracking hit.
//!
//! ```text
//! URI ──extract_query──▶ raw query ──decode──▶ ParameterMap ─┬─▶ LogAppender::append   (queued)
//!                                                            └─▶ Counter::increment_by (queued, only for CountParam::Value)
//! ```
//!
//! [`Beacon::handle`] always answers `200 OK` and returns as soon as both side effects are
//! queued; neither is awaited. Problems with the query, the log file or the store are reported
//! through `tracing` only.

use crate::appender::LogAppender;
use crate::config::BeaconConfig;
use crate::counter::{Counter, CounterStore, RedisCounterStore};
use crate::query::{count_param, decode, extract_query, CountParam, COUNT_KEY};
use crate::worker::WorkerError;
use anyhow::Context;
use http::StatusCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// A started beacon: owns the log writer and the counter store session.
pub struct Beacon {
    log: LogAppender,
    counter: Counter,
    debug_requests: bool,
    flush_timeout: Duration,
    shut_down: AtomicBool,
}

impl Beacon {
    /// Start with a Redis counter store built from `config.store`.
    ///
    /// An unreachable store does not prevent startup; the connection is retried on the first
    /// increment.
    pub fn start(config: &BeaconConfig) -> anyhow::Result<Self> {
        let mut store = RedisCounterStore::new(&config.store)
            .context("Failed to configure counter store")?;
        if let Err(e) = store.connect() {
            error!(error = %e, "Counter store unavailable at startup");
        }
        Self::with_store(config, store).context("Failed to start beacon workers")
    }

    /// Start with any [`CounterStore`].
    pub fn with_store<S: CounterStore>(config: &BeaconConfig, store: S) -> Result<Self, WorkerError> {
        let log = LogAppender::open(config.log_path())?;
        let counter = Counter::start(store)?;
        Ok(Self {
            log,
            counter,
            debug_requests: config.debug_requests,
            flush_timeout: config.flush_timeout,
            shut_down: AtomicBool::new(false),
        })
    }

    /// Process one request URI. Always `200 OK`.
    pub fn handle(&self, uri: &str) -> StatusCode {
        if self.debug_requests {
            info!(uri = %uri, "Process GET request");
        }

        let query = extract_query(uri);
        if query.is_empty() {
            debug!(uri = %uri, "No query string, nothing to record");
            return StatusCode::OK;
        }

        let params = decode(query);
        self.log.append(&params);

        match count_param(&params) {
            CountParam::Value(amount) => self.counter.increment_by(COUNT_KEY, amount),
            CountParam::Invalid(value) => {
                error!(value = %value, "Invalid count parameter, counter not updated");
            }
            CountParam::Absent => {}
        }

        StatusCode::OK
    }

    /// Wait (up to the configured flush timeout each) for queued log lines and increments.
    pub fn flush(&self) -> bool {
        let log_flushed = self.log.flush(self.flush_timeout);
        let counter_flushed = self.counter.flush(self.flush_timeout);
        log_flushed && counter_flushed
    }

    /// Quiesce, then close the log file and the store session. Only the first call does work.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Beacon shutting down");
        if !self.flush() {
            warn!(
                timeout_ms = self.flush_timeout.as_millis() as u64,
                "Pending log lines or increments not flushed in time"
            );
        }
        self.log.close();
        self.counter.close();
    }

    pub fn log(&self) -> &LogAppender {
        &self.log
    }

    pub fn counter(&self) -> &Counter {
        &self.counter
    }
}
