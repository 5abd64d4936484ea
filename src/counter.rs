//! # Counter Module
//!
//! Relative increments of the running counter kept in the external key-value store.
//!
//! ## Overview
//!
//! - [`CounterStore`] is the seam to the store: one operation, "increment key by N", plus an
//!   optional close hook. Nothing here ever reads a counter back.
//! - [`RedisCounterStore`] implements it with `INCRBY` over a single, lazily (re)established
//!   Redis connection shared by every request.
//! - [`Counter`] is the fire-and-forget front used by request handling. Increments are queued on
//!   a [`Worker`] and applied in order on its thread; failures are logged, never retried.
//!
//! ## Connection lifecycle
//!
//! The Redis session is opened eagerly at startup when possible. An I/O failure drops the
//! connection; the next increment reconnects and logs the attempt number. The increment that hit
//! the failure is reported and discarded.

use crate::config::StoreConfig;
use crate::worker::{JobHandler, Worker, WorkerError, WorkerMetrics};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid counter store address {url}")]
    InvalidAddress {
        url: String,
        #[source]
        source: redis::RedisError,
    },
    #[error("cannot connect to counter store at {url}")]
    Connect {
        url: String,
        #[source]
        source: redis::RedisError,
    },
    #[error("INCRBY {key} {amount} failed")]
    Command {
        key: String,
        amount: i64,
        #[source]
        source: redis::RedisError,
    },
    #[error("counter store is closed")]
    Closed,
}

/// A store that can add a signed amount to a named integer counter.
pub trait CounterStore: Send + 'static {
    /// Add `amount` to `key`, returning the new total.
    fn increment_by(&mut self, key: &str, amount: i64) -> Result<i64, StoreError>;

    /// Release the session. Called once, after the last increment.
    fn close(&mut self) {}
}

/// [`CounterStore`] backed by a Redis server.
pub struct RedisCounterStore {
    client: redis::Client,
    url: String,
    connect_timeout: Duration,
    connection: Option<redis::Connection>,
    connected_once: bool,
    reconnect_attempts: u32,
    closed: bool,
}

impl RedisCounterStore {
    /// Validate the address. Does not connect.
    pub fn new(config: &StoreConfig) -> Result<Self, StoreError> {
        let url = config.url();
        let client =
            redis::Client::open(url.as_str()).map_err(|source| StoreError::InvalidAddress {
                url: url.clone(),
                source,
            })?;
        Ok(Self {
            client,
            url,
            connect_timeout: config.connect_timeout,
            connection: None,
            connected_once: false,
            reconnect_attempts: 0,
            closed: false,
        })
    }

    /// Open the session now instead of on the first increment.
    pub fn connect(&mut self) -> Result<(), StoreError> {
        if self.connection.is_none() {
            let connection = self.open_connection()?;
            self.connection = Some(connection);
        }
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    fn open_connection(&mut self) -> Result<redis::Connection, StoreError> {
        if self.connected_once {
            self.reconnect_attempts += 1;
            info!(
                url = %self.url,
                attempt = self.reconnect_attempts,
                "Counter store reconnecting"
            );
        }
        let connection = self
            .client
            .get_connection_with_timeout(self.connect_timeout)
            .map_err(|source| StoreError::Connect {
                url: self.url.clone(),
                source,
            })?;
        // bound every command so a stalled server cannot wedge the worker
        let timeout = Some(self.connect_timeout);
        if let Err(e) = connection
            .set_read_timeout(timeout)
            .and_then(|()| connection.set_write_timeout(timeout))
        {
            warn!(url = %self.url, error = %e, "Could not set counter store I/O timeouts");
        }
        self.connected_once = true;
        self.reconnect_attempts = 0;
        info!(url = %self.url, "Counter store connected");
        Ok(connection)
    }
}

impl CounterStore for RedisCounterStore {
    fn increment_by(&mut self, key: &str, amount: i64) -> Result<i64, StoreError> {
        if self.closed {
            return Err(StoreError::Closed);
        }
        let mut connection = match self.connection.take() {
            Some(connection) => connection,
            None => self.open_connection()?,
        };
        match redis::cmd("INCRBY")
            .arg(key)
            .arg(amount)
            .query::<i64>(&mut connection)
        {
            Ok(total) => {
                self.connection = Some(connection);
                Ok(total)
            }
            Err(source) => {
                if source.is_io_error() || source.is_connection_dropped() {
                    warn!(url = %self.url, error = %source, "Counter store connection lost");
                } else {
                    self.connection = Some(connection);
                }
                Err(StoreError::Command {
                    key: key.to_string(),
                    amount,
                    source,
                })
            }
        }
    }

    fn close(&mut self) {
        self.closed = true;
        if let Some(mut connection) = self.connection.take() {
            if let Err(e) = redis::cmd("QUIT").query::<()>(&mut connection) {
                debug!(url = %self.url, error = %e, "QUIT failed while closing");
            }
        }
        info!(url = %self.url, "Counter store connection closed");
    }
}

/// One queued increment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Increment {
    pub key: String,
    pub amount: i64,
}

struct StoreWriter<S>(S);

impl<S: CounterStore> JobHandler<Increment> for StoreWriter<S> {
    type Error = StoreError;

    fn handle(&mut self, job: Increment) -> Result<(), StoreError> {
        let total = self.0.increment_by(&job.key, job.amount)?;
        debug!(key = %job.key, amount = job.amount, total = total, "Counter incremented");
        Ok(())
    }

    fn close(&mut self) {
        self.0.close();
    }
}

/// Fire-and-forget front of a [`CounterStore`].
pub struct Counter {
    worker: Worker<Increment>,
}

impl Counter {
    /// Move `store` onto its own worker thread.
    pub fn start<S: CounterStore>(store: S) -> Result<Self, WorkerError> {
        let worker = Worker::spawn("counter", StoreWriter(store))?;
        Ok(Self { worker })
    }

    /// Queue `key += amount`. Returns immediately; failures are only logged.
    pub fn increment_by(&self, key: &str, amount: i64) {
        let job = Increment {
            key: key.to_string(),
            amount,
        };
        if let Err(e) = self.worker.submit(job) {
            error!(key = %key, amount = amount, error = %e, "Counter increment dropped");
        }
    }

    pub fn flush(&self, timeout: Duration) -> bool {
        self.worker.flush(timeout)
    }

    /// Apply what is queued, then close the store session.
    pub fn close(&self) {
        self.worker.shutdown();
    }

    pub fn metrics(&self) -> &Arc<WorkerMetrics> {
        self.worker.metrics()
    }
}
