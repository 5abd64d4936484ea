//! # beacon
//!
//! **beacon** is a minimal HTTP tracking-beacon collector built on the `may` coroutine runtime
//! and `may_minihttp`.
//!
//! A beacon hit is a request whose only payload is its query string. For every hit the
//! collector:
//!
//! 1. isolates the raw query string of the request-target ([`query::extract_query`]);
//! 2. decodes it into an ordered parameter map ([`query::decode`]);
//! 3. appends the map as one JSON line to a local log file ([`appender::LogAppender`]);
//! 4. if a numeric `count` parameter is present, adds it to the `count` key of a Redis
//!    server ([`counter::Counter`]);
//! 5. answers `200 OK` with an empty body, without waiting for steps 3 and 4.
//!
//! ## Request Handling Flow
//!
//! ```mermaid
//! sequenceDiagram
//!     participant Client
//!     participant Server as HttpServer<br/>(may_minihttp)
//!     participant Beacon as Beacon::handle
//!     participant Log as log-writer worker
//!     participant Counter as counter worker
//!     participant Redis
//!
//!     Client->>Server: GET /track?foo=1&count=7
//!     Server->>Beacon: handle("/track?foo=1&count=7")
//!     Beacon->>Beacon: extract_query + decode
//!     Beacon-)Log: queue {"foo":"1","count":"7"}\n
//!     Beacon-)Counter: queue INCRBY count 7
//!     Beacon-->>Server: 200
//!     Server-->>Client: 200 OK (empty body)
//!     Log->>Log: write_all (O_APPEND)
//!     Counter->>Redis: INCRBY count 7
//! ```
//!
//! ## Error Handling
//!
//! Nothing that goes wrong while handling a request reaches the client. Undecodable escapes are
//! kept verbatim, an invalid `count` is logged and skipped, log-file and store failures are
//! logged by the worker that hit them. All of it is visible only through `tracing`
//! (see [`logging`]).
//!
//! ## Quick Start
//!
//! ```no_run
//! use beacon::{beacon::Beacon, config::BeaconConfig, server::{BeaconService, HttpServer}};
//! use std::sync::Arc;
//!
//! let config = BeaconConfig::default();
//! let beacon = Arc::new(Beacon::start(&config).expect("failed to start beacon"));
//! let handle = HttpServer(BeaconService::new(Arc::clone(&beacon)))
//!     .start(config.listen_addr())
//!     .expect("failed to bind");
//! // ... later
//! handle.stop();
//! beacon.shutdown();
//! ```
//!
//! ## Runtime Considerations
//!
//! HTTP connections are served by `may` coroutines, not tokio. The log writer and the counter
//! client each run on one dedicated OS thread because they perform blocking file and socket I/O;
//! request coroutines only ever push onto their queues.

pub mod appender;
pub mod beacon;
pub mod cli;
pub mod config;
pub mod counter;
pub mod logging;
pub mod query;
pub mod runtime_config;
pub mod server;
pub mod worker;

pub use appender::LogAppender;
pub use self::beacon::Beacon;
pub use config::{BeaconConfig, StoreConfig};
pub use counter::{Counter, CounterStore, RedisCounterStore, StoreError};
pub use query::{count_param, decode, extract_query, CountParam, ParameterMap};
