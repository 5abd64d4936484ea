//! # CLI Module
//!
//! Command-line entry points of the `beacon` binary.
//!
//! ## Commands
//!
//! ### `serve`
//!
//! Run the collector until SIGINT/SIGTERM:
//!
//! ```bash
//! beacon serve --port 1338 --log-dir /var/log/beacon --store-host 127.0.0.1 --store-port 6379
//! ```
//!
//! Every flag has a `BEACON_*` environment fallback (`BEACON_HOST`, `BEACON_PORT`,
//! `BEACON_LOG_DIR`, `BEACON_LOG_FILE`, `BEACON_STORE_HOST`, `BEACON_STORE_PORT`,
//! `BEACON_STORE_TIMEOUT_MS`, `BEACON_FLUSH_TIMEOUT_MS`, `BEACON_QUIET`).
//!
//! ### `inspect`
//!
//! Show what a request URI would produce, without touching the log file or the store:
//!
//! ```bash
//! $ beacon inspect '/track?foo=k%C5%AF%C5%88&count=7'
//! query: foo=k%C5%AF%C5%88&count=7
//! line:  {"foo":"kůň","count":"7"}
//! count: 7
//! ```

mod commands;


pub use commands::{inspect, run, run_cli, Cli, Commands, ServeArgs};
