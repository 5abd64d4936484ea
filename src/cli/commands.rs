use crate::{
    beacon::Beacon,
    config::{
        BeaconConfig, StoreConfig, DEFAULT_LISTEN_HOST, DEFAULT_LISTEN_PORT, DEFAULT_LOG_FILE,
        DEFAULT_STORE_HOST, DEFAULT_STORE_PORT,
    },
    logging::{init_logging_with_config, LogConfig},
    query::{count_param, decode, extract_query, CountParam},
    runtime_config::RuntimeConfig,
    server::{BeaconService, HttpServer},
};
use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Command-line interface for the beacon collector
#[derive(Parser)]
#[command(name = "beacon")]
#[command(about = "HTTP tracking-beacon collector", long_about = None, version)]
pub struct Cli {
    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Accept beacon requests until SIGINT/SIGTERM
    Serve(ServeArgs),
    /// Print the query string, log line and count classification for a request URI
    Inspect {
        /// Request URI, e.g. `/track?foo=1&count=2`
        uri: String,
    },
}

/// Settings of the `serve` command
#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Address to listen on
    #[arg(long, env = "BEACON_HOST", default_value = DEFAULT_LISTEN_HOST)]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "BEACON_PORT", default_value_t = DEFAULT_LISTEN_PORT)]
    pub port: u16,

    /// Directory of the JSON-lines log (default: current directory)
    #[arg(long, env = "BEACON_LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    /// File name of the JSON-lines log
    #[arg(long, env = "BEACON_LOG_FILE", default_value = DEFAULT_LOG_FILE)]
    pub log_file: String,

    /// Redis host holding the counter
    #[arg(long, env = "BEACON_STORE_HOST", default_value = DEFAULT_STORE_HOST)]
    pub store_host: String,

    /// Redis port
    #[arg(long, env = "BEACON_STORE_PORT", default_value_t = DEFAULT_STORE_PORT)]
    pub store_port: u16,

    /// Connect and command timeout for the store, in milliseconds
    #[arg(long, env = "BEACON_STORE_TIMEOUT_MS", default_value_t = 2000)]
    pub store_timeout_ms: u64,

    /// How long shutdown waits for queued writes, in milliseconds
    #[arg(long, env = "BEACON_FLUSH_TIMEOUT_MS", default_value_t = 5000)]
    pub flush_timeout_ms: u64,

    /// Do not log every incoming request
    #[arg(long, env = "BEACON_QUIET", default_value_t = false)]
    pub quiet: bool,
}

impl ServeArgs {
    pub fn to_config(&self) -> BeaconConfig {
        let defaults = BeaconConfig::default();
        BeaconConfig {
            listen_host: self.host.clone(),
            listen_port: self.port,
            log_dir: self.log_dir.clone().unwrap_or(defaults.log_dir),
            log_file: self.log_file.clone(),
            store: StoreConfig {
                host: self.store_host.clone(),
                port: self.store_port,
                connect_timeout: Duration::from_millis(self.store_timeout_ms),
            },
            debug_requests: !self.quiet,
            flush_timeout: Duration::from_millis(self.flush_timeout_ms),
        }
    }
}

/// Parse `std::env::args` and execute the command
pub fn run_cli() -> anyhow::Result<()> {
    run(Cli::parse())
}

/// Execute an already parsed command
///
/// # Errors
///
/// Returns an error if logging cannot be initialized, the store address is invalid,
/// the worker threads cannot be spawned or the listen address cannot be bound.
pub fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Serve(args) => serve(&args.to_config()),
        Commands::Inspect { uri } => inspect(&uri, &mut std::io::stdout().lock()),
    }
}

fn serve(config: &BeaconConfig) -> anyhow::Result<()> {
    let _log_guard = init_logging_with_config(&LogConfig::from_env())?;
    RuntimeConfig::from_env().apply();

    let beacon = Arc::new(Beacon::start(config)?);
    let addr = config.listen_addr();
    let handle = HttpServer(BeaconService::new(Arc::clone(&beacon)))
        .start(addr.as_str())
        .with_context(|| format!("Failed to start HTTP server on {addr}"))?;
    info!(
        addr = %handle.addr(),
        log_file = %config.log_path().display(),
        store = %config.store.url(),
        "HTTP server running at {}",
        handle.addr()
    );

    #[cfg(unix)]
    {
        wait_for_shutdown_signal()?;
        handle.stop();
    }
    #[cfg(not(unix))]
    {
        handle
            .join()
            .map_err(|e| anyhow::anyhow!("HTTP server failed: {e:?}"))?;
    }

    beacon.shutdown();
    Ok(())
}

#[cfg(unix)]
fn wait_for_shutdown_signal() -> anyhow::Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals =
        Signals::new([SIGINT, SIGTERM]).context("Failed to register signal handlers")?;
    if let Some(signal) = signals.forever().next() {
        info!(signal = signal, "Shutdown signal received");
    }
    Ok(())
}

/// Write the query string, JSON log line and count classification of `uri` to `out`
pub fn inspect<W: Write>(uri: &str, out: &mut W) -> anyhow::Result<()> {
    let query = extract_query(uri);
    writeln!(out, "query: {query}")?;
    if query.is_empty() {
        writeln!(out, "line:  (none, empty query string is not logged)")?;
        return Ok(());
    }

    let params = decode(query);
    let line = params
        .to_json_line()
        .context("Failed to serialize query parameters")?;
    write!(out, "line:  {line}")?;
    match count_param(&params) {
        CountParam::Absent => writeln!(out, "count: absent")?,
        CountParam::Value(amount) => writeln!(out, "count: {amount}")?,
        CountParam::Invalid(value) => writeln!(out, "count: invalid ({value:?}), not counted")?,
    }
    Ok(())
}
