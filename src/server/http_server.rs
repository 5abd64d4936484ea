use may::coroutine::JoinHandle;
use may_minihttp::HttpService;
use std::io;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::thread;
use std::time::Duration;
use tracing::{debug, info};

/// Listener for beacon hits, normally wrapping a [`BeaconService`](super::BeaconService).
pub struct HttpServer<T>(pub T);

/// The running accept loop plus the address it is bound to.
///
/// `serve` stops it on SIGINT/SIGTERM before the beacon drains its queues, so no hit is accepted
/// after the log file and store session start closing.
pub struct ServerHandle {
    addr: SocketAddr,
    handle: JoinHandle<()>,
}

impl ServerHandle {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Block until a TCP connect to the bound address succeeds (50 tries, 5 ms apart).
    ///
    /// Readiness connections close without sending a request, so they never reach
    /// `Beacon::handle` and never produce a log line.
    pub fn wait_ready(&self) -> io::Result<()> {
        for _ in 0..50 {
            if TcpStream::connect(self.addr).is_ok() {
                return Ok(());
            }
            thread::sleep(Duration::from_millis(5));
        }
        Err(io::Error::new(io::ErrorKind::TimedOut, "server not ready"))
    }

    /// Cancel the accept loop. Hits already handed to the beacon stay queued for its shutdown.
    pub fn stop(self) {
        info!(addr = %self.addr, "HTTP server stopping");
        // SAFETY: `cancel` is unsafe in may because a cancelled coroutine unwinds at its next
        // yield point. The accept loop holds no state that must survive that unwind, and the
        // handle is consumed here so the coroutine cannot be observed afterwards.
        unsafe {
            self.handle.coroutine().cancel();
        }
        if self.handle.join().is_err() {
            debug!(addr = %self.addr, "HTTP server accept loop cancelled");
        }
        info!(addr = %self.addr, "HTTP server is closed");
    }

    /// Run until the accept loop ends; used where no signal handling is available.
    pub fn join(self) -> std::thread::Result<()> {
        self.handle.join()
    }
}

impl<T: HttpService + Clone + Send + Sync + 'static> HttpServer<T> {
    /// Bind `addr` (the first resolved address) and start accepting hits.
    ///
    /// Fails only when the address does not resolve or cannot be bound; the beacon's own
    /// failures never surface here.
    pub fn start<A: ToSocketAddrs>(self, addr: A) -> io::Result<ServerHandle> {
        let addr = addr
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "invalid address"))?;
        let handle = may_minihttp::HttpServer(self.0).start(addr)?;
        info!(addr = %addr, "HTTP server running");
        Ok(ServerHandle { addr, handle })
    }
}
