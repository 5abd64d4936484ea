#![allow(dead_code)]

pub mod test_server {
    use beacon::server::{BeaconService, HttpServer, ServerHandle};
    use beacon::{Beacon, BeaconConfig, CounterStore, StoreError};
    use std::net::{SocketAddr, TcpListener};
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex, Once};
    use std::time::Duration;
    use tempfile::TempDir;

    /// Ensures May coroutines are configured only once
    static MAY_INIT: Once = Once::new();

    pub fn setup_may_runtime() {
        MAY_INIT.call_once(|| {
            may::config().set_stack_size(0x8000);
        });
    }

    /// Counter store double that records every increment it receives
    #[derive(Clone, Default)]
    pub struct RecordingStore {
        calls: Arc<Mutex<Vec<(String, i64)>>>,
    }

    impl RecordingStore {
        pub fn calls(&self) -> Vec<(String, i64)> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl CounterStore for RecordingStore {
        fn increment_by(&mut self, key: &str, amount: i64) -> Result<i64, StoreError> {
            let mut calls = self.calls.lock().unwrap();
            calls.push((key.to_string(), amount));
            Ok(calls.iter().map(|(_, amount)| amount).sum())
        }
    }

    /// Beacon behind a live HTTP server on a random port, torn down on drop
    pub struct BeaconTestServer {
        dir: TempDir,
        beacon: Arc<Beacon>,
        store: RecordingStore,
        handle: Option<ServerHandle>,
        addr: SocketAddr,
    }

    impl BeaconTestServer {
        pub fn new() -> Self {
            setup_may_runtime();

            let dir = tempfile::tempdir().unwrap();
            let config = BeaconConfig {
                log_dir: dir.path().to_path_buf(),
                debug_requests: false,
                flush_timeout: Duration::from_secs(5),
                ..BeaconConfig::default()
            };
            let store = RecordingStore::default();
            let beacon = Arc::new(Beacon::with_store(&config, store.clone()).unwrap());

            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            let addr = listener.local_addr().unwrap();
            drop(listener);
            let handle = HttpServer(BeaconService::new(Arc::clone(&beacon)))
                .start(addr)
                .unwrap();
            handle.wait_ready().unwrap();

            Self {
                dir,
                beacon,
                store,
                handle: Some(handle),
                addr,
            }
        }

        pub fn addr(&self) -> SocketAddr {
            self.addr
        }

        pub fn beacon(&self) -> &Beacon {
            &self.beacon
        }

        pub fn store(&self) -> &RecordingStore {
            &self.store
        }

        pub fn log_path(&self) -> PathBuf {
            self.dir.path().join("queries.log")
        }

        /// Wait for queued side effects, then read the log file line by line
        pub fn flushed_log_lines(&self) -> Vec<String> {
            assert!(self.beacon.flush(), "side effects not flushed in time");
            std::fs::read_to_string(self.log_path())
                .unwrap_or_default()
                .lines()
                .map(str::to_string)
                .collect()
        }
    }

    impl Drop for BeaconTestServer {
        fn drop(&mut self) {
            if let Some(handle) = self.handle.take() {
                handle.stop();
            }
            self.beacon.shutdown();
        }
    }
}

pub mod http {
    use std::io::{Read, Write};
    use std::net::{SocketAddr, TcpStream};
    use std::time::Duration;

    /// Send a raw request and collect the response, or whatever arrived before the read timeout
    pub fn send_request(addr: &SocketAddr, req: &str) -> String {
        send_pipelined(addr, req, 1)
    }

    /// Like [`send_request`] but keeps reading until `expected` responses are complete
    pub fn send_pipelined(addr: &SocketAddr, req: &str, expected: usize) -> String {
        let mut stream = TcpStream::connect(addr).unwrap();
        stream.write_all(req.as_bytes()).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_millis(500)))
            .unwrap();
        let mut buf = Vec::new();
        loop {
            let mut tmp = [0u8; 1024];
            match stream.read(&mut tmp) {
                Ok(0) => break,
                Ok(n) => {
                    buf.extend_from_slice(&tmp[..n]);
                    if complete_responses(&buf) >= expected {
                        break;
                    }
                }
                Err(ref e)
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut =>
                {
                    break
                }
                Err(e) => panic!("read error: {:?}", e),
            }
        }
        String::from_utf8_lossy(&buf).to_string()
    }

    // number of responses whose headers and Content-Length bytes of body have arrived
    fn complete_responses(buf: &[u8]) -> usize {
        let text = String::from_utf8_lossy(buf);
        let mut rest: &str = &text;
        let mut count = 0;
        while let Some(head_end) = rest.find("\r\n\r\n") {
            let content_length = rest[..head_end]
                .lines()
                .filter_map(|line| line.split_once(':'))
                .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
                .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            let end = head_end + 4 + content_length;
            if rest.len() < end {
                break;
            }
            count += 1;
            rest = &rest[end..];
        }
        count
    }

    /// Status code, headers and body of a raw response
    pub fn parse_response(resp: &str) -> (u16, Vec<(String, String)>, String) {
        let (head, body) = resp.split_once("\r\n\r\n").unwrap_or((resp, ""));
        let mut lines = head.lines();
        let status = lines
            .next()
            .and_then(|line| line.split_whitespace().nth(1))
            .and_then(|code| code.parse().ok())
            .unwrap_or(0);
        let headers = lines
            .filter_map(|line| line.split_once(':'))
            .map(|(name, value)| (name.trim().to_ascii_lowercase(), value.trim().to_string()))
            .collect();
        (status, headers, body.to_string())
    }

    pub fn request(addr: &SocketAddr, method: &str, target: &str) -> (u16, String) {
        let req = format!("{method} {target} HTTP/1.1\r\nHost: localhost\r\nContent-Length: 0\r\n\r\n");
        let (status, _, body) = parse_response(&send_request(addr, &req));
        (status, body)
    }

    pub fn get(addr: &SocketAddr, target: &str) -> (u16, String) {
        request(addr, "GET", target)
    }
}
