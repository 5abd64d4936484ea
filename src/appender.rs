//! # Appender Module
//!
//! Append-only JSON-lines log of decoded beacon parameters.
//!
//! Every accepted hit becomes one line: the [`ParameterMap`] serialized as a single JSON object
//! followed by `\n`. Lines are serialized on the caller's side and handed to a dedicated writer
//! [`Worker`], which owns the file handle and performs one `write_all` per line on a file opened
//! with `O_APPEND`. Because that writer is the only one touching the file, concurrent requests can
//! never interleave bytes inside a line.
//!
//! The file is opened lazily (append + create) and reopened after any failed write, so a
//! transient problem (missing directory, full disk) only loses the lines written while it lasts.
//! Existing content is never truncated or rewritten.

use crate::query::ParameterMap;
use crate::worker::{JobHandler, Worker, WorkerError, WorkerMetrics};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info};

#[derive(Debug, Error)]
pub enum AppendError {
    #[error("cannot open log file {path}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot write to log file {path}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Writer side: owns the file handle, runs on the worker thread.
struct FileWriter {
    path: PathBuf,
    file: Option<File>,
}

impl FileWriter {
    fn open(&self) -> Result<File, AppendError> {
        let file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)
            .map_err(|source| AppendError::Open {
                path: self.path.clone(),
                source,
            })?;
        debug!(path = %self.path.display(), "Log file opened");
        Ok(file)
    }
}

impl JobHandler<String> for FileWriter {
    type Error = AppendError;

    fn handle(&mut self, line: String) -> Result<(), AppendError> {
        let mut file = match self.file.take() {
            Some(file) => file,
            None => self.open()?,
        };
        // On failure the handle is dropped and the next line reopens the file.
        file.write_all(line.as_bytes())
            .map_err(|source| AppendError::Write {
                path: self.path.clone(),
                source,
            })?;
        self.file = Some(file);
        Ok(())
    }

    fn close(&mut self) {
        if let Some(file) = self.file.take() {
            if let Err(e) = file.sync_data() {
                error!(path = %self.path.display(), error = %e, "Failed to sync log file");
            }
        }
        info!(path = %self.path.display(), "Log file closed");
    }
}

/// Fire-and-forget front of the log writer.
pub struct LogAppender {
    path: PathBuf,
    worker: Worker<String>,
}

impl LogAppender {
    /// Start the writer for `path`. The file itself is opened on the first append.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, WorkerError> {
        let path = path.into();
        let worker = Worker::spawn(
            "log-writer",
            FileWriter {
                path: path.clone(),
                file: None,
            },
        )?;
        info!(path = %path.display(), "Log appender ready");
        Ok(Self { path, worker })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Queue `params` as one JSON line. Never blocks on I/O and never fails the caller:
    /// serialization and queueing errors are reported through `tracing`.
    pub fn append(&self, params: &ParameterMap) {
        let line = match params.to_json_line() {
            Ok(line) => line,
            Err(e) => {
                error!(error = %e, "Failed to serialize query parameters");
                return;
            }
        };
        if let Err(e) = self.worker.submit(line) {
            error!(path = %self.path.display(), error = %e, "Log line dropped");
        }
    }

    /// Wait until every line appended before this call has hit the file (or failed).
    pub fn flush(&self, timeout: Duration) -> bool {
        self.worker.flush(timeout)
    }

    /// Drain pending lines and close the file. Later appends are dropped and logged.
    pub fn close(&self) {
        self.worker.shutdown();
    }

    pub fn metrics(&self) -> &Arc<WorkerMetrics> {
        self.worker.metrics()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::decode;
    use std::fs;

    const WAIT: Duration = Duration::from_secs(5);

    #[test]
    fn test_append_writes_json_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queries.log");
        let appender = LogAppender::open(&path).unwrap();

        appender.append(&decode("foo=k%C5%AF%C5%88"));
        assert!(appender.flush(WAIT));

        assert_eq!(fs::read_to_string(&path).unwrap(), "{\"foo\":\"kůň\"}\n");
        assert_eq!(appender.metrics().completed(), 1);
    }

    #[test]
    fn test_append_never_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queries.log");
        fs::write(&path, "{\"old\":\"line\"}\n").unwrap();

        let appender = LogAppender::open(&path).unwrap();
        appender.append(&decode("a=1"));
        appender.append(&decode("b=2"));
        appender.close();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(
            lines,
            vec!["{\"old\":\"line\"}", "{\"a\":\"1\"}", "{\"b\":\"2\"}"]
        );
    }

    #[test]
    fn test_write_failure_is_counted_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("queries.log");
        let appender = LogAppender::open(&path).unwrap();

        appender.append(&decode("a=1"));
        assert!(appender.flush(WAIT));
        assert_eq!(appender.metrics().failed(), 1);

        // directory appears later: the writer recovers on the next line
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        appender.append(&decode("b=2"));
        assert!(appender.flush(WAIT));
        assert_eq!(appender.metrics().completed(), 1);
        assert_eq!(fs::read_to_string(&path).unwrap(), "{\"b\":\"2\"}\n");
    }

    #[test]
    fn test_append_after_close_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queries.log");
        let appender = LogAppender::open(&path).unwrap();
        appender.close();

        appender.append(&decode("late=1"));
        assert!(!path.exists());
        assert_eq!(appender.metrics().submitted(), 0);
    }

    #[test]
    fn test_many_threads_produce_whole_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queries.log");
        let appender = Arc::new(LogAppender::open(&path).unwrap());

        let threads: Vec<_> = (0..8)
            .map(|t| {
                let appender = Arc::clone(&appender);
                std::thread::spawn(move || {
                    for i in 0..50 {
                        appender.append(&decode(&format!("t{t}=v{i}&pad={}", "x".repeat(512))));
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert!(appender.flush(WAIT));

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 400);
        for line in lines {
            let obj: serde_json::Map<String, serde_json::Value> =
                serde_json::from_str(line).unwrap();
            assert_eq!(obj.len(), 2);
        }
    }
}
