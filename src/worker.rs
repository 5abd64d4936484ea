//! # Worker Module
//!
//! Single-consumer background queues for the side effects of a beacon hit.
//!
//! ## Overview
//!
//! Request handling must never wait on disk or network I/O, so both the log writer and the
//! counter client hand their jobs to a [`Worker`]:
//!
//! - **Unbounded FIFO**: `submit` is a channel send on `may`'s MPSC channel and never blocks
//! - **Single consumer**: one dedicated thread processes jobs in submission order, which is what
//!   keeps log lines from interleaving
//! - **Flush barrier**: [`Worker::flush`] waits until every job submitted before it is done
//! - **Panic recovery**: a panicking job is logged and counted, the worker keeps running
//! - **Metrics**: submitted / completed / failed counts and approximate queue depth
//!
//! The consumer is an OS thread rather than a coroutine because jobs perform blocking I/O.

use may::sync::mpsc;
use std::fmt::Display;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info};

/// Errors raised by the queue itself (never by the jobs it runs).
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("failed to spawn worker thread `{name}`")]
    Spawn {
        name: String,
        #[source]
        source: io::Error,
    },
    #[error("worker `{name}` is closed")]
    Closed { name: String },
}

/// Processes the jobs of one [`Worker`], on the worker's thread.
pub trait JobHandler<T>: Send + 'static {
    type Error: Display;

    /// Process one job. An `Err` is logged by the worker and counted as a failure.
    fn handle(&mut self, job: T) -> Result<(), Self::Error>;

    /// Called once after the queue is closed and fully drained.
    fn close(&mut self) {}
}

/// Counters for a worker queue
#[derive(Debug, Default)]
pub struct WorkerMetrics {
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    queue_depth: AtomicUsize,
}

impl WorkerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn record_submit(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
        self.queue_depth.fetch_add(1, Ordering::Relaxed);
    }

    fn record_completion(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
        self.queue_depth.fetch_sub(1, Ordering::Relaxed);
    }

    fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        self.queue_depth.fetch_sub(1, Ordering::Relaxed);
    }

    /// Undo a submit whose send failed.
    fn record_rejected(&self) {
        self.submitted.fetch_sub(1, Ordering::Relaxed);
        self.queue_depth.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn queue_depth(&self) -> usize {
        self.queue_depth.load(Ordering::Relaxed)
    }
}

enum Message<T> {
    Job(T),
    Flush(mpsc::Sender<()>),
}

/// A named background queue with exactly one consumer thread.
pub struct Worker<T: Send + 'static> {
    name: String,
    sender: RwLock<Option<mpsc::Sender<Message<T>>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
    metrics: Arc<WorkerMetrics>,
}

impl<T: Send + 'static> Worker<T> {
    /// Spawn the consumer thread and return the queue front.
    pub fn spawn<H>(name: impl Into<String>, mut handler: H) -> Result<Self, WorkerError>
    where
        H: JobHandler<T>,
    {
        let name = name.into();
        let (tx, rx) = mpsc::channel::<Message<T>>();
        let metrics = Arc::new(WorkerMetrics::new());

        let thread_metrics = Arc::clone(&metrics);
        let thread_name = name.clone();
        let handle = thread::Builder::new()
            .name(format!("beacon-{name}"))
            .spawn(move || {
                debug!(worker = %thread_name, "Worker started");
                for message in rx.iter() {
                    match message {
                        Message::Job(job) => {
                            let outcome =
                                panic::catch_unwind(AssertUnwindSafe(|| handler.handle(job)));
                            match outcome {
                                Ok(Ok(())) => thread_metrics.record_completion(),
                                Ok(Err(e)) => {
                                    error!(worker = %thread_name, error = %e, "Job failed");
                                    thread_metrics.record_failure();
                                }
                                Err(panic) => {
                                    error!(
                                        worker = %thread_name,
                                        panic_message = ?panic,
                                        "Job panicked"
                                    );
                                    thread_metrics.record_failure();
                                }
                            }
                        }
                        Message::Flush(ack) => {
                            if ack.send(()).is_err() {
                                debug!(worker = %thread_name, "Flush waiter gave up");
                            }
                        }
                    }
                }
                handler.close();
                debug!(worker = %thread_name, "Worker exiting");
            })
            .map_err(|source| WorkerError::Spawn {
                name: name.clone(),
                source,
            })?;

        info!(worker = %name, "Worker queue created");

        Ok(Self {
            name,
            sender: RwLock::new(Some(tx)),
            handle: Mutex::new(Some(handle)),
            metrics,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metrics(&self) -> &Arc<WorkerMetrics> {
        &self.metrics
    }

    /// Enqueue a job without waiting for it.
    pub fn submit(&self, job: T) -> Result<(), WorkerError> {
        self.send(Message::Job(job))
    }

    fn send(&self, message: Message<T>) -> Result<(), WorkerError> {
        let guard = self.sender.read().unwrap_or_else(PoisonError::into_inner);
        let Some(sender) = guard.as_ref() else {
            return Err(self.closed());
        };
        let is_job = matches!(message, Message::Job(_));
        if is_job {
            self.metrics.record_submit();
        }
        sender.send(message).map_err(|_| {
            if is_job {
                self.metrics.record_rejected();
            }
            self.closed()
        })
    }

    /// Block until all jobs submitted before this call have been processed.
    ///
    /// Returns `false` if the worker is closed or `timeout` elapses first.
    pub fn flush(&self, timeout: Duration) -> bool {
        let (ack_tx, ack_rx) = mpsc::channel();
        if self.send(Message::Flush(ack_tx)).is_err() {
            return false;
        }
        ack_rx.recv_timeout(timeout).is_ok()
    }

    /// Close the queue, let the consumer drain what is already queued and wait for it to exit.
    ///
    /// Idempotent. Jobs submitted afterwards are rejected with [`WorkerError::Closed`].
    pub fn shutdown(&self) {
        let sender = self
            .sender
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        drop(sender);

        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!(worker = %self.name, "Worker thread panicked during shutdown");
            }
        }
    }

    fn closed(&self) -> WorkerError {
        WorkerError::Closed {
            name: self.name.clone(),
        }
    }
}

impl<T: Send + 'static> Drop for Worker<T> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
