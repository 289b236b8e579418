//! Polling tailer for a single growing file.
//!
//! A [`Tailer`] remembers the last size and read offset of its file, checks
//! the file every poll interval, and hands each batch of newly completed lines
//! to its [`LineSink`]. Truncation or replacement of the file resets the read
//! offset to the beginning.

use crate::error::{Error, Result};
use crate::source::{self, TrailingLine};
use futures::FutureExt;
use futures::future::{self, BoxFuture};
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock, broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Receives each batch of new lines found by a [`Tailer`].
pub trait LineSink: Send + Sync {
    /// Deliver one batch. An error is fatal to the tailer that produced it.
    fn deliver(&self, lines: Vec<String>) -> BoxFuture<'_, Result<()>>;
}

impl LineSink for mpsc::UnboundedSender<Vec<String>> {
    fn deliver(&self, lines: Vec<String>) -> BoxFuture<'_, Result<()>> {
        let result = self.send(lines).map_err(|_| Error::SinkClosed);
        Box::pin(future::ready(result))
    }
}

/// Settings for one tailed file.
#[derive(Debug, Clone)]
pub struct TailConfig {
    pub path: PathBuf,
    pub poll_interval: Duration,
    pub trailing: TrailingLine,
}

impl TailConfig {
    pub fn new<P: AsRef<Path>>(path: P, poll_interval: Duration) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            poll_interval,
            trailing: TrailingLine::default(),
        }
    }

    pub fn with_trailing(mut self, trailing: TrailingLine) -> Self {
        self.trailing = trailing;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(Error::InvalidConfig {
                message: "poll interval must be positive".to_string(),
            });
        }
        if self.path.as_os_str().is_empty() {
            return Err(Error::InvalidConfig {
                message: "file path must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

/// Point-in-time view of a tailer, for status endpoints.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TailStatus {
    #[serde(rename = "is_running")]
    pub running: bool,
    pub file_path: String,
    pub last_size: u64,
    #[serde(rename = "last_position")]
    pub last_offset: u64,
    /// Seconds between polls.
    pub poll_interval: f64,
    pub file_exists: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct TailState {
    last_size: u64,
    last_offset: u64,
}

/// Detect if the file was truncated by comparing current size with last size
fn detect_file_truncation(current_size: u64, last_size: u64) -> bool {
    current_size < last_size
}

struct Shared {
    config: TailConfig,
    state: Mutex<TailState>,
    running: AtomicBool,
    sink: RwLock<Option<Arc<dyn LineSink>>>,
    // Serializes whole checks; `state` is only held for reads and writes.
    check: Mutex<()>,
}

impl Shared {
    async fn check_for_changes(&self) -> Result<()> {
        let _check = self.check.lock().await;
        let path = &self.config.path;

        let current_size = source::file_size(path).await;
        let TailState {
            last_size,
            last_offset,
        } = *self.state.lock().await;

        if detect_file_truncation(current_size, last_size) {
            info!(
                path = %path.display(),
                previous = last_size,
                current = current_size,
                "File was truncated or recreated, resetting position"
            );
            *self.state.lock().await = TailState {
                last_size: current_size,
                last_offset: 0,
            };
            return Ok(());
        }

        if current_size == last_size {
            return Ok(());
        }

        let (lines, new_offset) =
            source::read_appended_lines(path, last_offset, self.config.trailing).await;

        if !lines.is_empty() {
            debug!(path = %path.display(), lines = lines.len(), "Detected new lines");
            let sink = self.sink.read().await.clone();
            if let Some(sink) = sink {
                sink.deliver(lines).await?;
            }
        }

        // The file may have grown again between the stat and the read.
        *self.state.lock().await = TailState {
            last_size: current_size.max(new_offset),
            last_offset: new_offset,
        };
        Ok(())
    }
}

struct Worker {
    handle: JoinHandle<()>,
    shutdown: broadcast::Sender<()>,
}

/// Tails one file, delivering appended lines to a [`LineSink`].
pub struct Tailer {
    shared: Arc<Shared>,
    worker: Mutex<Option<Worker>>,
}

impl Tailer {
    /// Create a stopped tailer with no sink.
    pub fn new(config: TailConfig) -> Result<Self> {
        Self::build(config, None)
    }

    /// Create a stopped tailer delivering to `sink`.
    pub fn with_sink(config: TailConfig, sink: Arc<dyn LineSink>) -> Result<Self> {
        Self::build(config, Some(sink))
    }

    fn build(config: TailConfig, sink: Option<Arc<dyn LineSink>>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            shared: Arc::new(Shared {
                config,
                state: Mutex::new(TailState::default()),
                running: AtomicBool::new(false),
                sink: RwLock::new(sink),
                check: Mutex::new(()),
            }),
            worker: Mutex::new(None),
        })
    }

    /// Begin tailing from the current end of the file.
    ///
    /// Content already in the file is not replayed. Calling this while the
    /// tailer is running only logs a warning.
    pub async fn start(&self) {
        let mut worker = self.worker.lock().await;
        if self.shared.running.load(Ordering::SeqCst) {
            warn!(path = %self.path().display(), "Tailer is already running");
            return;
        }

        // A previous polling task that halted on a fault.
        if let Some(stale) = worker.take() {
            let _ = stale.handle.await;
        }

        let path = self.path();
        if !source::ensure_file_exists(path).await {
            warn!(path = %path.display(), "Tailing a file that could not be created");
        }

        let size = source::file_size(path).await;
        *self.shared.state.lock().await = TailState {
            last_size: size,
            last_offset: size,
        };
        self.shared.running.store(true, Ordering::SeqCst);

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = tokio::spawn(poll_loop(Arc::clone(&self.shared), shutdown_rx));
        *worker = Some(Worker {
            handle,
            shutdown: shutdown_tx,
        });

        info!(path = %path.display(), size, "Started tailing file");
    }

    /// Stop tailing and wait for the polling task to finish.
    ///
    /// No batch is delivered after this returns. Stopping a stopped tailer
    /// does nothing.
    pub async fn stop(&self) {
        let mut worker = self.worker.lock().await;
        if !self.shared.running.swap(false, Ordering::SeqCst) {
            return;
        }

        if let Some(Worker { handle, shutdown }) = worker.take() {
            // Ignore errors if the task already exited
            let _ = shutdown.send(());
            if let Err(e) = handle.await {
                error!(error = %e, "Polling task ended abnormally");
            }
        }

        info!(path = %self.path().display(), "Tailer stopped");
    }

    /// Run one change check outside the polling loop.
    pub async fn check_for_changes(&self) -> Result<()> {
        self.shared.check_for_changes().await
    }

    /// Replace the sink. The next poll delivers to the new one.
    pub async fn set_sink(&self, sink: Arc<dyn LineSink>) {
        *self.shared.sink.write().await = Some(sink);
    }

    /// Detach the sink. Later batches are read and discarded.
    pub async fn clear_sink(&self) {
        *self.shared.sink.write().await = None;
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    pub fn path(&self) -> &Path {
        &self.shared.config.path
    }

    pub fn config(&self) -> &TailConfig {
        &self.shared.config
    }

    pub async fn status(&self) -> TailStatus {
        let state = *self.shared.state.lock().await;
        let config = &self.shared.config;
        TailStatus {
            running: self.is_running(),
            file_path: config.path.display().to_string(),
            last_size: state.last_size,
            last_offset: state.last_offset,
            poll_interval: config.poll_interval.as_secs_f64(),
            file_exists: source::file_exists(&config.path).await,
        }
    }
}

impl Drop for Tailer {
    fn drop(&mut self) {
        self.shared.running.store(false, Ordering::SeqCst);
        if let Some(worker) = self.worker.get_mut() {
            // The detached task exits at its next suspension point
            let _ = worker.shutdown.send(());
        }
    }
}

/// Background task polling the file until shutdown or a fatal fault
async fn poll_loop(shared: Arc<Shared>, mut shutdown_rx: broadcast::Receiver<()>) {
    let path = shared.config.path.clone();

    while shared.running.load(Ordering::SeqCst) {
        let outcome = AssertUnwindSafe(shared.check_for_changes())
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!(path = %path.display(), error = %e, "Error in tailer loop, halting");
                shared.running.store(false, Ordering::SeqCst);
                break;
            }
            Err(_) => {
                error!(path = %path.display(), "Tailer loop panicked, halting");
                shared.running.store(false, Ordering::SeqCst);
                break;
            }
        }

        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = tokio::time::sleep(shared.config.poll_interval) => {}
        }
    }

    debug!(path = %path.display(), "Tailer loop exited");
}
