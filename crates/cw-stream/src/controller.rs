//! Lifecycle controller: opens the source, runs the reader and the drain
//! loop, and stops them.
//!
//! ```text
//! opener ──► StreamReader (blocking thread) ──► frame channel ──► drain task ──► AggregationTable
//!                  ▲                                                  ▲
//!                  └──────────────── stop signal (watch) ─────────────┘
//! ```
//!
//! The reader and the drain task share nothing but the channel and the stop
//! signal. A supervisor task waits for both to finish, then publishes the
//! final status and marks the source as released.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::channel::frame_channel;
use crate::error::{SourceResult, StreamError, StreamResult};
use crate::reader::{ReaderStats, StreamReader};
use crate::source::LineSource;
use crate::status::MonitorStatus;
use crate::table::AggregationTable;

/// Tunables for one monitor run.
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    /// Frame channel capacity. `None` is unbounded.
    pub channel_capacity: Option<usize>,
    /// How long `stop()` waits for the reader to release the source.
    pub stop_timeout: Duration,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            channel_capacity: None,
            stop_timeout: Duration::from_secs(1),
        }
    }
}

/// Result of [`MonitorController::stop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// The reader has exited and released the source.
    Released,
    /// The reader was still inside a read when the timeout elapsed.
    TimedOut,
}

/// Coordinates one monitor run. Share it behind an `Arc`; every method
/// takes `&self`.
pub struct MonitorController {
    settings: ControllerSettings,
    table: AggregationTable,
    started: AtomicBool,
    stop_tx: watch::Sender<bool>,
    status_tx: Arc<watch::Sender<MonitorStatus>>,
    released_tx: Mutex<Option<watch::Sender<bool>>>,
    released_rx: watch::Receiver<bool>,
    stats: Arc<Mutex<Option<ReaderStats>>>,
}

impl MonitorController {
    /// Create an idle controller with status `Connecting` and an empty table.
    pub fn new(settings: ControllerSettings) -> Self {
        let (stop_tx, _) = watch::channel(false);
        let (status_tx, _) = watch::channel(MonitorStatus::Connecting);
        let (released_tx, released_rx) = watch::channel(false);
        Self {
            settings,
            table: AggregationTable::new(),
            started: AtomicBool::new(false),
            stop_tx,
            status_tx: Arc::new(status_tx),
            released_tx: Mutex::new(Some(released_tx)),
            released_rx,
            stats: Arc::default(),
        }
    }

    /// Open the source with `opener` and start the reader and drain loops.
    ///
    /// An open failure is fatal to the run: no loop is started, the status
    /// becomes `Stopped` and the error is returned. Must be called from
    /// within a Tokio runtime.
    pub async fn start<S, F>(&self, opener: F) -> StreamResult<()>
    where
        S: LineSource + 'static,
        F: FnOnce() -> SourceResult<S> + Send + 'static,
    {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(StreamError::AlreadyStarted);
        }
        let Some(released_tx) = self.released_tx.lock().take() else {
            return Err(StreamError::AlreadyStarted);
        };

        self.status_tx.send_replace(MonitorStatus::Connecting);
        let opened = tokio::task::spawn_blocking(opener)
            .await
            .map_err(|e| StreamError::Join(e.to_string()))
            .and_then(|result| result.map_err(StreamError::Open));

        let source = match opened {
            Ok(source) => source,
            Err(e) => {
                tracing::error!(error = %e, "failed to open source");
                self.status_tx.send_replace(MonitorStatus::Stopped {
                    reason: e.to_string(),
                });
                released_tx.send_replace(true);
                return Err(e);
            }
        };

        let port = source.name().to_string();
        tracing::info!(port = %port, "source opened");
        self.status_tx
            .send_replace(MonitorStatus::Connected { port: port.clone() });

        let (frames_tx, frames_rx) = frame_channel(self.settings.channel_capacity);
        let reader = StreamReader::new(source, frames_tx, self.stop_tx.subscribe());
        let reader_handle = tokio::task::spawn_blocking(move || reader.run());

        let table = self.table.clone();
        let stop_rx = self.stop_tx.subscribe();
        let drain_handle = tokio::spawn(async move {
            let applied = table.drain(frames_rx, stop_rx).await;
            tracing::debug!(applied, "drain loop finished");
        });

        let status_tx = Arc::clone(&self.status_tx);
        let stats = Arc::clone(&self.stats);
        tokio::spawn(async move {
            let reason = match reader_handle.await {
                Ok(outcome) => {
                    if outcome.exit.is_failure() {
                        tracing::warn!(port = %port, exit = %outcome.exit, "reader stopped");
                    }
                    *stats.lock() = Some(outcome.stats);
                    outcome.exit.to_string()
                }
                Err(e) => {
                    tracing::error!(port = %port, error = %e, "reader task failed");
                    format!("reader task failed: {e}")
                }
            };
            // The reader dropped its sender on exit, so the drain loop ends
            // once the queued frames are applied.
            if let Err(e) = drain_handle.await {
                tracing::error!(error = %e, "drain task failed");
            }
            status_tx.send_replace(MonitorStatus::Stopped { reason });
            released_tx.send_replace(true);
        });

        Ok(())
    }

    /// Signal both loops to stop and wait for the reader to release the
    /// source, up to the configured stop timeout.
    ///
    /// Idempotent and safe to call concurrently from any task.
    pub async fn stop(&self) -> StopOutcome {
        if !self.stop_tx.send_replace(true) {
            tracing::info!("stop requested");
        }

        if !self.started.load(Ordering::SeqCst) {
            return StopOutcome::Released;
        }

        let mut released = self.released_rx.clone();
        match tokio::time::timeout(self.settings.stop_timeout, released.wait_for(|r| *r)).await {
            Ok(_) => StopOutcome::Released,
            Err(_) => {
                tracing::warn!(
                    timeout = ?self.settings.stop_timeout,
                    "reader did not release the source in time"
                );
                StopOutcome::TimedOut
            }
        }
    }

    /// Whether `stop()` has been called.
    pub fn stop_requested(&self) -> bool {
        *self.stop_tx.borrow()
    }

    /// Whether the reader has exited and released the source.
    pub fn is_released(&self) -> bool {
        *self.released_rx.borrow()
    }

    pub fn status(&self) -> MonitorStatus {
        self.status_tx.borrow().clone()
    }

    /// Subscribe to status changes.
    pub fn watch_status(&self) -> watch::Receiver<MonitorStatus> {
        self.status_tx.subscribe()
    }

    /// Handle to the aggregation table, readable from any context.
    pub fn table(&self) -> AggregationTable {
        self.table.clone()
    }

    /// Counters from the finished reader run, once it has exited.
    pub fn reader_stats(&self) -> Option<ReaderStats> {
        *self.stats.lock()
    }
}

impl Default for MonitorController {
    fn default() -> Self {
        Self::new(ControllerSettings::default())
    }
}
