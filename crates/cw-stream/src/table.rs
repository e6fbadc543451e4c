//! Last-writer-wins view of the bus: one row per CAN identifier.
//!
//! Rows keep the order in which identifiers were first seen, so a front end
//! can render a stable table that updates in place. Rows are never removed
//! while the monitor runs.
//!
//! Concurrency: a single `RwLock` guards the map. `apply` holds the write
//! lock for one upsert, `snapshot` holds the read lock for one clone of the
//! rows. Neither awaits while holding it, so a presentation loop calling
//! `snapshot` can never stall the consumer for longer than one copy, and
//! every row it sees is the result of one complete `apply`.

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use tokio::sync::watch;

use crate::channel::FrameReceiver;
use crate::frame::Frame;

/// Shared handle to the aggregation table. Clones refer to the same rows.
#[derive(Debug, Clone, Default)]
pub struct AggregationTable {
    rows: Arc<RwLock<IndexMap<String, Frame>>>,
}

impl AggregationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the row for `frame.can_id()`.
    ///
    /// The new frame replaces the previous one wholesale; no field survives
    /// from the old row.
    pub fn apply(&self, frame: Frame) {
        let mut rows = self.rows.write();
        match rows.get_mut(frame.can_id()) {
            Some(row) => *row = frame,
            None => {
                tracing::debug!(can_id = %frame.can_id(), "new identifier");
                rows.insert(frame.can_id().to_string(), frame);
            }
        }
    }

    /// Current rows in first-seen order.
    pub fn snapshot(&self) -> Vec<Frame> {
        self.rows.read().values().cloned().collect()
    }

    /// Current row for one identifier.
    pub fn get(&self, can_id: &str) -> Option<Frame> {
        self.rows.read().get(can_id).cloned()
    }

    /// Identifiers in first-seen order.
    pub fn ids(&self) -> Vec<String> {
        self.rows.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }

    /// Consumer loop: apply frames in channel order until the channel
    /// closes or `stop` turns true. Returns the number of frames applied.
    pub async fn drain(&self, mut frames: FrameReceiver, mut stop: watch::Receiver<bool>) -> usize {
        let mut applied = 0;
        // Stays false once the stop sender is gone; the channel closing
        // still ends the loop.
        let mut watching = true;

        loop {
            tokio::select! {
                biased;
                signal = stop.wait_for(|stopped| *stopped), if watching => {
                    if signal.is_ok() {
                        tracing::debug!(applied, "drain loop stopping on signal");
                        break;
                    }
                    watching = false;
                }
                next = frames.recv() => match next {
                    Some(frame) => {
                        self.apply(frame);
                        applied += 1;
                    }
                    None => {
                        tracing::debug!(applied, "frame channel closed");
                        break;
                    }
                },
            }
        }

        applied
    }
}
