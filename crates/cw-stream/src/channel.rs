//! Frame hand-off queue between the blocking reader thread and the async
//! consumer.
//!
//! Single producer, single consumer, strict FIFO. The bounded flavour
//! suspends the producer thread while the queue is full; it never drops or
//! reorders frames.

use thiserror::Error;
use tokio::sync::mpsc;

use crate::frame::Frame;

/// The consumer side has gone away; the frame was not delivered.
#[derive(Debug, Error)]
#[error("frame channel closed")]
pub struct ChannelClosed;

/// Create a frame channel. `None` means unbounded.
pub fn frame_channel(capacity: Option<usize>) -> (FrameSender, FrameReceiver) {
    match capacity {
        Some(n) => {
            let (tx, rx) = mpsc::channel(n.max(1));
            (FrameSender::Bounded(tx), FrameReceiver::Bounded(rx))
        }
        None => {
            let (tx, rx) = mpsc::unbounded_channel();
            (FrameSender::Unbounded(tx), FrameReceiver::Unbounded(rx))
        }
    }
}

/// Producer handle. Used from a blocking thread, never from async code.
#[derive(Debug)]
pub enum FrameSender {
    Bounded(mpsc::Sender<Frame>),
    Unbounded(mpsc::UnboundedSender<Frame>),
}

impl FrameSender {
    /// Hand a frame to the consumer, blocking while a bounded queue is full.
    pub fn send(&self, frame: Frame) -> Result<(), ChannelClosed> {
        match self {
            Self::Bounded(tx) => tx.blocking_send(frame).map_err(|_| ChannelClosed),
            Self::Unbounded(tx) => tx.send(frame).map_err(|_| ChannelClosed),
        }
    }

    pub fn is_closed(&self) -> bool {
        match self {
            Self::Bounded(tx) => tx.is_closed(),
            Self::Unbounded(tx) => tx.is_closed(),
        }
    }
}

/// Consumer handle.
#[derive(Debug)]
pub enum FrameReceiver {
    Bounded(mpsc::Receiver<Frame>),
    Unbounded(mpsc::UnboundedReceiver<Frame>),
}

impl FrameReceiver {
    /// Wait for the next frame. `None` once the producer is gone and the
    /// queue is empty.
    pub async fn recv(&mut self) -> Option<Frame> {
        match self {
            Self::Bounded(rx) => rx.recv().await,
            Self::Unbounded(rx) => rx.recv().await,
        }
    }

    /// Take the next frame if one is already queued.
    pub fn try_recv(&mut self) -> Option<Frame> {
        match self {
            Self::Bounded(rx) => rx.try_recv().ok(),
            Self::Unbounded(rx) => rx.try_recv().ok(),
        }
    }
}
