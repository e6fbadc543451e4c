//! Reader loop: drains a [`LineSource`], parses each line and forwards the
//! accepted frames to the frame channel.
//!
//! Runs on a dedicated blocking thread. The stop signal is checked at the
//! top of every iteration, so an in-flight read finishes (or times out)
//! before the loop notices it.

use std::fmt;

use tokio::sync::watch;

use crate::channel::{ChannelClosed, FrameSender};
use crate::error::SourceError;
use crate::parser::parse_line;
use crate::source::LineSource;

/// Longest unterminated line kept while waiting for its newline.
pub const MAX_LINE_BYTES: usize = 1024;

/// Why the reader loop ended.
#[derive(Debug)]
pub enum ReaderExit {
    /// The stop signal was raised.
    StopRequested,
    /// The source reported end of stream.
    EndOfStream,
    /// The source failed (disconnect, I/O error).
    SourceFailed(SourceError),
    /// The consumer dropped its end of the frame channel.
    ConsumerGone,
}

impl ReaderExit {
    /// Whether the loop ended because of the device rather than a request.
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::SourceFailed(_))
    }
}

impl fmt::Display for ReaderExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StopRequested => f.write_str("stop requested"),
            Self::EndOfStream => f.write_str("end of stream"),
            Self::SourceFailed(e) => write!(f, "{e}"),
            Self::ConsumerGone => f.write_str("consumer stopped"),
        }
    }
}

/// Counters kept by one reader run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReaderStats {
    /// Non-empty lines handed to the parser.
    pub lines_read: u64,
    /// Lines that produced a frame.
    pub frames_accepted: u64,
    /// Lines the parser rejected (headers, banners, malformed rows).
    pub lines_rejected: u64,
    /// Reads that timed out with no data.
    pub idle_reads: u64,
}

/// Result of [`StreamReader::run`].
#[derive(Debug)]
pub struct ReaderOutcome {
    pub exit: ReaderExit,
    pub stats: ReaderStats,
}

/// Owns the byte source for the duration of one run.
pub struct StreamReader<S: LineSource> {
    source: S,
    frames: FrameSender,
    stop: watch::Receiver<bool>,
}

impl<S: LineSource> StreamReader<S> {
    pub fn new(source: S, frames: FrameSender, stop: watch::Receiver<bool>) -> Self {
        Self {
            source,
            frames,
            stop,
        }
    }

    /// Run until stopped, the source fails, or the consumer goes away.
    ///
    /// Blocking. The source is reset and released exactly once on every
    /// exit path, unwinding included.
    pub fn run(self) -> ReaderOutcome {
        let Self {
            source,
            frames,
            stop,
        } = self;
        let mut source = SourceGuard::new(source);
        let mut stats = ReaderStats::default();
        let mut buf = Vec::with_capacity(128);

        if let Err(e) = source.get().reset_input() {
            tracing::warn!(source = %source.name(), error = %e, "failed to reset input");
        }
        tracing::info!(source = %source.name(), "reader started");

        let exit = loop {
            if *stop.borrow() {
                break ReaderExit::StopRequested;
            }

            // `buf` keeps a partial line across timed-out reads until its
            // newline arrives.
            match source.get().read_line(&mut buf) {
                Ok(0) => {
                    stats.idle_reads += 1;
                    continue;
                }
                Ok(_) => {}
                Err(SourceError::Closed) => {
                    // Last line of a capture may lack its newline.
                    if forward_line(&buf, &frames, &mut stats).is_err() {
                        break ReaderExit::ConsumerGone;
                    }
                    break ReaderExit::EndOfStream;
                }
                Err(e) => {
                    tracing::warn!(source = %source.name(), error = %e, "source failed");
                    break ReaderExit::SourceFailed(e);
                }
            }

            if !buf.ends_with(b"\n") {
                if buf.len() > MAX_LINE_BYTES {
                    tracing::trace!(bytes = buf.len(), "discarding unterminated line");
                    stats.lines_rejected += 1;
                    buf.clear();
                }
                continue;
            }

            let sent = forward_line(&buf, &frames, &mut stats);
            buf.clear();
            if sent.is_err() {
                break ReaderExit::ConsumerGone;
            }
        };

        source.release();
        tracing::info!(
            exit = %exit,
            lines = stats.lines_read,
            frames = stats.frames_accepted,
            rejected = stats.lines_rejected,
            "reader stopped"
        );

        ReaderOutcome { exit, stats }
    }
}

/// Decode, trim and parse one line, sending the frame if it is valid.
fn forward_line(
    line: &[u8],
    frames: &FrameSender,
    stats: &mut ReaderStats,
) -> Result<(), ChannelClosed> {
    let text = decode_lossy(line);
    let line = text.trim();
    if line.is_empty() {
        return Ok(());
    }

    stats.lines_read += 1;
    match parse_line(line) {
        Some(frame) => {
            frames.send(frame)?;
            stats.frames_accepted += 1;
        }
        None => {
            stats.lines_rejected += 1;
            tracing::trace!(line, "discarding line");
        }
    }
    Ok(())
}

/// Decode bytes as UTF-8, dropping invalid sequences instead of replacing
/// them.
pub fn decode_lossy(bytes: &[u8]) -> String {
    let mut text = String::with_capacity(bytes.len());
    for chunk in bytes.utf8_chunks() {
        text.push_str(chunk.valid());
    }
    text
}

/// Resets and releases the source when the reader is done with it.
struct SourceGuard<S: LineSource> {
    source: S,
    released: bool,
}

impl<S: LineSource> SourceGuard<S> {
    fn new(source: S) -> Self {
        Self {
            source,
            released: false,
        }
    }

    fn get(&mut self) -> &mut S {
        &mut self.source
    }

    fn name(&self) -> &str {
        self.source.name()
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Err(e) = self.source.reset_input() {
            tracing::debug!(source = %self.source.name(), error = %e, "reset on release failed");
        }
        if let Err(e) = self.source.close() {
            tracing::warn!(source = %self.source.name(), error = %e, "failed to release source");
        }
    }
}

impl<S: LineSource> Drop for SourceGuard<S> {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::frame_channel;
    use crate::mock::MockLineSource;

    const FRAME_A: &str = "1000,0x1A0,8,0x01,0x02,0x03,0x04,0x05,0x06,0x07,0x08,EngineRPM 1500";
    const FRAME_B: &str = "1010,0x2B0,2,0xAA,0xBB,0,0,0,0,0,0";

    fn run_to_end(mock: &MockLineSource) -> (ReaderOutcome, Vec<crate::frame::Frame>) {
        let (tx, mut rx) = frame_channel(None);
        let (_stop_tx, stop_rx) = watch::channel(false);
        let outcome = StreamReader::new(mock.clone(), tx, stop_rx).run();
        let mut frames = Vec::new();
        while let Some(f) = rx.try_recv() {
            frames.push(f);
        }
        (outcome, frames)
    }

    #[test]
    fn forwards_valid_frames_and_skips_noise() {
        let mock = MockLineSource::with_lines([
            "timestamp,id,dlc,d0,d1,d2,d3,d4,d5,d6,d7,interpretation",
            "Enhanced CAN Bus Listener v2.0",
            FRAME_A,
            "",
            "abc,0x1A0,8,0,0,0,0,0,0,0,0",
            FRAME_B,
        ])
        .end_when_drained();

        let (outcome, frames) = run_to_end(&mock);

        assert!(matches!(outcome.exit, ReaderExit::EndOfStream));
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].can_id(), "0x1A0");
        assert_eq!(frames[1].can_id(), "0x2B0");
        assert_eq!(outcome.stats.lines_read, 5);
        assert_eq!(outcome.stats.frames_accepted, 2);
        assert_eq!(outcome.stats.lines_rejected, 3);
    }

    #[test]
    fn timeouts_are_not_fatal() {
        let mock = MockLineSource::new().end_when_drained();
        mock.push_timeout();
        mock.push_line(FRAME_A);
        mock.push_timeout();
        mock.push_line(FRAME_B);

        let (outcome, frames) = run_to_end(&mock);
        assert_eq!(frames.len(), 2);
        assert_eq!(outcome.stats.idle_reads, 2);
    }

    #[test]
    fn partial_line_is_joined_across_timeouts() {
        let mock = MockLineSource::new().end_when_drained();
        mock.push_bytes(b"100".to_vec());
        mock.push_timeout();
        mock.push_bytes(b"0,0x1A0,1,0x01,0,0,0,0,0,0,0,rpm\n".to_vec());

        let (outcome, frames) = run_to_end(&mock);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].timestamp_ms(), 1000);
        assert_eq!(outcome.stats.lines_read, 1);
        assert_eq!(outcome.stats.idle_reads, 1);
    }

    #[test]
    fn unterminated_last_line_is_parsed_at_end_of_stream() {
        let mock = MockLineSource::new().end_when_drained();
        mock.push_bytes(FRAME_B.as_bytes().to_vec());

        let (outcome, frames) = run_to_end(&mock);
        assert!(matches!(outcome.exit, ReaderExit::EndOfStream));
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].can_id(), "0x2B0");
    }

    #[test]
    fn overlong_unterminated_line_is_dropped() {
        let mock = MockLineSource::new().end_when_drained();
        mock.push_bytes(vec![b'x'; MAX_LINE_BYTES + 1]);
        mock.push_line(FRAME_A);

        let (outcome, frames) = run_to_end(&mock);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].timestamp_ms(), 1000);
        assert_eq!(outcome.stats.lines_rejected, 1);
    }

    #[test]
    fn crlf_and_invalid_bytes_are_tolerated() {
        let mock = MockLineSource::new().end_when_drained();
        let mut bytes = b"1000,0x1A0,8,0x01,0x02,0x03,".to_vec();
        bytes.extend_from_slice(&[0xFF, 0xFE]);
        bytes.extend_from_slice(b"0x04,0x05,0x06,0x07,0x08,Engine\xC3RPM\r\n");
        mock.push_bytes(bytes);

        let (_, frames) = run_to_end(&mock);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data_bytes()[3], "0x04");
        assert_eq!(frames[0].interpretation(), "EngineRPM");
    }

    #[test]
    fn disconnect_stops_and_releases_once() {
        let mock = MockLineSource::with_lines([FRAME_A]);
        mock.push_disconnect();
        mock.push_line(FRAME_B);

        let (outcome, frames) = run_to_end(&mock);

        assert!(outcome.exit.is_failure());
        assert!(matches!(
            outcome.exit,
            ReaderExit::SourceFailed(SourceError::Disconnected(_))
        ));
        assert_eq!(frames.len(), 1);
        assert_eq!(mock.pending(), 1);
        assert_eq!(mock.close_count(), 1);
        assert_eq!(mock.reset_count(), 2);
    }

    #[test]
    fn io_fault_is_fatal() {
        let mock = MockLineSource::new();
        mock.push_fault();
        let (outcome, _) = run_to_end(&mock);
        assert!(matches!(
            outcome.exit,
            ReaderExit::SourceFailed(SourceError::Io(_))
        ));
        assert!(mock.is_closed());
    }

    #[test]
    fn stop_signal_checked_before_reading() {
        let mock = MockLineSource::with_lines([FRAME_A]);
        let (tx, _rx) = frame_channel(None);
        let (stop_tx, stop_rx) = watch::channel(false);
        stop_tx.send(true).unwrap();

        let outcome = StreamReader::new(mock.clone(), tx, stop_rx).run();

        assert!(matches!(outcome.exit, ReaderExit::StopRequested));
        assert_eq!(mock.read_count(), 0);
        assert_eq!(mock.close_count(), 1);
    }

    #[test]
    fn exits_when_consumer_gone() {
        let mock = MockLineSource::with_lines([FRAME_A, FRAME_B]);
        let (tx, rx) = frame_channel(None);
        drop(rx);
        let (_stop_tx, stop_rx) = watch::channel(false);

        let outcome = StreamReader::new(mock.clone(), tx, stop_rx).run();
        assert!(matches!(outcome.exit, ReaderExit::ConsumerGone));
        assert_eq!(mock.close_count(), 1);
    }

    #[test]
    fn decode_drops_invalid_sequences() {
        assert_eq!(decode_lossy(b"ab\xFFcd"), "abcd");
        assert_eq!(decode_lossy("grüß".as_bytes()), "grüß");
        assert_eq!(decode_lossy(&[0xC3]), "");
    }

    #[test]
    fn exit_reasons_read_well() {
        assert_eq!(ReaderExit::StopRequested.to_string(), "stop requested");
        assert_eq!(ReaderExit::EndOfStream.to_string(), "end of stream");
        assert_eq!(
            ReaderExit::SourceFailed(SourceError::Disconnected("ttyACM0".into())).to_string(),
            "device disconnected: ttyACM0"
        );
    }
}
