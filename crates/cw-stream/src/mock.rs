//! Mock line source for testing.
//!
//! Serves a scripted queue of reads and records how the reader used it.
//! All tests use this instead of a serial device so the suite runs in CI on
//! any platform.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::{SourceError, SourceResult};
use crate::source::LineSource;

/// Simulated read window once the script runs dry.
const IDLE_READ_WAIT: Duration = Duration::from_millis(5);

/// One scripted outcome of `read_line`.
#[derive(Debug, Clone)]
enum ScriptedRead {
    Bytes(Vec<u8>),
    Timeout,
    Disconnect,
    Fault,
}

#[derive(Debug, Default)]
struct MockState {
    script: VecDeque<ScriptedRead>,
    end_when_drained: bool,
    closed: bool,
    reads: usize,
    reads_after_close: usize,
    resets: usize,
    closes: usize,
}

/// Scripted line source. Clones share state, so a test can keep a handle
/// for assertions after moving the source into a reader.
#[derive(Debug, Clone)]
pub struct MockLineSource {
    name: String,
    state: Arc<Mutex<MockState>>,
}

impl MockLineSource {
    /// Create a mock with an empty script. Once drained it behaves like an
    /// idle link: every read times out.
    pub fn new() -> Self {
        Self {
            name: "mock".to_string(),
            state: Arc::default(),
        }
    }

    /// Create a mock pre-loaded with text lines (a `\n` is appended to each).
    pub fn with_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mock = Self::new();
        for line in lines {
            mock.push_line(line.as_ref());
        }
        mock
    }

    /// Label reported by [`LineSource::name`].
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Report end of stream once the script is drained instead of idling.
    pub fn end_when_drained(self) -> Self {
        self.state.lock().end_when_drained = true;
        self
    }

    /// Queue a text line.
    pub fn push_line(&self, line: &str) {
        let mut bytes = line.as_bytes().to_vec();
        bytes.push(b'\n');
        self.push_bytes(bytes);
    }

    /// Queue raw bytes returned verbatim by one read.
    pub fn push_bytes(&self, bytes: Vec<u8>) {
        self.state.lock().script.push_back(ScriptedRead::Bytes(bytes));
    }

    /// Queue one read that times out with no data.
    pub fn push_timeout(&self) {
        self.state.lock().script.push_back(ScriptedRead::Timeout);
    }

    /// Queue a device disconnect.
    pub fn push_disconnect(&self) {
        self.state.lock().script.push_back(ScriptedRead::Disconnect);
    }

    /// Queue a generic I/O failure.
    pub fn push_fault(&self) {
        self.state.lock().script.push_back(ScriptedRead::Fault);
    }

    /// Number of `read_line` calls so far.
    pub fn read_count(&self) -> usize {
        self.state.lock().reads
    }

    /// Number of `read_line` calls made after the source was closed.
    pub fn reads_after_close(&self) -> usize {
        self.state.lock().reads_after_close
    }

    /// Number of `reset_input` calls so far.
    pub fn reset_count(&self) -> usize {
        self.state.lock().resets
    }

    /// Number of times the source was actually released.
    pub fn close_count(&self) -> usize {
        self.state.lock().closes
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Scripted reads not yet consumed.
    pub fn pending(&self) -> usize {
        self.state.lock().script.len()
    }
}

impl Default for MockLineSource {
    fn default() -> Self {
        Self::new()
    }
}

impl LineSource for MockLineSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn reset_input(&mut self) -> SourceResult<()> {
        self.state.lock().resets += 1;
        Ok(())
    }

    fn read_line(&mut self, buf: &mut Vec<u8>) -> SourceResult<usize> {
        let next = {
            let mut state = self.state.lock();
            state.reads += 1;
            if state.closed {
                state.reads_after_close += 1;
                return Err(SourceError::Closed);
            }
            match state.script.pop_front() {
                Some(read) => read,
                None if state.end_when_drained => return Err(SourceError::Closed),
                None => ScriptedRead::Timeout,
            }
        };

        match next {
            ScriptedRead::Bytes(bytes) => {
                buf.extend_from_slice(&bytes);
                Ok(bytes.len())
            }
            ScriptedRead::Timeout => {
                std::thread::sleep(IDLE_READ_WAIT);
                Ok(0)
            }
            ScriptedRead::Disconnect => Err(SourceError::Disconnected(format!(
                "{}: device unplugged",
                self.name
            ))),
            ScriptedRead::Fault => Err(SourceError::Io(format!("{}: scripted fault", self.name))),
        }
    }

    fn close(&mut self) -> SourceResult<()> {
        let mut state = self.state.lock();
        if !state.closed {
            state.closed = true;
            state.closes += 1;
        }
        Ok(())
    }
}
