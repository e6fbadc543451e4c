//! Byte source abstraction: the blocking, line-oriented device the reader
//! drains.
//!
//! Opening and configuring the device (baud rate, read timeout) belongs to
//! the caller; the core receives an already-open source and is responsible
//! for releasing it.

use std::io::{self, BufRead, BufReader, ErrorKind, Read};

use crate::error::{SourceError, SourceResult};

/// Blocking line source, e.g. a serial device.
///
/// Analogous to an async bus interface, but blocking: implementations are
/// driven from a dedicated thread and must bound each read with their own
/// timeout.
pub trait LineSource: Send {
    /// Port or path label for status and logging.
    fn name(&self) -> &str;

    /// Discard any input buffered but not yet read.
    fn reset_input(&mut self) -> SourceResult<()>;

    /// Append the next line (including its `\n`, if any) to `buf`.
    ///
    /// Returns the number of bytes appended. A read that times out with no
    /// data returns `Ok(0)`.
    fn read_line(&mut self, buf: &mut Vec<u8>) -> SourceResult<usize>;

    /// Release the underlying device. Calling it again is a no-op.
    fn close(&mut self) -> SourceResult<()>;
}

impl<S: LineSource + ?Sized> LineSource for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn reset_input(&mut self) -> SourceResult<()> {
        (**self).reset_input()
    }

    fn read_line(&mut self, buf: &mut Vec<u8>) -> SourceResult<usize> {
        (**self).read_line(buf)
    }

    fn close(&mut self) -> SourceResult<()> {
        (**self).close()
    }
}

/// Discards input queued below the reader, e.g. in a serial driver.
pub type InputClear<R> = fn(&mut R) -> io::Result<()>;

/// Line source over any [`Read`] implementation: a serial port opened with a
/// read timeout, a capture file, stdin.
///
/// `TimedOut`, `WouldBlock` and `Interrupted` I/O errors are treated as a
/// timed-out read. End of input is reported as [`SourceError::Closed`].
pub struct IoLineSource<R> {
    name: String,
    reader: Option<BufReader<R>>,
    clear_input: Option<InputClear<R>>,
}

impl<R: Read + Send> IoLineSource<R> {
    pub fn new(name: impl Into<String>, reader: R) -> Self {
        Self {
            name: name.into(),
            reader: Some(BufReader::new(reader)),
            clear_input: None,
        }
    }

    /// Also run `clear` on the inner reader whenever input is reset.
    pub fn with_input_clear(mut self, clear: InputClear<R>) -> Self {
        self.clear_input = Some(clear);
        self
    }

    /// Whether the source has been released.
    pub fn is_closed(&self) -> bool {
        self.reader.is_none()
    }
}

impl<R: Read + Send> LineSource for IoLineSource<R> {
    fn name(&self) -> &str {
        &self.name
    }

    fn reset_input(&mut self) -> SourceResult<()> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(());
        };
        let buffered = reader.buffer().len();
        reader.consume(buffered);
        if let Some(clear) = self.clear_input {
            clear(reader.get_mut()).map_err(|e| SourceError::Io(format!("{}: {e}", self.name)))?;
        }
        Ok(())
    }

    fn read_line(&mut self, buf: &mut Vec<u8>) -> SourceResult<usize> {
        let Some(reader) = self.reader.as_mut() else {
            return Err(SourceError::Closed);
        };

        let start = buf.len();
        match reader.read_until(b'\n', buf) {
            Ok(0) => Err(SourceError::Closed),
            Ok(n) => Ok(n),
            // A timed-out read may still have appended a partial line.
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                ) =>
            {
                Ok(buf.len() - start)
            }
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::BrokenPipe
                        | ErrorKind::NotConnected
                        | ErrorKind::ConnectionReset
                        | ErrorKind::UnexpectedEof
                ) =>
            {
                Err(SourceError::Disconnected(format!("{}: {e}", self.name)))
            }
            Err(e) => Err(SourceError::Io(format!("{}: {e}", self.name))),
        }
    }

    fn close(&mut self) -> SourceResult<()> {
        if self.reader.take().is_some() {
            tracing::debug!(source = %self.name, "source released");
        }
        Ok(())
    }
}
