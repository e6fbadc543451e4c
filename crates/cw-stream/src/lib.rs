//! Ingestion core for CAN frames streamed as CSV text over a serial link.
//!
//! Provides a strict line parser, a blocking `LineSource` abstraction with a
//! scripted mock for tests, the reader loop, a FIFO frame channel, the
//! last-writer-wins `AggregationTable`, and the `MonitorController` that ties
//! their lifecycles together.

pub mod channel;
pub mod controller;
pub mod error;
pub mod frame;
pub mod mock;
pub mod parser;
pub mod reader;
pub mod source;
pub mod status;
pub mod table;

// Re-export key types for convenience
pub use channel::{FrameReceiver, FrameSender, frame_channel};
pub use controller::{ControllerSettings, MonitorController, StopOutcome};
pub use error::{SourceError, SourceResult, StreamError, StreamResult};
pub use frame::{DATA_COLUMNS, Frame, MAX_DLC};
pub use mock::MockLineSource;
pub use parser::parse_line;
pub use reader::{ReaderExit, ReaderOutcome, ReaderStats, StreamReader};
pub use source::{InputClear, IoLineSource, LineSource};
pub use status::MonitorStatus;
pub use table::AggregationTable;
