//! Connection status reported to front ends.

use std::fmt;

use serde::Serialize;

/// Lifecycle state of the monitor, as shown in a status line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum MonitorStatus {
    /// Opening the byte source.
    Connecting,
    /// Reader loop running against `port`.
    Connected { port: String },
    /// Reader loop has exited; the table keeps its last-known rows.
    Stopped { reason: String },
}

impl MonitorStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self, Self::Stopped { .. })
    }
}

impl fmt::Display for MonitorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting => f.write_str("Connecting..."),
            Self::Connected { port } => write!(f, "Connected to {port}"),
            Self::Stopped { reason } => write!(f, "Reader stopped: {reason}"),
        }
    }
}
