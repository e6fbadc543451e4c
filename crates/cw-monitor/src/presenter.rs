//! Renders table snapshots to a terminal or as JSON lines.
//!
//! The presenter polls the controller on its own cadence; it never touches
//! the reader or the channel.

use std::io::Write;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time;

use cw_stream::{Frame, MonitorController, MonitorStatus};

use crate::config::OutputMode;

/// ANSI clear-screen + cursor-home, written before each table redraw.
const CLEAR_SCREEN: &str = "\x1b[2J\x1b[H";

const HEADERS: [&str; 4] = ["CAN ID", "Hex Data", "Last Timestamp", "Interpretation"];

/// One rendered row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowView {
    pub can_id: String,
    pub data: String,
    pub last_timestamp: String,
    pub interpretation: String,
}

impl From<&Frame> for RowView {
    fn from(frame: &Frame) -> Self {
        Self {
            can_id: frame.can_id().to_string(),
            data: frame.data_display(),
            last_timestamp: frame.elapsed_display(),
            interpretation: frame.interpretation().to_string(),
        }
    }
}

/// JSON document written once per refresh in [`OutputMode::Json`].
#[derive(Debug, Serialize)]
struct JsonRefresh<'a> {
    at: DateTime<Utc>,
    status: &'a MonitorStatus,
    status_text: &'a str,
    rows: &'a [Frame],
}

/// Status line text; appends the baud rate while connected when known.
pub fn status_line(status: &MonitorStatus, baud: Option<u32>) -> String {
    match (status, baud) {
        (MonitorStatus::Connected { .. }, Some(baud)) => format!("{status} @ {baud} baud"),
        _ => status.to_string(),
    }
}

/// Render rows as a fixed-width table under a status line.
pub fn render_table(status: &str, rows: &[Frame]) -> String {
    let views: Vec<RowView> = rows.iter().map(RowView::from).collect();

    let mut widths = HEADERS.map(str::len);
    for view in &views {
        for (width, cell) in widths.iter_mut().zip(cells(view)) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    out.push_str(status);
    out.push('\n');
    push_row(&mut out, &widths, HEADERS);
    push_row(&mut out, &widths, widths.map(|w| "-".repeat(w)).each_ref().map(String::as_str));
    for view in &views {
        push_row(&mut out, &widths, cells(view));
    }
    out
}

/// Render one refresh as a single JSON line.
pub fn render_json(
    status: &MonitorStatus,
    status_text: &str,
    rows: &[Frame],
    at: DateTime<Utc>,
) -> serde_json::Result<String> {
    serde_json::to_string(&JsonRefresh {
        at,
        status,
        status_text,
        rows,
    })
}

fn cells(view: &RowView) -> [&str; 4] {
    [
        view.can_id.as_str(),
        view.data.as_str(),
        view.last_timestamp.as_str(),
        view.interpretation.as_str(),
    ]
}

fn push_row(out: &mut String, widths: &[usize; 4], cells: [&str; 4]) {
    let line = widths
        .iter()
        .zip(cells)
        .map(|(&width, cell)| format!("{cell:<width$}"))
        .collect::<Vec<_>>()
        .join("  ");
    out.push_str(line.trim_end());
    out.push('\n');
}

/// Tracks what was last shown so unchanged refreshes print nothing.
#[derive(Debug)]
pub struct Presenter {
    mode: OutputMode,
    baud: Option<u32>,
    last: Option<(MonitorStatus, Vec<Frame>)>,
}

impl Presenter {
    pub fn new(mode: OutputMode, baud: Option<u32>) -> Self {
        Self {
            mode,
            baud,
            last: None,
        }
    }

    /// Render the given state if it differs from the previous refresh.
    pub fn refresh(
        &mut self,
        status: MonitorStatus,
        rows: Vec<Frame>,
    ) -> serde_json::Result<Option<String>> {
        if self
            .last
            .as_ref()
            .is_some_and(|(s, r)| *s == status && *r == rows)
        {
            return Ok(None);
        }

        let text = status_line(&status, self.baud);
        let rendered = match self.mode {
            OutputMode::Table => format!("{CLEAR_SCREEN}{}", render_table(&text, &rows)),
            OutputMode::Json => {
                let mut line = render_json(&status, &text, &rows, Utc::now())?;
                line.push('\n');
                line
            }
        };
        self.last = Some((status, rows));
        Ok(Some(rendered))
    }
}

/// Refresh loop: poll the controller every `interval` and write changes to
/// `out`.
///
/// Runs until the controller has been asked to stop, or, with
/// `exit_when_stopped`, until the reader has stopped and the final state has
/// been shown.
pub async fn run<W: Write>(
    controller: &MonitorController,
    presenter: &mut Presenter,
    interval: Duration,
    exit_when_stopped: bool,
    mut out: W,
) -> std::io::Result<()> {
    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(time::MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;

        let status = controller.status();
        let stopped = status.is_stopped();
        if let Some(rendered) = presenter.refresh(status, controller.table().snapshot())? {
            out.write_all(rendered.as_bytes())?;
            out.flush()?;
        }

        if controller.stop_requested() || (exit_when_stopped && stopped) {
            return Ok(());
        }
    }
}
