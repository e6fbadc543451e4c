//! CSV frame record parser.
//!
//! Record layout, one per line:
//!
//! ```text
//! timestamp_ms,can_id,dlc,b0,b1,b2,b3,b4,b5,b6,b7[,interpretation]
//! ```
//!
//! Header lines, blank lines and anything that does not match the layout
//! yield `None`. Rejection is routine on a live serial link (boot banners,
//! partial lines after connect) and never an error.

use std::num::IntErrorKind;

use crate::frame::{DATA_COLUMNS, Frame};

/// Header token recognised case-insensitively in the first column.
pub const HEADER_TOKEN: &str = "timestamp";

/// Minimum number of columns: timestamp, id, dlc and the data columns.
pub const MIN_FIELDS: usize = 3 + DATA_COLUMNS;

const TIMESTAMP_COL: usize = 0;
const ID_COL: usize = 1;
const DLC_COL: usize = 2;
const DATA_START_COL: usize = 3;
const INTERPRETATION_COL: usize = DATA_START_COL + DATA_COLUMNS;

/// Parse one line into a [`Frame`].
///
/// Returns `None` for headers, blank lines, short rows, non-integer
/// timestamp or DLC, and empty identifiers.
pub fn parse_line(line: &str) -> Option<Frame> {
    if line.trim().is_empty() {
        return None;
    }

    let fields = split_fields(line);
    if is_header_field(&fields[TIMESTAMP_COL]) {
        tracing::trace!("skipping header line");
        return None;
    }

    if fields.len() < MIN_FIELDS {
        tracing::trace!(fields = fields.len(), "rejecting short line");
        return None;
    }

    let timestamp_ms = fields[TIMESTAMP_COL].parse::<u64>().ok()?;
    let dlc = parse_dlc(&fields[DLC_COL])?;

    let can_id = fields[ID_COL].as_str();
    if can_id.is_empty() {
        return None;
    }

    let data_bytes: [String; DATA_COLUMNS] =
        std::array::from_fn(|i| fields[DATA_START_COL + i].clone());

    let interpretation = fields
        .get(INTERPRETATION_COL)
        .map(String::as_str)
        .unwrap_or_default();

    Some(Frame::new(timestamp_ms, can_id, dlc, data_bytes, interpretation))
}

/// Parse the DLC column. Integers too large for `i64` saturate, so the
/// clamp still applies to them.
fn parse_dlc(field: &str) -> Option<i64> {
    match field.parse::<i64>() {
        Ok(dlc) => Some(dlc),
        Err(e) => match e.kind() {
            IntErrorKind::PosOverflow => Some(i64::MAX),
            IntErrorKind::NegOverflow => Some(i64::MIN),
            _ => None,
        },
    }
}

/// Whether the line is a column header row.
pub fn is_header(line: &str) -> bool {
    split_fields(line)
        .first()
        .is_some_and(|first| is_header_field(first))
}

fn is_header_field(field: &str) -> bool {
    field.eq_ignore_ascii_case(HEADER_TOKEN)
}

/// Split a line into trimmed, comma-delimited fields.
///
/// A field starting with `"` is quoted: commas inside it are literal and
/// `""` stands for one quote character. Text after the closing quote, up to
/// the next comma, is appended as-is. An unterminated quote runs to the end
/// of the line.
pub fn split_fields(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut chars = line.chars().peekable();

    loop {
        while chars.next_if(|c| c.is_whitespace()).is_some() {}

        let mut field = String::new();
        if chars.next_if_eq(&'"').is_some() {
            while let Some(c) = chars.next() {
                if c != '"' {
                    field.push(c);
                } else if chars.next_if_eq(&'"').is_some() {
                    field.push('"');
                } else {
                    break;
                }
            }
        }

        let mut more = false;
        for c in chars.by_ref() {
            if c == ',' {
                more = true;
                break;
            }
            field.push(c);
        }

        fields.push(field.trim().to_string());
        if !more {
            return fields;
        }
    }
}
