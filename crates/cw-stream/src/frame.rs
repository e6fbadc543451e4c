//! The parsed CAN frame record.

use serde::Serialize;

/// Number of data columns every record carries, regardless of DLC.
pub const DATA_COLUMNS: usize = 8;

/// Largest valid data length count for classic CAN.
pub const MAX_DLC: u8 = 8;

/// One CAN frame as reported by the device.
///
/// Immutable once built. `data_bytes` always holds [`DATA_COLUMNS`] tokens
/// and `dlc` is always within `0..=MAX_DLC`; only the first `dlc` tokens
/// carry payload, the rest are padding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Frame {
    timestamp_ms: u64,
    can_id: String,
    dlc: u8,
    data_bytes: [String; DATA_COLUMNS],
    interpretation: String,
}

impl Frame {
    /// Build a frame, clamping `dlc` into `0..=MAX_DLC`.
    pub fn new(
        timestamp_ms: u64,
        can_id: impl Into<String>,
        dlc: i64,
        data_bytes: [String; DATA_COLUMNS],
        interpretation: impl Into<String>,
    ) -> Self {
        Self {
            timestamp_ms,
            can_id: can_id.into(),
            dlc: clamp_dlc(dlc),
            data_bytes,
            interpretation: interpretation.into(),
        }
    }

    /// Device-reported elapsed milliseconds. Not guaranteed monotonic.
    pub fn timestamp_ms(&self) -> u64 {
        self.timestamp_ms
    }

    /// Identifier exactly as received, e.g. `0x1A0`.
    pub fn can_id(&self) -> &str {
        &self.can_id
    }

    pub fn dlc(&self) -> u8 {
        self.dlc
    }

    /// All eight data columns, padding included.
    pub fn data_bytes(&self) -> &[String; DATA_COLUMNS] {
        &self.data_bytes
    }

    pub fn interpretation(&self) -> &str {
        &self.interpretation
    }

    /// The first `dlc` data tokens.
    pub fn payload(&self) -> &[String] {
        &self.data_bytes[..usize::from(self.dlc)]
    }

    /// Payload tokens joined by single spaces, e.g. `0x01 0x02`.
    pub fn data_display(&self) -> String {
        self.payload().join(" ")
    }

    /// Device timestamp in seconds with millisecond precision, e.g. `1.500s`.
    pub fn elapsed_display(&self) -> String {
        format!("{}.{:03}s", self.timestamp_ms / 1000, self.timestamp_ms % 1000)
    }
}

/// Clamp a raw DLC value into `0..=MAX_DLC`.
pub fn clamp_dlc(raw: i64) -> u8 {
    // Lossless: the clamped value fits in u8.
    raw.clamp(0, i64::from(MAX_DLC)) as u8
}
