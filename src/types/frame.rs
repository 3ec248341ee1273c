//! Raw broadcast frame type for the acquisition path

use std::time::Instant;

/// Maximum payload length of a diagnostic bus frame.
pub const MAX_PAYLOAD: usize = 8;

/// One broadcast frame off the diagnostic bus.
///
/// This is the fundamental data unit that flows into the decoder. Frames are
/// immutable: the transport produces them and the decoder consumes each one
/// exactly once.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetryFrame {
    /// Arbitration id distinguishing message types on the bus
    pub id: u32,

    /// Payload bytes; only the first `dlc` are valid
    data: [u8; MAX_PAYLOAD],

    /// Number of valid payload bytes (0..=8)
    dlc: usize,

    /// When the transport handed us this frame
    pub received_at: Instant,
}

impl TelemetryFrame {
    /// Create a frame from raw payload bytes, truncating anything past 8.
    pub fn new(id: u32, payload: &[u8], received_at: Instant) -> Self {
        let dlc = payload.len().min(MAX_PAYLOAD);
        let mut data = [0u8; MAX_PAYLOAD];
        data[..dlc].copy_from_slice(&payload[..dlc]);
        Self { id, data, dlc, received_at }
    }

    /// The valid payload bytes.
    pub fn payload(&self) -> &[u8] {
        &self.data[..self.dlc]
    }

    /// Number of valid payload bytes.
    pub fn dlc(&self) -> usize {
        self.dlc
    }
}
