//! Frame transport trait for diagnostic-link sources

use crate::Result;
use crate::types::{MAX_PAYLOAD, TelemetryFrame};

/// Trait for diagnostic-link frame sources and sinks.
///
/// Transports abstract over the physical link (serial bridge, socket-CAN,
/// replay log) and handle their own timing internally: a push-capable link
/// suspends in `recv` until a frame arrives, a poll-only link sleeps its own
/// cadence. Link establishment, flow control, and reconnect policy all live
/// behind this trait, outside this crate.
#[async_trait::async_trait]
pub trait FrameTransport: Send + 'static {
    /// Receive the next broadcast frame.
    ///
    /// Returns:
    /// - `Ok(Some(frame))` - new frame available
    /// - `Ok(None)` - stream ended (normal termination, link closed)
    /// - `Err(e)` - transport error; the acquisition loop retries with backoff
    async fn recv(&mut self) -> Result<Option<TelemetryFrame>>;

    /// Send a raw frame onto the bus.
    ///
    /// # Errors
    ///
    /// Returns [`crate::TelemetryError::Transport`] when the link refuses the
    /// write, or a decode-class error when `payload` exceeds 8 bytes.
    async fn send(&mut self, id: u32, payload: &[u8]) -> Result<()>;
}

/// Validate an outgoing payload length before it reaches the link.
pub fn check_payload_len(id: u32, payload: &[u8]) -> Result<()> {
    if payload.len() > MAX_PAYLOAD {
        return Err(crate::TelemetryError::Decode {
            id,
            details: format!("outgoing payload of {} bytes exceeds 8", payload.len()),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oversize_outgoing_payload_is_rejected() {
        assert!(check_payload_len(0x700, &[0u8; 9]).is_err());
        assert!(check_payload_len(0x700, &[0u8; 8]).is_ok());
        assert!(check_payload_len(0x700, &[]).is_ok());
    }
}
