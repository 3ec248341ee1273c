//! Error types for telemetry decoding and feature control.
//!
//! All errors implement the `std::error::Error` trait and carry structured
//! context so callers can log them and decide on recovery.
//!
//! ## Error Categories
//!
//! - **Transport Errors**: the diagnostic link dropped or a send failed
//! - **Decode Errors**: short or malformed broadcast frames (benign, dropped)
//! - **Config Errors**: feature or safety thresholds rejected at load time
//! - **Sink Errors**: a parameter-adjustment request was refused by the ECU
//! - **Timeouts**: a sink or transport call exceeded its budget
//! - **Channel Errors**: an internal task channel closed during shutdown
//!
//! ## Recovery and Retry
//!
//! Errors provide a method to determine if they are worth retrying:
//!
//! ```rust
//! use overboost::TelemetryError;
//!
//! let error = TelemetryError::transport("connection lost");
//! if error.is_retryable() {
//!     println!("Can retry this operation");
//! }
//! ```
//!
//! ## Helper Constructors
//!
//! Use helper methods for common error scenarios:
//!
//! ```rust
//! use overboost::TelemetryError;
//!
//! let short = TelemetryError::short_frame(0x700, 3, 8);
//! let config = TelemetryError::config("launch_rpm", "must be between 1000 and 9000");
//! ```

use std::time::Duration;
use thiserror::Error;

/// Result type alias for telemetry operations.
pub type Result<T, E = TelemetryError> = std::result::Result<T, E>;

/// Main error type for telemetry and feature-control operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TelemetryError {
    #[error("Transport error: {reason}")]
    Transport {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Decode error on frame {id:#x}: {details}")]
    Decode { id: u32, details: String },

    #[error("Invalid config for '{field}': {details}")]
    Config { field: String, details: String },

    #[error("Parameter sink rejected {request}: {details}")]
    Sink {
        request: String,
        details: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    #[error("Internal channel closed: {context}")]
    ChannelClosed { context: String },
}

impl TelemetryError {
    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            TelemetryError::Transport { .. } => true,
            TelemetryError::Sink { .. } => true,
            TelemetryError::Timeout { .. } => true,
            TelemetryError::Decode { .. } => false,
            TelemetryError::Config { .. } => false,
            TelemetryError::ChannelClosed { .. } => false,
        }
    }

    /// Helper constructor for transport errors.
    pub fn transport(reason: impl Into<String>) -> Self {
        TelemetryError::Transport { reason: reason.into(), source: None }
    }

    /// Helper constructor for transport errors with a source.
    pub fn transport_with_source(
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        TelemetryError::Transport { reason: reason.into(), source: Some(source) }
    }

    /// Helper constructor for a frame shorter than its layout expects.
    pub fn short_frame(id: u32, got: usize, expected: usize) -> Self {
        TelemetryError::Decode {
            id,
            details: format!("payload too short: {got} bytes, layout expects {expected}"),
        }
    }

    /// Helper constructor for config validation failures.
    pub fn config(field: impl Into<String>, details: impl Into<String>) -> Self {
        TelemetryError::Config { field: field.into(), details: details.into() }
    }

    /// Helper constructor for parameter sink failures.
    pub fn sink(request: impl Into<String>, details: impl Into<String>) -> Self {
        TelemetryError::Sink { request: request.into(), details: details.into(), source: None }
    }

    /// Helper constructor for a closed internal channel.
    pub fn channel_closed(context: impl Into<String>) -> Self {
        TelemetryError::ChannelClosed { context: context.into() }
    }
}

impl From<std::io::Error> for TelemetryError {
    fn from(err: std::io::Error) -> Self {
        TelemetryError::Transport { reason: err.to_string(), source: Some(Box::new(err)) }
    }
}
