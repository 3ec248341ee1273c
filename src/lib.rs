//! Real-time vehicle telemetry decoding and performance-feature control over
//! a CAN diagnostic link.
//!
//! Overboost decodes the periodic broadcast frames of a turbocharged ECU into
//! a typed vehicle state, and drives six performance features against that
//! state at a fixed 100 Hz: launch control, flat-shift, anti-lag,
//! pop-and-bang, two-step rev limiting, and stealth mode. A global safety
//! monitor runs ahead of every feature and disables the lot when an engine
//! limit is violated.
//!
//! # Architecture
//!
//! - **Acquisition task**: owns the [`FrameTransport`], decodes frames, and
//!   feeds the shared [`VehicleStateStore`]
//! - **Evaluation task**: snapshots the store at 100 Hz, runs the safety
//!   monitor and the feature engine, and emits [`ParameterRequest`]s into the
//!   [`ParameterSink`]
//! - **[`EcuConnection`]**: the handle an application holds; state queries,
//!   status subscriptions, and operator commands
//!
//! Transports and sinks are traits: the physical link (serial CAN bridge,
//! socket-CAN, replay log) lives outside this crate.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use overboost::{Overboost, UpdateRate};
//! use futures::StreamExt;
//!
//! # async fn example(
//! #     transport: impl overboost::FrameTransport,
//! #     sink: impl overboost::ParameterSink,
//! # ) -> overboost::Result<()> {
//! let connection = Overboost::new().start(transport, sink).await?;
//!
//! connection.arm_launch_control().await?;
//!
//! let mut updates = connection.status_updates(UpdateRate::Max(10));
//! while let Some(status) = updates.next().await {
//!     for (name, feature) in status.iter() {
//!         println!("{name}: {}", feature.state);
//!     }
//! }
//! connection.shutdown().await?;
//! # Ok(())
//! # }
//! ```

// Core types and error handling
mod error;
#[cfg(any(test, feature = "benchmark"))]
pub mod test_utils;
pub mod types;

// Decoding and shared state
pub mod decoder;
pub mod store;

// Feature control
pub mod features;
pub mod safety;

// Stream-based connection architecture
pub mod connection;
pub mod driver;
pub mod sink;
pub mod stream;
pub mod transport;

// Core exports
pub use error::{Result, TelemetryError};
pub use types::*;

// Main API exports
pub use connection::EcuConnection;
pub use decoder::{FrameBus, FrameCallback, FrameDecoder, ids};
pub use driver::{Command, Driver, DriverChannels, EVALUATION_HZ, FeatureStatusMap};
pub use sink::{ParameterRequest, ParameterSink, RevLimitName};
pub use store::VehicleStateStore;
pub use transport::FrameTransport;

use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Builder and entry point for telemetry connections.
///
/// Configuration is validated when the connection starts; a bad threshold
/// never reaches a running controller.
///
/// # Example
///
/// ```rust,no_run
/// use overboost::{Overboost, FeatureConfigs, SafetyLimits};
///
/// # async fn example(
/// #     transport: impl overboost::FrameTransport,
/// #     sink: impl overboost::ParameterSink,
/// # ) -> overboost::Result<()> {
/// let mut configs = FeatureConfigs::default();
/// configs.launch.launch_rpm = 4500.0;
///
/// let connection = Overboost::new()
///     .with_configs(configs)
///     .with_safety_limits(SafetyLimits::default())
///     .start(transport, sink)
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct Overboost {
    configs: FeatureConfigs,
    limits: SafetyLimits,
    bus: FrameBus,
}

impl Overboost {
    /// Start building a connection with the default street calibration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the feature calibration.
    pub fn with_configs(mut self, configs: FeatureConfigs) -> Self {
        self.configs = configs;
        self
    }

    /// Replace the safety limits.
    pub fn with_safety_limits(mut self, limits: SafetyLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Register a raw-frame callback for one arbitration id.
    ///
    /// Callbacks run on the acquisition task in registration order, once per
    /// matching frame, including ids this crate has no layout for.
    /// Registration is builder-only; once the connection starts the callback
    /// set is fixed.
    pub fn on_frame<F>(mut self, id: u32, callback: F) -> Self
    where
        F: FnMut(&TelemetryFrame) -> Result<()> + Send + 'static,
    {
        self.bus.register(id, Box::new(callback));
        self
    }

    /// Validate the configuration and start the connection.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::Config`] when a feature threshold or safety
    /// limit is out of range. The transport is not touched in that case.
    pub async fn start<T, S>(self, transport: T, sink: S) -> Result<EcuConnection>
    where
        T: FrameTransport,
        S: ParameterSink,
    {
        self.configs.validate()?;
        self.limits.validate()?;

        let store = Arc::new(VehicleStateStore::new(Instant::now()));
        let decoder = FrameDecoder::new(self.bus);
        let channels = Driver::spawn(
            transport,
            decoder,
            Arc::clone(&store),
            self.configs,
            self.limits,
            Arc::new(sink),
        );

        info!(hz = EVALUATION_HZ, "overboost connection started");
        Ok(EcuConnection::new(channels, store))
    }
}
