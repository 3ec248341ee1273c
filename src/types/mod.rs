//! Core types for the telemetry and feature-control data model.
//!
//! This module provides the foundational data structures shared by the
//! decoder, the state store, and the feature engine:
//!
//! - [`TelemetryFrame`] is one immutable broadcast frame off the diagnostic bus
//! - [`VehicleStateSnapshot`] is the fixed, statically typed vehicle record
//! - [`FieldUpdate`] is a single typed field write produced by the decoder
//! - [`FeatureConfigs`] and [`SafetyLimits`] are whole-object-replace
//!   calibration, validated before use
//! - [`FeatureStatus`] is the externally visible state of one controller
//! - [`UpdateRate`] controls how fast status subscribers are fed

mod config;
mod frame;
mod state;
mod status;
mod update_rate;

pub use config::{
    AntiLagConfig, FeatureConfigs, FlatShiftConfig, LaunchConfig, PopBangConfig, SafetyLimits,
    StealthConfig, TwoStepConfig,
};
pub use frame::{MAX_PAYLOAD, TelemetryFrame};
pub use state::{FieldUpdate, Timestamped, VehicleStateSnapshot};
pub use status::{FaultCode, FaultEvent, FeatureName, FeatureState, FeatureStatus};
pub use update_rate::UpdateRate;
