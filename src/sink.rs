//! Parameter sink vocabulary and trait.
//!
//! Feature controllers never touch the ECU directly; they emit
//! [`ParameterRequest`] values into a [`ParameterSink`]. The vocabulary is
//! fixed: every `Set*` has a matching `Reset*`, and resets are idempotent, so
//! reapplying one twice is harmless. That property is what lets the engine
//! retry a failed reset and lets the safety monitor blanket-reset everything
//! without bookkeeping.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::Result;

/// Named rev limits managed by the two-step feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RevLimitName {
    Launch,
    FlatShift,
}

impl RevLimitName {
    pub fn as_str(&self) -> &'static str {
        match self {
            RevLimitName::Launch => "launch",
            RevLimitName::FlatShift => "flat_shift",
        }
    }
}

/// One parameter-adjustment request toward the ECU.
///
/// An rpm range is `(low, high)` in engine rpm; a load range is `(low, high)`
/// in relative load percent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ParameterRequest {
    SetIgnitionTimingOffset {
        degrees: f32,
        rpm_range: Option<(u16, u16)>,
    },
    ResetIgnitionTimingOffset,

    SetFuelEnrichment {
        rpm_range: (u16, u16),
        load_range: (f32, f32),
        percent: f32,
        duration: Option<Duration>,
    },
    ResetFuelEnrichment,

    SetIgnitionCut {
        rpm_threshold: u16,
        degrees: f32,
        duration: Duration,
    },
    ResetIgnitionCut,

    SetFuelCut {
        rpm_threshold: u16,
        percent: f32,
        duration: Duration,
    },
    ResetFuelCut,

    SetRevLimit {
        name: RevLimitName,
        rpm: u16,
        fuel_cut_pct: f32,
        retard_deg: f32,
    },
    ResetRevLimit {
        name: RevLimitName,
    },

    SetBoostControl {
        target_psi: f32,
        ramp_psi_per_s: f32,
    },
    ResetBoostControl,

    SetThrottleBlip {
        rpm_range: (u16, u16),
        percent: f32,
        duration: Duration,
    },
    ResetThrottleBlip,
}

impl ParameterRequest {
    /// Stable request name for logging and sink error context.
    pub fn kind(&self) -> &'static str {
        match self {
            ParameterRequest::SetIgnitionTimingOffset { .. } => "set_ignition_timing_offset",
            ParameterRequest::ResetIgnitionTimingOffset => "reset_ignition_timing_offset",
            ParameterRequest::SetFuelEnrichment { .. } => "set_fuel_enrichment",
            ParameterRequest::ResetFuelEnrichment => "reset_fuel_enrichment",
            ParameterRequest::SetIgnitionCut { .. } => "set_ignition_cut",
            ParameterRequest::ResetIgnitionCut => "reset_ignition_cut",
            ParameterRequest::SetFuelCut { .. } => "set_fuel_cut",
            ParameterRequest::ResetFuelCut => "reset_fuel_cut",
            ParameterRequest::SetRevLimit { .. } => "set_rev_limit",
            ParameterRequest::ResetRevLimit { .. } => "reset_rev_limit",
            ParameterRequest::SetBoostControl { .. } => "set_boost_control",
            ParameterRequest::ResetBoostControl => "reset_boost_control",
            ParameterRequest::SetThrottleBlip { .. } => "set_throttle_blip",
            ParameterRequest::ResetThrottleBlip => "reset_throttle_blip",
        }
    }

    /// Whether this request is a reset.
    pub fn is_reset(&self) -> bool {
        matches!(
            self,
            ParameterRequest::ResetIgnitionTimingOffset
                | ParameterRequest::ResetFuelEnrichment
                | ParameterRequest::ResetIgnitionCut
                | ParameterRequest::ResetFuelCut
                | ParameterRequest::ResetRevLimit { .. }
                | ParameterRequest::ResetBoostControl
                | ParameterRequest::ResetThrottleBlip
        )
    }

    /// The idempotent reset matching a set request.
    ///
    /// Resets map to themselves, so blanket reset batches can be built from
    /// mixed request lists.
    pub fn matching_reset(&self) -> ParameterRequest {
        match self {
            ParameterRequest::SetIgnitionTimingOffset { .. }
            | ParameterRequest::ResetIgnitionTimingOffset => {
                ParameterRequest::ResetIgnitionTimingOffset
            }
            ParameterRequest::SetFuelEnrichment { .. } | ParameterRequest::ResetFuelEnrichment => {
                ParameterRequest::ResetFuelEnrichment
            }
            ParameterRequest::SetIgnitionCut { .. } | ParameterRequest::ResetIgnitionCut => {
                ParameterRequest::ResetIgnitionCut
            }
            ParameterRequest::SetFuelCut { .. } | ParameterRequest::ResetFuelCut => {
                ParameterRequest::ResetFuelCut
            }
            ParameterRequest::SetRevLimit { name, .. }
            | ParameterRequest::ResetRevLimit { name } => {
                ParameterRequest::ResetRevLimit { name: *name }
            }
            ParameterRequest::SetBoostControl { .. } | ParameterRequest::ResetBoostControl => {
                ParameterRequest::ResetBoostControl
            }
            ParameterRequest::SetThrottleBlip { .. } | ParameterRequest::ResetThrottleBlip => {
                ParameterRequest::ResetThrottleBlip
            }
        }
    }
}

/// Trait for the ECU-side parameter adjustment interface.
///
/// Sink calls are potentially blocking I/O; the feature engine wraps every
/// call in a bounded timeout so a slow sink never stalls the next evaluation
/// tick.
#[async_trait::async_trait]
pub trait ParameterSink: Send + Sync + 'static {
    /// Apply one parameter-adjustment request.
    ///
    /// # Errors
    ///
    /// Returns [`crate::TelemetryError::Sink`] when the ECU refuses the
    /// request. Failures on a `Set*` fault the requesting feature; failures
    /// on a `Reset*` are retried once and then logged.
    async fn apply(&self, request: ParameterRequest) -> Result<()>;
}
