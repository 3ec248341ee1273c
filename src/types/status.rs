//! Feature identity, state machine states, and externally visible status

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Instant;

/// The six performance features, in their fixed evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FeatureName {
    LaunchControl,
    FlatShift,
    AntiLag,
    PopBang,
    TwoStep,
    StealthMode,
}

impl FeatureName {
    /// The five polled features in the order the evaluation tick runs them.
    pub const POLLED: [FeatureName; 5] = [
        FeatureName::LaunchControl,
        FeatureName::FlatShift,
        FeatureName::AntiLag,
        FeatureName::PopBang,
        FeatureName::TwoStep,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FeatureName::LaunchControl => "launch_control",
            FeatureName::FlatShift => "flat_shift",
            FeatureName::AntiLag => "anti_lag",
            FeatureName::PopBang => "pop_bang",
            FeatureName::TwoStep => "two_step",
            FeatureName::StealthMode => "stealth_mode",
        }
    }
}

impl fmt::Display for FeatureName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state shared by every feature controller.
///
/// `Fault` is terminal until an explicit external reset; nothing in the
/// evaluation loop clears it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeatureState {
    Disabled,
    Armed,
    Active,
    Fault,
}

impl fmt::Display for FeatureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FeatureState::Disabled => "disabled",
            FeatureState::Armed => "armed",
            FeatureState::Active => "active",
            FeatureState::Fault => "fault",
        };
        f.write_str(s)
    }
}

/// Machine-readable fault codes attached to `FeatureState::Fault`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FaultCode {
    OverRev,
    OverBoost,
    OverTemp,
    AfrOutOfBand,
    SinkError,
}

impl FaultCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FaultCode::OverRev => "over_rev",
            FaultCode::OverBoost => "over_boost",
            FaultCode::OverTemp => "over_temp",
            FaultCode::AfrOutOfBand => "afr_out_of_band",
            FaultCode::SinkError => "sink_error",
        }
    }
}

impl fmt::Display for FaultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Externally visible status of one feature controller.
///
/// Owned and mutated only by the feature engine; everything outside the
/// evaluation task sees clones. `metrics` is the one deliberately open map,
/// reserved for per-feature diagnostic counters.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureStatus {
    pub state: FeatureState,
    pub last_updated: Instant,
    pub fault_code: Option<FaultCode>,
    pub metrics: HashMap<String, f64>,
}

impl FeatureStatus {
    pub fn new(now: Instant) -> Self {
        Self {
            state: FeatureState::Disabled,
            last_updated: now,
            fault_code: None,
            metrics: HashMap::new(),
        }
    }

    /// Bump a named diagnostic counter by one.
    pub fn bump(&mut self, metric: &str) {
        *self.metrics.entry(metric.to_string()).or_insert(0.0) += 1.0;
    }
}

/// One global safety fault, emitted exactly once per violation.
#[derive(Debug, Clone, PartialEq)]
pub struct FaultEvent {
    pub code: FaultCode,
    pub message: String,
    pub at: Instant,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fault_codes_render_machine_readable() {
        assert_eq!(FaultCode::OverBoost.as_str(), "over_boost");
        assert_eq!(FaultCode::OverRev.as_str(), "over_rev");
        assert_eq!(FaultCode::AfrOutOfBand.to_string(), "afr_out_of_band");
    }

    #[test]
    fn polled_order_is_fixed() {
        assert_eq!(
            FeatureName::POLLED,
            [
                FeatureName::LaunchControl,
                FeatureName::FlatShift,
                FeatureName::AntiLag,
                FeatureName::PopBang,
                FeatureName::TwoStep,
            ]
        );
    }

    #[test]
    fn status_starts_disabled_without_fault() {
        let status = FeatureStatus::new(Instant::now());
        assert_eq!(status.state, FeatureState::Disabled);
        assert!(status.fault_code.is_none());
        assert!(status.metrics.is_empty());
    }

    #[test]
    fn bump_accumulates_metrics() {
        let mut status = FeatureStatus::new(Instant::now());
        status.bump("activations");
        status.bump("activations");
        assert_eq!(status.metrics["activations"], 2.0);
    }
}
