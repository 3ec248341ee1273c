//! Overrun pop-and-bang: momentary retard-plus-fuel pulses on lift-off.
//!
//! Unlike the other features this never holds an Active state: each trigger
//! is a pulse whose parameter requests are reset automatically 200 ms later
//! on an independent timer ([`super::PULSE_SETTLE`]). The engine guarantees
//! at most one outstanding reset per pulse; this logic only supplies the
//! trigger predicate and the request table.

use super::conditions;
use super::{Decision, FeatureLogic};
use crate::sink::ParameterRequest;
use crate::types::{FeatureName, FeatureState, PopBangConfig, VehicleStateSnapshot};

pub struct PopBangLogic {
    config: PopBangConfig,
}

impl PopBangLogic {
    pub fn new(config: PopBangConfig) -> Self {
        Self { config }
    }
}

impl FeatureLogic for PopBangLogic {
    fn name(&self) -> FeatureName {
        FeatureName::PopBang
    }

    fn evaluate(&mut self, snap: &VehicleStateSnapshot, current: FeatureState) -> Decision {
        if current != FeatureState::Disabled {
            return Decision::Hold;
        }
        let overrun = snap.throttle_pct.value < conditions::LIFT_THROTTLE_PCT
            && snap.rpm.value > self.config.min_rpm
            && snap.speed_kph.value > self.config.min_speed_kph;
        if overrun { Decision::Pulse } else { Decision::Hold }
    }

    fn activation_requests(&self) -> Vec<ParameterRequest> {
        vec![
            ParameterRequest::SetIgnitionTimingOffset {
                degrees: -self.config.retard_deg,
                rpm_range: Some((self.config.min_rpm as u16, u16::MAX)),
            },
            ParameterRequest::SetFuelEnrichment {
                rpm_range: (self.config.min_rpm as u16, u16::MAX),
                load_range: (0.0, conditions::LIFT_THROTTLE_PCT),
                percent: self.config.fuel_add_pct,
                duration: Some(super::PULSE_SETTLE),
            },
        ]
    }
}
