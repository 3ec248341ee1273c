//! Launch control: hold rpm with retarded timing for a standing start.
//!
//! The only polled feature with an Armed stage: arming is an explicit
//! operator request and is refused unless the car is effectively stationary
//! with the engine near idle. Activation then waits for the driver to stage
//! (wide open throttle, clutch in, rpm up near the launch target).

use super::conditions;
use super::{Decision, FeatureLogic};
use crate::sink::ParameterRequest;
use crate::types::{FeatureName, FeatureState, LaunchConfig, VehicleStateSnapshot};

pub struct LaunchLogic {
    config: LaunchConfig,
    arm_requested: bool,
}

impl LaunchLogic {
    pub fn new(config: LaunchConfig) -> Self {
        Self { config, arm_requested: false }
    }
}

impl FeatureLogic for LaunchLogic {
    fn name(&self) -> FeatureName {
        FeatureName::LaunchControl
    }

    fn evaluate(&mut self, snap: &VehicleStateSnapshot, current: FeatureState) -> Decision {
        match current {
            FeatureState::Disabled => {
                if self.arm_requested
                    && snap.speed_kph.value < conditions::LAUNCH_MAX_SPEED_KPH
                    && snap.rpm.value < conditions::ARM_MAX_RPM
                {
                    Decision::Arm
                } else {
                    Decision::Hold
                }
            }
            FeatureState::Armed => {
                if !self.arm_requested {
                    Decision::Deactivate
                } else if conditions::launch_ready(snap, self.config.launch_rpm) {
                    // A launch consumes the arm request; the next one needs a
                    // fresh explicit arm.
                    self.arm_requested = false;
                    Decision::Activate
                } else {
                    Decision::Hold
                }
            }
            FeatureState::Active => {
                if snap.speed_kph.value > conditions::LAUNCH_EXIT_SPEED_KPH
                    || snap.throttle_pct.value < conditions::LIFT_THROTTLE_PCT
                {
                    Decision::Deactivate
                } else {
                    Decision::Hold
                }
            }
            FeatureState::Fault => Decision::Hold,
        }
    }

    fn activation_requests(&self) -> Vec<ParameterRequest> {
        let mut requests = vec![ParameterRequest::SetIgnitionTimingOffset {
            degrees: -self.config.retard_deg,
            rpm_range: None,
        }];
        if self.config.fuel_add_pct > 0.0 {
            requests.push(ParameterRequest::SetFuelEnrichment {
                rpm_range: (0, self.config.launch_rpm as u16),
                load_range: (0.0, 100.0),
                percent: self.config.fuel_add_pct,
                duration: None,
            });
        }
        requests
    }

    fn on_arm_request(&mut self) {
        self.arm_requested = true;
    }

    fn on_disarm_request(&mut self) {
        self.arm_requested = false;
    }
}
