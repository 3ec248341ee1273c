//! Flat-shift: ignition cut for full-throttle gear changes.
//!
//! No Armed stage; the feature engages the moment the driver pulls the
//! clutch at wide open throttle near the shift rpm, and releases with the
//! clutch.

use super::conditions;
use super::{Decision, FeatureLogic};
use crate::sink::ParameterRequest;
use crate::types::{FeatureName, FeatureState, FlatShiftConfig, VehicleStateSnapshot};

pub struct FlatShiftLogic {
    config: FlatShiftConfig,
}

impl FlatShiftLogic {
    pub fn new(config: FlatShiftConfig) -> Self {
        Self { config }
    }
}

impl FeatureLogic for FlatShiftLogic {
    fn name(&self) -> FeatureName {
        FeatureName::FlatShift
    }

    fn evaluate(&mut self, snap: &VehicleStateSnapshot, current: FeatureState) -> Decision {
        match current {
            FeatureState::Disabled => {
                if conditions::flat_shift_ready(snap, self.config.rpm) {
                    Decision::Activate
                } else {
                    Decision::Hold
                }
            }
            FeatureState::Active => {
                if snap.clutch.value {
                    Decision::Hold
                } else {
                    Decision::Deactivate
                }
            }
            FeatureState::Armed | FeatureState::Fault => Decision::Hold,
        }
    }

    fn activation_requests(&self) -> Vec<ParameterRequest> {
        vec![ParameterRequest::SetIgnitionCut {
            rpm_threshold: self.config.rpm as u16,
            degrees: self.config.cut_deg,
            duration: self.config.cut_duration,
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::snapshot_with;
    use crate::types::FieldUpdate;

    fn shifting_snapshot() -> crate::types::VehicleStateSnapshot {
        snapshot_with(&[
            FieldUpdate::ThrottlePct(100.0),
            FieldUpdate::Rpm(5200.0),
            FieldUpdate::Clutch(true),
            FieldUpdate::CurrentGear(3),
        ])
    }

    #[test]
    fn engages_at_wot_with_clutch_in_gear() {
        let mut logic = FlatShiftLogic::new(FlatShiftConfig::default());
        assert_eq!(logic.evaluate(&shifting_snapshot(), FeatureState::Disabled), Decision::Activate);
    }

    #[test]
    fn neutral_blocks_engagement() {
        let mut logic = FlatShiftLogic::new(FlatShiftConfig::default());
        let neutral = snapshot_with(&[
            FieldUpdate::ThrottlePct(100.0),
            FieldUpdate::Rpm(5200.0),
            FieldUpdate::Clutch(true),
            FieldUpdate::CurrentGear(0),
        ]);
        assert_eq!(logic.evaluate(&neutral, FeatureState::Disabled), Decision::Hold);
    }

    #[test]
    fn rpm_below_ninety_percent_blocks_engagement() {
        let mut logic = FlatShiftLogic::new(FlatShiftConfig::default());
        let low = snapshot_with(&[
            FieldUpdate::ThrottlePct(100.0),
            FieldUpdate::Rpm(4000.0),
            FieldUpdate::Clutch(true),
            FieldUpdate::CurrentGear(3),
        ]);
        assert_eq!(logic.evaluate(&low, FeatureState::Disabled), Decision::Hold);
    }

    #[test]
    fn clutch_release_ends_the_cut() {
        let mut logic = FlatShiftLogic::new(FlatShiftConfig::default());
        let released = snapshot_with(&[FieldUpdate::Clutch(false), FieldUpdate::Rpm(5200.0)]);
        assert_eq!(logic.evaluate(&released, FeatureState::Active), Decision::Deactivate);

        let held = snapshot_with(&[FieldUpdate::Clutch(true), FieldUpdate::Rpm(5200.0)]);
        assert_eq!(logic.evaluate(&held, FeatureState::Active), Decision::Hold);
    }

    #[test]
    fn activation_is_a_single_ignition_cut() {
        let logic = FlatShiftLogic::new(FlatShiftConfig::default());
        let requests = logic.activation_requests();
        assert_eq!(requests.len(), 1);
        assert!(matches!(
            requests[0],
            ParameterRequest::SetIgnitionCut { rpm_threshold: 5500, .. }
        ));
        assert_eq!(logic.reset_requests(), vec![ParameterRequest::ResetIgnitionCut]);
    }
}
