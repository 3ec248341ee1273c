//! Two-step rev limiting: one limiter, two ceilings.
//!
//! Installs a named rev limit while either launch conditions (low limit,
//! standing start) or flat-shift conditions (high limit, flat-foot gear
//! change) hold. The two sub-modes share their predicates with Launch
//! Control and Flat-Shift via [`super::conditions`] and are mutually
//! exclusive per activation: the sub-mode is chosen on entry and only its
//! own condition is consulted for exit.

use super::conditions;
use super::{Decision, FeatureLogic};
use crate::sink::{ParameterRequest, RevLimitName};
use crate::types::{FeatureName, FeatureState, TwoStepConfig, VehicleStateSnapshot};

pub struct TwoStepLogic {
    config: TwoStepConfig,
    /// Sub-mode chosen at the most recent activation.
    sub_mode: Option<RevLimitName>,
}

impl TwoStepLogic {
    pub fn new(config: TwoStepConfig) -> Self {
        Self { config, sub_mode: None }
    }

    fn launch_holds(&self, snap: &VehicleStateSnapshot) -> bool {
        conditions::launch_ready(snap, self.config.launch_limit_rpm)
    }

    fn flat_shift_holds(&self, snap: &VehicleStateSnapshot) -> bool {
        conditions::flat_shift_ready(snap, self.config.flat_shift_limit_rpm)
    }

    /// The sub-mode the most recent activation ran in, if any.
    pub fn sub_mode(&self) -> Option<RevLimitName> {
        self.sub_mode
    }
}

impl FeatureLogic for TwoStepLogic {
    fn name(&self) -> FeatureName {
        FeatureName::TwoStep
    }

    fn evaluate(&mut self, snap: &VehicleStateSnapshot, current: FeatureState) -> Decision {
        match current {
            FeatureState::Disabled => {
                // Launch wins when both could apply; a standing start at the
                // lower limit is the safer of the two.
                if self.launch_holds(snap) {
                    self.sub_mode = Some(RevLimitName::Launch);
                    Decision::Activate
                } else if self.flat_shift_holds(snap) {
                    self.sub_mode = Some(RevLimitName::FlatShift);
                    Decision::Activate
                } else {
                    Decision::Hold
                }
            }
            FeatureState::Active => {
                let holds = match self.sub_mode {
                    Some(RevLimitName::Launch) => self.launch_holds(snap),
                    Some(RevLimitName::FlatShift) => self.flat_shift_holds(snap),
                    None => false,
                };
                if holds { Decision::Hold } else { Decision::Deactivate }
            }
            FeatureState::Armed | FeatureState::Fault => Decision::Hold,
        }
    }

    fn activation_requests(&self) -> Vec<ParameterRequest> {
        let (name, rpm) = match self.sub_mode {
            Some(RevLimitName::FlatShift) => {
                (RevLimitName::FlatShift, self.config.flat_shift_limit_rpm)
            }
            // Launch is the default before any activation has happened.
            _ => (RevLimitName::Launch, self.config.launch_limit_rpm),
        };
        vec![ParameterRequest::SetRevLimit {
            name,
            rpm: rpm as u16,
            fuel_cut_pct: self.config.fuel_cut_pct,
            retard_deg: self.config.retard_deg,
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::snapshot_with;
    use crate::types::FieldUpdate;

    fn launch_snapshot() -> VehicleStateSnapshot {
        snapshot_with(&[
            FieldUpdate::ThrottlePct(100.0),
            FieldUpdate::Rpm(3500.0),
            FieldUpdate::Clutch(true),
            FieldUpdate::SpeedKph(0.0),
        ])
    }

    fn flat_shift_snapshot() -> VehicleStateSnapshot {
        snapshot_with(&[
            FieldUpdate::ThrottlePct(100.0),
            FieldUpdate::Rpm(6200.0),
            FieldUpdate::Clutch(true),
            FieldUpdate::CurrentGear(3),
            FieldUpdate::SpeedKph(90.0),
        ])
    }

    #[test]
    fn launch_conditions_select_the_launch_limit() {
        let mut logic = TwoStepLogic::new(TwoStepConfig::default());
        assert_eq!(logic.evaluate(&launch_snapshot(), FeatureState::Disabled), Decision::Activate);
        assert_eq!(logic.sub_mode(), Some(RevLimitName::Launch));
        assert_eq!(
            logic.activation_requests(),
            vec![ParameterRequest::SetRevLimit {
                name: RevLimitName::Launch,
                rpm: 4000,
                fuel_cut_pct: 100.0,
                retard_deg: 4.0,
            }]
        );
    }

    #[test]
    fn flat_shift_conditions_select_the_shift_limit() {
        let mut logic = TwoStepLogic::new(TwoStepConfig::default());
        assert_eq!(
            logic.evaluate(&flat_shift_snapshot(), FeatureState::Disabled),
            Decision::Activate
        );
        assert_eq!(logic.sub_mode(), Some(RevLimitName::FlatShift));
        assert!(matches!(
            logic.activation_requests()[0],
            ParameterRequest::SetRevLimit { name: RevLimitName::FlatShift, rpm: 6500, .. }
        ));
    }

    #[test]
    fn active_sub_mode_checks_only_its_own_condition() {
        let mut logic = TwoStepLogic::new(TwoStepConfig::default());
        logic.evaluate(&launch_snapshot(), FeatureState::Disabled);

        // Flat-shift conditions now hold instead, but the launch sub-mode is
        // the one active: its condition dropped, so the feature deactivates
        // rather than silently swapping limits.
        assert_eq!(
            logic.evaluate(&flat_shift_snapshot(), FeatureState::Active),
            Decision::Deactivate
        );
    }

    #[test]
    fn reset_carries_the_activated_limit_name() {
        let mut logic = TwoStepLogic::new(TwoStepConfig::default());
        logic.evaluate(&flat_shift_snapshot(), FeatureState::Disabled);
        assert_eq!(
            logic.reset_requests(),
            vec![ParameterRequest::ResetRevLimit { name: RevLimitName::FlatShift }]
        );
    }

    #[test]
    fn lifting_ends_either_sub_mode() {
        let mut logic = TwoStepLogic::new(TwoStepConfig::default());
        logic.evaluate(&launch_snapshot(), FeatureState::Disabled);
        let lifted = snapshot_with(&[FieldUpdate::ThrottlePct(5.0)]);
        assert_eq!(logic.evaluate(&lifted, FeatureState::Active), Decision::Deactivate);
    }
}
