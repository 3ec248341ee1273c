//! Anti-lag: keep the turbine spooled off-throttle.
//!
//! Purely condition-driven with no Armed stage: active exactly while rpm sits
//! in the configured window, the throttle is closed below the threshold, and
//! the turbo is off boost. Retarded timing plus extra fuel move combustion
//! into the exhaust to keep shaft speed up.

use super::conditions;
use super::{Decision, FeatureLogic};
use crate::sink::ParameterRequest;
use crate::types::{AntiLagConfig, FeatureName, FeatureState, VehicleStateSnapshot};

pub struct AntiLagLogic {
    config: AntiLagConfig,
}

impl AntiLagLogic {
    pub fn new(config: AntiLagConfig) -> Self {
        Self { config }
    }

    fn window_holds(&self, snap: &VehicleStateSnapshot) -> bool {
        let rpm = snap.rpm.value;
        rpm >= self.config.min_rpm
            && rpm <= self.config.max_rpm
            && snap.throttle_pct.value < self.config.throttle_threshold_pct
            && snap.boost_psi.value < conditions::ANTI_LAG_MAX_BOOST_PSI
    }
}

impl FeatureLogic for AntiLagLogic {
    fn name(&self) -> FeatureName {
        FeatureName::AntiLag
    }

    fn evaluate(&mut self, snap: &VehicleStateSnapshot, current: FeatureState) -> Decision {
        let holds = self.window_holds(snap);
        match current {
            FeatureState::Disabled if holds => Decision::Activate,
            FeatureState::Active if !holds => Decision::Deactivate,
            _ => Decision::Hold,
        }
    }

    fn activation_requests(&self) -> Vec<ParameterRequest> {
        let rpm_range = (self.config.min_rpm as u16, self.config.max_rpm as u16);
        vec![
            ParameterRequest::SetIgnitionTimingOffset {
                degrees: -self.config.retard_deg,
                rpm_range: Some(rpm_range),
            },
            ParameterRequest::SetFuelEnrichment {
                rpm_range,
                load_range: (0.0, self.config.throttle_threshold_pct),
                percent: self.config.fuel_add_pct,
                duration: None,
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::snapshot_with;
    use crate::types::FieldUpdate;
    use proptest::prelude::*;

    #[test]
    fn active_inside_the_window_only() {
        let mut logic = AntiLagLogic::new(AntiLagConfig::default());

        let inside = snapshot_with(&[
            FieldUpdate::Rpm(3000.0),
            FieldUpdate::ThrottlePct(5.0),
            FieldUpdate::BoostPsi(1.0),
        ]);
        assert_eq!(logic.evaluate(&inside, FeatureState::Disabled), Decision::Activate);
        assert_eq!(logic.evaluate(&inside, FeatureState::Active), Decision::Hold);

        let on_boost = snapshot_with(&[
            FieldUpdate::Rpm(3000.0),
            FieldUpdate::ThrottlePct(5.0),
            FieldUpdate::BoostPsi(6.0),
        ]);
        assert_eq!(logic.evaluate(&on_boost, FeatureState::Active), Decision::Deactivate);
        assert_eq!(logic.evaluate(&on_boost, FeatureState::Disabled), Decision::Hold);
    }

    #[test]
    fn activation_pairs_retard_with_enrichment() {
        let logic = AntiLagLogic::new(AntiLagConfig::default());
        let requests = logic.activation_requests();
        assert_eq!(requests.len(), 2);
        assert!(matches!(
            requests[0],
            ParameterRequest::SetIgnitionTimingOffset { degrees, .. } if degrees == -12.0
        ));
        assert!(matches!(requests[1], ParameterRequest::SetFuelEnrichment { .. }));
        assert_eq!(
            logic.reset_requests(),
            vec![
                ParameterRequest::ResetIgnitionTimingOffset,
                ParameterRequest::ResetFuelEnrichment,
            ]
        );
    }

    proptest! {
        #[test]
        fn decision_tracks_the_window_predicate(
            rpm in 0.0f32..=9000.0,
            throttle in 0.0f32..=100.0,
            boost in -5.0f32..=30.0,
        ) {
            let config = AntiLagConfig::default();
            let mut logic = AntiLagLogic::new(config);
            let snap = snapshot_with(&[
                FieldUpdate::Rpm(rpm),
                FieldUpdate::ThrottlePct(throttle),
                FieldUpdate::BoostPsi(boost),
            ]);
            let holds = rpm >= config.min_rpm
                && rpm <= config.max_rpm
                && throttle < config.throttle_threshold_pct
                && boost < 5.0;
            prop_assert_eq!(
                logic.evaluate(&snap, FeatureState::Disabled) == Decision::Activate,
                holds
            );
            prop_assert_eq!(
                logic.evaluate(&snap, FeatureState::Active) == Decision::Deactivate,
                !holds
            );
        }
    }
}
