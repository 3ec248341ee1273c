//! Feature controllers: one generic state-machine engine, six behaviors.
//!
//! Older implementations of this system carried six hand-rolled controllers
//! with subtly divergent condition logic. Here a single [`FeatureEngine`]
//! owns every controller's [`FeatureStatus`] and runs one shared transition
//! contract; the per-feature differences live behind the [`FeatureLogic`]
//! trait as pure predicates plus parameter-request tables. The predicates
//! that Launch Control, Flat-Shift, and Two-Step have in common are shared
//! functions in [`conditions`], so the features cannot drift apart.
//!
//! The engine enforces the parts of the contract that must never differ
//! between features: `Fault` is terminal until an external reset, every
//! activation batch has a matching idempotent reset batch, a sink failure on
//! activation faults only that feature, a sink failure on reset is retried
//! once, and every sink call carries a bounded timeout so a slow ECU never
//! stalls the next evaluation tick.

mod anti_lag;
mod flat_shift;
mod launch;
mod pop_bang;
mod stealth;
mod two_step;

pub use anti_lag::AntiLagLogic;
pub use flat_shift::FlatShiftLogic;
pub use launch::LaunchLogic;
pub use pop_bang::PopBangLogic;
pub use stealth::StealthController;
pub use two_step::TwoStepLogic;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::error::{Result, TelemetryError};
use crate::sink::{ParameterRequest, ParameterSink};
use crate::types::{
    FaultCode, FeatureConfigs, FeatureName, FeatureState, FeatureStatus, VehicleStateSnapshot,
};

/// Budget for a single parameter sink call. Two of these fit inside one
/// 10 ms evaluation tick, which bounds a full activation batch.
pub const SINK_CALL_TIMEOUT: Duration = Duration::from_millis(5);

/// Settle delay between a pop-and-bang pulse and its automatic reset.
pub const PULSE_SETTLE: Duration = Duration::from_millis(200);

/// Condition predicates shared across features.
///
/// Launch Control and Two-Step's launch sub-mode evaluate the same launch
/// predicate; Flat-Shift and Two-Step's flat-shift sub-mode evaluate the same
/// shift predicate. Sharing the functions is what keeps them in lockstep.
pub mod conditions {
    use crate::types::VehicleStateSnapshot;

    /// Wide-open-throttle threshold used by launch and flat-shift entry.
    pub const WOT_THROTTLE_PCT: f32 = 90.0;
    /// Closed-throttle threshold used by launch exit and pop-and-bang entry.
    pub const LIFT_THROTTLE_PCT: f32 = 10.0;
    /// A launch only makes sense from a near standstill.
    pub const LAUNCH_MAX_SPEED_KPH: f32 = 5.0;
    /// Rolling faster than this ends a launch.
    pub const LAUNCH_EXIT_SPEED_KPH: f32 = 30.0;
    /// Arming is refused above this rpm.
    pub const ARM_MAX_RPM: f32 = 1500.0;
    /// Anti-lag only runs while the turbo is off boost.
    pub const ANTI_LAG_MAX_BOOST_PSI: f32 = 5.0;

    /// Launch activation: wide open throttle, near the target rpm, clutch in,
    /// car stationary.
    pub fn launch_ready(snap: &VehicleStateSnapshot, launch_rpm: f32) -> bool {
        snap.throttle_pct.value > WOT_THROTTLE_PCT
            && snap.rpm.value > 0.8 * launch_rpm
            && snap.clutch.value
            && snap.speed_kph.value < LAUNCH_MAX_SPEED_KPH
    }

    /// Flat-shift activation: wide open throttle, near the shift rpm, clutch
    /// in, rolling in gear.
    pub fn flat_shift_ready(snap: &VehicleStateSnapshot, shift_rpm: f32) -> bool {
        snap.throttle_pct.value > WOT_THROTTLE_PCT
            && snap.rpm.value > 0.9 * shift_rpm
            && snap.clutch.value
            && snap.current_gear.value > 0
    }
}

/// Transition decision returned by a feature's `evaluate` for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Stay in the current state
    Hold,
    /// Disabled -> Armed
    Arm,
    /// -> Active, emitting the activation batch
    Activate,
    /// Back to Disabled; the reset batch is emitted when leaving Active
    Deactivate,
    /// Momentary activation: emit the batch now, auto-reset after
    /// [`PULSE_SETTLE`] on an independent timer
    Pulse,
}

/// Per-feature behavior plugged into the [`FeatureEngine`].
pub trait FeatureLogic: Send {
    fn name(&self) -> FeatureName;

    /// Decide this tick's transition from the latest snapshot. Must be pure
    /// apart from the logic's own bookkeeping; sink I/O belongs to the engine.
    fn evaluate(&mut self, snap: &VehicleStateSnapshot, current: FeatureState) -> Decision;

    /// Parameter requests emitted on activation (or on each pulse).
    fn activation_requests(&self) -> Vec<ParameterRequest>;

    /// Idempotent resets matching the activation batch. The default derives
    /// them from [`ParameterRequest::matching_reset`], deduplicated.
    fn reset_requests(&self) -> Vec<ParameterRequest> {
        let mut resets = Vec::new();
        for request in self.activation_requests() {
            let reset = request.matching_reset();
            if !resets.contains(&reset) {
                resets.push(reset);
            }
        }
        resets
    }

    /// Explicit external arm request (launch control only).
    fn on_arm_request(&mut self) {}

    /// Explicit external disarm request (launch control only).
    fn on_disarm_request(&mut self) {}
}

struct Feature {
    logic: Box<dyn FeatureLogic>,
    status: FeatureStatus,
    /// While true, the poll loop holds this feature at Disabled (stealth).
    suppressed: bool,
    /// One outstanding pulse reset at a time.
    pulse_reset_pending: Arc<AtomicBool>,
}

/// Apply one request with the engine's bounded per-call timeout.
async fn apply_bounded(sink: &Arc<dyn ParameterSink>, request: ParameterRequest) -> Result<()> {
    match tokio::time::timeout(SINK_CALL_TIMEOUT, sink.apply(request)).await {
        Ok(result) => result,
        Err(_) => Err(TelemetryError::Timeout { duration: SINK_CALL_TIMEOUT }),
    }
}

/// Apply a reset batch with the retry-once policy. Safe to call from timer
/// tasks; resets are idempotent so a duplicate application is harmless.
async fn apply_resets(
    sink: &Arc<dyn ParameterSink>,
    name: FeatureName,
    resets: &[ParameterRequest],
) -> u32 {
    let mut retries = 0;
    for reset in resets {
        if apply_bounded(sink, *reset).await.is_ok() {
            continue;
        }
        retries += 1;
        if let Err(e) = apply_bounded(sink, *reset).await {
            warn!(feature = %name, request = reset.kind(), error = %e, "reset failed after retry");
        }
    }
    retries
}

/// Drives all polled feature controllers against one shared contract.
pub struct FeatureEngine {
    features: Vec<Feature>,
    stealth: StealthController,
    sink: Arc<dyn ParameterSink>,
}

impl FeatureEngine {
    /// Build the engine with the five polled features in their fixed
    /// evaluation order plus the event-driven stealth controller.
    pub fn new(configs: FeatureConfigs, sink: Arc<dyn ParameterSink>, now: Instant) -> Self {
        let logics: Vec<Box<dyn FeatureLogic>> = vec![
            Box::new(LaunchLogic::new(configs.launch)),
            Box::new(FlatShiftLogic::new(configs.flat_shift)),
            Box::new(AntiLagLogic::new(configs.anti_lag)),
            Box::new(PopBangLogic::new(configs.pop_bang)),
            Box::new(TwoStepLogic::new(configs.two_step)),
        ];
        let features = logics
            .into_iter()
            .map(|logic| Feature {
                logic,
                status: FeatureStatus::new(now),
                suppressed: false,
                pulse_reset_pending: Arc::new(AtomicBool::new(false)),
            })
            .collect();
        Self { features, stealth: StealthController::new(configs.stealth, now), sink }
    }

    /// Run one evaluation tick over every polled feature, in order.
    pub async fn tick(&mut self, snap: &VehicleStateSnapshot, now: Instant) {
        for index in 0..self.features.len() {
            self.tick_feature(index, snap, now).await;
        }
    }

    async fn tick_feature(&mut self, index: usize, snap: &VehicleStateSnapshot, now: Instant) {
        let feature = &mut self.features[index];
        if feature.status.state == FeatureState::Fault || feature.suppressed {
            return;
        }

        if feature.status.state == FeatureState::Active {
            feature.status.bump("ticks_active");
        }

        let decision = feature.logic.evaluate(snap, feature.status.state);
        match (feature.status.state, decision) {
            (_, Decision::Hold) => {}
            (FeatureState::Disabled, Decision::Arm) => {
                info!(feature = %feature.logic.name(), "armed");
                feature.status.state = FeatureState::Armed;
                feature.status.last_updated = now;
            }
            (FeatureState::Disabled | FeatureState::Armed, Decision::Activate) => {
                self.activate(index, now).await;
            }
            (FeatureState::Armed, Decision::Deactivate) => {
                let feature = &mut self.features[index];
                debug!(feature = %feature.logic.name(), "disarmed");
                feature.status.state = FeatureState::Disabled;
                feature.status.last_updated = now;
            }
            (FeatureState::Active, Decision::Deactivate) => {
                self.deactivate(index, now).await;
            }
            (FeatureState::Disabled, Decision::Pulse) => {
                self.pulse(index, now).await;
            }
            (state, decision) => {
                // A logic bug, not a runtime condition; log and hold.
                warn!(
                    feature = %self.features[index].logic.name(),
                    %state, ?decision, "ignoring invalid transition"
                );
            }
        }
    }

    /// Send the activation batch and enter Active. Any sink failure faults
    /// this feature only, after best-effort rollback of what was applied.
    async fn activate(&mut self, index: usize, now: Instant) {
        let name = self.features[index].logic.name();
        let requests = self.features[index].logic.activation_requests();

        for request in &requests {
            if let Err(e) = apply_bounded(&self.sink, *request).await {
                warn!(feature = %name, request = request.kind(), error = %e, "activation failed, faulting feature");
                let resets = self.features[index].logic.reset_requests();
                let retries = apply_resets(&self.sink, name, &resets).await;

                let feature = &mut self.features[index];
                feature.status.state = FeatureState::Fault;
                feature.status.fault_code = Some(FaultCode::SinkError);
                feature.status.last_updated = now;
                feature.status.bump("sink_failures");
                for _ in 0..retries {
                    feature.status.bump("sink_retries");
                }
                return;
            }
        }

        let feature = &mut self.features[index];
        info!(feature = %name, requests = requests.len(), "activated");
        feature.status.state = FeatureState::Active;
        feature.status.last_updated = now;
        feature.status.bump("activations");
    }

    /// Send the reset batch (retry-once) and return to Disabled.
    async fn deactivate(&mut self, index: usize, now: Instant) {
        let name = self.features[index].logic.name();
        let resets = self.features[index].logic.reset_requests();
        let retries = apply_resets(&self.sink, name, &resets).await;

        let feature = &mut self.features[index];
        info!(feature = %name, "deactivated");
        feature.status.state = FeatureState::Disabled;
        feature.status.last_updated = now;
        for _ in 0..retries {
            feature.status.bump("sink_retries");
        }
    }

    /// Momentary activation: fire the batch now, schedule exactly one reset
    /// after [`PULSE_SETTLE`] on an independent timer task. Re-triggering is
    /// gated until the pending reset lands.
    async fn pulse(&mut self, index: usize, now: Instant) {
        if self.features[index].pulse_reset_pending.load(Ordering::Acquire) {
            return;
        }

        let name = self.features[index].logic.name();
        let requests = self.features[index].logic.activation_requests();
        for request in &requests {
            if let Err(e) = apply_bounded(&self.sink, *request).await {
                warn!(feature = %name, request = request.kind(), error = %e, "pulse failed, faulting feature");
                let resets = self.features[index].logic.reset_requests();
                apply_resets(&self.sink, name, &resets).await;

                let feature = &mut self.features[index];
                feature.status.state = FeatureState::Fault;
                feature.status.fault_code = Some(FaultCode::SinkError);
                feature.status.last_updated = now;
                feature.status.bump("sink_failures");
                return;
            }
        }

        let feature = &mut self.features[index];
        feature.status.last_updated = now;
        feature.status.bump("pulses");
        feature.pulse_reset_pending.store(true, Ordering::Release);

        debug!(feature = %name, "pulse fired, reset in {:?}", PULSE_SETTLE);
        let sink = Arc::clone(&self.sink);
        let pending = Arc::clone(&feature.pulse_reset_pending);
        let resets = feature.logic.reset_requests();
        tokio::spawn(async move {
            tokio::time::sleep(PULSE_SETTLE).await;
            apply_resets(&sink, name, &resets).await;
            pending.store(false, Ordering::Release);
        });
    }

    /// Public disable operation: reset and return one feature to Disabled.
    ///
    /// This is the only path by which anything outside a controller (stealth
    /// mode included) may push it toward Disabled. Faulted features are left
    /// in Fault.
    pub async fn disable(&mut self, name: FeatureName, now: Instant) {
        let Some(index) = self.index_of(name) else { return };
        match self.features[index].status.state {
            FeatureState::Active => self.deactivate(index, now).await,
            FeatureState::Armed => {
                let feature = &mut self.features[index];
                feature.status.state = FeatureState::Disabled;
                feature.status.last_updated = now;
            }
            FeatureState::Disabled | FeatureState::Fault => {}
        }
    }

    /// Fault every currently Active or Armed feature with `code` and issue a
    /// full reset batch for all features. Called by the safety path, which
    /// emits the single fault event itself.
    pub async fn fault_all(&mut self, code: FaultCode, now: Instant) {
        for index in 0..self.features.len() {
            let name = self.features[index].logic.name();
            let resets = self.features[index].logic.reset_requests();
            apply_resets(&self.sink, name, &resets).await;

            let feature = &mut self.features[index];
            match feature.status.state {
                FeatureState::Active | FeatureState::Armed => {
                    feature.status.state = FeatureState::Fault;
                    feature.status.fault_code = Some(code);
                    feature.status.last_updated = now;
                }
                FeatureState::Disabled | FeatureState::Fault => {}
            }
        }
    }

    /// Explicit external fault reset: every faulted feature returns to
    /// Disabled with its fault code cleared.
    pub fn clear_faults(&mut self, now: Instant) {
        for feature in &mut self.features {
            if feature.status.state == FeatureState::Fault {
                info!(feature = %feature.logic.name(), "fault cleared by external reset");
                feature.status.state = FeatureState::Disabled;
                feature.status.fault_code = None;
                feature.status.last_updated = now;
            }
        }
    }

    /// Toggle stealth mode. Enabling disables Launch Control, Anti-Lag, and
    /// Pop&Bang through [`FeatureEngine::disable`] and caps boost; disabling
    /// lifts the suppression and resets the boost target.
    pub async fn set_stealth(&mut self, enabled: bool, now: Instant) {
        if self.stealth.enabled() == enabled {
            return;
        }

        if enabled {
            for name in StealthController::SUPPRESSED {
                self.disable(name, now).await;
                if let Some(index) = self.index_of(name) {
                    self.features[index].suppressed = true;
                }
            }
            let cap = self.stealth.boost_cap_request();
            if let Err(e) = apply_bounded(&self.sink, cap).await {
                warn!(error = %e, "failed to cap boost for stealth mode");
            }
        } else {
            for name in StealthController::SUPPRESSED {
                if let Some(index) = self.index_of(name) {
                    self.features[index].suppressed = false;
                }
            }
            if let Err(e) = apply_bounded(&self.sink, ParameterRequest::ResetBoostControl).await {
                warn!(error = %e, "failed to reset boost control leaving stealth mode");
            }
        }

        self.stealth.set_enabled(enabled, now);
        info!(enabled, "stealth mode toggled");
    }

    /// Whether stealth mode is currently on.
    pub fn stealth_enabled(&self) -> bool {
        self.stealth.enabled()
    }

    /// Drive every Active feature through its reset sequence, for shutdown.
    pub async fn shutdown(&mut self, now: Instant) {
        for index in 0..self.features.len() {
            if self.features[index].status.state == FeatureState::Active {
                self.deactivate(index, now).await;
            } else if self.features[index].status.state == FeatureState::Armed {
                self.features[index].status.state = FeatureState::Disabled;
                self.features[index].status.last_updated = now;
            }
        }
        info!("feature engine shut down");
    }

    /// Route an explicit launch-control arm request.
    pub fn arm_launch_control(&mut self) {
        if let Some(index) = self.index_of(FeatureName::LaunchControl) {
            self.features[index].logic.on_arm_request();
        }
    }

    /// Route an explicit launch-control disarm request.
    pub fn disarm_launch_control(&mut self) {
        if let Some(index) = self.index_of(FeatureName::LaunchControl) {
            self.features[index].logic.on_disarm_request();
        }
    }

    /// Clone of every feature's externally visible status, stealth included.
    pub fn status_map(&self) -> std::collections::HashMap<FeatureName, FeatureStatus> {
        let mut map: std::collections::HashMap<_, _> = self
            .features
            .iter()
            .map(|feature| (feature.logic.name(), feature.status.clone()))
            .collect();
        map.insert(FeatureName::StealthMode, self.stealth.status().clone());
        map
    }

    /// Features currently in the given state, in evaluation order.
    pub fn in_state(&self, state: FeatureState) -> Vec<FeatureName> {
        self.features
            .iter()
            .filter(|feature| feature.status.state == state)
            .map(|feature| feature.logic.name())
            .collect()
    }

    fn index_of(&self, name: FeatureName) -> Option<usize> {
        self.features.iter().position(|feature| feature.logic.name() == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{RecordingSink, snapshot_with};
    use crate::types::FieldUpdate;

    fn engine_with(sink: Arc<RecordingSink>) -> FeatureEngine {
        FeatureEngine::new(FeatureConfigs::default(), sink, Instant::now())
    }

    #[tokio::test]
    async fn launch_scenario_armed_to_active_emits_one_retard_request() {
        let sink = Arc::new(RecordingSink::new());
        let mut engine = engine_with(Arc::clone(&sink));
        let now = Instant::now();

        // Arm from a standstill.
        engine.arm_launch_control();
        let idle = snapshot_with(&[FieldUpdate::Rpm(900.0), FieldUpdate::SpeedKph(0.0)]);
        engine.tick(&idle, now).await;
        assert_eq!(engine.status_map()[&FeatureName::LaunchControl].state, FeatureState::Armed);
        sink.take_applied();

        // Scenario: rpm 4200, throttle 95, clutch in, speed 2, launch_rpm 4000.
        let staged = snapshot_with(&[
            FieldUpdate::Rpm(4200.0),
            FieldUpdate::ThrottlePct(95.0),
            FieldUpdate::Clutch(true),
            FieldUpdate::SpeedKph(2.0),
        ]);
        engine.tick(&staged, now).await;

        assert_eq!(engine.status_map()[&FeatureName::LaunchControl].state, FeatureState::Active);
        let launch_requests: Vec<_> = sink.take_applied();
        assert_eq!(
            launch_requests
                .iter()
                .filter(|r| matches!(
                    r,
                    ParameterRequest::SetIgnitionTimingOffset { degrees, .. } if *degrees == -5.0
                ))
                .count(),
            1
        );
        assert!(
            !launch_requests
                .iter()
                .any(|r| matches!(r, ParameterRequest::SetFuelEnrichment { .. })),
            "default launch fuel add of 0 must not emit an enrichment request"
        );
    }

    #[tokio::test]
    async fn sink_failure_on_activation_faults_only_that_feature() {
        let sink = Arc::new(RecordingSink::new());
        sink.fail_on("set_ignition_cut");
        let mut engine = engine_with(Arc::clone(&sink));
        let now = Instant::now();

        // Flat-shift entry conditions; launch not armed so it stays Disabled.
        let shifting = snapshot_with(&[
            FieldUpdate::Rpm(5400.0),
            FieldUpdate::ThrottlePct(100.0),
            FieldUpdate::Clutch(true),
            FieldUpdate::CurrentGear(2),
            FieldUpdate::SpeedKph(80.0),
        ]);
        engine.tick(&shifting, now).await;

        let map = engine.status_map();
        assert_eq!(map[&FeatureName::FlatShift].state, FeatureState::Fault);
        assert_eq!(map[&FeatureName::FlatShift].fault_code, Some(FaultCode::SinkError));
        assert_eq!(map[&FeatureName::LaunchControl].state, FeatureState::Disabled);
        assert_eq!(map[&FeatureName::AntiLag].state, FeatureState::Disabled);
    }

    #[tokio::test]
    async fn faulted_feature_stays_faulted_until_cleared() {
        let sink = Arc::new(RecordingSink::new());
        sink.fail_on("set_ignition_cut");
        let mut engine = engine_with(Arc::clone(&sink));
        let now = Instant::now();

        let shifting = snapshot_with(&[
            FieldUpdate::Rpm(5400.0),
            FieldUpdate::ThrottlePct(100.0),
            FieldUpdate::Clutch(true),
            FieldUpdate::CurrentGear(2),
        ]);
        engine.tick(&shifting, now).await;
        assert_eq!(engine.status_map()[&FeatureName::FlatShift].state, FeatureState::Fault);

        // Conditions still hold and the sink now works, but Fault is terminal.
        sink.clear_failures();
        engine.tick(&shifting, now).await;
        assert_eq!(engine.status_map()[&FeatureName::FlatShift].state, FeatureState::Fault);

        engine.clear_faults(now);
        assert_eq!(engine.status_map()[&FeatureName::FlatShift].state, FeatureState::Disabled);
        assert_eq!(engine.status_map()[&FeatureName::FlatShift].fault_code, None);
    }

    #[tokio::test]
    async fn reset_failures_are_retried_once_and_do_not_fault() {
        let sink = Arc::new(RecordingSink::new());
        let mut engine = engine_with(Arc::clone(&sink));
        let now = Instant::now();

        let shifting = snapshot_with(&[
            FieldUpdate::Rpm(5400.0),
            FieldUpdate::ThrottlePct(100.0),
            FieldUpdate::Clutch(true),
            FieldUpdate::CurrentGear(2),
        ]);
        engine.tick(&shifting, now).await;
        assert_eq!(engine.status_map()[&FeatureName::FlatShift].state, FeatureState::Active);

        // Every reset attempt fails; the feature still returns to Disabled.
        sink.fail_on("reset_ignition_cut");
        let released = snapshot_with(&[FieldUpdate::Rpm(5400.0), FieldUpdate::Clutch(false)]);
        engine.tick(&released, now).await;

        let status = &engine.status_map()[&FeatureName::FlatShift];
        assert_eq!(status.state, FeatureState::Disabled);
        assert!(status.metrics.get("sink_retries").copied().unwrap_or(0.0) >= 1.0);

        // Retry means exactly two attempts per failed reset request.
        let attempts = sink
            .take_applied()
            .iter()
            .filter(|r| r.kind() == "reset_ignition_cut")
            .count();
        assert_eq!(attempts, 2);
    }

    #[tokio::test]
    async fn fault_all_faults_active_features_and_resets_everything() {
        let sink = Arc::new(RecordingSink::new());
        let mut engine = engine_with(Arc::clone(&sink));
        let now = Instant::now();

        // Anti-lag active: in-window rpm, closed throttle, low boost.
        let antilag = snapshot_with(&[
            FieldUpdate::Rpm(3000.0),
            FieldUpdate::ThrottlePct(5.0),
            FieldUpdate::BoostPsi(1.0),
            FieldUpdate::SpeedKph(10.0),
        ]);
        engine.tick(&antilag, now).await;
        assert_eq!(engine.status_map()[&FeatureName::AntiLag].state, FeatureState::Active);
        sink.take_applied();

        engine.fault_all(FaultCode::OverBoost, now).await;

        let map = engine.status_map();
        assert_eq!(map[&FeatureName::AntiLag].state, FeatureState::Fault);
        assert_eq!(map[&FeatureName::AntiLag].fault_code, Some(FaultCode::OverBoost));
        // Features that were Disabled stay Disabled but still get resets.
        assert_eq!(map[&FeatureName::LaunchControl].state, FeatureState::Disabled);
        let applied = sink.take_applied();
        assert!(applied.iter().all(|r| r.is_reset()));
        assert!(!applied.is_empty());
    }

    #[tokio::test]
    async fn stealth_disables_and_suppresses_its_features() {
        let sink = Arc::new(RecordingSink::new());
        let mut engine = engine_with(Arc::clone(&sink));
        let now = Instant::now();

        let antilag = snapshot_with(&[
            FieldUpdate::Rpm(3000.0),
            FieldUpdate::ThrottlePct(5.0),
            FieldUpdate::BoostPsi(1.0),
        ]);
        engine.tick(&antilag, now).await;
        assert_eq!(engine.status_map()[&FeatureName::AntiLag].state, FeatureState::Active);

        engine.set_stealth(true, now).await;
        assert!(engine.stealth_enabled());
        let map = engine.status_map();
        assert_eq!(map[&FeatureName::AntiLag].state, FeatureState::Disabled);
        assert_eq!(map[&FeatureName::StealthMode].state, FeatureState::Active);
        assert!(
            sink.take_applied()
                .iter()
                .any(|r| matches!(r, ParameterRequest::SetBoostControl { .. }))
        );

        // Conditions still hold but the suppressed feature must not reactivate.
        engine.tick(&antilag, now).await;
        assert_eq!(engine.status_map()[&FeatureName::AntiLag].state, FeatureState::Disabled);

        engine.set_stealth(false, now).await;
        assert!(
            sink.take_applied().iter().any(|r| matches!(r, ParameterRequest::ResetBoostControl))
        );
        engine.tick(&antilag, now).await;
        assert_eq!(engine.status_map()[&FeatureName::AntiLag].state, FeatureState::Active);
    }

    #[tokio::test]
    async fn shutdown_resets_every_active_feature() {
        let sink = Arc::new(RecordingSink::new());
        let mut engine = engine_with(Arc::clone(&sink));
        let now = Instant::now();

        let antilag = snapshot_with(&[
            FieldUpdate::Rpm(3000.0),
            FieldUpdate::ThrottlePct(5.0),
            FieldUpdate::BoostPsi(1.0),
        ]);
        engine.tick(&antilag, now).await;
        assert_eq!(engine.in_state(FeatureState::Active), vec![FeatureName::AntiLag]);
        sink.take_applied();

        engine.shutdown(now).await;

        assert!(engine.in_state(FeatureState::Active).is_empty());
        let applied = sink.take_applied();
        assert!(applied.iter().all(|r| r.is_reset()));
        assert!(!applied.is_empty());
    }
}
