//! Shared vehicle state store.
//!
//! One store instance is created at connection start and shared between the
//! acquisition task (writer) and the evaluation task (reader). Both sides go
//! through a single `RwLock` around the whole record; every critical section
//! is a handful of field assignments or one clone, so hold times stay bounded.
//!
//! A field's timestamp never decreases: `apply` keeps the newer of the stored
//! and incoming instants, so replayed or reordered frames cannot roll state
//! backwards in time.

use std::sync::RwLock;
use std::time::Instant;

use tracing::trace;

use crate::types::{FieldUpdate, Timestamped, VehicleStateSnapshot};

/// Lock-guarded owner of the latest decoded vehicle state.
#[derive(Debug)]
pub struct VehicleStateStore {
    state: RwLock<VehicleStateSnapshot>,
}

fn write_field<T: Copy>(slot: &mut Timestamped<T>, value: T, at: Instant) {
    // Keep the newer timestamp; a stale write may still update the value but
    // must not move time backwards.
    slot.value = value;
    if at > slot.updated_at {
        slot.updated_at = at;
    }
}

impl VehicleStateStore {
    /// Create a store with power-on defaults timestamped `epoch`.
    pub fn new(epoch: Instant) -> Self {
        Self { state: RwLock::new(VehicleStateSnapshot::defaults(epoch)) }
    }

    /// Apply one typed field update under the write lock.
    pub fn apply(&self, update: FieldUpdate, at: Instant) {
        let mut state = self.write_lock();
        Self::apply_locked(&mut state, update, at);
    }

    /// Apply a batch of updates from one decoded frame under a single lock
    /// acquisition.
    pub fn apply_all(&self, updates: &[FieldUpdate], at: Instant) {
        let mut state = self.write_lock();
        for update in updates {
            Self::apply_locked(&mut state, *update, at);
        }
    }

    fn write_lock(&self) -> std::sync::RwLockWriteGuard<'_, VehicleStateSnapshot> {
        match self.state.write() {
            Ok(guard) => guard,
            // A poisoned lock means a writer panicked mid-assignment; the
            // record is still plain-old-data, so keep serving it.
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn apply_locked(state: &mut VehicleStateSnapshot, update: FieldUpdate, at: Instant) {
        trace!(?update, "state update");
        match update {
            FieldUpdate::Rpm(v) => write_field(&mut state.rpm, v, at),
            FieldUpdate::SpeedKph(v) => write_field(&mut state.speed_kph, v, at),
            FieldUpdate::ThrottlePct(v) => write_field(&mut state.throttle_pct, v, at),
            FieldUpdate::CoolantC(v) => write_field(&mut state.coolant_c, v, at),
            FieldUpdate::IntakeC(v) => write_field(&mut state.intake_c, v, at),
            FieldUpdate::MafGs(v) => write_field(&mut state.maf_g_s, v, at),
            FieldUpdate::IgnitionDeg(v) => write_field(&mut state.ignition_deg, v, at),
            FieldUpdate::BatteryV(v) => write_field(&mut state.battery_v, v, at),
            FieldUpdate::Afr(v) => write_field(&mut state.afr, v, at),
            FieldUpdate::BoostPsi(v) => write_field(&mut state.boost_psi, v, at),
            FieldUpdate::WastegatePct(v) => write_field(&mut state.wastegate_pct, v, at),
            FieldUpdate::EthanolPct(v) => write_field(&mut state.ethanol_pct, v, at),
            FieldUpdate::KnockCount(v) => write_field(&mut state.knock_count, v, at),
            FieldUpdate::KnockRetardDeg(v) => write_field(&mut state.knock_retard_deg, v, at),
            FieldUpdate::OilTempC(v) => write_field(&mut state.oil_temp_c, v, at),
            FieldUpdate::OilPressureKpa(v) => write_field(&mut state.oil_pressure_kpa, v, at),
            FieldUpdate::FuelLevelPct(v) => write_field(&mut state.fuel_level_pct, v, at),
            FieldUpdate::CurrentGear(v) => write_field(&mut state.current_gear, v, at),
            FieldUpdate::TargetGear(v) => write_field(&mut state.target_gear, v, at),
            FieldUpdate::Clutch(v) => write_field(&mut state.clutch, v, at),
            FieldUpdate::Brake(v) => write_field(&mut state.brake, v, at),
            FieldUpdate::Cruise(v) => write_field(&mut state.cruise, v, at),
            FieldUpdate::DscActive(v) => write_field(&mut state.dsc_active, v, at),
            FieldUpdate::TractionActive(v) => write_field(&mut state.traction_active, v, at),
        }
    }

    /// Copy of all fields, consistent with respect to any single `apply`.
    pub fn snapshot(&self) -> VehicleStateSnapshot {
        match self.state.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}
