//! Shared vehicle state model.
//!
//! The vehicle state is a fixed, statically typed record: every decodable
//! channel has a named field, so referencing an unknown field is impossible at
//! compile time. Each field carries the timestamp of its last update;
//! staleness is a consumer-side policy built on [`Timestamped::age`], never
//! enforced by the store itself.

use std::time::{Duration, Instant};

/// A value paired with the instant it was last written.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Timestamped<T> {
    pub value: T,
    pub updated_at: Instant,
}

impl<T> Timestamped<T> {
    pub fn new(value: T, updated_at: Instant) -> Self {
        Self { value, updated_at }
    }

    /// Time elapsed since the last update, as seen from `now`.
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.updated_at)
    }

    /// Whether the value has gone without an update for longer than `window`.
    pub fn is_stale(&self, now: Instant, window: Duration) -> bool {
        self.age(now) > window
    }
}

/// Consistent copy of the latest decoded vehicle state.
///
/// Obtained from [`crate::VehicleStateStore::snapshot`]. Consistent with
/// respect to any single field update; cross-field tearing across
/// independently arriving frames is acceptable by design.
#[derive(Debug, Clone, PartialEq)]
pub struct VehicleStateSnapshot {
    pub rpm: Timestamped<f32>,
    pub speed_kph: Timestamped<f32>,
    pub throttle_pct: Timestamped<f32>,
    pub coolant_c: Timestamped<f32>,
    pub intake_c: Timestamped<f32>,
    pub maf_g_s: Timestamped<f32>,
    pub ignition_deg: Timestamped<f32>,
    pub battery_v: Timestamped<f32>,
    pub afr: Timestamped<f32>,
    pub boost_psi: Timestamped<f32>,
    pub wastegate_pct: Timestamped<f32>,
    pub ethanol_pct: Timestamped<f32>,
    pub knock_count: Timestamped<u8>,
    pub knock_retard_deg: Timestamped<f32>,
    pub oil_temp_c: Timestamped<f32>,
    pub oil_pressure_kpa: Timestamped<f32>,
    pub fuel_level_pct: Timestamped<f32>,
    pub current_gear: Timestamped<u8>,
    pub target_gear: Timestamped<u8>,
    pub clutch: Timestamped<bool>,
    pub brake: Timestamped<bool>,
    pub cruise: Timestamped<bool>,
    pub dsc_active: Timestamped<bool>,
    pub traction_active: Timestamped<bool>,
}

impl VehicleStateSnapshot {
    /// State with all channels at their power-on defaults, timestamped `epoch`.
    pub fn defaults(epoch: Instant) -> Self {
        let f = |value| Timestamped::new(value, epoch);
        Self {
            rpm: f(0.0),
            speed_kph: f(0.0),
            throttle_pct: f(0.0),
            coolant_c: f(0.0),
            intake_c: f(0.0),
            maf_g_s: f(0.0),
            ignition_deg: f(0.0),
            battery_v: f(0.0),
            afr: f(14.7),
            boost_psi: f(0.0),
            wastegate_pct: f(0.0),
            ethanol_pct: f(0.0),
            knock_count: Timestamped::new(0, epoch),
            knock_retard_deg: f(0.0),
            oil_temp_c: f(0.0),
            oil_pressure_kpa: f(0.0),
            fuel_level_pct: f(0.0),
            current_gear: Timestamped::new(0, epoch),
            target_gear: Timestamped::new(0, epoch),
            clutch: Timestamped::new(false, epoch),
            brake: Timestamped::new(false, epoch),
            cruise: Timestamped::new(false, epoch),
            dsc_active: Timestamped::new(false, epoch),
            traction_active: Timestamped::new(false, epoch),
        }
    }
}

/// A single typed field write produced by the decoder.
///
/// Replaces the string-keyed state map of older designs: an unknown field is
/// rejected by the type system, not at runtime.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldUpdate {
    Rpm(f32),
    SpeedKph(f32),
    ThrottlePct(f32),
    CoolantC(f32),
    IntakeC(f32),
    MafGs(f32),
    IgnitionDeg(f32),
    BatteryV(f32),
    Afr(f32),
    BoostPsi(f32),
    WastegatePct(f32),
    EthanolPct(f32),
    KnockCount(u8),
    KnockRetardDeg(f32),
    OilTempC(f32),
    OilPressureKpa(f32),
    FuelLevelPct(f32),
    CurrentGear(u8),
    TargetGear(u8),
    Clutch(bool),
    Brake(bool),
    Cruise(bool),
    DscActive(bool),
    TractionActive(bool),
}
