//! Feature calibration and safety limits.
//!
//! Config objects are immutable once installed: the builder validates them,
//! the engine takes ownership, and replacement means swapping a whole object,
//! never mutating a threshold in place while a controller is using it.
//!
//! Every config implements `Default` with a conservative street calibration
//! and `validate()`, which rejects nonsense thresholds with
//! [`TelemetryError::Config`] before any controller can act on them.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{Result, TelemetryError};

/// Launch control calibration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LaunchConfig {
    /// Target launch rpm; activation requires rpm above 80% of this
    pub launch_rpm: f32,
    /// Ignition retard applied while launching, in positive degrees
    pub retard_deg: f32,
    /// Extra fuel while launching; 0 disables the enrichment request
    pub fuel_add_pct: f32,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self { launch_rpm: 4000.0, retard_deg: 5.0, fuel_add_pct: 0.0 }
    }
}

impl LaunchConfig {
    pub fn validate(&self) -> Result<()> {
        if !(1000.0..=9000.0).contains(&self.launch_rpm) {
            return Err(TelemetryError::config("launch_rpm", "must be between 1000 and 9000"));
        }
        if !(0.0..=20.0).contains(&self.retard_deg) {
            return Err(TelemetryError::config("retard_deg", "must be between 0 and 20 degrees"));
        }
        if !(0.0..=30.0).contains(&self.fuel_add_pct) {
            return Err(TelemetryError::config("fuel_add_pct", "must be between 0 and 30 percent"));
        }
        Ok(())
    }
}

/// Flat-shift (full-throttle gear change) calibration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlatShiftConfig {
    /// Shift rpm; activation requires rpm above 90% of this
    pub rpm: f32,
    /// Ignition cut retard while the clutch is in, in degrees
    pub cut_deg: f32,
    /// Upper bound on a single ignition cut
    pub cut_duration: Duration,
}

impl Default for FlatShiftConfig {
    fn default() -> Self {
        Self { rpm: 5500.0, cut_deg: 15.0, cut_duration: Duration::from_millis(150) }
    }
}

impl FlatShiftConfig {
    pub fn validate(&self) -> Result<()> {
        if !(2000.0..=9000.0).contains(&self.rpm) {
            return Err(TelemetryError::config("rpm", "must be between 2000 and 9000"));
        }
        if !(0.0..=30.0).contains(&self.cut_deg) {
            return Err(TelemetryError::config("cut_deg", "must be between 0 and 30 degrees"));
        }
        if self.cut_duration > Duration::from_millis(500) {
            return Err(TelemetryError::config("cut_duration", "must not exceed 500ms"));
        }
        Ok(())
    }
}

/// Anti-lag calibration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AntiLagConfig {
    /// Lower edge of the active rpm window
    pub min_rpm: f32,
    /// Upper edge of the active rpm window
    pub max_rpm: f32,
    /// Active only below this throttle position
    pub throttle_threshold_pct: f32,
    /// Ignition retard keeping the turbine spooled, in positive degrees
    pub retard_deg: f32,
    /// Extra fuel burned in the exhaust, in percent
    pub fuel_add_pct: f32,
}

impl Default for AntiLagConfig {
    fn default() -> Self {
        Self {
            min_rpm: 2500.0,
            max_rpm: 4500.0,
            throttle_threshold_pct: 20.0,
            retard_deg: 12.0,
            fuel_add_pct: 10.0,
        }
    }
}

impl AntiLagConfig {
    pub fn validate(&self) -> Result<()> {
        if self.min_rpm >= self.max_rpm {
            return Err(TelemetryError::config("min_rpm", "must be below max_rpm"));
        }
        if !(1000.0..=9000.0).contains(&self.min_rpm) || !(1000.0..=9000.0).contains(&self.max_rpm)
        {
            return Err(TelemetryError::config("rpm window", "must lie between 1000 and 9000"));
        }
        if !(0.0..=100.0).contains(&self.throttle_threshold_pct) {
            return Err(TelemetryError::config(
                "throttle_threshold_pct",
                "must be between 0 and 100",
            ));
        }
        if !(0.0..=25.0).contains(&self.retard_deg) {
            return Err(TelemetryError::config("retard_deg", "must be between 0 and 25 degrees"));
        }
        if !(0.0..=30.0).contains(&self.fuel_add_pct) {
            return Err(TelemetryError::config("fuel_add_pct", "must be between 0 and 30 percent"));
        }
        Ok(())
    }
}

/// Overrun pop-and-bang calibration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PopBangConfig {
    /// Only pulse above this rpm
    pub min_rpm: f32,
    /// Only pulse above this road speed
    pub min_speed_kph: f32,
    /// Ignition retard during the pulse, in positive degrees
    pub retard_deg: f32,
    /// Overrun enrichment during the pulse, in percent
    pub fuel_add_pct: f32,
}

impl Default for PopBangConfig {
    fn default() -> Self {
        Self { min_rpm: 3000.0, min_speed_kph: 20.0, retard_deg: 8.0, fuel_add_pct: 8.0 }
    }
}

impl PopBangConfig {
    pub fn validate(&self) -> Result<()> {
        if !(1000.0..=9000.0).contains(&self.min_rpm) {
            return Err(TelemetryError::config("min_rpm", "must be between 1000 and 9000"));
        }
        if !(0.0..=300.0).contains(&self.min_speed_kph) {
            return Err(TelemetryError::config("min_speed_kph", "must be between 0 and 300"));
        }
        if !(0.0..=20.0).contains(&self.retard_deg) {
            return Err(TelemetryError::config("retard_deg", "must be between 0 and 20 degrees"));
        }
        if !(0.0..=30.0).contains(&self.fuel_add_pct) {
            return Err(TelemetryError::config("fuel_add_pct", "must be between 0 and 30 percent"));
        }
        Ok(())
    }
}

/// Two-step rev limiter calibration.
///
/// Two limits: a low one held against the brakes for a standing start and a
/// higher one for flat-foot gear changes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TwoStepConfig {
    /// Rev limit during a standing-start launch
    pub launch_limit_rpm: f32,
    /// Rev limit during a flat-foot shift
    pub flat_shift_limit_rpm: f32,
    /// Fuel cut applied at the limit, in percent
    pub fuel_cut_pct: f32,
    /// Ignition retard applied at the limit, in positive degrees
    pub retard_deg: f32,
}

impl Default for TwoStepConfig {
    fn default() -> Self {
        Self {
            launch_limit_rpm: 4000.0,
            flat_shift_limit_rpm: 6500.0,
            fuel_cut_pct: 100.0,
            retard_deg: 4.0,
        }
    }
}

impl TwoStepConfig {
    pub fn validate(&self) -> Result<()> {
        if self.launch_limit_rpm >= self.flat_shift_limit_rpm {
            return Err(TelemetryError::config(
                "launch_limit_rpm",
                "must be below flat_shift_limit_rpm",
            ));
        }
        if !(1000.0..=9000.0).contains(&self.launch_limit_rpm)
            || !(1000.0..=9000.0).contains(&self.flat_shift_limit_rpm)
        {
            return Err(TelemetryError::config("rev limits", "must lie between 1000 and 9000"));
        }
        if !(0.0..=100.0).contains(&self.fuel_cut_pct) {
            return Err(TelemetryError::config("fuel_cut_pct", "must be between 0 and 100"));
        }
        if !(0.0..=20.0).contains(&self.retard_deg) {
            return Err(TelemetryError::config("retard_deg", "must be between 0 and 20 degrees"));
        }
        Ok(())
    }
}

/// Stealth mode calibration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StealthConfig {
    /// Boost target enforced while stealth is on
    pub boost_cap_psi: f32,
    /// Ramp rate for the capped boost target, in psi per second
    pub ramp_psi_per_s: f32,
}

impl Default for StealthConfig {
    fn default() -> Self {
        Self { boost_cap_psi: 7.0, ramp_psi_per_s: 2.0 }
    }
}

impl StealthConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=30.0).contains(&self.boost_cap_psi) {
            return Err(TelemetryError::config("boost_cap_psi", "must be between 0 and 30"));
        }
        if !(0.1..=20.0).contains(&self.ramp_psi_per_s) {
            return Err(TelemetryError::config("ramp_psi_per_s", "must be between 0.1 and 20"));
        }
        Ok(())
    }
}

/// Complete calibration for all six features.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FeatureConfigs {
    pub launch: LaunchConfig,
    pub flat_shift: FlatShiftConfig,
    pub anti_lag: AntiLagConfig,
    pub pop_bang: PopBangConfig,
    pub two_step: TwoStepConfig,
    pub stealth: StealthConfig,
}

impl FeatureConfigs {
    /// Validate every feature calibration, failing on the first bad field.
    pub fn validate(&self) -> Result<()> {
        self.launch.validate()?;
        self.flat_shift.validate()?;
        self.anti_lag.validate()?;
        self.pop_bang.validate()?;
        self.two_step.validate()?;
        self.stealth.validate()?;
        Ok(())
    }
}

/// Global fault thresholds evaluated by the safety monitor every tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SafetyLimits {
    pub max_rpm: f32,
    pub max_boost_psi: f32,
    pub max_coolant_c: f32,
    pub max_oil_c: f32,
    pub afr_min: f32,
    pub afr_max: f32,
}

impl Default for SafetyLimits {
    fn default() -> Self {
        Self {
            max_rpm: 7200.0,
            max_boost_psi: 25.0,
            max_coolant_c: 115.0,
            max_oil_c: 130.0,
            afr_min: 10.0,
            afr_max: 17.5,
        }
    }
}

impl SafetyLimits {
    pub fn validate(&self) -> Result<()> {
        if !(3000.0..=12000.0).contains(&self.max_rpm) {
            return Err(TelemetryError::config("max_rpm", "must be between 3000 and 12000"));
        }
        if !(5.0..=50.0).contains(&self.max_boost_psi) {
            return Err(TelemetryError::config("max_boost_psi", "must be between 5 and 50"));
        }
        if self.afr_min >= self.afr_max {
            return Err(TelemetryError::config("afr_min", "must be below afr_max"));
        }
        if !(5.0..=25.0).contains(&self.afr_min) || !(5.0..=25.0).contains(&self.afr_max) {
            return Err(TelemetryError::config("afr band", "must lie between 5 and 25"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pass_validation() {
        FeatureConfigs::default().validate().expect("default calibration must be valid");
        SafetyLimits::default().validate().expect("default limits must be valid");
    }

    #[test]
    fn launch_rpm_out_of_range_is_rejected() {
        let config = LaunchConfig { launch_rpm: 12000.0, ..LaunchConfig::default() };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("launch_rpm"));
    }

    #[test]
    fn inverted_anti_lag_window_is_rejected() {
        let config = AntiLagConfig { min_rpm: 5000.0, max_rpm: 3000.0, ..AntiLagConfig::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn two_step_limits_must_be_ordered() {
        let config = TwoStepConfig {
            launch_limit_rpm: 6500.0,
            flat_shift_limit_rpm: 4000.0,
            ..TwoStepConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn inverted_afr_band_is_rejected() {
        let limits = SafetyLimits { afr_min: 18.0, afr_max: 10.0, ..SafetyLimits::default() };
        assert!(limits.validate().is_err());
    }

    #[test]
    fn feature_configs_validation_fails_on_any_bad_member() {
        let mut configs = FeatureConfigs::default();
        configs.pop_bang.retard_deg = -1.0;
        assert!(configs.validate().is_err());
    }
}
