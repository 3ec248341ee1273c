//! Global safety monitor.
//!
//! Runs ahead of the feature engine on every evaluation tick, checking the
//! latest snapshot against [`SafetyLimits`]. The first violated limit latches:
//! one [`FaultEvent`] is emitted, the driver faults every feature through the
//! engine, and further checks stay quiet until an explicit operator
//! [`SafetyMonitor::clear`]. Latching keeps a value oscillating around its
//! limit from producing a fault storm and makes the fault visible until
//! someone acknowledges it.
//!
//! Check order is fixed: over-rev, over-boost, over-temp, AFR band. When
//! several limits are violated on the same tick only the first in that order
//! is reported.

use std::time::Instant;

use tracing::error;

use crate::types::{FaultCode, FaultEvent, SafetyLimits, VehicleStateSnapshot};

/// Rpm floor below which the AFR band is not enforced. Cranking and stalled
/// readings sit far outside the band without anything being wrong.
const AFR_CHECK_MIN_RPM: f32 = 1200.0;

pub struct SafetyMonitor {
    limits: SafetyLimits,
    latched: Option<FaultCode>,
}

impl SafetyMonitor {
    pub fn new(limits: SafetyLimits) -> Self {
        Self { limits, latched: None }
    }

    /// The currently latched fault, if any.
    pub fn latched(&self) -> Option<FaultCode> {
        self.latched
    }

    /// Acknowledge the latched fault and resume checking.
    pub fn clear(&mut self) {
        self.latched = None;
    }

    /// Check one snapshot. Returns the fault event exactly once per latch.
    pub fn check(&mut self, snap: &VehicleStateSnapshot, now: Instant) -> Option<FaultEvent> {
        if self.latched.is_some() {
            return None;
        }

        let violation = self.first_violation(snap);
        let (code, message) = violation?;
        self.latched = Some(code);
        error!(code = %code, %message, "safety limit violated, latching fault");
        Some(FaultEvent { code, message, at: now })
    }

    fn first_violation(&self, snap: &VehicleStateSnapshot) -> Option<(FaultCode, String)> {
        let limits = &self.limits;
        if snap.rpm.value > limits.max_rpm {
            return Some((
                FaultCode::OverRev,
                format!("rpm {:.0} exceeds limit {:.0}", snap.rpm.value, limits.max_rpm),
            ));
        }
        if snap.boost_psi.value > limits.max_boost_psi {
            return Some((
                FaultCode::OverBoost,
                format!(
                    "boost {:.1} psi exceeds limit {:.1}",
                    snap.boost_psi.value, limits.max_boost_psi
                ),
            ));
        }
        if snap.coolant_c.value > limits.max_coolant_c {
            return Some((
                FaultCode::OverTemp,
                format!(
                    "coolant {:.0}C exceeds limit {:.0}",
                    snap.coolant_c.value, limits.max_coolant_c
                ),
            ));
        }
        if snap.oil_temp_c.value > limits.max_oil_c {
            return Some((
                FaultCode::OverTemp,
                format!(
                    "oil {:.0}C exceeds limit {:.0}",
                    snap.oil_temp_c.value, limits.max_oil_c
                ),
            ));
        }
        if snap.rpm.value > AFR_CHECK_MIN_RPM
            && !(limits.afr_min..=limits.afr_max).contains(&snap.afr.value)
        {
            return Some((
                FaultCode::AfrOutOfBand,
                format!(
                    "afr {:.1} outside band {:.1}..{:.1}",
                    snap.afr.value, limits.afr_min, limits.afr_max
                ),
            ));
        }
        None
    }
}
