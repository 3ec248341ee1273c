//! Stealth mode: quiet, low-boost running.
//!
//! Event-driven rather than polled: toggling it is an explicit operator
//! request, not a condition the evaluation loop watches for. The controller
//! itself only tracks the toggle and supplies the boost-cap request; the
//! engine performs the actual suppression through its public disable path,
//! so stealth never reaches into another controller's state.

use std::time::Instant;

use crate::sink::ParameterRequest;
use crate::types::{FeatureName, FeatureState, FeatureStatus, StealthConfig};

pub struct StealthController {
    config: StealthConfig,
    enabled: bool,
    status: FeatureStatus,
}

impl StealthController {
    /// Features forced to Disabled and held there while stealth is on.
    /// Flat-Shift and Two-Step stay available; they only act on explicit
    /// driver inputs and make no noise sitting idle.
    pub const SUPPRESSED: [FeatureName; 3] =
        [FeatureName::LaunchControl, FeatureName::AntiLag, FeatureName::PopBang];

    pub fn new(config: StealthConfig, now: Instant) -> Self {
        Self { config, enabled: false, status: FeatureStatus::new(now) }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Record the toggle. Side effects (suppression, boost requests) are the
    /// engine's job and happen before this is called.
    pub fn set_enabled(&mut self, enabled: bool, now: Instant) {
        self.enabled = enabled;
        self.status.state = if enabled { FeatureState::Active } else { FeatureState::Disabled };
        self.status.last_updated = now;
        if enabled {
            self.status.bump("enables");
        }
    }

    /// The boost cap applied on entry, ramped down rather than stepped so the
    /// wastegate does not slam.
    pub fn boost_cap_request(&self) -> ParameterRequest {
        ParameterRequest::SetBoostControl {
            target_psi: self.config.boost_cap_psi,
            ramp_psi_per_s: self.config.ramp_psi_per_s,
        }
    }

    pub fn status(&self) -> &FeatureStatus {
        &self.status
    }
}
