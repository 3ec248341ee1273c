//! Stream utilities for subscription rate control

mod throttle;

pub use throttle::{Throttle, ThrottleExt};
