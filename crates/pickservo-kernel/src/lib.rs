//! `pickservo-kernel` – safety layer between plans and actuators.
//!
//! Nothing reaches the robot without passing through this crate.
//!
//! # Modules
//!
//! - [`safety`] – fixed actuator limits: total, idempotent `clamp_*`
//!   functions and `validate_*` checks that reject what clamping cannot fix.
//! - [`timer`] – [`ActionTimer`][timer::ActionTimer]: per-skill wall-clock
//!   budget.
//! - [`skills`] – [`Skills`][skills::Skills]: clamp, validate, invoke and
//!   time every physical capability; `base_step` always ends with a stop.

pub mod safety;
pub mod skills;
pub mod timer;

pub use safety::{Bounds, SafetyViolation};
pub use skills::Skills;
pub use timer::ActionTimer;
