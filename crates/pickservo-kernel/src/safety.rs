//! Hard numeric limits for every actuator parameter.
//!
//! Each parameter has a `clamp_*` function that saturates into its
//! [`Bounds`] and never fails, and each command group has a `validate_*`
//! function that re-checks the clamped values. Validation only rejects what
//! clamping cannot repair: non-finite numbers and a base heading outside
//! `[0, 360)`, which is not clamped.
//!
//! All functions are pure.
//!
//! # Example
//!
//! ```
//! use pickservo_kernel::safety::{clamp_base, validate_base};
//! use pickservo_types::BaseCommand;
//!
//! let wild = BaseCommand { velocity: 900.0, direction: 0.0, angular_rate: -80.0, duration: 3.0 };
//! let safe = clamp_base(wild);
//! assert_eq!(safe.velocity, 200.0);
//! assert_eq!(safe.angular_rate, -50.0);
//! assert_eq!(safe.duration, 0.5);
//! assert!(validate_base(&safe).is_ok());
//! ```

use std::fmt;

use pickservo_types::{ArmPose, BaseCommand};
use thiserror::Error;

// ────────────────────────────────────────────────────────────────────────────
// Bounds
// ────────────────────────────────────────────────────────────────────────────

/// A numeric interval `[min, max]`, or `[min, max)` when the upper end is open.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: f64,
    pub max: f64,
    pub max_inclusive: bool,
}

impl Bounds {
    pub const fn closed(min: f64, max: f64) -> Self {
        Self {
            min,
            max,
            max_inclusive: true,
        }
    }

    pub const fn half_open(min: f64, max: f64) -> Self {
        Self {
            min,
            max,
            max_inclusive: false,
        }
    }

    /// Saturate `value` into the closed interval. NaN is returned unchanged
    /// so that validation can reject it.
    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }

    pub fn contains(&self, value: f64) -> bool {
        value.is_finite()
            && value >= self.min
            && (value < self.max || (self.max_inclusive && value == self.max))
    }

    fn check(&self, parameter: &'static str, value: f64) -> Result<(), SafetyViolation> {
        if self.contains(value) {
            Ok(())
        } else {
            Err(SafetyViolation {
                parameter,
                value,
                bounds: *self,
            })
        }
    }
}

impl fmt::Display for Bounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let close = if self.max_inclusive { ']' } else { ')' };
        write!(f, "[{}, {}{close}", self.min, self.max)
    }
}

/// A parameter that failed validation after clamping.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{parameter} = {value} outside safe range {bounds}")]
pub struct SafetyViolation {
    pub parameter: &'static str,
    pub value: f64,
    pub bounds: Bounds,
}

// ────────────────────────────────────────────────────────────────────────────
// Limits
// ────────────────────────────────────────────────────────────────────────────

pub const BASE_VELOCITY_MM_S: Bounds = Bounds::closed(0.0, 200.0);
pub const BASE_ANGULAR_RATE_DEG_S: Bounds = Bounds::closed(-50.0, 50.0);
pub const BASE_DURATION_S: Bounds = Bounds::closed(0.2, 0.5);
pub const BASE_DIRECTION_DEG: Bounds = Bounds::half_open(0.0, 360.0);
pub const ARM_X_CM: Bounds = Bounds::closed(-10.0, 10.0);
pub const ARM_Y_CM: Bounds = Bounds::closed(5.0, 15.0);
pub const ARM_Z_CM: Bounds = Bounds::closed(0.0, 25.0);
pub const ARM_SPEED_MS: Bounds = Bounds::closed(500.0, 3000.0);
pub const GRIPPER_POSITION_PCT: Bounds = Bounds::closed(0.0, 100.0);

// ────────────────────────────────────────────────────────────────────────────
// Clamp
// ────────────────────────────────────────────────────────────────────────────

pub fn clamp_velocity(mm_s: f64) -> f64 {
    BASE_VELOCITY_MM_S.clamp(mm_s)
}

pub fn clamp_angular_rate(deg_s: f64) -> f64 {
    BASE_ANGULAR_RATE_DEG_S.clamp(deg_s)
}

pub fn clamp_duration(seconds: f64) -> f64 {
    BASE_DURATION_S.clamp(seconds)
}

pub fn clamp_arm_x(cm: f64) -> f64 {
    ARM_X_CM.clamp(cm)
}

pub fn clamp_arm_y(cm: f64) -> f64 {
    ARM_Y_CM.clamp(cm)
}

pub fn clamp_arm_z(cm: f64) -> f64 {
    ARM_Z_CM.clamp(cm)
}

pub fn clamp_arm_speed(ms: u32) -> u32 {
    ms.clamp(ARM_SPEED_MS.min as u32, ARM_SPEED_MS.max as u32)
}

pub fn clamp_gripper_position(percent: i32) -> u8 {
    // In range after the clamp, so the narrowing cannot truncate.
    percent.clamp(GRIPPER_POSITION_PCT.min as i32, GRIPPER_POSITION_PCT.max as i32) as u8
}

/// Clamp every numeric field of a base command. `direction` is left as is.
pub fn clamp_base(cmd: BaseCommand) -> BaseCommand {
    BaseCommand {
        velocity: clamp_velocity(cmd.velocity),
        direction: cmd.direction,
        angular_rate: clamp_angular_rate(cmd.angular_rate),
        duration: clamp_duration(cmd.duration),
    }
}

/// Clamp position and speed of an arm pose. Orientation is left as is.
pub fn clamp_arm(pose: ArmPose) -> ArmPose {
    ArmPose {
        x: clamp_arm_x(pose.x),
        y: clamp_arm_y(pose.y),
        z: clamp_arm_z(pose.z),
        speed: clamp_arm_speed(pose.speed),
        ..pose
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Validate
// ────────────────────────────────────────────────────────────────────────────

pub fn validate_base(cmd: &BaseCommand) -> Result<(), SafetyViolation> {
    BASE_VELOCITY_MM_S.check("velocity", cmd.velocity)?;
    BASE_DIRECTION_DEG.check("direction", cmd.direction)?;
    BASE_ANGULAR_RATE_DEG_S.check("angular_rate", cmd.angular_rate)?;
    BASE_DURATION_S.check("duration", cmd.duration)
}

pub fn validate_arm(pose: &ArmPose) -> Result<(), SafetyViolation> {
    ARM_X_CM.check("x", pose.x)?;
    ARM_Y_CM.check("y", pose.y)?;
    ARM_Z_CM.check("z", pose.z)?;
    ARM_SPEED_MS.check("speed", f64::from(pose.speed))?;
    let any_angle = Bounds::closed(f64::MIN, f64::MAX);
    any_angle.check("pitch", pose.pitch)?;
    any_angle.check("roll", pose.roll)?;
    any_angle.check("yaw", pose.yaw)
}

pub fn validate_gripper(position: u8) -> Result<(), SafetyViolation> {
    GRIPPER_POSITION_PCT.check("position", f64::from(position))
}
