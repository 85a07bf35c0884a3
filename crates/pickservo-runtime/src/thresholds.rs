//! [`Thresholds`] – tuning constants for the policy and the loop.
//!
//! Loaded once at startup from a TOML document with the tables `[base]`,
//! `[approach]`, `[arm]`, `[grasp]` and `[general]`. Every key is required;
//! a missing key, a wrongly typed value or a value rejected by
//! [`Thresholds::validate`] is a [`PickError::Config`].

use std::fs;
use std::path::Path;
use std::time::Duration;

use pickservo_types::PickError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseThresholds {
    pub search_rotation_step_deg: f64,
    pub search_rotation_duration_s: f64,
    /// Rotations without a detection before one forward step is taken.
    pub max_search_rotations: u32,
    pub center_tol_px: f64,
    pub approach_velocity_mm_s: f64,
    pub approach_duration_s: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApproachThresholds {
    /// Area ratio at which the target counts as within arm reach.
    pub near_threshold: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArmThresholds {
    pub grasp_pixel_offset_y: i32,
    pub visual_servo_tolerance_px: f64,
    pub align_step_max_cm: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraspThresholds {
    pub approach_z_offset_cm: f64,
    pub lift_z_offset_cm: f64,
    pub max_attempts: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneralThresholds {
    /// Consecutive repeats of one action name that count as stuck.
    pub stuck_threshold: u32,
    pub observation_delay_s: f64,
}

/// Immutable configuration shared by the policy and the executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub base: BaseThresholds,
    pub approach: ApproachThresholds,
    pub arm: ArmThresholds,
    pub grasp: GraspThresholds,
    pub general: GeneralThresholds,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            base: BaseThresholds {
                search_rotation_step_deg: 15.0,
                search_rotation_duration_s: 0.5,
                max_search_rotations: 24,
                center_tol_px: 15.0,
                approach_velocity_mm_s: 100.0,
                approach_duration_s: 0.5,
            },
            approach: ApproachThresholds {
                near_threshold: 0.08,
            },
            arm: ArmThresholds {
                grasp_pixel_offset_y: 60,
                visual_servo_tolerance_px: 12.0,
                align_step_max_cm: 1.0,
            },
            grasp: GraspThresholds {
                approach_z_offset_cm: -10.0,
                lift_z_offset_cm: 4.0,
                max_attempts: 3,
            },
            general: GeneralThresholds {
                stuck_threshold: 30,
                observation_delay_s: 0.1,
            },
        }
    }
}

impl Thresholds {
    /// Read and validate a thresholds file.
    pub fn load(path: &Path) -> Result<Self, PickError> {
        let text = fs::read_to_string(path).map_err(|e| {
            PickError::Config(format!("cannot read thresholds {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&text)
            .map_err(|e| PickError::Config(format!("{}: {e}", path.display())))
    }

    pub fn from_toml_str(text: &str) -> Result<Self, PickError> {
        let thresholds: Self =
            toml::from_str(text).map_err(|e| PickError::Config(e.to_string()))?;
        thresholds.validate()?;
        Ok(thresholds)
    }

    /// Reject values the policy cannot work with.
    pub fn validate(&self) -> Result<(), PickError> {
        let b = &self.base;
        positive("base.search_rotation_step_deg", b.search_rotation_step_deg)?;
        positive("base.search_rotation_duration_s", b.search_rotation_duration_s)?;
        non_negative("base.center_tol_px", b.center_tol_px)?;
        positive("base.approach_velocity_mm_s", b.approach_velocity_mm_s)?;
        positive("base.approach_duration_s", b.approach_duration_s)?;

        let near = self.approach.near_threshold;
        if !(near > 0.0 && near <= 1.0) {
            return Err(invalid("approach.near_threshold", near, "must be in (0, 1]"));
        }

        non_negative("arm.visual_servo_tolerance_px", self.arm.visual_servo_tolerance_px)?;
        positive("arm.align_step_max_cm", self.arm.align_step_max_cm)?;

        finite("grasp.approach_z_offset_cm", self.grasp.approach_z_offset_cm)?;
        finite("grasp.lift_z_offset_cm", self.grasp.lift_z_offset_cm)?;
        if self.grasp.max_attempts == 0 {
            return Err(invalid("grasp.max_attempts", 0.0, "must be at least 1"));
        }

        if self.general.stuck_threshold == 0 {
            return Err(invalid("general.stuck_threshold", 0.0, "must be at least 1"));
        }
        // An uninterrupted search is one run of base steps: the rotations and
        // then the forward step. The guard must let that run finish.
        if self.general.stuck_threshold <= b.max_search_rotations {
            return Err(invalid(
                "general.stuck_threshold",
                f64::from(self.general.stuck_threshold),
                &format!(
                    "must exceed base.max_search_rotations ({})",
                    b.max_search_rotations
                ),
            ));
        }
        non_negative("general.observation_delay_s", self.general.observation_delay_s)
    }

    /// Search rotation rate in deg/s.
    pub fn search_rotation_rate(&self) -> f64 {
        self.base.search_rotation_step_deg / self.base.search_rotation_duration_s
    }

    pub fn observation_delay(&self) -> Duration {
        Duration::from_secs_f64(self.general.observation_delay_s)
    }
}

fn invalid(key: &str, value: f64, why: &str) -> PickError {
    PickError::Config(format!("{key} = {value} {why}"))
}

fn finite(key: &str, value: f64) -> Result<(), PickError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(invalid(key, value, "must be finite"))
    }
}

fn positive(key: &str, value: f64) -> Result<(), PickError> {
    finite(key, value)?;
    if value > 0.0 {
        Ok(())
    } else {
        Err(invalid(key, value, "must be positive"))
    }
}

fn non_negative(key: &str, value: f64) -> Result<(), PickError> {
    finite(key, value)?;
    if value >= 0.0 {
        Ok(())
    } else {
        Err(invalid(key, value, "must not be negative"))
    }
}
