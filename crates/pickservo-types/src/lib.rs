//! Shared data model for the pickservo control stack.
//!
//! Every crate in the workspace speaks in these types: the perception layer
//! produces a [`Detection`], a policy turns it into an [`ActionPlan`], the
//! skill layer executes the plan's [`Action`] and reports an
//! [`ActionResult`] that is fed back into the next planning step.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ─────────────────────────────────────────────────────────────────────────────
// Perception
// ─────────────────────────────────────────────────────────────────────────────

/// A pixel coordinate in image space (origin top-left, y grows downwards).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelPoint {
    pub x: i32,
    pub y: i32,
}

impl PixelPoint {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned bounding box `(x1, y1)`–`(x2, y2)` in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BoundingBox {
    pub fn width(&self) -> i32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> i32 {
        self.y2 - self.y1
    }

    pub fn center(&self) -> PixelPoint {
        PixelPoint::new(
            self.x1 + self.width() / 2,
            self.y1 + self.height() / 2,
        )
    }
}

/// One frame's object-localisation result.
///
/// Produced fresh every iteration by a detector and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub found: bool,
    pub bbox: Option<BoundingBox>,
    pub center: Option<PixelPoint>,
    /// Blob area divided by image area, in `[0, 1]`.
    pub area_ratio: f64,
    /// Detector confidence in `[0, 1]`.
    pub confidence: f64,
    /// Set when the observation itself failed (e.g. the frame capture).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Detection {
    /// A detection with nothing in view.
    pub fn lost() -> Self {
        Self {
            found: false,
            bbox: None,
            center: None,
            area_ratio: 0.0,
            confidence: 0.0,
            error: None,
        }
    }

    /// A detection for a failed observation, annotated with `error`.
    pub fn lost_with_error(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::lost()
        }
    }

    /// A positive detection centred on the bounding box.
    pub fn at(bbox: BoundingBox, area_ratio: f64, confidence: f64) -> Self {
        Self {
            found: true,
            center: Some(bbox.center()),
            bbox: Some(bbox),
            area_ratio: area_ratio.clamp(0.0, 1.0),
            confidence: confidence.clamp(0.0, 1.0),
            error: None,
        }
    }

    /// The target centre, only when the target is actually in view.
    pub fn target(&self) -> Option<PixelPoint> {
        if self.found { self.center } else { None }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Phases
// ─────────────────────────────────────────────────────────────────────────────

/// A named state of the visual-servo controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Search,
    AlignBase,
    Approach,
    Pregrasp,
    AlignArm,
    Grasp,
    Verify,
    Recover,
    Done,
    Failed,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Search => "SEARCH",
            Phase::AlignBase => "ALIGN_BASE",
            Phase::Approach => "APPROACH",
            Phase::Pregrasp => "PREGRASP",
            Phase::AlignArm => "ALIGN_ARM",
            Phase::Grasp => "GRASP",
            Phase::Verify => "VERIFY",
            Phase::Recover => "RECOVER",
            Phase::Done => "DONE",
            Phase::Failed => "FAILED",
        }
    }

    /// `true` for phases after which the control loop exits.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Done | Phase::Failed)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Actions
// ─────────────────────────────────────────────────────────────────────────────

/// Parameters of a short, self-terminating base motion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BaseCommand {
    /// Translational speed in mm/s.
    pub velocity: f64,
    /// Heading of the translation in degrees, `[0, 360)`, 0 = forward.
    pub direction: f64,
    /// Yaw rate in deg/s, positive turns towards a target right of centre.
    pub angular_rate: f64,
    /// Motion duration in seconds.
    pub duration: f64,
}

impl BaseCommand {
    /// Rotate in place.
    pub fn rotate(angular_rate: f64, duration: f64) -> Self {
        Self {
            velocity: 0.0,
            direction: 0.0,
            angular_rate,
            duration,
        }
    }

    /// Drive straight ahead.
    pub fn forward(velocity: f64, duration: f64) -> Self {
        Self {
            velocity,
            direction: 0.0,
            angular_rate: 0.0,
            duration,
        }
    }
}

/// End-effector target for the arm's inverse kinematics (cm, degrees, ms).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ArmPose {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub pitch: f64,
    pub roll: f64,
    pub yaw: f64,
    /// Movement time in milliseconds.
    pub speed: u32,
}

impl ArmPose {
    pub const DEFAULT_PITCH: f64 = 0.0;
    pub const DEFAULT_ROLL: f64 = -90.0;
    pub const DEFAULT_YAW: f64 = 90.0;
    pub const DEFAULT_SPEED_MS: u32 = 1500;

    /// Conservative pose above the workspace.
    pub const SAFE_XYZ: (f64, f64, f64) = (0.0, 6.0, 18.0);

    /// A pose at `(x, y, z)` with the default gripper-down orientation.
    pub fn at(x: f64, y: f64, z: f64) -> Self {
        Self {
            x,
            y,
            z,
            pitch: Self::DEFAULT_PITCH,
            roll: Self::DEFAULT_ROLL,
            yaw: Self::DEFAULT_YAW,
            speed: Self::DEFAULT_SPEED_MS,
        }
    }

    pub fn safe() -> Self {
        let (x, y, z) = Self::SAFE_XYZ;
        Self::at(x, y, z)
    }
}

/// A single actuator command selected by a policy.
///
/// Serialises as `{"action": "<name>", "params": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", content = "params", rename_all = "snake_case")]
pub enum Action {
    BaseStep(BaseCommand),
    BaseStop,
    ArmMoveXyz(ArmPose),
    ArmToSafePose,
    GripperOpen,
    GripperClose,
    GripperPosition { position: i32, use_time_ms: u32 },
    ReadRange,
}

impl Action {
    /// Stable action name, used for logging and stuck detection.
    pub fn name(&self) -> &'static str {
        match self {
            Action::BaseStep(_) => "base_step",
            Action::BaseStop => "base_stop",
            Action::ArmMoveXyz(_) => "arm_move_xyz",
            Action::ArmToSafePose => "arm_to_safe_pose",
            Action::GripperOpen => "gripper_open",
            Action::GripperClose => "gripper_close",
            Action::GripperPosition { .. } => "gripper_position",
            Action::ReadRange => "read_range",
        }
    }
}

/// The next command for one control-loop iteration plus its provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionPlan {
    #[serde(flatten)]
    pub action: Action,
    /// Phase whose handler produced this plan.
    pub phase: Phase,
    /// Human-readable reason, for logs.
    pub why: String,
}

impl ActionPlan {
    pub fn new(action: Action, phase: Phase, why: impl Into<String>) -> Self {
        Self {
            action,
            phase,
            why: why.into(),
        }
    }
}

/// Actuator feedback attached to an [`ActionResult`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionData {
    None,
    /// The post-clamp base command that was sent.
    Base(BaseCommand),
    /// The post-clamp arm pose that was sent and whether IK accepted it.
    Arm { pose: ArmPose, ik_success: bool },
    Gripper {
        position: Option<u8>,
        use_time_ms: Option<u32>,
    },
    Range { distance_cm: f64 },
    Battery { millivolts: u32 },
}

/// Outcome of executing one [`Action`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    pub success: bool,
    pub data: ActionData,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Wall-clock time spent executing the action, in seconds.
    pub elapsed_s: f64,
}

impl ActionResult {
    pub fn ok(data: ActionData, elapsed: Duration) -> Self {
        Self {
            success: true,
            data,
            error: None,
            elapsed_s: elapsed.as_secs_f64(),
        }
    }

    pub fn failed(data: ActionData, error: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            success: false,
            data,
            error: Some(error.into()),
            elapsed_s: elapsed.as_secs_f64(),
        }
    }

    /// A failure that never reached the actuator.
    pub fn rejected(error: impl Into<String>) -> Self {
        Self::failed(ActionData::None, error, Duration::ZERO)
    }
}

/// Snapshot of the loop state handed to policies and iteration sinks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSummary {
    pub task: String,
    pub phase: Phase,
    pub iteration: u64,
    pub detection: Detection,
    pub last_action: Option<String>,
    pub last_action_success: Option<bool>,
    /// Advisory hints from observers riding alongside the policy.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hints: Vec<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Failure of a single remote procedure call.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RpcError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The remote service answered but reported that the call failed.
    #[error("{method} rejected: {message}")]
    Rejected { method: String, message: String },

    #[error("{0}")]
    Other(String),
}

/// Top-level error type for the pickservo stack.
#[derive(Error, Debug)]
pub enum PickError {
    #[error("RPC error: {0}")]
    Rpc(#[from] RpcError),

    #[error("Camera error: {0}")]
    Camera(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}
