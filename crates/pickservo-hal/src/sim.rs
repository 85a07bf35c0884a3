//! In-process simulation for CI and headless runs without a robot.
//!
//! [`SimWorld`] holds a tiny kinematic scene: one red target at a bearing and
//! distance from the base, the arm's end-effector position and the gripper.
//! Three views share the scene:
//!
//! - [`SimRobot`] – an [`RpcTransport`] that answers the actuator service's
//!   procedures, records every call and updates the scene.
//! - [`SimCamera`] – renders the target as a red square on a grey RGB24 frame.
//! - [`SimSleeper`] – advances the scene's clock (and any active base
//!   velocity) instead of blocking the thread.
//!
//! # Example
//!
//! ```rust
//! use pickservo_hal::sim::SimWorld;
//! use pickservo_hal::{Camera, RobotClient};
//!
//! let world = SimWorld::new().with_target(5.0, 400.0);
//! let robot = RobotClient::new(Box::new(world.robot()));
//! robot.reset_mecanum_motors().expect("sim call succeeds");
//!
//! let mut camera = world.camera();
//! let frame = camera.capture().expect("sim frame");
//! assert!(frame.is_rgb24());
//! assert_eq!(world.call_names(), vec!["ResetMecanumMotors"]);
//! ```

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use pickservo_types::{ArmPose, PickError, RpcError};
use serde_json::{Value, json};
use tracing::trace;

use crate::camera::{Camera, CameraFrame};
use crate::clock::Sleeper;
use crate::robot::methods;
use crate::rpc::RpcTransport;

/// Width of every simulated frame in pixels.
pub const SIM_FRAME_WIDTH: u32 = 320;
/// Height of every simulated frame in pixels.
pub const SIM_FRAME_HEIGHT: u32 = 240;

const BACKGROUND: [u8; 3] = [90, 90, 90];
const TARGET: [u8; 3] = [200, 20, 20];

/// Half of the camera's horizontal field of view, degrees.
const HALF_FOV_DEG: f64 = 30.0;
/// Fraction of a commanded yaw the base actually turns (wheel slip).
const YAW_GAIN: f64 = 0.25;
/// Apparent side of the target in pixels at 1 mm, divided by distance.
const SIDE_AT_MM: f64 = 17_400.0;
/// Pixel shift per centimetre of end-effector motion.
const PX_PER_CM: f64 = 10.0;
const REFERENCE_DISTANCE_MM: f64 = 400.0;

const BATTERY_MV: u32 = 7400;

/// One recorded remote call.
#[derive(Debug, Clone, PartialEq)]
pub struct SimCall {
    pub method: String,
    pub params: Vec<Value>,
}

#[derive(Debug)]
struct Scene {
    bearing_deg: f64,
    distance_mm: f64,
    arm: (f64, f64, f64),
    gripper_open: bool,
    holding: bool,
    /// Active base command: (mm/s, heading deg, deg/s).
    velocity: (f64, f64, f64),
    clock: Duration,
    calls: Vec<SimCall>,
    failing: HashSet<String>,
    frame_failures: u32,
    camera_closed: bool,
}

impl Default for Scene {
    fn default() -> Self {
        Self {
            bearing_deg: 0.0,
            distance_mm: REFERENCE_DISTANCE_MM,
            arm: ArmPose::SAFE_XYZ,
            gripper_open: true,
            holding: false,
            velocity: (0.0, 0.0, 0.0),
            clock: Duration::ZERO,
            calls: Vec::new(),
            failing: HashSet::new(),
            frame_failures: 0,
            camera_closed: false,
        }
    }
}

impl Scene {
    fn advance(&mut self, dt: Duration) {
        let secs = dt.as_secs_f64();
        let (v, dir, rate) = self.velocity;
        if rate != 0.0 {
            self.bearing_deg = wrap_deg(self.bearing_deg - rate * secs * YAW_GAIN);
        }
        if v != 0.0 {
            let toward = v * dir.to_radians().cos() * secs;
            self.distance_mm = (self.distance_mm - toward).max(0.0);
        }
        self.clock += dt;
    }

    fn visible(&self) -> bool {
        !self.holding && self.bearing_deg.abs() < HALF_FOV_DEG && self.distance_mm > 0.0
    }

    /// Whether closing the gripper now would capture the target.
    fn within_reach(&self) -> bool {
        let (_, _, z) = self.arm;
        self.gripper_open
            && z < 10.0
            && self.bearing_deg.abs() < 10.0
            && self.distance_mm < 300.0
    }

    fn render(&self) -> CameraFrame {
        let (w, h) = (SIM_FRAME_WIDTH as i64, SIM_FRAME_HEIGHT as i64);
        let mut data = Vec::with_capacity((w * h * 3) as usize);
        for _ in 0..w * h {
            data.extend_from_slice(&BACKGROUND);
        }

        if self.visible() {
            let (arm_x, arm_y, _) = self.arm;
            let side = (SIDE_AT_MM / self.distance_mm).clamp(2.0, h as f64);
            let cx = w as f64 / 2.0 + self.bearing_deg / HALF_FOV_DEG * (w as f64 / 2.0)
                - arm_x * PX_PER_CM;
            let cy = h as f64 / 2.0 + (REFERENCE_DISTANCE_MM - self.distance_mm) * 0.3
                - (arm_y - ArmPose::SAFE_XYZ.1) * PX_PER_CM;
            let half = side / 2.0;
            let x1 = ((cx - half).round() as i64).clamp(0, w);
            let x2 = ((cx + half).round() as i64).clamp(0, w);
            let y1 = ((cy - half).round() as i64).clamp(0, h);
            let y2 = ((cy + half).round() as i64).clamp(0, h);
            for y in y1..y2 {
                for x in x1..x2 {
                    let i = ((y * w + x) * 3) as usize;
                    data[i..i + 3].copy_from_slice(&TARGET);
                }
            }
        }

        CameraFrame::rgb(SIM_FRAME_WIDTH, SIM_FRAME_HEIGHT, data)
    }

    fn answer(&mut self, method: &str, params: &[Value]) -> Result<Value, RpcError> {
        match method {
            methods::ARM_MOVE_IK => {
                let x = number(method, params, 0)?;
                let y = number(method, params, 1)?;
                let z = number(method, params, 2)?;
                self.arm = (x, y, z);
                Ok(json!(true))
            }
            methods::SET_GRIPPER_OPEN => {
                self.set_gripper(true);
                Ok(json!(true))
            }
            methods::SET_GRIPPER_CLOSE => {
                self.set_gripper(false);
                Ok(json!(true))
            }
            methods::SET_GRIPPER_POSITION => {
                let position = number(method, params, 0)?;
                self.set_gripper(position > 50.0);
                Ok(json!(true))
            }
            methods::GET_GRIPPER_POSITION => Ok(json!(if self.gripper_open { 100 } else { 0 })),
            methods::SET_MECANUM_VELOCITY => {
                self.velocity = (
                    number(method, params, 0)?,
                    number(method, params, 1)?,
                    number(method, params, 2)?,
                );
                Ok(json!(true))
            }
            methods::RESET_MECANUM_MOTORS | methods::STOP_ALL_MOTORS => {
                self.velocity = (0.0, 0.0, 0.0);
                Ok(json!(true))
            }
            methods::GET_SONAR_DISTANCE => Ok(json!(self.distance_mm / 10.0)),
            methods::GET_BATTERY_VOLTAGE => Ok(json!(BATTERY_MV)),
            other => Err(RpcError::Rejected {
                method: other.to_string(),
                message: "Method not found".to_string(),
            }),
        }
    }

    fn set_gripper(&mut self, open: bool) {
        if open {
            self.holding = false;
        } else if self.within_reach() {
            self.holding = true;
        }
        self.gripper_open = open;
    }
}

fn number(method: &str, params: &[Value], index: usize) -> Result<f64, RpcError> {
    params
        .get(index)
        .and_then(Value::as_f64)
        .ok_or_else(|| RpcError::Rejected {
            method: method.to_string(),
            message: format!("parameter {index} missing or not a number"),
        })
}

fn wrap_deg(deg: f64) -> f64 {
    let wrapped = (deg + 180.0).rem_euclid(360.0) - 180.0;
    if wrapped == -180.0 { 180.0 } else { wrapped }
}

// ────────────────────────────────────────────────────────────────────────────
// SimWorld
// ────────────────────────────────────────────────────────────────────────────

/// Shared simulated scene. Cloning yields another handle to the same scene.
#[derive(Debug, Clone, Default)]
pub struct SimWorld {
    scene: Arc<Mutex<Scene>>,
}

impl SimWorld {
    /// A scene with the target dead ahead at 400 mm.
    pub fn new() -> Self {
        Self::default()
    }

    /// Place the target at `bearing_deg` (positive = right of the camera
    /// axis) and `distance_mm` from the base.
    pub fn with_target(self, bearing_deg: f64, distance_mm: f64) -> Self {
        {
            let mut scene = self.lock();
            scene.bearing_deg = wrap_deg(bearing_deg);
            scene.distance_mm = distance_mm.max(0.0);
        }
        self
    }

    pub fn camera(&self) -> SimCamera {
        SimCamera {
            id: "sim_front_rgb".to_string(),
            scene: Arc::clone(&self.scene),
        }
    }

    pub fn robot(&self) -> SimRobot {
        SimRobot {
            scene: Arc::clone(&self.scene),
        }
    }

    pub fn sleeper(&self) -> SimSleeper {
        SimSleeper {
            scene: Arc::clone(&self.scene),
        }
    }

    /// Make every subsequent call to `method` fail with
    /// [`RpcError::ConnectionFailed`]. The call is still recorded.
    pub fn fail_method(&self, method: &str) {
        self.lock().failing.insert(method.to_string());
    }

    pub fn clear_failures(&self) {
        self.lock().failing.clear();
    }

    /// Make the next `n` captures fail.
    pub fn fail_next_frames(&self, n: u32) {
        self.lock().frame_failures = n;
    }

    pub fn calls(&self) -> Vec<SimCall> {
        self.lock().calls.clone()
    }

    pub fn call_names(&self) -> Vec<String> {
        self.lock().calls.iter().map(|c| c.method.clone()).collect()
    }

    pub fn camera_closed(&self) -> bool {
        self.lock().camera_closed
    }

    /// `true` once the gripper has closed on the target.
    pub fn holding(&self) -> bool {
        self.lock().holding
    }

    pub fn target_bearing_deg(&self) -> f64 {
        self.lock().bearing_deg
    }

    pub fn target_distance_mm(&self) -> f64 {
        self.lock().distance_mm
    }

    pub fn arm_position(&self) -> (f64, f64, f64) {
        self.lock().arm
    }

    /// `true` while a non-zero base velocity is active.
    pub fn base_moving(&self) -> bool {
        self.lock().velocity != (0.0, 0.0, 0.0)
    }

    /// Simulated time elapsed through [`SimSleeper`].
    pub fn elapsed(&self) -> Duration {
        self.lock().clock
    }

    fn lock(&self) -> MutexGuard<'_, Scene> {
        lock(&self.scene)
    }
}

// A panic while holding the lock leaves the scene usable for cleanup calls.
fn lock(scene: &Mutex<Scene>) -> MutexGuard<'_, Scene> {
    scene.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ────────────────────────────────────────────────────────────────────────────
// Views
// ────────────────────────────────────────────────────────────────────────────

/// Simulated actuator service.
#[derive(Debug, Clone)]
pub struct SimRobot {
    scene: Arc<Mutex<Scene>>,
}

impl RpcTransport for SimRobot {
    fn invoke(&self, method: &str, params: &[Value]) -> Result<Value, RpcError> {
        let mut scene = lock(&self.scene);
        scene.calls.push(SimCall {
            method: method.to_string(),
            params: params.to_vec(),
        });
        trace!(method, ?params, "sim rpc");
        if scene.failing.contains(method) {
            return Err(RpcError::ConnectionFailed(format!(
                "simulated failure for {method}"
            )));
        }
        scene.answer(method, params)
    }
}

/// Simulated forward camera.
#[derive(Debug)]
pub struct SimCamera {
    id: String,
    scene: Arc<Mutex<Scene>>,
}

impl Camera for SimCamera {
    fn id(&self) -> &str {
        &self.id
    }

    fn capture(&mut self) -> Result<CameraFrame, PickError> {
        let mut scene = lock(&self.scene);
        if scene.camera_closed {
            return Err(PickError::Camera(format!("{} is closed", self.id)));
        }
        if scene.frame_failures > 0 {
            scene.frame_failures -= 1;
            return Err(PickError::Camera("simulated frame drop".to_string()));
        }
        Ok(scene.render())
    }

    fn close(&mut self) {
        lock(&self.scene).camera_closed = true;
    }
}

/// Advances simulated time without blocking.
#[derive(Debug, Clone)]
pub struct SimSleeper {
    scene: Arc<Mutex<Scene>>,
}

impl Sleeper for SimSleeper {
    fn sleep(&self, duration: Duration) {
        lock(&self.scene).advance(duration);
    }
}
