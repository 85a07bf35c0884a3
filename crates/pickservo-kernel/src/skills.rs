//! [`Skills`] – the only path from a planned [`Action`] to the actuators.
//!
//! Every skill follows the same protocol:
//!
//! 1. clamp all numeric inputs ([`crate::safety`]),
//! 2. validate the clamped values; a violation is returned as a failed
//!    [`ActionResult`] and the actuator service is never contacted,
//! 3. invoke the remote procedure through [`RobotClient`],
//! 4. report the measured wall-clock time in the result.
//!
//! Remote failures never escape as errors: they become
//! `ActionResult { success: false, .. }`.
//!
//! `base_step` is self-terminating: after the velocity command it blocks for
//! the clamped duration and then always issues a stop, even if the velocity
//! command itself failed.
//!
//! # Example
//!
//! ```
//! use pickservo_hal::RobotClient;
//! use pickservo_hal::sim::SimWorld;
//! use pickservo_kernel::Skills;
//! use pickservo_types::{Action, ActionData, ArmPose};
//!
//! let world = SimWorld::new();
//! let skills = Skills::new(RobotClient::new(Box::new(world.robot())), Box::new(world.sleeper()));
//!
//! let result = skills.dispatch(&Action::ArmMoveXyz(ArmPose::at(50.0, 6.0, 18.0)));
//! assert!(result.success);
//! match result.data {
//!     ActionData::Arm { pose, .. } => assert_eq!(pose.x, 10.0),
//!     other => panic!("unexpected data {other:?}"),
//! }
//! ```

use std::time::Duration;

use pickservo_hal::{RobotClient, Sleeper};
use pickservo_types::{Action, ActionData, ActionResult, ArmPose, BaseCommand};
use tracing::{debug, warn};

use crate::safety;
use crate::timer::ActionTimer;

/// Default gripper movement time in milliseconds.
pub const DEFAULT_GRIPPER_USE_TIME_MS: u32 = 500;

/// Bounded actuator capabilities over one robot connection.
pub struct Skills {
    robot: RobotClient,
    sleeper: Box<dyn Sleeper>,
    budget: Duration,
}

impl Skills {
    pub fn new(robot: RobotClient, sleeper: Box<dyn Sleeper>) -> Self {
        Self {
            robot,
            sleeper,
            budget: ActionTimer::DEFAULT_BUDGET,
        }
    }

    /// Override the per-skill time budget used for overrun warnings.
    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.budget = budget;
        self
    }

    /// Execute `action`. This is the single entry point used by the loop.
    pub fn dispatch(&self, action: &Action) -> ActionResult {
        let result = match action {
            Action::BaseStep(cmd) => self.base_step(*cmd),
            Action::BaseStop => self.base_stop(),
            Action::ArmMoveXyz(pose) => self.arm_move_xyz(*pose),
            Action::ArmToSafePose => self.arm_to_safe_pose(),
            Action::GripperOpen => self.gripper_open(),
            Action::GripperClose => self.gripper_close(),
            Action::GripperPosition {
                position,
                use_time_ms,
            } => self.gripper_position(*position, *use_time_ms),
            Action::ReadRange => self.read_range(),
        };
        debug!(
            action = action.name(),
            success = result.success,
            elapsed_s = result.elapsed_s,
            "skill finished"
        );
        result
    }

    /// Timed base motion followed by an unconditional stop.
    pub fn base_step(&self, cmd: BaseCommand) -> ActionResult {
        let cmd = safety::clamp_base(cmd);
        if let Err(violation) = safety::validate_base(&cmd) {
            return reject("base_step", violation);
        }

        let timer = self.timer("base_step");
        let moved = self
            .robot
            .set_mecanum_velocity(cmd.velocity, cmd.direction, cmd.angular_rate);
        if let Err(e) = &moved {
            warn!(error = %e, "velocity command failed; stopping after the step anyway");
        }
        self.sleeper.sleep(Duration::from_secs_f64(cmd.duration));
        let stopped = self.robot.reset_mecanum_motors();
        if let Err(e) = &stopped {
            warn!(error = %e, "stop after base step failed");
        }
        let elapsed = timer.finish();

        let data = ActionData::Base(cmd);
        match (moved, stopped) {
            (Ok(_), Ok(_)) => ActionResult::ok(data, elapsed),
            (Err(m), Ok(_)) => {
                ActionResult::failed(data, format!("velocity command failed: {m}"), elapsed)
            }
            (Ok(_), Err(s)) => ActionResult::failed(data, format!("stop failed: {s}"), elapsed),
            (Err(m), Err(s)) => ActionResult::failed(
                data,
                format!("velocity command failed: {m}; stop failed: {s}"),
                elapsed,
            ),
        }
    }

    pub fn base_stop(&self) -> ActionResult {
        let timer = self.timer("base_stop");
        let outcome = self.robot.reset_mecanum_motors();
        finish(timer, ActionData::None, outcome)
    }

    /// Move the end effector. The result carries the post-clamp pose that
    /// was actually sent.
    pub fn arm_move_xyz(&self, pose: ArmPose) -> ActionResult {
        let pose = safety::clamp_arm(pose);
        if let Err(violation) = safety::validate_arm(&pose) {
            return reject("arm_move_xyz", violation);
        }

        let timer = self.timer("arm_move_xyz");
        let outcome = self.robot.arm_move_ik(
            pose.x, pose.y, pose.z, pose.pitch, pose.roll, pose.yaw, pose.speed,
        );
        let data = ActionData::Arm {
            pose,
            ik_success: outcome.is_ok(),
        };
        finish(timer, data, outcome)
    }

    pub fn arm_to_safe_pose(&self) -> ActionResult {
        self.arm_move_xyz(ArmPose::safe())
    }

    pub fn gripper_open(&self) -> ActionResult {
        let timer = self.timer("gripper_open");
        let outcome = self.robot.set_gripper_open();
        finish(timer, gripper_data(None, None), outcome)
    }

    pub fn gripper_close(&self) -> ActionResult {
        let timer = self.timer("gripper_close");
        let outcome = self.robot.set_gripper_close();
        finish(timer, gripper_data(None, None), outcome)
    }

    /// Set the gripper opening in percent (0 closed, 100 open).
    pub fn gripper_position(&self, position: i32, use_time_ms: u32) -> ActionResult {
        let position = safety::clamp_gripper_position(position);
        if let Err(violation) = safety::validate_gripper(position) {
            return reject("gripper_position", violation);
        }

        let timer = self.timer("gripper_position");
        let outcome = self.robot.set_gripper_position(position, use_time_ms);
        finish(
            timer,
            gripper_data(Some(position), Some(use_time_ms)),
            outcome,
        )
    }

    /// Current gripper opening in percent.
    pub fn read_gripper(&self) -> ActionResult {
        let timer = self.timer("read_gripper");
        match self.robot.gripper_position() {
            Ok(position) => ActionResult::ok(gripper_data(Some(position), None), timer.finish()),
            Err(e) => ActionResult::failed(ActionData::None, e.to_string(), timer.finish()),
        }
    }

    /// Ultrasonic range reading.
    pub fn read_range(&self) -> ActionResult {
        let timer = self.timer("read_range");
        match self.robot.sonar_distance() {
            Ok(distance_cm) => ActionResult::ok(ActionData::Range { distance_cm }, timer.finish()),
            Err(e) => ActionResult::failed(ActionData::None, e.to_string(), timer.finish()),
        }
    }

    pub fn battery_voltage(&self) -> ActionResult {
        let timer = self.timer("battery_voltage");
        match self.robot.battery_voltage() {
            Ok(millivolts) => ActionResult::ok(ActionData::Battery { millivolts }, timer.finish()),
            Err(e) => ActionResult::failed(ActionData::None, e.to_string(), timer.finish()),
        }
    }

    /// Stop every motor on the robot.
    pub fn emergency_stop(&self) -> ActionResult {
        let timer = self.timer("emergency_stop");
        let outcome = self.robot.stop_all_motors();
        finish(timer, ActionData::None, outcome)
    }

    fn timer(&self, skill: &'static str) -> ActionTimer {
        ActionTimer::with_budget(skill, self.budget)
    }
}

fn gripper_data(position: Option<u8>, use_time_ms: Option<u32>) -> ActionData {
    ActionData::Gripper {
        position,
        use_time_ms,
    }
}

fn finish<T, E: std::fmt::Display>(
    timer: ActionTimer,
    data: ActionData,
    outcome: Result<T, E>,
) -> ActionResult {
    let elapsed = timer.finish();
    match outcome {
        Ok(_) => ActionResult::ok(data, elapsed),
        Err(e) => ActionResult::failed(data, e.to_string(), elapsed),
    }
}

fn reject(skill: &'static str, violation: safety::SafetyViolation) -> ActionResult {
    warn!(skill, %violation, "command rejected by safety limits");
    ActionResult::rejected(violation.to_string())
}
