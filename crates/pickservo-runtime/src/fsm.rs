//! [`VisualServoFsm`] – deterministic visual-servo pick policy.
//!
//! ```text
//! SEARCH ─found─▶ ALIGN_BASE ─centred─▶ APPROACH ─near─▶ PREGRASP ─▶ ALIGN_ARM
//!    ▲                                                                  │ aligned
//!    │                                                                  ▼
//!    └──────────── RECOVER ◀─attempts exhausted── VERIFY ◀─────────── GRASP
//!                                                   │
//!                                                   └─target gone─▶ DONE
//! ```
//!
//! One [`ActionPlan`] per call. Phase changes that need no motion of their
//! own fall through to the next phase's handler in the same call, so every
//! call emits exactly one command. Losing the target in any phase before
//! GRASP returns to SEARCH. GRASP is a blind four-step sequence (open,
//! lower, close, lift) that ignores the detection once started.
//!
//! Arm corrections in ALIGN_ARM use a fixed gain of 0.1 cm per pixel of
//! error, capped at `arm.align_step_max_cm` per step.
//!
//! # Example
//!
//! ```
//! use pickservo_runtime::fsm::VisualServoFsm;
//! use pickservo_runtime::Thresholds;
//! use pickservo_types::{Action, Detection, Phase};
//!
//! let mut fsm = VisualServoFsm::new(Thresholds::default());
//! fsm.set_image_size(640, 480);
//!
//! let plan = fsm.plan(&Detection::lost());
//! assert_eq!(plan.phase, Phase::Search);
//! assert!(matches!(plan.action, Action::BaseStep(cmd) if cmd.velocity == 0.0));
//! ```

use pickservo_types::{Action, ActionPlan, ArmPose, BaseCommand, Detection, Phase, PixelPoint};
use tracing::debug;

use crate::policy::{PlanContext, Policy};
use crate::thresholds::Thresholds;

/// Pixel-to-centimetre gain for arm corrections.
const SERVO_GAIN_CM_PER_PX: f64 = 0.1;
/// Yaw rate used to centre the target, deg/s.
const ALIGN_YAW_RATE: f64 = 20.0;
/// Slow forward step taken when a full search turn found nothing.
const EXPAND_VELOCITY_MM_S: f64 = 30.0;
const EXPAND_DURATION_S: f64 = 0.3;
/// Area ratio below which a still-visible blob counts as picked up.
const VERIFY_GONE_AREA: f64 = 0.01;

/// Position within the blind grasp sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GraspStep {
    #[default]
    Open,
    Lower,
    Close,
    Lift,
}

impl GraspStep {
    pub fn index(self) -> u8 {
        self as u8
    }
}

pub struct VisualServoFsm {
    thresholds: Thresholds,
    phase: Phase,
    search_rotation_count: u32,
    grasp_attempts: u32,
    grasp_step: GraspStep,
    image_center: Option<PixelPoint>,
    grasp_target_px: Option<PixelPoint>,
    pre_grasp_xyz: Option<(f64, f64, f64)>,
}

impl VisualServoFsm {
    pub fn new(thresholds: Thresholds) -> Self {
        Self {
            thresholds,
            phase: Phase::Search,
            search_rotation_count: 0,
            grasp_attempts: 0,
            grasp_step: GraspStep::Open,
            image_center: None,
            grasp_target_px: None,
            pre_grasp_xyz: None,
        }
    }

    /// Record the frame size; the grasp target sits `grasp_pixel_offset_y`
    /// pixels below the image centre.
    pub fn set_image_size(&mut self, width: u32, height: u32) {
        let center = PixelPoint::new((width / 2) as i32, (height / 2) as i32);
        self.image_center = Some(center);
        self.grasp_target_px = Some(PixelPoint::new(
            center.x,
            center.y + self.thresholds.arm.grasp_pixel_offset_y,
        ));
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn search_rotation_count(&self) -> u32 {
        self.search_rotation_count
    }

    pub fn grasp_attempts(&self) -> u32 {
        self.grasp_attempts
    }

    /// Next step of the grasp sequence, 0–3. Meaningful only in GRASP.
    pub fn grasp_substep(&self) -> u8 {
        self.grasp_step.index()
    }

    pub fn pre_grasp_xyz(&self) -> Option<(f64, f64, f64)> {
        self.pre_grasp_xyz
    }

    pub fn image_center(&self) -> Option<PixelPoint> {
        self.image_center
    }

    pub fn reset(&mut self) {
        self.phase = Phase::Search;
        self.search_rotation_count = 0;
        self.grasp_attempts = 0;
        self.grasp_step = GraspStep::Open;
        self.pre_grasp_xyz = None;
    }

    /// Choose the next action for `detection`.
    pub fn plan(&mut self, detection: &Detection) -> ActionPlan {
        let before = self.phase;
        let plan = match self.phase {
            Phase::Search => self.plan_search(detection),
            Phase::AlignBase => self.plan_align_base(detection),
            Phase::Approach => self.plan_approach(detection),
            Phase::Pregrasp => self.plan_pregrasp(detection),
            Phase::AlignArm => self.plan_align_arm(detection),
            Phase::Grasp => self.plan_grasp(),
            Phase::Verify => self.plan_verify(detection),
            Phase::Recover => self.plan_recover(),
            Phase::Done => ActionPlan::new(Action::BaseStop, Phase::Done, "task complete"),
            Phase::Failed => ActionPlan::new(Action::BaseStop, Phase::Failed, "task failed"),
        };
        if before != self.phase {
            debug!(from = %before, to = %self.phase, "phase transition");
        }
        plan
    }

    // ── Phase handlers ──────────────────────────────────────────────────────

    fn plan_search(&mut self, detection: &Detection) -> ActionPlan {
        if detection.target().is_some() {
            self.phase = Phase::AlignBase;
            self.search_rotation_count = 0;
            return self.plan_align_base(detection);
        }

        if self.search_rotation_count >= self.thresholds.base.max_search_rotations {
            self.search_rotation_count = 0;
            return ActionPlan::new(
                Action::BaseStep(BaseCommand::forward(EXPAND_VELOCITY_MM_S, EXPAND_DURATION_S)),
                Phase::Search,
                "expanding search area",
            );
        }

        self.search_rotation_count += 1;
        let cmd = BaseCommand::rotate(
            self.thresholds.search_rotation_rate(),
            self.thresholds.base.search_rotation_duration_s,
        );
        ActionPlan::new(
            Action::BaseStep(cmd),
            Phase::Search,
            format!("searching for target (rotation {})", self.search_rotation_count),
        )
    }

    fn plan_align_base(&mut self, detection: &Detection) -> ActionPlan {
        let Some(target) = detection.target() else {
            return self.lose_target(detection);
        };
        let Some(center) = self.image_center else {
            return waiting_for_image(Phase::AlignBase);
        };

        let dx = target.x - center.x;
        if f64::from(dx.abs()) <= self.thresholds.base.center_tol_px {
            self.phase = Phase::Approach;
            return self.plan_approach(detection);
        }

        let rate = if dx > 0 { ALIGN_YAW_RATE } else { -ALIGN_YAW_RATE };
        ActionPlan::new(
            Action::BaseStep(BaseCommand::rotate(
                rate,
                self.thresholds.base.search_rotation_duration_s,
            )),
            Phase::AlignBase,
            format!("centering target (dx={dx}px)"),
        )
    }

    fn plan_approach(&mut self, detection: &Detection) -> ActionPlan {
        let Some(target) = detection.target() else {
            return self.lose_target(detection);
        };

        let near = self.thresholds.approach.near_threshold;
        if detection.area_ratio >= near {
            self.phase = Phase::Pregrasp;
            return self.plan_pregrasp(detection);
        }

        if let Some(center) = self.image_center {
            if f64::from((target.x - center.x).abs()) > self.thresholds.base.center_tol_px {
                self.phase = Phase::AlignBase;
                return self.plan_align_base(detection);
            }
        }

        let base = &self.thresholds.base;
        ActionPlan::new(
            Action::BaseStep(BaseCommand::forward(
                base.approach_velocity_mm_s,
                base.approach_duration_s,
            )),
            Phase::Approach,
            format!(
                "approaching target (area_ratio={:.4} < {near:.4})",
                detection.area_ratio
            ),
        )
    }

    fn plan_pregrasp(&mut self, detection: &Detection) -> ActionPlan {
        if detection.target().is_none() {
            return self.lose_target(detection);
        }

        self.pre_grasp_xyz.get_or_insert(ArmPose::SAFE_XYZ);
        // A fresh alignment starts a fresh attempt budget; VERIFY retries
        // re-enter ALIGN_ARM directly and keep counting.
        self.grasp_attempts = 0;
        self.phase = Phase::AlignArm;
        ActionPlan::new(
            Action::ArmToSafePose,
            Phase::Pregrasp,
            "moving arm to pre-grasp position",
        )
    }

    fn plan_align_arm(&mut self, detection: &Detection) -> ActionPlan {
        let Some(target) = detection.target() else {
            return self.lose_target(detection);
        };
        let Some(grasp_px) = self.grasp_target_px else {
            return waiting_for_image(Phase::AlignArm);
        };

        let ex = target.x - grasp_px.x;
        let ey = target.y - grasp_px.y;
        let tol = self.thresholds.arm.visual_servo_tolerance_px;
        if f64::from(ex.abs()) <= tol && f64::from(ey.abs()) <= tol {
            self.enter_grasp();
            return self.plan_grasp();
        }

        let max_step = self.thresholds.arm.align_step_max_cm;
        let step = |err: i32| (f64::from(err) * SERVO_GAIN_CM_PER_PX).clamp(-max_step, max_step);
        let (x, y, z) = self.pre_grasp_xyz.unwrap_or(ArmPose::SAFE_XYZ);
        let next = (x + step(ex), y + step(ey), z);
        self.pre_grasp_xyz = Some(next);

        ActionPlan::new(
            Action::ArmMoveXyz(ArmPose::at(next.0, next.1, next.2)),
            Phase::AlignArm,
            format!("aligning arm (ex={ex}px, ey={ey}px)"),
        )
    }

    fn enter_grasp(&mut self) {
        self.phase = Phase::Grasp;
        self.grasp_step = GraspStep::Open;
    }

    /// One step of the blind grasp sequence per call.
    fn plan_grasp(&mut self) -> ActionPlan {
        let (x, y, z) = self.pre_grasp_xyz.unwrap_or(ArmPose::SAFE_XYZ);
        let grasp = &self.thresholds.grasp;
        let (action, why, next) = match self.grasp_step {
            GraspStep::Open => (Action::GripperOpen, "opening gripper", GraspStep::Lower),
            GraspStep::Lower => (
                Action::ArmMoveXyz(ArmPose::at(x, y, z + grasp.approach_z_offset_cm)),
                "lowering arm to grasp",
                GraspStep::Close,
            ),
            GraspStep::Close => (Action::GripperClose, "closing gripper", GraspStep::Lift),
            GraspStep::Lift => (
                Action::ArmMoveXyz(ArmPose::at(x, y, z + grasp.lift_z_offset_cm)),
                "lifting arm after grasp",
                GraspStep::Open,
            ),
        };
        if self.grasp_step == GraspStep::Lift {
            self.phase = Phase::Verify;
        }
        self.grasp_step = next;
        ActionPlan::new(action, Phase::Grasp, why)
    }

    fn plan_verify(&mut self, detection: &Detection) -> ActionPlan {
        if detection.target().is_none() {
            self.phase = Phase::Done;
            return ActionPlan::new(
                Action::BaseStop,
                Phase::Verify,
                "grasp verified: target disappeared",
            );
        }
        if detection.area_ratio < VERIFY_GONE_AREA {
            self.phase = Phase::Done;
            return ActionPlan::new(
                Action::BaseStop,
                Phase::Verify,
                "grasp verified: target area dropped",
            );
        }

        self.grasp_attempts += 1;
        if self.grasp_attempts >= self.thresholds.grasp.max_attempts {
            self.phase = Phase::Recover;
            return self.plan_recover();
        }
        self.phase = Phase::AlignArm;
        self.plan_align_arm(detection)
    }

    fn plan_recover(&mut self) -> ActionPlan {
        self.reset();
        ActionPlan::new(
            Action::ArmToSafePose,
            Phase::Recover,
            "recovering: arm to safe pose, restarting search",
        )
    }

    fn lose_target(&mut self, detection: &Detection) -> ActionPlan {
        self.phase = Phase::Search;
        self.plan_search(detection)
    }
}

fn waiting_for_image(phase: Phase) -> ActionPlan {
    ActionPlan::new(Action::BaseStop, phase, "waiting for image size")
}

impl Policy for VisualServoFsm {
    fn plan(&mut self, ctx: &PlanContext<'_>) -> ActionPlan {
        VisualServoFsm::plan(self, ctx.detection)
    }

    fn reset(&mut self) {
        VisualServoFsm::reset(self);
    }

    fn phase(&self) -> Phase {
        self.phase
    }

    fn force_recover(&mut self) {
        self.phase = Phase::Recover;
    }

    fn observe_frame_size(&mut self, width: u32, height: u32) {
        self.set_image_size(width, height);
    }
}
