//! [`Referee`] – advisory observer over the executed action history.
//!
//! The referee watches `(plan, result)` pairs after each iteration and
//! raises hints about unproductive patterns. It owns its own counters and
//! has no access to the policy; hints are attached to the next
//! [`StateSummary`](pickservo_types::StateSummary) and logged.
//!
//! - **Yaw oscillation**: the rotation sign of the last six rotating base
//!   steps flipped at least three times.
//! - **Arm clamping**: the last three arm moves each reported a pose that
//!   differs from the requested one, i.e. the target is outside the arm's
//!   workspace.

use std::collections::VecDeque;

use pickservo_types::{Action, ActionData, ActionPlan, ActionResult, ArmPose};

const YAW_WINDOW: usize = 6;
const YAW_FLIPS: usize = 3;
const CLAMP_STREAK: u32 = 3;
const CLAMP_EPSILON: f64 = 1e-6;

#[derive(Debug, Clone, Default)]
pub struct Referee {
    /// Signs of recent non-zero yaw rates, oldest first.
    yaw_signs: VecDeque<bool>,
    clamped_streak: u32,
}

impl Referee {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one executed iteration.
    pub fn observe(&mut self, plan: &ActionPlan, result: &ActionResult) {
        match &plan.action {
            Action::BaseStep(cmd) if cmd.angular_rate != 0.0 => {
                self.yaw_signs.push_back(cmd.angular_rate > 0.0);
                while self.yaw_signs.len() > YAW_WINDOW {
                    self.yaw_signs.pop_front();
                }
            }
            Action::ArmMoveXyz(requested) => {
                if let ActionData::Arm { pose, .. } = &result.data {
                    if was_clamped(requested, pose) {
                        self.clamped_streak += 1;
                    } else {
                        self.clamped_streak = 0;
                    }
                }
            }
            _ => {}
        }
    }

    pub fn yaw_flips(&self) -> usize {
        self.yaw_signs
            .iter()
            .zip(self.yaw_signs.iter().skip(1))
            .filter(|(a, b)| a != b)
            .count()
    }

    /// Current hints, empty when nothing looks wrong.
    pub fn hints(&self) -> Vec<String> {
        let mut hints = Vec::new();
        let flips = self.yaw_flips();
        if flips >= YAW_FLIPS {
            hints.push(format!(
                "yaw oscillation: rotation direction flipped {flips} times in the last {} turns",
                self.yaw_signs.len()
            ));
        }
        if self.clamped_streak >= CLAMP_STREAK {
            hints.push(format!(
                "arm clamping: last {} arm moves were clamped to the workspace",
                self.clamped_streak
            ));
        }
        hints
    }

    pub fn reset(&mut self) {
        self.yaw_signs.clear();
        self.clamped_streak = 0;
    }
}

fn was_clamped(requested: &ArmPose, sent: &ArmPose) -> bool {
    (requested.x - sent.x).abs() > CLAMP_EPSILON
        || (requested.y - sent.y).abs() > CLAMP_EPSILON
        || (requested.z - sent.z).abs() > CLAMP_EPSILON
}

#[cfg(test)]
mod tests {
    use super::*;
    use pickservo_types::{BaseCommand, Phase};
    use std::time::Duration;

    fn turn(rate: f64) -> (ActionPlan, ActionResult) {
        let cmd = BaseCommand::rotate(rate, 0.5);
        (
            ActionPlan::new(Action::BaseStep(cmd), Phase::AlignBase, "turn"),
            ActionResult::ok(ActionData::Base(cmd), Duration::ZERO),
        )
    }

    fn arm(requested: ArmPose, sent: ArmPose) -> (ActionPlan, ActionResult) {
        (
            ActionPlan::new(Action::ArmMoveXyz(requested), Phase::AlignArm, "arm"),
            ActionResult::ok(
                ActionData::Arm {
                    pose: sent,
                    ik_success: true,
                },
                Duration::ZERO,
            ),
        )
    }

    #[test]
    fn alternating_turns_raise_oscillation_hint() {
        let mut referee = Referee::new();
        for rate in [20.0, -20.0, 20.0] {
            let (p, r) = turn(rate);
            referee.observe(&p, &r);
        }
        assert!(referee.hints().is_empty());

        let (p, r) = turn(-20.0);
        referee.observe(&p, &r);
        let hints = referee.hints();
        assert_eq!(hints.len(), 1);
        assert!(hints[0].starts_with("yaw oscillation"));
    }

    #[test]
    fn forward_steps_do_not_count_as_turns() {
        let mut referee = Referee::new();
        for rate in [20.0, -20.0] {
            let (p, r) = turn(rate);
            referee.observe(&p, &r);
        }
        let forward = BaseCommand::forward(100.0, 0.5);
        referee.observe(
            &ActionPlan::new(Action::BaseStep(forward), Phase::Approach, "fwd"),
            &ActionResult::ok(ActionData::Base(forward), Duration::ZERO),
        );
        assert_eq!(referee.yaw_flips(), 1);
    }

    #[test]
    fn old_flips_slide_out_of_the_window() {
        let mut referee = Referee::new();
        for rate in [20.0, -20.0, 20.0, -20.0] {
            let (p, r) = turn(rate);
            referee.observe(&p, &r);
        }
        assert!(!referee.hints().is_empty());
        for _ in 0..YAW_WINDOW {
            let (p, r) = turn(30.0);
            referee.observe(&p, &r);
        }
        assert_eq!(referee.yaw_flips(), 0);
    }

    #[test]
    fn repeated_clamping_raises_hint_and_clears_on_reachable_move() {
        let mut referee = Referee::new();
        let far = ArmPose::at(50.0, 6.0, 18.0);
        let clamped = ArmPose::at(10.0, 6.0, 18.0);
        for _ in 0..3 {
            let (p, r) = arm(far, clamped);
            referee.observe(&p, &r);
        }
        assert!(referee.hints()[0].starts_with("arm clamping"));

        let (p, r) = arm(clamped, clamped);
        referee.observe(&p, &r);
        assert!(referee.hints().is_empty());
    }

    #[test]
    fn rejected_arm_move_is_ignored() {
        let mut referee = Referee::new();
        let far = ArmPose::at(50.0, 6.0, 18.0);
        for _ in 0..5 {
            referee.observe(
                &ActionPlan::new(Action::ArmMoveXyz(far), Phase::AlignArm, "arm"),
                &ActionResult::rejected("bad pose"),
            );
        }
        assert!(referee.hints().is_empty());
    }
}
