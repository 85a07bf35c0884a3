//! The [`Policy`] seam between the executor and its decision logic.
//!
//! The executor depends only on this trait. [`VisualServoFsm`] is the
//! deterministic implementation; other policies (e.g. model-driven ones)
//! plug in behind the same contract.
//!
//! [`VisualServoFsm`]: crate::fsm::VisualServoFsm

use pickservo_hal::CameraFrame;
use pickservo_types::{ActionPlan, ActionResult, Detection, Phase, StateSummary};

/// Everything a policy may look at when choosing the next action.
#[derive(Debug, Clone, Copy)]
pub struct PlanContext<'a> {
    /// The frame the detection was computed from, if the capture succeeded.
    pub frame: Option<&'a CameraFrame>,
    pub detection: &'a Detection,
    pub state: &'a StateSummary,
    /// Result of the previous iteration's action.
    pub last_result: Option<&'a ActionResult>,
}

/// Chooses exactly one action per control-loop iteration.
pub trait Policy: Send {
    fn plan(&mut self, ctx: &PlanContext<'_>) -> ActionPlan;

    /// Return to the initial phase with all counters cleared.
    fn reset(&mut self);

    fn phase(&self) -> Phase;

    /// Abandon the current attempt; the next plan starts recovery.
    fn force_recover(&mut self);

    /// Called with the dimensions of every captured frame before planning.
    fn observe_frame_size(&mut self, _width: u32, _height: u32) {}
}
