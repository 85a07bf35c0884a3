//! [`Executor`] – the observe → plan → act → log control loop.
//!
//! Each iteration:
//!
//! 1. **Observe** – capture a frame and run the detector. A failed capture
//!    becomes a [`Detection`] with nothing in view and an error annotation;
//!    the loop keeps going.
//! 2. **Check** – stop when the policy has reached DONE or FAILED.
//! 3. **Plan** – ask the [`Policy`] for exactly one [`ActionPlan`].
//! 4. **Act** – run the plan's action through [`Skills`], unless the
//!    [`LoopGuard`] reports that the same action has been chosen too many
//!    times in a row. A stuck action is not executed; the policy is forced
//!    into RECOVER and the iteration is recorded as failed.
//! 5. **Log** – hand an [`IterationRecord`] to the [`IterationSink`].
//! 6. **Settle** – wait `general.observation_delay_s`.
//!
//! # Shutdown
//!
//! Whatever ends the run (completion, the iteration cap, an interrupt or a
//! panic inside an iteration) the executor stops the base, then closes the
//! camera, then finalises the sink, in that order.
//!
//! # Example
//!
//! ```
//! use pickservo_hal::RobotClient;
//! use pickservo_hal::sim::SimWorld;
//! use pickservo_kernel::Skills;
//! use pickservo_perception::ColorBlobDetector;
//! use pickservo_runtime::{Executor, RunOutcome, Thresholds, VisualServoFsm};
//!
//! let world = SimWorld::new().with_target(8.0, 400.0);
//! let thresholds = Thresholds::default();
//! let skills = Skills::new(RobotClient::new(Box::new(world.robot())), Box::new(world.sleeper()));
//! let mut executor = Executor::new(
//!     Box::new(world.camera()),
//!     Box::new(ColorBlobDetector::red()),
//!     Box::new(VisualServoFsm::new(thresholds.clone())),
//!     skills,
//!     thresholds,
//! )
//! .with_sleeper(Box::new(world.sleeper()));
//!
//! let report = executor.run("pick up the red block", 200);
//! assert_eq!(report.outcome, RunOutcome::Completed);
//! assert!(world.holding());
//! ```

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use pickservo_hal::{Camera, CameraFrame, Sleeper, ThreadSleeper};
use pickservo_kernel::Skills;
use pickservo_perception::Detector;
use pickservo_types::{ActionPlan, ActionResult, Detection, Phase, StateSummary};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::loop_guard::LoopGuard;
use crate::policy::{PlanContext, Policy};
use crate::referee::Referee;
use crate::sink::{IterationRecord, IterationSink, NullSink};
use crate::thresholds::Thresholds;

// ─────────────────────────────────────────────────────────────────────────────
// Run outcome
// ─────────────────────────────────────────────────────────────────────────────

/// Why a run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// The policy reached DONE.
    Completed,
    /// The policy reached FAILED.
    Failed,
    IterationLimit,
    Interrupted,
    /// An iteration panicked; carries the panic message.
    Aborted(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub iterations: u64,
    pub final_phase: Phase,
}

// ─────────────────────────────────────────────────────────────────────────────
// Executor
// ─────────────────────────────────────────────────────────────────────────────

pub struct Executor {
    camera: Box<dyn Camera>,
    detector: Box<dyn Detector>,
    policy: Box<dyn Policy>,
    skills: Skills,
    thresholds: Thresholds,
    sink: Box<dyn IterationSink>,
    sleeper: Box<dyn Sleeper>,
    interrupt: Arc<AtomicBool>,
    guard: LoopGuard,
    referee: Referee,
    iteration: u64,
}

impl Executor {
    pub fn new(
        camera: Box<dyn Camera>,
        detector: Box<dyn Detector>,
        policy: Box<dyn Policy>,
        skills: Skills,
        thresholds: Thresholds,
    ) -> Self {
        let guard = LoopGuard::new(thresholds.general.stuck_threshold);
        Self {
            camera,
            detector,
            policy,
            skills,
            thresholds,
            sink: Box::new(NullSink),
            sleeper: Box::new(ThreadSleeper),
            interrupt: Arc::new(AtomicBool::new(false)),
            guard,
            referee: Referee::new(),
            iteration: 0,
        }
    }

    pub fn with_sink(mut self, sink: Box<dyn IterationSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Sleeper for the observation delay between iterations.
    pub fn with_sleeper(mut self, sleeper: Box<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Use an externally owned interrupt flag, e.g. one set by a signal
    /// handler installed before the executor exists.
    pub fn with_interrupt(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupt = flag;
        self
    }

    /// Setting the returned flag ends the run before the next iteration.
    pub fn interrupt_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupt)
    }

    /// Run the loop for at most `max_iterations` iterations.
    ///
    /// Never panics on behalf of an iteration: a panic inside the loop is
    /// reported as [`RunOutcome::Aborted`] after the shutdown sequence.
    pub fn run(&mut self, task: &str, max_iterations: u64) -> RunReport {
        info!(task, max_iterations, camera = self.camera.id(), "starting run");
        if let Err(e) = self.sink.start(task) {
            warn!(error = %e, "iteration sink failed to start");
        }
        self.policy.reset();
        self.guard.reset();
        self.referee.reset();
        self.iteration = 0;

        let outcome = match panic::catch_unwind(AssertUnwindSafe(|| {
            self.control_loop(task, max_iterations)
        })) {
            Ok(outcome) => outcome,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(iteration = self.iteration, %message, "run aborted");
                RunOutcome::Aborted(message)
            }
        };

        self.shutdown(outcome)
    }

    fn control_loop(&mut self, task: &str, max_iterations: u64) -> RunOutcome {
        let mut last_plan: Option<ActionPlan> = None;
        let mut last_result: Option<ActionResult> = None;

        while self.iteration < max_iterations {
            if self.interrupt.load(Ordering::SeqCst) {
                info!(iteration = self.iteration, "run interrupted");
                return RunOutcome::Interrupted;
            }
            self.iteration += 1;
            let iteration = self.iteration;

            let (frame, detection) = self.observe();
            let phase = self.policy.phase();
            debug!(
                iteration,
                found = detection.found,
                area_ratio = detection.area_ratio,
                phase = %phase,
                "observed"
            );
            if let Some(outcome) = terminal_outcome(phase) {
                info!(iteration, phase = %phase, "policy finished");
                return outcome;
            }

            let state = StateSummary {
                task: task.to_string(),
                phase,
                iteration,
                detection: detection.clone(),
                last_action: last_plan.as_ref().map(|p| p.action.name().to_string()),
                last_action_success: last_result.as_ref().map(|r| r.success),
                hints: self.referee.hints(),
            };
            let plan = self.policy.plan(&PlanContext {
                frame: frame.as_ref(),
                detection: &detection,
                state: &state,
                last_result: last_result.as_ref(),
            });
            info!(
                iteration,
                phase = %plan.phase,
                action = plan.action.name(),
                why = %plan.why,
                "plan"
            );

            let result = self.act(&plan);
            if !result.success {
                warn!(
                    iteration,
                    action = plan.action.name(),
                    error = result.error.as_deref().unwrap_or("unknown"),
                    "action failed"
                );
            }

            self.referee.observe(&plan, &result);
            let hints = self.referee.hints();
            for hint in &hints {
                debug!(iteration, %hint, "referee");
            }

            let record = IterationRecord {
                iteration,
                timestamp: Utc::now(),
                state: StateSummary {
                    phase: self.policy.phase(),
                    last_action: Some(plan.action.name().to_string()),
                    last_action_success: Some(result.success),
                    hints,
                    ..state
                },
                detection,
                plan,
                result,
            };
            if let Err(e) = self.sink.log_iteration(frame.as_ref(), &record) {
                warn!(iteration, error = %e, "iteration sink failed");
            }
            last_plan = Some(record.plan);
            last_result = Some(record.result);

            self.sleeper.sleep(self.thresholds.observation_delay());
        }

        match terminal_outcome(self.policy.phase()) {
            Some(outcome) => outcome,
            None => {
                info!(max_iterations, "reached maximum iterations");
                RunOutcome::IterationLimit
            }
        }
    }

    fn observe(&mut self) -> (Option<CameraFrame>, Detection) {
        match self.camera.capture() {
            Ok(frame) => {
                self.policy.observe_frame_size(frame.width, frame.height);
                let detection = self.detector.detect(&frame);
                (Some(frame), detection)
            }
            Err(e) => {
                warn!(error = %e, "observation failed");
                let detection = Detection::lost_with_error(format!("Failed to capture frame: {e}"));
                (None, detection)
            }
        }
    }

    fn act(&mut self, plan: &ActionPlan) -> ActionResult {
        let name = plan.action.name();
        if self.guard.record(name) {
            let threshold = self.thresholds.general.stuck_threshold;
            warn!(action = name, threshold, "stuck: forcing recovery");
            self.policy.force_recover();
            return ActionResult::rejected(format!(
                "stuck: {name} repeated {threshold} times"
            ));
        }
        self.skills.dispatch(&plan.action)
    }

    fn shutdown(&mut self, outcome: RunOutcome) -> RunReport {
        let stop = self.skills.base_stop();
        if !stop.success {
            error!(
                error = stop.error.as_deref().unwrap_or("unknown"),
                "base stop failed during shutdown"
            );
        }
        self.camera.close();

        let report = RunReport {
            outcome,
            iterations: self.iteration,
            final_phase: self.policy.phase(),
        };
        if let Err(e) = self.sink.finish(&report) {
            warn!(error = %e, "iteration sink failed to finish");
        }
        info!(
            outcome = ?report.outcome,
            iterations = report.iterations,
            final_phase = %report.final_phase,
            "run finished"
        );
        report
    }
}

fn terminal_outcome(phase: Phase) -> Option<RunOutcome> {
    if !phase.is_terminal() {
        return None;
    }
    Some(if phase == Phase::Done {
        RunOutcome::Completed
    } else {
        RunOutcome::Failed
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
