//! [`ActionTimer`] – per-skill time budget.
//!
//! Every skill starts a timer before touching the actuator service and
//! finishes it once the reply is in. The measured duration is reported in
//! the [`ActionResult`][pickservo_types::ActionResult]; a skill that ran past
//! its budget is logged but its result is still returned.

use std::time::{Duration, Instant};

use tracing::warn;

/// Wall-clock stopwatch for one skill invocation.
#[derive(Debug, Clone)]
pub struct ActionTimer {
    skill: &'static str,
    started: Instant,
    budget: Duration,
}

impl ActionTimer {
    pub const DEFAULT_BUDGET: Duration = Duration::from_secs(2);

    /// Start timing `skill` against [`Self::DEFAULT_BUDGET`].
    pub fn start(skill: &'static str) -> Self {
        Self::with_budget(skill, Self::DEFAULT_BUDGET)
    }

    pub fn with_budget(skill: &'static str, budget: Duration) -> Self {
        Self {
            skill,
            started: Instant::now(),
            budget,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// `true` once the elapsed time exceeds the budget.
    pub fn overran(&self) -> bool {
        self.elapsed() > self.budget
    }

    /// Stop the timer and return the elapsed time, warning on overrun.
    pub fn finish(self) -> Duration {
        let elapsed = self.elapsed();
        if self.overran() {
            warn!(
                skill = self.skill,
                elapsed_ms = elapsed.as_millis() as u64,
                budget_ms = self.budget.as_millis() as u64,
                "skill exceeded its time budget"
            );
        }
        elapsed
    }
}
