//! [`LoopGuard`] – repeated-action stuck detector.
//!
//! Detects when the policy keeps choosing the same action iteration after
//! iteration without making progress, and signals that the executor should
//! force a recovery instead of executing it again.
//!
//! # Algorithm
//!
//! The guard remembers the previous action name and a repeat counter. Each
//! [`LoopGuard::record`] compares the new name with the previous one: equal
//! names increment the counter, a different name resets it to zero. When the
//! counter reaches `threshold`, `record` returns `true` and the guard clears
//! itself, so the next streak is counted from scratch.
//!
//! # Example
//!
//! ```rust
//! use pickservo_runtime::loop_guard::LoopGuard;
//!
//! let mut guard = LoopGuard::new(2);
//!
//! assert!(!guard.record("base_step"));
//! assert!(!guard.record("base_step")); // first repeat
//! assert!(guard.record("base_step")); // second repeat → stuck!
//!
//! // Firing clears the history.
//! assert!(!guard.record("base_step"));
//! ```

// ─────────────────────────────────────────────────────────────────────────────
// LoopGuard
// ─────────────────────────────────────────────────────────────────────────────

/// Counts consecutive repeats of one action name.
#[derive(Debug, Clone)]
pub struct LoopGuard {
    /// Number of consecutive repeats that triggers detection.
    threshold: u32,
    previous: Option<String>,
    repeats: u32,
}

impl LoopGuard {
    /// Create a new guard.
    ///
    /// With `threshold = n` the guard fires on the `n + 1`-th identical name
    /// in a row. A `threshold` of 0 is treated as 1.
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            previous: None,
            repeats: 0,
        }
    }

    /// Record that `action` was just chosen.
    ///
    /// Returns `true` when `action` has now been repeated `threshold` times
    /// consecutively.
    pub fn record(&mut self, action: &str) -> bool {
        if self.previous.as_deref() == Some(action) {
            self.repeats += 1;
        } else {
            self.previous = Some(action.to_string());
            self.repeats = 0;
        }

        if self.repeats >= self.threshold {
            self.reset();
            return true;
        }
        false
    }

    /// Consecutive repeats of the most recent action so far.
    pub fn repeats(&self) -> u32 {
        self.repeats
    }

    pub fn reset(&mut self) {
        self.previous = None;
        self.repeats = 0;
    }
}
