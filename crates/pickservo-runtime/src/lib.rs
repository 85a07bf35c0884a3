//! `pickservo-runtime` – policy and control loop.
//!
//! Turns detections into bounded actions and sequences them against the
//! robot until the pick succeeds, the iteration budget runs out or the
//! operator interrupts.
//!
//! # Modules
//!
//! - [`thresholds`] – [`Thresholds`][thresholds::Thresholds]: tuning
//!   constants loaded once from TOML and shared read-only.
//! - [`policy`] – the [`Policy`][policy::Policy] trait the executor drives.
//! - [`fsm`] – [`VisualServoFsm`][fsm::VisualServoFsm]: the deterministic
//!   SEARCH → … → VERIFY visual-servo state machine.
//! - [`loop_guard`] – [`LoopGuard`][loop_guard::LoopGuard]: detects the same
//!   action being chosen over and over.
//! - [`referee`] – [`Referee`][referee::Referee]: advisory hints about yaw
//!   oscillation and arm clamping, never touching policy state.
//! - [`sink`] – [`IterationSink`][sink::IterationSink] and the JSONL
//!   [`JsonlSessionLogger`][sink::JsonlSessionLogger].
//! - [`executor`] – [`Executor`][executor::Executor]: observe → plan → act
//!   → log with stuck detection and guaranteed shutdown.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: global
//!   `tracing` subscriber with optional OTLP export.

pub mod executor;
pub mod fsm;
pub mod loop_guard;
pub mod policy;
pub mod referee;
pub mod sink;
pub mod telemetry;
pub mod thresholds;

pub use executor::{Executor, RunOutcome, RunReport};
pub use fsm::VisualServoFsm;
pub use loop_guard::LoopGuard;
pub use policy::{PlanContext, Policy};
pub use referee::Referee;
pub use sink::{IterationRecord, IterationSink, JsonlSessionLogger, NullSink};
pub use telemetry::{TracerProviderGuard, init_tracing};
pub use thresholds::Thresholds;
