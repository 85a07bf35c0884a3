//! Per-iteration run records.
//!
//! The executor hands every loop pass to an [`IterationSink`]. Sinks are
//! for replay and offline analysis; diagnostics go through `tracing`.
//! A failing sink never stops the robot: the executor logs the error and
//! carries on.
//!
//! [`JsonlSessionLogger`] writes one directory per run:
//!
//! ```text
//! <root>/<YYYYmmdd_HHMMSS>_<task>/
//! ├── iterations.jsonl      one IterationRecord per line
//! ├── frames/iter_00001.ppm optional, binary PPM of the observed frame
//! └── summary.json          written when the run ends
//! ```

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, Utc};
use pickservo_hal::CameraFrame;
use pickservo_types::{ActionPlan, ActionResult, Detection, Phase, PickError, StateSummary};
use serde::Serialize;
use tracing::info;

use crate::executor::{RunOutcome, RunReport};

/// Everything that happened in one loop pass.
#[derive(Debug, Clone, Serialize)]
pub struct IterationRecord {
    pub iteration: u64,
    pub timestamp: DateTime<Utc>,
    pub detection: Detection,
    /// State after the action was executed.
    pub state: StateSummary,
    pub plan: ActionPlan,
    pub result: ActionResult,
}

/// Receives run records from the executor.
pub trait IterationSink: Send {
    fn start(&mut self, task: &str) -> Result<(), PickError>;

    fn log_iteration(
        &mut self,
        frame: Option<&CameraFrame>,
        record: &IterationRecord,
    ) -> Result<(), PickError>;

    /// Called exactly once, after the robot has been stopped.
    fn finish(&mut self, report: &RunReport) -> Result<(), PickError>;
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl IterationSink for NullSink {
    fn start(&mut self, _task: &str) -> Result<(), PickError> {
        Ok(())
    }

    fn log_iteration(
        &mut self,
        _frame: Option<&CameraFrame>,
        _record: &IterationRecord,
    ) -> Result<(), PickError> {
        Ok(())
    }

    fn finish(&mut self, _report: &RunReport) -> Result<(), PickError> {
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// JSONL session logger
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct SessionSummary<'a> {
    task: &'a str,
    outcome: &'a RunOutcome,
    iterations: u64,
    final_phase: Phase,
    action_counts: &'a BTreeMap<String, u64>,
    failed_actions: u64,
    started_at: DateTime<Utc>,
    ended_at: DateTime<Utc>,
}

struct Session {
    dir: PathBuf,
    task: String,
    lines: BufWriter<File>,
    started_at: DateTime<Utc>,
    action_counts: BTreeMap<String, u64>,
    failed_actions: u64,
}

/// Writes each run to its own directory under `root`.
///
/// If the session directory cannot be created, `start` reports the error
/// once and the rest of the run is not persisted.
pub struct JsonlSessionLogger {
    root: PathBuf,
    save_frames: bool,
    session: Option<Session>,
    unavailable: bool,
}

impl JsonlSessionLogger {
    pub fn new(root: impl Into<PathBuf>, save_frames: bool) -> Self {
        Self {
            root: root.into(),
            save_frames,
            session: None,
            unavailable: false,
        }
    }

    /// Directory of the current (or last) session.
    pub fn session_dir(&self) -> Option<&Path> {
        self.session.as_ref().map(|s| s.dir.as_path())
    }

    /// The open session, opening an `unknown` one if `start` was never
    /// called. `None` once opening has failed.
    fn session(&mut self) -> Result<Option<&mut Session>, PickError> {
        if self.unavailable {
            return Ok(None);
        }
        if self.session.is_none() {
            self.start("unknown")?;
        }
        Ok(self.session.as_mut())
    }

    fn open(&self, task: &str) -> Result<Session, PickError> {
        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        let dir = self.root.join(format!("{stamp}_{}", slug(task)));
        fs::create_dir_all(&dir).map_err(|e| io_error(&dir, e))?;
        if self.save_frames {
            let frames = dir.join("frames");
            fs::create_dir_all(&frames).map_err(|e| io_error(&frames, e))?;
        }
        let path = dir.join("iterations.jsonl");
        let file = File::create(&path).map_err(|e| io_error(&path, e))?;

        info!(dir = %dir.display(), "logging session started");
        Ok(Session {
            dir,
            task: task.to_string(),
            lines: BufWriter::new(file),
            started_at: Utc::now(),
            action_counts: BTreeMap::new(),
            failed_actions: 0,
        })
    }
}

impl IterationSink for JsonlSessionLogger {
    fn start(&mut self, task: &str) -> Result<(), PickError> {
        match self.open(task) {
            Ok(session) => {
                self.session = Some(session);
                self.unavailable = false;
                Ok(())
            }
            Err(e) => {
                self.session = None;
                self.unavailable = true;
                Err(e)
            }
        }
    }

    fn log_iteration(
        &mut self,
        frame: Option<&CameraFrame>,
        record: &IterationRecord,
    ) -> Result<(), PickError> {
        let save_frames = self.save_frames;
        let Some(session) = self.session()? else {
            return Ok(());
        };

        *session
            .action_counts
            .entry(record.plan.action.name().to_string())
            .or_default() += 1;
        if !record.result.success {
            session.failed_actions += 1;
        }

        serde_json::to_writer(&mut session.lines, record)
            .map_err(|e| PickError::Serialization(e.to_string()))?;
        session
            .lines
            .write_all(b"\n")
            .map_err(|e| PickError::Io(e.to_string()))?;

        if let Some(frame) = frame.filter(|f| save_frames && f.is_rgb24()) {
            let path = session
                .dir
                .join("frames")
                .join(format!("iter_{:05}.ppm", record.iteration));
            write_ppm(&path, frame)?;
        }
        Ok(())
    }

    fn finish(&mut self, report: &RunReport) -> Result<(), PickError> {
        let Some(session) = self.session()? else {
            return Ok(());
        };
        session
            .lines
            .flush()
            .map_err(|e| PickError::Io(e.to_string()))?;

        let summary = SessionSummary {
            task: &session.task,
            outcome: &report.outcome,
            iterations: report.iterations,
            final_phase: report.final_phase,
            action_counts: &session.action_counts,
            failed_actions: session.failed_actions,
            started_at: session.started_at,
            ended_at: Utc::now(),
        };
        let path = session.dir.join("summary.json");
        let text = serde_json::to_string_pretty(&summary)
            .map_err(|e| PickError::Serialization(e.to_string()))?;
        fs::write(&path, text).map_err(|e| io_error(&path, e))?;
        info!(path = %path.display(), "session summary saved");
        Ok(())
    }
}

/// File-system safe form of a task description.
fn slug(task: &str) -> String {
    let slug: String = task
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    if slug.is_empty() { "task".to_string() } else { slug }
}

fn write_ppm(path: &Path, frame: &CameraFrame) -> Result<(), PickError> {
    let file = File::create(path).map_err(|e| io_error(path, e))?;
    let mut out = BufWriter::new(file);
    write!(out, "P6\n{} {}\n255\n", frame.width, frame.height)
        .and_then(|_| out.write_all(&frame.data))
        .and_then(|_| out.flush())
        .map_err(|e| io_error(path, e))
}

fn io_error(path: &Path, e: std::io::Error) -> PickError {
    PickError::Io(format!("{}: {e}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pickservo_types::{Action, ActionData};
    use std::time::Duration;

    fn record(iteration: u64, action: Action, success: bool) -> IterationRecord {
        let detection = Detection::lost();
        let result = if success {
            ActionResult::ok(ActionData::None, Duration::from_millis(5))
        } else {
            ActionResult::rejected("nope")
        };
        IterationRecord {
            iteration,
            timestamp: Utc::now(),
            detection: detection.clone(),
            state: StateSummary {
                task: "pick red".to_string(),
                phase: Phase::Search,
                iteration,
                detection,
                last_action: Some(action.name().to_string()),
                last_action_success: Some(success),
                hints: Vec::new(),
            },
            plan: ActionPlan::new(action, Phase::Search, "test"),
            result,
        }
    }

    #[test]
    fn slug_replaces_separators() {
        assert_eq!(slug("pick up red block"), "pick_up_red_block");
        assert_eq!(slug("a/b"), "a_b");
        assert_eq!(slug("   "), "task");
    }

    #[test]
    fn writes_lines_frames_and_summary() {
        let root = tempfile::tempdir().unwrap();
        let mut logger = JsonlSessionLogger::new(root.path(), true);
        logger.start("pick red").unwrap();
        let dir = logger.session_dir().unwrap().to_path_buf();
        assert!(dir.file_name().unwrap().to_string_lossy().ends_with("_pick_red"));

        let frame = CameraFrame::rgb(2, 1, vec![1, 2, 3, 4, 5, 6]);
        logger
            .log_iteration(Some(&frame), &record(1, Action::BaseStop, true))
            .unwrap();
        logger
            .log_iteration(None, &record(2, Action::GripperOpen, false))
            .unwrap();
        logger
            .log_iteration(None, &record(3, Action::BaseStop, true))
            .unwrap();
        logger
            .finish(&RunReport {
                outcome: RunOutcome::Completed,
                iterations: 3,
                final_phase: Phase::Done,
            })
            .unwrap();

        let lines = fs::read_to_string(dir.join("iterations.jsonl")).unwrap();
        let parsed: Vec<serde_json::Value> = lines
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed[0]["plan"]["action"], "base_stop");
        assert_eq!(parsed[1]["result"]["success"], false);

        let ppm = fs::read(dir.join("frames/iter_00001.ppm")).unwrap();
        assert!(ppm.starts_with(b"P6\n2 1\n255\n"));
        assert!(ppm.ends_with(&[1, 2, 3, 4, 5, 6]));
        assert!(!dir.join("frames/iter_00002.ppm").exists());

        let summary: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(dir.join("summary.json")).unwrap()).unwrap();
        assert_eq!(summary["task"], "pick red");
        assert_eq!(summary["outcome"], "completed");
        assert_eq!(summary["final_phase"], "DONE");
        assert_eq!(summary["action_counts"]["base_stop"], 2);
        assert_eq!(summary["action_counts"]["gripper_open"], 1);
        assert_eq!(summary["failed_actions"], 1);
    }

    #[test]
    fn frames_are_skipped_unless_enabled() {
        let root = tempfile::tempdir().unwrap();
        let mut logger = JsonlSessionLogger::new(root.path(), false);
        logger.start("t").unwrap();
        let frame = CameraFrame::rgb(1, 1, vec![0, 0, 0]);
        logger
            .log_iteration(Some(&frame), &record(1, Action::BaseStop, true))
            .unwrap();
        assert!(!logger.session_dir().unwrap().join("frames").exists());
    }

    #[test]
    fn logging_before_start_opens_a_session() {
        let root = tempfile::tempdir().unwrap();
        let mut logger = JsonlSessionLogger::new(root.path(), false);
        logger
            .log_iteration(None, &record(1, Action::BaseStop, true))
            .unwrap();
        let dir = logger.session_dir().unwrap();
        assert!(dir.to_string_lossy().ends_with("_unknown"));
        assert!(dir.join("iterations.jsonl").exists());
    }

    #[test]
    fn failed_start_is_reported_once_and_not_retried() {
        // A regular file where the log root should be.
        let blocker = tempfile::NamedTempFile::new().unwrap();
        let mut logger = JsonlSessionLogger::new(blocker.path(), true);

        assert!(matches!(logger.start("pick red"), Err(PickError::Io(_))));
        for i in 1..=3 {
            logger
                .log_iteration(None, &record(i, Action::BaseStop, true))
                .unwrap();
        }
        logger
            .finish(&RunReport {
                outcome: RunOutcome::Completed,
                iterations: 3,
                final_phase: Phase::Done,
            })
            .unwrap();
        assert!(logger.session_dir().is_none());
    }
}
