//! End-to-end runs of the executor against the simulated robot.

use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use pickservo_hal::sim::SimWorld;
use pickservo_hal::{CameraFrame, RobotClient};
use pickservo_kernel::Skills;
use pickservo_perception::{ColorBlobDetector, Detector, ScriptedDetector};
use pickservo_runtime::{
    Executor, IterationRecord, IterationSink, JsonlSessionLogger, RunOutcome, RunReport,
    Thresholds, VisualServoFsm,
};
use pickservo_types::{Action, Detection, Phase, PickError};

fn skills(world: &SimWorld) -> Skills {
    Skills::new(
        RobotClient::new(Box::new(world.robot())),
        Box::new(world.sleeper()),
    )
}

fn sim_executor(world: &SimWorld, detector: Box<dyn Detector>, thresholds: Thresholds) -> Executor {
    Executor::new(
        Box::new(world.camera()),
        detector,
        Box::new(VisualServoFsm::new(thresholds.clone())),
        skills(world),
        thresholds,
    )
    .with_sleeper(Box::new(world.sleeper()))
}

/// Collects records in memory so tests can inspect them after the run.
#[derive(Clone, Default)]
struct MemorySink {
    records: Arc<Mutex<Vec<IterationRecord>>>,
    started: Arc<Mutex<Option<String>>>,
    finished: Arc<Mutex<Option<RunReport>>>,
}

impl IterationSink for MemorySink {
    fn start(&mut self, task: &str) -> Result<(), PickError> {
        *self.started.lock().unwrap() = Some(task.to_string());
        Ok(())
    }

    fn log_iteration(
        &mut self,
        _frame: Option<&CameraFrame>,
        record: &IterationRecord,
    ) -> Result<(), PickError> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }

    fn finish(&mut self, report: &RunReport) -> Result<(), PickError> {
        *self.finished.lock().unwrap() = Some(report.clone());
        Ok(())
    }
}

#[test]
fn picks_target_off_centre() {
    let world = SimWorld::new().with_target(8.0, 400.0);
    let sink = MemorySink::default();
    let mut executor = sim_executor(&world, Box::new(ColorBlobDetector::red()), Thresholds::default())
        .with_sink(Box::new(sink.clone()));

    let report = executor.run("pick up red block", 100);

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.final_phase, Phase::Done);
    assert!(world.holding());
    assert!(world.camera_closed());
    assert!(!world.base_moving());

    let records = sink.records.lock().unwrap();
    let phases: Vec<Phase> = records.iter().map(|r| r.plan.phase).collect();
    for expected in [
        Phase::AlignBase,
        Phase::Approach,
        Phase::Pregrasp,
        Phase::Grasp,
        Phase::Verify,
    ] {
        assert!(phases.contains(&expected), "missing {expected} in {phases:?}");
    }
    let grasp: Vec<&str> = records
        .iter()
        .filter(|r| r.plan.phase == Phase::Grasp)
        .map(|r| r.plan.action.name())
        .collect();
    assert_eq!(
        grasp,
        ["gripper_open", "arm_move_xyz", "gripper_close", "arm_move_xyz"]
    );
    assert!(records.iter().all(|r| r.result.success));

    assert_eq!(
        sink.started.lock().unwrap().as_deref(),
        Some("pick up red block")
    );
    assert_eq!(sink.finished.lock().unwrap().as_ref(), Some(&report));
}

#[test]
fn target_outside_the_view_is_found_by_searching() {
    let world = SimWorld::new().with_target(60.0, 400.0);
    let sink = MemorySink::default();
    let mut executor = sim_executor(&world, Box::new(ColorBlobDetector::red()), Thresholds::default())
        .with_sink(Box::new(sink.clone()));

    let report = executor.run("pick up red block", 300);

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert!(world.holding());
    assert_eq!(
        world.call_names().last().map(String::as_str),
        Some("ResetMecanumMotors")
    );

    let records = sink.records.lock().unwrap();
    let first = |phase: Phase| records.iter().position(|r| r.plan.phase == phase);
    let search = first(Phase::Search).expect("searched");
    let align = first(Phase::AlignBase).expect("aligned");
    assert_eq!(search, 0);
    assert!(search < align);
    assert!(!records[0].detection.found);
    assert!(records[align].detection.found);
}

#[test]
fn empty_scene_widens_the_search_before_recovering() {
    let world = SimWorld::new();
    let thresholds = Thresholds::default();
    let rotations = thresholds.base.max_search_rotations as usize;
    let sink = MemorySink::default();
    let mut executor = sim_executor(&world, Box::new(ScriptedDetector::new([])), thresholds)
        .with_sink(Box::new(sink.clone()));

    executor.run("t", 40);

    let records = sink.records.lock().unwrap();
    let forward = records
        .iter()
        .position(|r| {
            r.plan.phase == Phase::Search
                && matches!(r.plan.action, Action::BaseStep(cmd) if cmd.velocity > 0.0)
        })
        .expect("a forward search step");
    assert_eq!(forward, rotations);
    assert!(records[forward].result.success);

    let stuck = records
        .iter()
        .position(|r| !r.result.success)
        .expect("the guard eventually fires");
    assert!(stuck > forward);
}

#[test]
fn dropped_frames_degrade_to_search() {
    let world = SimWorld::new();
    world.fail_next_frames(3);
    let sink = MemorySink::default();
    let mut executor = sim_executor(&world, Box::new(ColorBlobDetector::red()), Thresholds::default())
        .with_sink(Box::new(sink.clone()));

    executor.run("t", 4);

    let records = sink.records.lock().unwrap();
    assert_eq!(records.len(), 4);
    for r in &records[..3] {
        assert!(!r.detection.found);
        assert!(r.detection.error.as_deref().unwrap().contains("Failed to capture frame"));
        assert_eq!(r.plan.phase, Phase::Search);
    }
    // Three search turns later the target is still in view.
    assert!(records[3].detection.found);
}

#[test]
fn repeated_search_is_broken_by_recovery() {
    let world = SimWorld::new();
    let mut thresholds = Thresholds::default();
    thresholds.general.stuck_threshold = 3;
    let sink = MemorySink::default();
    let mut executor = sim_executor(&world, Box::new(ScriptedDetector::new([])), thresholds)
        .with_sink(Box::new(sink.clone()));

    executor.run("t", 6);

    let records = sink.records.lock().unwrap();
    let stuck = &records[3];
    assert_eq!(stuck.plan.action.name(), "base_step");
    assert!(!stuck.result.success);
    assert!(stuck.result.error.as_deref().unwrap().starts_with("stuck"));
    assert_eq!(stuck.state.phase, Phase::Recover);

    assert_eq!(records[4].plan.phase, Phase::Recover);
    assert_eq!(records[4].plan.action.name(), "arm_to_safe_pose");
    assert_eq!(records[5].plan.phase, Phase::Search);
}

#[test]
fn failing_actuator_does_not_stop_the_loop() {
    let world = SimWorld::new();
    world.fail_method("SetMecanumVelocity");
    let sink = MemorySink::default();
    let mut executor = sim_executor(&world, Box::new(ScriptedDetector::new([])), Thresholds::default())
        .with_sink(Box::new(sink.clone()));

    let report = executor.run("t", 3);

    assert_eq!(report.outcome, RunOutcome::IterationLimit);
    let records = sink.records.lock().unwrap();
    assert_eq!(records.len(), 3);
    assert!(records.iter().all(|r| !r.result.success));
    // Every failed velocity command was still followed by a stop.
    let names = world.call_names();
    let velocity = names.iter().filter(|n| *n == "SetMecanumVelocity").count();
    let stops = names.iter().filter(|n| *n == "ResetMecanumMotors").count();
    assert_eq!(velocity, 3);
    assert_eq!(stops, 4);
}

/// A sink whose every call fails.
struct BrokenSink;

impl IterationSink for BrokenSink {
    fn start(&mut self, _task: &str) -> Result<(), PickError> {
        Err(PickError::Io("disk full".to_string()))
    }

    fn log_iteration(
        &mut self,
        _frame: Option<&CameraFrame>,
        _record: &IterationRecord,
    ) -> Result<(), PickError> {
        Err(PickError::Io("disk full".to_string()))
    }

    fn finish(&mut self, _report: &RunReport) -> Result<(), PickError> {
        Err(PickError::Io("disk full".to_string()))
    }
}

#[test]
fn failing_sink_does_not_stop_the_run() {
    let world = SimWorld::new().with_target(8.0, 400.0);
    let mut executor = sim_executor(&world, Box::new(ColorBlobDetector::red()), Thresholds::default())
        .with_sink(Box::new(BrokenSink));

    let report = executor.run("pick up red block", 100);

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.final_phase, Phase::Done);
    assert!(world.holding());
    assert!(world.camera_closed());
    assert!(!world.base_moving());
    assert_eq!(
        world.call_names().last().map(String::as_str),
        Some("ResetMecanumMotors")
    );
}

/// Sets the interrupt flag the first time it is asked to detect.
struct InterruptingDetector {
    flag: Arc<AtomicBool>,
}

impl Detector for InterruptingDetector {
    fn detect(&mut self, _frame: &CameraFrame) -> Detection {
        self.flag.store(true, Ordering::SeqCst);
        Detection::lost()
    }
}

#[test]
fn interrupt_is_honoured_between_iterations() {
    let world = SimWorld::new();
    let flag = Arc::new(AtomicBool::new(false));
    let mut executor = sim_executor(
        &world,
        Box::new(InterruptingDetector {
            flag: Arc::clone(&flag),
        }),
        Thresholds::default(),
    )
    .with_interrupt(flag);

    // The in-flight action finishes and the loop stops before the second
    // iteration.
    let report = executor.run("t", 10);
    assert_eq!(report.outcome, RunOutcome::Interrupted);
    assert_eq!(report.iterations, 1);
    let names = world.call_names();
    assert_eq!(
        names,
        ["SetMecanumVelocity", "ResetMecanumMotors", "ResetMecanumMotors"]
    );
    assert!(world.camera_closed());
}

#[test]
fn session_logger_writes_a_replayable_run() {
    let root = tempfile::tempdir().unwrap();
    let world = SimWorld::new().with_target(8.0, 400.0);
    let mut executor = sim_executor(&world, Box::new(ColorBlobDetector::red()), Thresholds::default())
        .with_sink(Box::new(JsonlSessionLogger::new(root.path(), true)));

    let report = executor.run("pick up red block", 100);
    assert_eq!(report.outcome, RunOutcome::Completed);

    let session = fs::read_dir(root.path())
        .unwrap()
        .next()
        .unwrap()
        .unwrap()
        .path();
    let lines = fs::read_to_string(session.join("iterations.jsonl")).unwrap();
    // The final iteration only observes DONE and is not logged.
    assert_eq!(lines.lines().count() as u64, report.iterations - 1);

    let frames = fs::read_dir(session.join("frames")).unwrap().count() as u64;
    assert_eq!(frames, report.iterations - 1);

    let summary: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(session.join("summary.json")).unwrap()).unwrap();
    assert_eq!(summary["outcome"], "completed");
    assert_eq!(summary["final_phase"], "DONE");
    assert_eq!(summary["action_counts"]["gripper_close"], 1);
}
