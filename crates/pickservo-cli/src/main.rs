//! `pickservo` – command line front end for the visual-servo pick controller.
//!
//! Subcommands:
//!
//! - `run` – execute a pick task. `--sim` runs against the in-process
//!   simulated robot and camera.
//! - `probe` – read battery voltage, sonar distance and gripper opening.
//! - `stop` – stop every motor.
//! - `config` – show (and optionally write) the effective robot config.
//!
//! Ctrl-C during `run` finishes the in-flight action, stops the base and
//! closes the camera before exiting.

mod config;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::{info, warn};

use pickservo_hal::sim::SimWorld;
use pickservo_hal::{JsonRpcClient, RobotClient, ThreadSleeper};
use pickservo_kernel::Skills;
use pickservo_perception::ColorBlobDetector;
use pickservo_runtime::{
    Executor, JsonlSessionLogger, RunOutcome, RunReport, Thresholds, VisualServoFsm,
};
use pickservo_types::{ActionData, ActionResult, PickError};

use config::RobotConfig;

const DEFAULT_THRESHOLDS: &str = "config/thresholds.toml";

#[derive(Parser)]
#[command(author, version, about = "Visual-servo pick controller for a mobile manipulator")]
struct Cli {
    /// Robot config file [default: ~/.pickservo/config.toml]
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a pick task.
    Run {
        /// Task description, used for logs.
        #[arg(long, default_value = "pick up red block")]
        task: String,

        /// Use the simulated robot and camera.
        #[arg(long)]
        sim: bool,

        #[arg(long, default_value_t = 500)]
        max_iterations: u64,

        /// Thresholds file [default: config/thresholds.toml, built-in values if absent]
        #[arg(long)]
        thresholds: Option<PathBuf>,

        /// Initial target bearing in degrees for `--sim`.
        #[arg(long, default_value_t = 8.0, allow_negative_numbers = true)]
        sim_bearing: f64,

        /// Initial target distance in millimetres for `--sim`.
        #[arg(long, default_value_t = 400.0)]
        sim_distance: f64,
    },
    /// Read battery voltage, sonar distance and gripper opening.
    Probe,
    /// Stop all motors.
    Stop,
    /// Print the effective robot config.
    Config {
        /// Write it to the config file.
        #[arg(long)]
        write: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let guard = pickservo_runtime::init_tracing("pickservo");
    if guard.exporting() {
        info!("exporting spans over OTLP");
    }

    match dispatch(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            if is_config_error(&e) {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

fn dispatch(cli: Cli) -> Result<ExitCode> {
    let config_path = cli.config.clone().unwrap_or_else(config::config_path);
    let cfg = config::load_or_default(&config_path).map_err(PickError::Config)?;

    match cli.command {
        Command::Run {
            task,
            sim,
            max_iterations,
            thresholds,
            sim_bearing,
            sim_distance,
        } => {
            let thresholds = load_thresholds(thresholds.as_deref())?;
            if !sim {
                return Err(PickError::Config(format!(
                    "no camera driver for http://{}:{}; use --sim",
                    cfg.robot_ip, cfg.camera_port
                ))
                .into());
            }
            let report = run_sim(&cfg, thresholds, &task, max_iterations, sim_bearing, sim_distance);
            print_report(&report);
            Ok(exit_code(&report.outcome))
        }
        Command::Probe => {
            let skills = robot_skills(&cfg)?;
            print_result("battery", &skills.battery_voltage());
            print_result("sonar", &skills.read_range());
            print_result("gripper", &skills.read_gripper());
            Ok(ExitCode::SUCCESS)
        }
        Command::Stop => {
            let skills = robot_skills(&cfg)?;
            let all = skills.emergency_stop();
            let base = skills.base_stop();
            print_result("stop all motors", &all);
            print_result("reset base", &base);
            if all.success && base.success {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::FAILURE)
            }
        }
        Command::Config { write } => {
            let raw = toml::to_string_pretty(&cfg).context("serialising config")?;
            println!("# {}", config_path.display());
            print!("{raw}");
            if write {
                config::save_to(&cfg, &config_path).map_err(PickError::Config)?;
                println!("{} saved to {}", "✓".green().bold(), config_path.display());
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// An explicit path must exist; the default path falls back to built-in
/// values.
fn load_thresholds(path: Option<&Path>) -> Result<Thresholds, PickError> {
    match path {
        Some(path) => Thresholds::load(path),
        None => {
            let default = Path::new(DEFAULT_THRESHOLDS);
            if default.exists() {
                Thresholds::load(default)
            } else {
                warn!(path = DEFAULT_THRESHOLDS, "thresholds file not found; using built-in values");
                Ok(Thresholds::default())
            }
        }
    }
}

fn robot_skills(cfg: &RobotConfig) -> Result<Skills> {
    let client = JsonRpcClient::new(&cfg.robot_ip, cfg.rpc_port, cfg.rpc_timeout())
        .with_context(|| format!("connecting to {}:{}", cfg.robot_ip, cfg.rpc_port))?;
    info!(url = client.url(), "actuator service");
    Ok(Skills::new(
        RobotClient::new(Box::new(client)),
        Box::new(ThreadSleeper),
    ))
}

fn run_sim(
    cfg: &RobotConfig,
    thresholds: Thresholds,
    task: &str,
    max_iterations: u64,
    bearing_deg: f64,
    distance_mm: f64,
) -> RunReport {
    let world = SimWorld::new().with_target(bearing_deg, distance_mm);
    let skills = Skills::new(
        RobotClient::new(Box::new(world.robot())),
        Box::new(world.sleeper()),
    );

    let interrupt = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&interrupt);
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping after the current action …".yellow().bold());
        flag.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "failed to install Ctrl-C handler");
    }

    let mut executor = Executor::new(
        Box::new(world.camera()),
        Box::new(ColorBlobDetector::red()),
        Box::new(VisualServoFsm::new(thresholds.clone())),
        skills,
        thresholds,
    )
    .with_sleeper(Box::new(world.sleeper()))
    .with_sink(Box::new(JsonlSessionLogger::new(&cfg.log_dir, cfg.save_frames)))
    .with_interrupt(interrupt);

    println!("{} {}", "Task:".bold(), task);
    executor.run(task, max_iterations)
}

fn exit_code(outcome: &RunOutcome) -> ExitCode {
    match outcome {
        RunOutcome::Completed => ExitCode::SUCCESS,
        RunOutcome::Interrupted => ExitCode::from(130),
        _ => ExitCode::FAILURE,
    }
}

fn is_config_error(e: &anyhow::Error) -> bool {
    matches!(e.downcast_ref::<PickError>(), Some(PickError::Config(_)))
}

// ─────────────────────────────────────────────────────────────────────────────
// Output
// ─────────────────────────────────────────────────────────────────────────────

fn print_report(report: &RunReport) {
    let outcome = match &report.outcome {
        RunOutcome::Completed => "completed".green().bold(),
        RunOutcome::Failed => "failed".red().bold(),
        RunOutcome::IterationLimit => "iteration limit reached".yellow().bold(),
        RunOutcome::Interrupted => "interrupted".yellow().bold(),
        RunOutcome::Aborted(msg) => format!("aborted: {msg}").red().bold(),
    };
    println!();
    println!("  {} {}", "Outcome:".bold(), outcome);
    println!("  {} {}", "Iterations:".bold(), report.iterations);
    println!("  {} {}", "Final phase:".bold(), report.final_phase);
}

fn print_result(label: &str, result: &ActionResult) {
    if !result.success {
        println!(
            "  {:<16} {} {}",
            label,
            "✗".red().bold(),
            result.error.as_deref().unwrap_or("unknown error")
        );
        return;
    }
    let detail = match &result.data {
        ActionData::Battery { millivolts } => format!("{:.2} V", f64::from(*millivolts) / 1000.0),
        ActionData::Range { distance_cm } => format!("{distance_cm:.1} cm"),
        ActionData::Gripper {
            position: Some(position),
            ..
        } => format!("{position}% open"),
        _ => "ok".to_string(),
    };
    println!("  {:<16} {} {}", label, "✓".green().bold(), detail);
}
