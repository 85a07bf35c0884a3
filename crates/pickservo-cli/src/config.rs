//! Robot connection settings – reads/writes `~/.pickservo/config.toml`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Persisted connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobotConfig {
    /// Address of the robot running the actuator service and camera stream.
    #[serde(default = "default_robot_ip")]
    pub robot_ip: String,

    /// JSON-RPC port of the actuator service.
    #[serde(default = "default_rpc_port")]
    pub rpc_port: u16,

    /// HTTP port of the camera stream.
    #[serde(default = "default_camera_port")]
    pub camera_port: u16,

    /// Per-call timeout for actuator RPCs, in seconds.
    #[serde(default = "default_rpc_timeout_s")]
    pub rpc_timeout_s: u64,

    /// Root directory for per-run session logs.
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    /// Also write every observed frame as a PPM image.
    #[serde(default)]
    pub save_frames: bool,
}

fn default_robot_ip() -> String {
    "192.168.86.60".to_string()
}
fn default_rpc_port() -> u16 {
    9030
}
fn default_camera_port() -> u16 {
    8080
}
fn default_rpc_timeout_s() -> u64 {
    10
}
fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

impl Default for RobotConfig {
    fn default() -> Self {
        Self {
            robot_ip: default_robot_ip(),
            rpc_port: default_rpc_port(),
            camera_port: default_camera_port(),
            rpc_timeout_s: default_rpc_timeout_s(),
            log_dir: default_log_dir(),
            save_frames: false,
        }
    }
}

impl RobotConfig {
    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_s)
    }
}

/// Return the path to `~/.pickservo/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".pickservo").join("config.toml")
}

/// Load the config, falling back to defaults when the file does not exist.
/// Environment overrides are applied either way.
pub fn load_or_default(path: &Path) -> Result<RobotConfig, String> {
    let mut cfg = load_from(path)?.unwrap_or_default();
    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

/// Load the config from a specific path. Returns `None` if the file does
/// not exist.
pub(crate) fn load_from(path: &Path) -> Result<Option<RobotConfig>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let cfg: RobotConfig = toml::from_str(&raw)
        .map_err(|e| format!("Failed to parse config at {}: {}", path.display(), e))?;
    Ok(Some(cfg))
}

/// Apply `PICKSERVO_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `PICKSERVO_ROBOT_IP` | `robot_ip` |
/// | `PICKSERVO_RPC_PORT` | `rpc_port` |
/// | `PICKSERVO_CAMERA_PORT` | `camera_port` |
///
/// Unparseable ports are ignored.
pub fn apply_env_overrides(cfg: &mut RobotConfig) {
    apply_overrides(cfg, |key| std::env::var(key).ok());
}

fn apply_overrides(cfg: &mut RobotConfig, var: impl Fn(&str) -> Option<String>) {
    if let Some(v) = var("PICKSERVO_ROBOT_IP") {
        cfg.robot_ip = v;
    }
    if let Some(port) = var("PICKSERVO_RPC_PORT").and_then(|v| v.parse::<u16>().ok()) {
        cfg.rpc_port = port;
    }
    if let Some(port) = var("PICKSERVO_CAMERA_PORT").and_then(|v| v.parse::<u16>().ok()) {
        cfg.camera_port = port;
    }
}

/// Save the config to a specific path, creating parent directories.
pub(crate) fn save_to(cfg: &RobotConfig, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn roundtrip_default_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        save_to(&RobotConfig::default(), &path).expect("save");

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded, RobotConfig::default());
        assert_eq!(loaded.rpc_port, 9030);
        assert_eq!(loaded.rpc_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn partial_file_uses_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "robot_ip = \"10.0.0.7\"\nsave_frames = true\n").unwrap();

        let cfg = load_from(&path).unwrap().unwrap();
        assert_eq!(cfg.robot_ip, "10.0.0.7");
        assert!(cfg.save_frames);
        assert_eq!(cfg.camera_port, 8080);
        assert_eq!(cfg.log_dir, PathBuf::from("logs"));
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "rpc_port = \"nine\"\n").unwrap();
        let err = load_from(&path).unwrap_err();
        assert!(err.contains("Failed to parse config"));
    }

    #[test]
    fn config_path_points_to_pickservo_dir() {
        let p = config_path_for_home("/home/testuser");
        assert!(p.to_string_lossy().contains(".pickservo"));
        assert!(p.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn overrides_replace_file_values() {
        let mut cfg = RobotConfig::default();
        apply_overrides(
            &mut cfg,
            env(&[
                ("PICKSERVO_ROBOT_IP", "robot.local"),
                ("PICKSERVO_RPC_PORT", "9999"),
                ("PICKSERVO_CAMERA_PORT", "8181"),
            ]),
        );
        assert_eq!(cfg.robot_ip, "robot.local");
        assert_eq!(cfg.rpc_port, 9999);
        assert_eq!(cfg.camera_port, 8181);
    }

    #[test]
    fn overrides_ignore_invalid_port() {
        let mut cfg = RobotConfig::default();
        apply_overrides(&mut cfg, env(&[("PICKSERVO_RPC_PORT", "not-a-port")]));
        assert_eq!(cfg.rpc_port, 9030);
    }
}
