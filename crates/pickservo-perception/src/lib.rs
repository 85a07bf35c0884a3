//! `pickservo-perception` – turns camera frames into [`Detection`]s.
//!
//! # Modules
//!
//! - [`blob`] – [`ColorBlobDetector`][blob::ColorBlobDetector]: HSV colour
//!   mask and largest connected component on RGB24 frames.
//! - [`scripted`] – [`ScriptedDetector`][scripted::ScriptedDetector]: replays
//!   a fixed sequence of detections, for tests.
//!
//! [`Detection`]: pickservo_types::Detection

pub mod blob;
pub mod scripted;

use pickservo_hal::CameraFrame;
use pickservo_types::Detection;

pub use blob::{ColorBlobDetector, HsvRange};
pub use scripted::ScriptedDetector;

/// Localises the target object in one frame.
///
/// Output is a noisy observation; callers must not assume that identical
/// frames yield identical detections.
pub trait Detector: Send {
    fn detect(&mut self, frame: &CameraFrame) -> Detection;
}
