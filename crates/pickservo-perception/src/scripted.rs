//! Replays a fixed sequence of detections, ignoring the frame.

use std::collections::VecDeque;

use pickservo_hal::CameraFrame;
use pickservo_types::Detection;

use crate::Detector;

/// A detector driven by a script instead of pixels.
///
/// Once the script is exhausted every call returns the fallback, which is
/// [`Detection::lost`] unless set with [`ScriptedDetector::then_repeat`].
#[derive(Debug, Clone)]
pub struct ScriptedDetector {
    script: VecDeque<Detection>,
    fallback: Detection,
    calls: usize,
}

impl ScriptedDetector {
    pub fn new(script: impl IntoIterator<Item = Detection>) -> Self {
        Self {
            script: script.into_iter().collect(),
            fallback: Detection::lost(),
            calls: 0,
        }
    }

    pub fn then_repeat(mut self, detection: Detection) -> Self {
        self.fallback = detection;
        self
    }

    /// Number of frames seen so far.
    pub fn calls(&self) -> usize {
        self.calls
    }
}

impl Detector for ScriptedDetector {
    fn detect(&mut self, _frame: &CameraFrame) -> Detection {
        self.calls += 1;
        self.script
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pickservo_types::BoundingBox;

    #[test]
    fn replays_then_falls_back() {
        let bbox = BoundingBox {
            x1: 0,
            y1: 0,
            x2: 10,
            y2: 10,
        };
        let frame = CameraFrame::rgb(1, 1, vec![0, 0, 0]);
        let mut det = ScriptedDetector::new([Detection::at(bbox, 0.1, 0.9)]);
        assert!(det.detect(&frame).found);
        assert!(!det.detect(&frame).found);
        assert_eq!(det.calls(), 2);

        let mut det = ScriptedDetector::new([]).then_repeat(Detection::at(bbox, 0.2, 0.5));
        assert!(det.detect(&frame).found);
        assert!(det.detect(&frame).found);
    }
}
