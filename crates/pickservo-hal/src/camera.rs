//! Generic `Camera` trait and supporting types for image-capture hardware.

use chrono::{DateTime, Utc};
use pickservo_types::PickError;

/// A raw image frame returned by a camera driver.
#[derive(Debug, Clone)]
pub struct CameraFrame {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Raw pixel data, row-major. RGB24 unless a driver documents otherwise.
    pub data: Vec<u8>,
    /// Capture time.
    pub timestamp: DateTime<Utc>,
}

impl CameraFrame {
    /// Wrap an RGB24 buffer captured now.
    pub fn rgb(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            data,
            timestamp: Utc::now(),
        }
    }

    /// `true` when the buffer holds exactly `width * height` RGB triplets.
    pub fn is_rgb24(&self) -> bool {
        self.data.len() == self.width as usize * self.height as usize * 3
    }
}

/// A camera or image-capture device.
///
/// A failed capture is not fatal to the control loop; callers turn it into
/// an observation with nothing in view.
pub trait Camera: Send {
    /// Stable identifier for this camera, e.g. `"front_rgb"`.
    fn id(&self) -> &str;

    /// Capture and return the next available frame.
    ///
    /// # Errors
    ///
    /// Returns [`PickError::Camera`] if the frame cannot be captured
    /// (e.g. the stream is disconnected or the frame failed to decode).
    fn capture(&mut self) -> Result<CameraFrame, PickError>;

    /// Release the underlying device or stream. Idempotent.
    fn close(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockCamera {
        id: String,
        closed: bool,
    }

    impl Camera for MockCamera {
        fn id(&self) -> &str {
            &self.id
        }

        fn capture(&mut self) -> Result<CameraFrame, PickError> {
            if self.closed {
                return Err(PickError::Camera("closed".to_string()));
            }
            Ok(CameraFrame::rgb(2, 2, vec![0u8; 2 * 2 * 3]))
        }

        fn close(&mut self) {
            self.closed = true;
        }
    }

    #[test]
    fn mock_camera_capture() {
        let mut cam = MockCamera {
            id: "front_rgb".to_string(),
            closed: false,
        };
        assert_eq!(cam.id(), "front_rgb");
        let frame = cam.capture().unwrap();
        assert_eq!(frame.width, 2);
        assert_eq!(frame.height, 2);
        assert!(frame.is_rgb24());
        cam.close();
        assert!(cam.capture().is_err());
    }

    #[test]
    fn greyscale_buffer_is_not_rgb24() {
        let frame = CameraFrame::rgb(4, 4, vec![0u8; 16]);
        assert!(!frame.is_rgb24());
    }
}
