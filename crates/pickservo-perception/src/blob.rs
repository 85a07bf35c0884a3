//! Colour-blob detector on RGB24 frames.
//!
//! Pixels are converted to HSV and kept when their hue falls in one of the
//! configured [`HsvRange`]s and their saturation and value reach the range's
//! minimums. The largest 4-connected component of the mask is the target.
//!
//! Confidence favours square blobs and larger blobs:
//!
//! ```text
//! aspect_score = 1 − |1 − w/h|
//! area_score   = min(20 · area_ratio, 1)
//! confidence   = 0.3 · aspect_score + 0.7 · area_score
//! ```

use pickservo_hal::CameraFrame;
use pickservo_types::{BoundingBox, Detection};
use tracing::trace;

use crate::Detector;

/// An inclusive hue interval (degrees) with minimum saturation and value
/// (`0..=255`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HsvRange {
    pub hue_min: f64,
    pub hue_max: f64,
    pub sat_min: u8,
    pub val_min: u8,
}

impl HsvRange {
    fn contains(&self, (h, s, v): (f64, u8, u8)) -> bool {
        h >= self.hue_min && h <= self.hue_max && s >= self.sat_min && v >= self.val_min
    }
}

/// Detects the largest blob of a target colour.
#[derive(Debug, Clone)]
pub struct ColorBlobDetector {
    ranges: Vec<HsvRange>,
    min_area_px: usize,
}

impl Default for ColorBlobDetector {
    fn default() -> Self {
        Self::red()
    }
}

impl ColorBlobDetector {
    pub const DEFAULT_MIN_AREA_PX: usize = 100;

    /// Red wraps around hue 0, so it needs two ranges.
    pub fn red() -> Self {
        Self::new(vec![
            HsvRange {
                hue_min: 0.0,
                hue_max: 10.0,
                sat_min: 50,
                val_min: 50,
            },
            HsvRange {
                hue_min: 340.0,
                hue_max: 360.0,
                sat_min: 50,
                val_min: 50,
            },
        ])
    }

    pub fn new(ranges: Vec<HsvRange>) -> Self {
        Self {
            ranges,
            min_area_px: Self::DEFAULT_MIN_AREA_PX,
        }
    }

    /// Blobs with fewer pixels are treated as noise.
    pub fn with_min_area(mut self, pixels: usize) -> Self {
        self.min_area_px = pixels;
        self
    }

    fn mask(&self, frame: &CameraFrame) -> Vec<bool> {
        frame
            .data
            .chunks_exact(3)
            .map(|px| {
                let hsv = rgb_to_hsv(px[0], px[1], px[2]);
                self.ranges.iter().any(|r| r.contains(hsv))
            })
            .collect()
    }
}

impl Detector for ColorBlobDetector {
    fn detect(&mut self, frame: &CameraFrame) -> Detection {
        if frame.width == 0 || frame.height == 0 || !frame.is_rgb24() {
            return Detection::lost();
        }
        let (w, h) = (frame.width as usize, frame.height as usize);
        let mask = self.mask(frame);

        let Some(blob) = largest_component(&mask, w, h) else {
            return Detection::lost();
        };
        if blob.pixels < self.min_area_px {
            trace!(pixels = blob.pixels, "blob below minimum area");
            return Detection::lost();
        }

        let bbox = BoundingBox {
            x1: blob.x_min as i32,
            y1: blob.y_min as i32,
            x2: blob.x_max as i32 + 1,
            y2: blob.y_max as i32 + 1,
        };
        let area_ratio = blob.pixels as f64 / (w * h) as f64;
        let aspect = f64::from(bbox.width()) / f64::from(bbox.height());
        let aspect_score = 1.0 - (1.0 - aspect).abs();
        let area_score = (area_ratio * 20.0).min(1.0);
        let confidence = 0.3 * aspect_score + 0.7 * area_score;

        Detection::at(bbox, area_ratio, confidence)
    }
}

struct Component {
    pixels: usize,
    x_min: usize,
    y_min: usize,
    x_max: usize,
    y_max: usize,
}

fn largest_component(mask: &[bool], w: usize, h: usize) -> Option<Component> {
    let mut seen = vec![false; mask.len()];
    let mut stack = Vec::new();
    let mut best: Option<Component> = None;

    for start in 0..mask.len() {
        if !mask[start] || seen[start] {
            continue;
        }
        seen[start] = true;
        stack.push(start);
        let mut c = Component {
            pixels: 0,
            x_min: usize::MAX,
            y_min: usize::MAX,
            x_max: 0,
            y_max: 0,
        };

        while let Some(i) = stack.pop() {
            let (x, y) = (i % w, i / w);
            c.pixels += 1;
            c.x_min = c.x_min.min(x);
            c.x_max = c.x_max.max(x);
            c.y_min = c.y_min.min(y);
            c.y_max = c.y_max.max(y);

            let mut visit = |j: usize| {
                if mask[j] && !seen[j] {
                    seen[j] = true;
                    stack.push(j);
                }
            };
            if x > 0 {
                visit(i - 1);
            }
            if x + 1 < w {
                visit(i + 1);
            }
            if y > 0 {
                visit(i - w);
            }
            if y + 1 < h {
                visit(i + w);
            }
        }

        if best.as_ref().is_none_or(|b| c.pixels > b.pixels) {
            best = Some(c);
        }
    }
    best
}

/// Hue in degrees `[0, 360)`, saturation and value scaled to `0..=255`.
fn rgb_to_hsv(r: u8, g: u8, b: u8) -> (f64, u8, u8) {
    let (rf, gf, bf) = (f64::from(r), f64::from(g), f64::from(b));
    let max = rf.max(gf).max(bf);
    let min = rf.min(gf).min(bf);
    let delta = max - min;

    let hue = if delta == 0.0 {
        0.0
    } else if max == rf {
        60.0 * ((gf - bf) / delta).rem_euclid(6.0)
    } else if max == gf {
        60.0 * ((bf - rf) / delta + 2.0)
    } else {
        60.0 * ((rf - gf) / delta + 4.0)
    };
    let sat = if max == 0.0 { 0.0 } else { delta / max * 255.0 };

    (hue, sat.round() as u8, max as u8)
}
