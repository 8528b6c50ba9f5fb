//! Image-derived vertical line detection.
//!
//! A second, raster-only line signal for pages whose tables were drawn into
//! the scan rather than the PDF's vector layer. The detector is an injected
//! capability with two implementations: a real detector (adaptive threshold
//! → vertical-run opening → Hough transform, behind the `line-detect`
//! feature) and a no-op stub. Absence of the capability is never an error.
//!
//! The whole path is bounded by a wall-clock budget shared with the rest of
//! the line-assist pass; when the budget is already spent the detector
//! aborts before doing any pixel work and reports a timeout, returning no
//! lines rather than raising.

use crate::lines::{LineScan, SectionBounds};
use image::RgbImage;
use std::time::Instant;

/// Image line detection capability.
pub trait ImageLineDetector {
    /// Detect clustered vertical line x positions within `section` of the
    /// page image. `started` marks the beginning of the line-assist pass;
    /// `budget_ms` is the total wall-clock budget for that pass.
    fn vertical_lines(
        &self,
        image: &RgbImage,
        section: &SectionBounds,
        budget_ms: u64,
        started: Instant,
    ) -> LineScan;
}

/// Stub detector used when image detection is unavailable.
#[derive(Debug, Default)]
pub struct NoopLineDetector;

impl ImageLineDetector for NoopLineDetector {
    fn vertical_lines(
        &self,
        _image: &RgbImage,
        _section: &SectionBounds,
        _budget_ms: u64,
        _started: Instant,
    ) -> LineScan {
        LineScan::unavailable("image line detection unavailable")
    }
}

/// Construct the default image detector for this build: the Hough detector
/// when the `line-detect` feature is enabled, otherwise the no-op stub.
pub fn default_image_detector() -> Box<dyn ImageLineDetector> {
    #[cfg(feature = "line-detect")]
    {
        Box::new(hough::HoughLineDetector::default())
    }
    #[cfg(not(feature = "line-detect"))]
    {
        Box::new(NoopLineDetector)
    }
}

#[cfg(feature = "line-detect")]
pub use hough::HoughLineDetector;

#[cfg(feature = "line-detect")]
mod hough {
    use super::*;
    use crate::layout::cluster_x_positions;
    use image::GrayImage;
    use imageproc::hough::{detect_lines, LineDetectionOptions};

    /// Real image line detector.
    #[derive(Debug)]
    pub struct HoughLineDetector {
        /// Local-mean block radius for adaptive thresholding
        pub block_radius: u32,
    }

    impl Default for HoughLineDetector {
        fn default() -> Self {
            Self { block_radius: 15 }
        }
    }

    impl ImageLineDetector for HoughLineDetector {
        fn vertical_lines(
            &self,
            image: &RgbImage,
            section: &SectionBounds,
            budget_ms: u64,
            started: Instant,
        ) -> LineScan {
            let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
            let remaining_ms = budget_ms as f64 - elapsed_ms;
            if remaining_ms <= 1.0 {
                return LineScan {
                    positions: vec![],
                    raw_count: 0,
                    elapsed_ms,
                    timed_out: true,
                    note: Some("latency budget exhausted before image pass".to_string()),
                };
            }

            let (width, height) = (image.width() as f32, image.height() as f32);
            let x_min = (section.x_min - 32.0).max(0.0) as u32;
            let x_max = (section.x_max + 32.0).min(width) as u32;
            let y_min = (section.y_min - 16.0).max(0.0) as u32;
            let y_max = (section.y_max + 16.0).min(height) as u32;
            if x_max <= x_min || y_max <= y_min {
                return LineScan::unavailable("invalid detection region");
            }

            let roi =
                image::imageops::crop_imm(image, x_min, y_min, x_max - x_min, y_max - y_min)
                    .to_image();
            let mut gray = image::imageops::grayscale(&roi);
            let roi_height = y_max - y_min;

            // Dark ink on light paper: threshold against the local mean, then
            // invert so strokes become foreground.
            let mut binary = imageproc::contrast::adaptive_threshold(&gray, self.block_radius);
            image::imageops::invert(&mut binary);
            gray = binary;

            let kernel_height = ((roi_height / 18).max(12)) as usize;
            let opened = keep_vertical_runs(&gray, kernel_height);

            let min_line_length = ((roi_height as f32 * 0.35) as u32).max(20);
            let options = LineDetectionOptions {
                vote_threshold: min_line_length,
                suppression_radius: 8,
            };
            let lines = detect_lines(&opened, options);

            let mut x_positions: Vec<f32> = Vec::new();
            for line in &lines {
                // In the Hough parameterization a vertical line has angle 0
                // (or its 180° alias) and r equal to its x position.
                let angle = line.angle_in_degrees;
                if !(angle <= 2 || angle >= 178) {
                    continue;
                }
                let x = line.r.abs() + x_min as f32;
                x_positions.push((x * 100.0).round() / 100.0);
            }

            let raw_count = x_positions.len();
            let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
            LineScan {
                positions: cluster_x_positions(&x_positions, 10.0),
                raw_count,
                elapsed_ms,
                timed_out: elapsed_ms > budget_ms as f64,
                note: None,
            }
        }
    }

    /// Morphological opening with a 1×k vertical kernel, expressed directly
    /// as a run filter: foreground runs shorter than `min_run` pixels are
    /// erased column by column.
    fn keep_vertical_runs(binary: &GrayImage, min_run: usize) -> GrayImage {
        let (width, height) = binary.dimensions();
        let mut out = GrayImage::new(width, height);
        for x in 0..width {
            let mut run_start: Option<u32> = None;
            for y in 0..=height {
                let on = y < height && binary.get_pixel(x, y)[0] > 127;
                match (on, run_start) {
                    (true, None) => run_start = Some(y),
                    (false, Some(start)) => {
                        if (y - start) as usize >= min_run {
                            for yy in start..y {
                                out.put_pixel(x, yy, image::Luma([255]));
                            }
                        }
                        run_start = None;
                    }
                    _ => {}
                }
            }
        }
        out
    }

}
