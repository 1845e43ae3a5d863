//! Thermal blob classifier
//!
//! Turns one thermal frame into a threat severity:
//! upscale → threshold → external contours → largest area → severity bucket.
//! The classifier holds only its immutable settings, so classifying the same
//! frame twice always gives the same answer.

use sg_error::{InputError, SkyguardError};
use tracing::debug;

use super::contour::{largest_contour_area, Mask};
use super::upscale::resize_cubic;
use crate::config::DetectionSettings;
use crate::data::{Severity, ThermalFrame};

/// Single-frame blob classifier
#[derive(Debug, Clone, PartialEq)]
pub struct ThreatClassifier {
    settings: DetectionSettings,
}

impl ThreatClassifier {
    /// Build a classifier, rejecting settings it cannot run with
    pub fn new(settings: DetectionSettings) -> Result<Self, SkyguardError> {
        settings.validate()?;
        Ok(Self { settings })
    }

    /// Wrap raw samples in a frame of the configured sensor shape
    pub fn frame_from_samples(&self, samples: Vec<f32>) -> Result<ThermalFrame, InputError> {
        ThermalFrame::new(samples, self.settings.frame_rows, self.settings.frame_cols)
    }

    /// Classify one frame
    pub fn classify(&self, frame: &ThermalFrame) -> Result<Severity, InputError> {
        let severity = match self.largest_blob_area(frame)? {
            None => Severity::None,
            Some(area) => {
                let severity = self.severity_for_area(area);
                debug!(area, %severity, "Largest thermal blob");
                severity
            }
        };
        Ok(severity)
    }

    /// Convenience wrapper for raw sensor output
    pub fn classify_samples(&self, samples: Vec<f32>) -> Result<Severity, InputError> {
        self.classify(&self.frame_from_samples(samples)?)
    }

    /// Area of the largest hot blob on the working grid, None when nothing
    /// reaches the threshold
    pub fn largest_blob_area(&self, frame: &ThermalFrame) -> Result<Option<f64>, InputError> {
        let s = &self.settings;
        if frame.rows() != s.frame_rows || frame.cols() != s.frame_cols {
            return Err(InputError::FrameShape {
                expected_rows: s.frame_rows,
                expected_cols: s.frame_cols,
                rows: frame.rows(),
                cols: frame.cols(),
            });
        }

        let grid = resize_cubic(
            frame.samples(),
            s.frame_rows,
            s.frame_cols,
            s.upscale_width,
            s.upscale_height,
        );
        let mask = Mask::from_threshold(
            &grid.values,
            grid.width,
            grid.height,
            f64::from(s.hot_threshold_celsius),
        );

        Ok(largest_contour_area(&mask))
    }

    /// Bucket an area; each boundary belongs to the higher bucket
    pub fn severity_for_area(&self, area: f64) -> Severity {
        if area >= self.settings.severe_area {
            Severity::Severe
        } else if area >= self.settings.moderate_area {
            Severity::Moderate
        } else {
            Severity::Mild
        }
    }
}

impl Default for ThreatClassifier {
    fn default() -> Self {
        Self {
            settings: DetectionSettings::default(),
        }
    }
}
