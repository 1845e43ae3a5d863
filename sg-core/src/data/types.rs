//! Core data types for SkyGuard
//!
//! Defines the values that flow through one control-loop iteration: the raw
//! thermal frame, the classified severity, the environment snapshot, the
//! deterrent script and the event record handed to the log sink.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use sg_error::InputError;

use crate::constants::mavlink;

/// One thermal frame, row-major, exactly `rows * cols` finite samples
#[derive(Debug, Clone, PartialEq)]
pub struct ThermalFrame {
    rows: usize,
    cols: usize,
    samples: Vec<f32>,
}

impl ThermalFrame {
    /// Wrap raw sensor samples, rejecting a wrong element count or
    /// non-finite temperatures. Never truncates or pads.
    pub fn new(samples: Vec<f32>, rows: usize, cols: usize) -> Result<Self, InputError> {
        let expected = rows * cols;
        if samples.len() != expected {
            return Err(InputError::FrameSize {
                expected,
                actual: samples.len(),
            });
        }
        if let Some(index) = samples.iter().position(|s| !s.is_finite()) {
            return Err(InputError::NonFiniteSample { index });
        }
        Ok(Self { rows, cols, samples })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }
}

/// Threat level, ordered by escalation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    None,
    Mild,
    Moderate,
    Severe,
}

impl Severity {
    /// Lowercase name, as written to the event log
    pub const fn as_str(&self) -> &'static str {
        match self {
            Severity::None => "none",
            Severity::Mild => "mild",
            Severity::Moderate => "moderate",
            Severity::Severe => "severe",
        }
    }

    pub fn is_threat(&self) -> bool {
        *self != Severity::None
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Environment snapshot taken once per iteration
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EnvironmentContext {
    /// Distance to the nearest echo; None when the ranger timed out
    pub distance_cm: Option<f64>,
    pub is_raining: bool,
}

impl EnvironmentContext {
    pub fn new(distance_cm: Option<f64>, is_raining: bool) -> Self {
        Self { distance_cm, is_raining }
    }
}

/// Logical actuator outputs owned by the deterrent state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActuatorPin {
    Light,
    Speaker,
}

impl ActuatorPin {
    pub const ALL: [ActuatorPin; 2] = [ActuatorPin::Light, ActuatorPin::Speaker];

    pub const fn name(&self) -> &'static str {
        match self {
            ActuatorPin::Light => "light",
            ActuatorPin::Speaker => "speaker",
        }
    }
}

/// One step of a deterrent script
#[derive(Debug, Clone, PartialEq)]
pub enum DeterrentAction {
    /// Switch the light on or off
    Light(bool),
    /// Switch the speaker on or off
    Speaker(bool),
    /// Send the evasive maneuver to the vehicle
    IssueEvasiveCommand,
    /// Deliver an alert message to the remote operator
    SendAlert(String),
    /// Keep outputs in their current state
    Hold(Duration),
}

impl DeterrentAction {
    /// The actuator write this step performs, if any
    pub fn actuator_op(&self) -> Option<(ActuatorPin, bool)> {
        match self {
            DeterrentAction::Light(on) => Some((ActuatorPin::Light, *on)),
            DeterrentAction::Speaker(on) => Some((ActuatorPin::Speaker, *on)),
            _ => None,
        }
    }
}

/// A single long-form command for the vehicle autopilot
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VehicleCommand {
    /// MAV_CMD identifier
    pub command: u16,
    pub params: [f32; 7],
    pub confirmation: u8,
}

impl VehicleCommand {
    /// The fixed evasive speed change: ground speed 5 m/s, throttle unchanged
    pub fn evasive() -> Self {
        Self {
            command: mavlink::MAV_CMD_DO_CHANGE_SPEED,
            params: mavlink::EVASIVE_PARAMS,
            confirmation: 0,
        }
    }
}

/// Vehicle acknowledgement of a dispatched command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    pub target_system: u8,
    pub target_component: u8,
    /// Link sequence number of the sent frame
    pub sequence: u8,
}

/// One logged threat event
#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    pub timestamp: DateTime<Local>,
    pub severity: Severity,
    pub distance_cm: Option<f64>,
    pub is_raining: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_rejects_wrong_size() {
        assert_eq!(
            ThermalFrame::new(vec![20.0; 767], 24, 32),
            Err(InputError::FrameSize { expected: 768, actual: 767 })
        );
        assert_eq!(
            ThermalFrame::new(vec![20.0; 769], 24, 32),
            Err(InputError::FrameSize { expected: 768, actual: 769 })
        );
    }

    #[test]
    fn test_frame_rejects_non_finite() {
        let mut samples = vec![20.0; 768];
        samples[100] = f32::NAN;
        assert_eq!(
            ThermalFrame::new(samples, 24, 32),
            Err(InputError::NonFiniteSample { index: 100 })
        );
    }

    #[test]
    fn test_frame_accessors() {
        let mut samples = vec![20.0; 6];
        samples[4] = 41.5;
        let frame = ThermalFrame::new(samples, 2, 3).unwrap();
        assert_eq!((frame.rows(), frame.cols()), (2, 3));
        assert_eq!(frame.samples()[4], 41.5);
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::None < Severity::Mild);
        assert!(Severity::Mild < Severity::Moderate);
        assert!(Severity::Moderate < Severity::Severe);
        assert_eq!(Severity::Severe.to_string(), "severe");
        assert!(!Severity::None.is_threat());
    }

    #[test]
    fn test_evasive_command() {
        let cmd = VehicleCommand::evasive();
        assert_eq!(cmd.command, 178);
        assert_eq!(cmd.params, [1.0, 5.0, -1.0, 0.0, 0.0, 0.0, 0.0]);
        assert_eq!(cmd.confirmation, 0);
    }

    #[test]
    fn test_actuator_ops() {
        assert_eq!(DeterrentAction::Light(true).actuator_op(), Some((ActuatorPin::Light, true)));
        assert_eq!(DeterrentAction::Speaker(false).actuator_op(), Some((ActuatorPin::Speaker, false)));
        assert_eq!(DeterrentAction::IssueEvasiveCommand.actuator_op(), None);
        assert_eq!(DeterrentAction::Hold(Duration::from_millis(5)).actuator_op(), None);
    }
}
