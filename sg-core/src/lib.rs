//! SkyGuard Core Library
//!
//! Perimeter threat deterrence for a fixed installation: a thermal camera and
//! an ultrasonic ranger feed a blob classifier, and a graduated response
//! (speaker, light, evasive vehicle command, remote alert) is run for every
//! detected threat and logged.
//!
//! # Module Structure
//!
//! - `data/` - Frames, severities, deterrent actions, event records
//! - `engine/` - Classifier pipeline, deterrent state machine, control loop
//! - `dispatch/` - Evasive command and alert dispatchers
//! - `hw/` - Collaborator traits and Linux adapters (sysfs GPIO, serial, MAVLink, CSV)
//!
//! # Example
//!
//! ```no_run
//! use sg_core::{Severity, ThreatClassifier};
//!
//! let classifier = ThreatClassifier::default();
//! let severity = classifier.classify_samples(vec![20.0; 768]).unwrap();
//! assert_eq!(severity, Severity::None);
//! ```

// Grouped modules
pub mod data;
pub mod dispatch;
pub mod engine;
pub mod hw;

// Standalone modules
pub mod config;
pub mod constants;
pub mod recorder;

// Re-export primary types from data/
pub use data::{
    Ack, ActuatorPin, DeterrentAction, EnvironmentContext, EventRecord, Severity, ThermalFrame,
    VehicleCommand,
};

// Re-export configuration
pub use config::{
    load_config, resolve_config_path, save_config, ControlSettings, DetectionSettings,
    DeviceSettings, PinMap, ScriptDurations, SkyguardConfig,
};

// Re-export engine types
pub use engine::{
    Collaborators, ControlLoop, DeterrentStateMachine, DispatchKind, ExecutionReport,
    IterationOutcome, ScriptOutputs, Shutdown, ThreatClassifier,
};

pub use dispatch::{AlertDispatcher, EvasiveDispatcher};
pub use recorder::EventRecorder;

// Re-export error types
pub use sg_error::{DispatchError, InputError, Result, SensorError, SkyguardError};
