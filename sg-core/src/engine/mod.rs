//! Detection and response engine
//!
//! Contains the thermal classifier pipeline, the deterrent state machine and
//! the control loop that drives them.

mod classifier;
pub mod contour;
mod control;
mod deterrent;
mod shutdown;
pub mod upscale;

pub use classifier::ThreatClassifier;
pub use control::{Collaborators, ControlLoop, IterationOutcome};
pub use deterrent::{
    ActuatorGuard, DeterrentStateMachine, DispatchKind, ExecutionReport, ScriptOutputs,
};
pub use shutdown::Shutdown;
