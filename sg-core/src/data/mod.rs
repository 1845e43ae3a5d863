//! Data types passed between the pipeline stages

mod types;

pub use types::{
    Ack, ActuatorPin, DeterrentAction, EnvironmentContext, EventRecord, Severity, ThermalFrame,
    VehicleCommand,
};
