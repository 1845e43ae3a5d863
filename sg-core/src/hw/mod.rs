//! Collaborator interfaces and their Linux adapters
//!
//! The engine only sees the traits defined here. The adapters are thin:
//! sysfs GPIO for the actuator, rain and ultrasonic pins, a frame file for
//! the thermal camera, termios serial ports for the vehicle link and the
//! alert modem, and an append-only CSV file for the event log.

mod csv_sink;
mod gpio;
pub mod mavlink;
mod serial;
mod thermal;

pub use csv_sink::{format_csv_row, CsvEventSink};
pub use gpio::{GpioRainSensor, SysfsGpio, UltrasonicRanger};
pub use mavlink::MavlinkLink;
pub use serial::{SerialAlertTransport, SerialPort};
pub use thermal::{parse_frame, FrameFileSource};

use sg_error::{DispatchError, Result, SensorError};

use crate::data::{Ack, ActuatorPin, EventRecord, VehicleCommand};

// ============================================================================
// Sensors
// ============================================================================

/// Ultrasonic (or any) range finder
#[cfg_attr(test, mockall::automock)]
pub trait DistanceSensor {
    /// Distance to the nearest echo in centimetres; may block up to the
    /// sensor timeout
    fn read_cm(&mut self) -> std::result::Result<f64, SensorError>;
}

/// Thermal camera
#[cfg_attr(test, mockall::automock)]
pub trait ThermalSensor {
    /// One raw frame, row-major, in degrees Celsius
    fn read_frame(&mut self) -> std::result::Result<Vec<f32>, SensorError>;
}

/// Binary rain indicator
#[cfg_attr(test, mockall::automock)]
pub trait RainSensor {
    fn is_raining(&mut self) -> std::result::Result<bool, SensorError>;
}

// ============================================================================
// Outputs
// ============================================================================

/// Light and speaker outputs
///
/// Fire-and-forget: adapters log write failures themselves.
#[cfg_attr(test, mockall::automock)]
pub trait Actuator {
    fn set(&mut self, pin: ActuatorPin, on: bool);
}

/// Command link to the vehicle autopilot
#[cfg_attr(test, mockall::automock)]
pub trait VehicleLink {
    fn send_command(&mut self, command: &VehicleCommand) -> std::result::Result<Ack, DispatchError>;
}

/// Remote notification channel; each call opens and releases its own
/// connection
#[cfg_attr(test, mockall::automock)]
pub trait AlertTransport {
    fn send(&mut self, payload: &[u8]) -> std::result::Result<(), DispatchError>;
}

/// Durable append-only event log
#[cfg_attr(test, mockall::automock)]
pub trait EventSink {
    fn append(&mut self, record: &EventRecord) -> Result<()>;

    fn flush(&mut self) -> Result<()>;
}
