//! Sysfs GPIO adapters
//!
//! Pins are exported through `<root>/export`, configured through
//! `gpioN/direction` and driven through `gpioN/value`. The value file stays
//! open for the lifetime of the pin so echo polling does not reopen it.

use std::fs::{self, File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use sg_error::{Result, SensorError, SkyguardError};
use tracing::{debug, warn};

use super::{Actuator, DistanceSensor, RainSensor};
use crate::config::{ControlSettings, PinMap};
use crate::constants::ranging::{SPEED_OF_SOUND_CM_S, TRIGGER_PULSE};
use crate::data::ActuatorPin;

/// How long to wait for udev to create `gpioN/` after an export
const EXPORT_SETTLE_ATTEMPTS: u32 = 20;
const EXPORT_SETTLE_STEP: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    fn as_str(&self) -> &'static str {
        match self {
            Direction::In => "in",
            Direction::Out => "out",
        }
    }
}

/// One exported GPIO line; unexported on drop
#[derive(Debug)]
pub struct GpioPin {
    root: PathBuf,
    number: u32,
    value: File,
}

impl GpioPin {
    /// Export `number` under `root` and set its direction
    pub fn export(root: &Path, number: u32, direction: Direction) -> Result<Self> {
        let pin_dir = root.join(format!("gpio{}", number));

        if !pin_dir.exists() {
            fs::write(root.join("export"), number.to_string())
                .map_err(|e| SkyguardError::gpio(number, format!("export failed: {}", e)))?;

            let mut attempts = 0;
            while !pin_dir.exists() {
                attempts += 1;
                if attempts > EXPORT_SETTLE_ATTEMPTS {
                    return Err(SkyguardError::gpio(number, "exported pin never appeared in sysfs"));
                }
                thread::sleep(EXPORT_SETTLE_STEP);
            }
        }

        fs::write(pin_dir.join("direction"), direction.as_str()).map_err(|e| {
            SkyguardError::gpio(number, format!("failed to set direction {}: {}", direction.as_str(), e))
        })?;

        let value = OpenOptions::new()
            .read(true)
            .write(direction == Direction::Out)
            .open(pin_dir.join("value"))
            .map_err(|e| SkyguardError::gpio(number, format!("failed to open value: {}", e)))?;

        debug!(pin = number, direction = direction.as_str(), "GPIO exported");
        Ok(Self {
            root: root.to_path_buf(),
            number,
            value,
        })
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn read(&self) -> Result<bool> {
        let mut buf = [0u8; 1];
        let n = self
            .value
            .read_at(&mut buf, 0)
            .map_err(|e| SkyguardError::gpio(self.number, format!("read failed: {}", e)))?;
        match (n, buf[0]) {
            (1, b'1') => Ok(true),
            (1, b'0') => Ok(false),
            _ => Err(SkyguardError::gpio(self.number, "unexpected value contents")),
        }
    }

    pub fn write(&self, high: bool) -> Result<()> {
        let byte: &[u8] = if high { b"1" } else { b"0" };
        self.value
            .write_at(byte, 0)
            .map(|_| ())
            .map_err(|e| SkyguardError::gpio(self.number, format!("write failed: {}", e)))
    }
}

impl Drop for GpioPin {
    fn drop(&mut self) {
        if let Err(e) = fs::write(self.root.join("unexport"), self.number.to_string()) {
            debug!(pin = self.number, "GPIO unexport failed: {}", e);
        }
    }
}

// ============================================================================
// Actuator
// ============================================================================

/// Light and speaker on sysfs output pins
pub struct SysfsGpio {
    light: GpioPin,
    speaker: GpioPin,
}

impl SysfsGpio {
    pub fn open(root: &Path, pins: &PinMap) -> Result<Self> {
        let light = GpioPin::export(root, pins.light, Direction::Out)?;
        let speaker = GpioPin::export(root, pins.speaker, Direction::Out)?;
        let mut gpio = Self { light, speaker };
        for pin in ActuatorPin::ALL {
            gpio.set(pin, false);
        }
        Ok(gpio)
    }

    fn pin(&self, pin: ActuatorPin) -> &GpioPin {
        match pin {
            ActuatorPin::Light => &self.light,
            ActuatorPin::Speaker => &self.speaker,
        }
    }
}

impl Actuator for SysfsGpio {
    fn set(&mut self, pin: ActuatorPin, on: bool) {
        if let Err(e) = self.pin(pin).write(on) {
            warn!("Failed to switch {} {}: {}", pin.name(), if on { "on" } else { "off" }, e);
        }
    }
}

// ============================================================================
// Rain sensor
// ============================================================================

/// Digital rain sensor; a high level means rain
pub struct GpioRainSensor {
    pin: GpioPin,
}

impl GpioRainSensor {
    pub fn open(root: &Path, pins: &PinMap) -> Result<Self> {
        Ok(Self {
            pin: GpioPin::export(root, pins.rain, Direction::In)?,
        })
    }
}

impl RainSensor for GpioRainSensor {
    fn is_raining(&mut self) -> std::result::Result<bool, SensorError> {
        self.pin.read().map_err(|e| SensorError::read("rain", e.to_string()))
    }
}

// ============================================================================
// Ultrasonic ranger
// ============================================================================

/// Convert a round-trip echo time to a one-way distance
pub fn echo_to_cm(echo: Duration) -> f64 {
    echo.as_secs_f64() * SPEED_OF_SOUND_CM_S / 2.0
}

/// HC-SR04 style ranger: pulse the trigger, time the echo
pub struct UltrasonicRanger {
    trigger: GpioPin,
    echo: GpioPin,
    timeout: Duration,
}

impl UltrasonicRanger {
    pub fn open(root: &Path, pins: &PinMap, control: &ControlSettings) -> Result<Self> {
        let trigger = GpioPin::export(root, pins.trigger, Direction::Out)?;
        let echo = GpioPin::export(root, pins.echo, Direction::In)?;
        trigger.write(false)?;
        Ok(Self {
            trigger,
            echo,
            timeout: control.distance_timeout(),
        })
    }

    fn timeout_error(&self) -> SensorError {
        SensorError::Timeout {
            sensor: "distance",
            timeout_ms: self.timeout.as_millis() as u64,
        }
    }

    /// Busy-wait until the echo line reaches `level`; returns when it did
    fn wait_for_echo(&self, level: bool, deadline: Instant) -> std::result::Result<Instant, SensorError> {
        loop {
            let now = Instant::now();
            let current = self
                .echo
                .read()
                .map_err(|e| SensorError::read("distance", e.to_string()))?;
            if current == level {
                return Ok(now);
            }
            if now >= deadline {
                return Err(self.timeout_error());
            }
        }
    }
}

impl DistanceSensor for UltrasonicRanger {
    fn read_cm(&mut self) -> std::result::Result<f64, SensorError> {
        let pulse = |high| {
            self.trigger
                .write(high)
                .map_err(|e| SensorError::read("distance", e.to_string()))
        };
        pulse(true)?;
        thread::sleep(TRIGGER_PULSE);
        pulse(false)?;

        let deadline = Instant::now() + self.timeout;
        let rise = self.wait_for_echo(true, deadline)?;
        let fall = self.wait_for_echo(false, rise + self.timeout)?;
        Ok(echo_to_cm(fall - rise))
    }
}
