//! Constants and configuration defaults for SkyGuard
//!
//! Centralizes the magic numbers of the controller. Anything an installer may
//! want to tune is only a *default* here and is carried by
//! [`crate::config::SkyguardConfig`]; protocol constants are fixed.

use std::time::Duration;

/// Thermal sensor geometry and classification defaults
pub mod detection {
    /// Sensor rows (MLX90640: 24x32)
    pub const FRAME_ROWS: usize = 24;

    /// Sensor columns
    pub const FRAME_COLS: usize = 32;

    /// Working resolution width after upscaling
    pub const UPSCALE_WIDTH: usize = 160;

    /// Working resolution height after upscaling
    pub const UPSCALE_HEIGHT: usize = 120;

    /// Pixels at or above this temperature (°C) are hot
    pub const HOT_THRESHOLD_CELSIUS: f32 = 33.0;

    /// Contour area (working-resolution pixels) where Moderate starts
    pub const MODERATE_AREA: f64 = 50.0;

    /// Contour area where Severe starts
    pub const SEVERE_AREA: f64 = 150.0;

    /// Keys cubic kernel coefficient (matches the common image-library choice)
    pub const CUBIC_A: f64 = -0.75;
}

/// BCM pin assignments
pub mod pins {
    pub const TRIGGER: u32 = 23;
    pub const ECHO: u32 = 24;
    pub const LIGHT: u32 = 18;
    pub const SPEAKER: u32 = 25;
    pub const RAIN: u32 = 4;
}

/// Deterrent script durations
pub mod script {
    /// Speaker chirp for a mild threat
    pub const MILD_SPEAKER_MS: u64 = 100;

    /// Light + speaker hold for a moderate threat
    pub const MODERATE_HOLD_MS: u64 = 1000;

    /// Light + speaker hold for a severe threat
    pub const SEVERE_HOLD_MS: u64 = 2000;

    /// Settle time after an evasive command
    pub const EVASIVE_SETTLE_MS: u64 = 500;
}

/// Control loop timing
pub mod control {
    use super::Duration;

    /// Default control loop period
    pub const PERIOD_MS: u64 = 500;

    /// Shortest accepted control loop period
    pub const MIN_PERIOD_MS: u64 = 50;

    /// Echo wait timeout for the ultrasonic ranger
    pub const DISTANCE_TIMEOUT_MS: u64 = 40;

    /// Granularity of cancellable sleeps
    pub const SLEEP_SLICE: Duration = Duration::from_millis(50);

    /// Log every Nth consecutive iteration failure at error level
    pub const ERROR_LOG_EVERY: u32 = 10;
}

/// Ultrasonic ranging
pub mod ranging {
    use super::Duration;

    /// Speed of sound in cm/s at roughly 20°C
    pub const SPEED_OF_SOUND_CM_S: f64 = 34300.0;

    /// Trigger pulse width
    pub const TRIGGER_PULSE: Duration = Duration::from_micros(10);
}

/// Device paths and serial parameters
pub mod devices {
    /// Sysfs GPIO root
    pub const GPIO_ROOT: &str = "/sys/class/gpio";

    /// Frame file written by the thermal acquisition helper
    pub const THERMAL_FRAME_PATH: &str = "/run/skyguard/thermal_frame";

    /// Upper bound on reading one frame, so a stalled FIFO writer cannot
    /// hold the loop past a shutdown request
    pub const THERMAL_READ_TIMEOUT_MS: u64 = 1000;

    /// Flight controller telemetry port
    pub const VEHICLE_PORT: &str = "/dev/ttyAMA0";
    pub const VEHICLE_BAUD: u32 = 57600;

    /// How long to wait for a heartbeat when opening the vehicle link
    pub const VEHICLE_HANDSHAKE_MS: u64 = 5000;

    /// GSM/LoRa modem port
    pub const ALERT_PORT: &str = "/dev/ttyUSB0";
    pub const ALERT_BAUD: u32 = 9600;
    pub const ALERT_TIMEOUT_MS: u64 = 1000;

    /// CSV event log
    pub const EVENT_LOG_PATH: &str = "/home/pi/skyguard_log.csv";

    /// Baud rates the serial adapter knows how to configure
    pub const SUPPORTED_BAUD_RATES: &[u32] = &[
        1200, 2400, 4800, 9600, 19200, 38400, 57600, 115200, 230400, 460800, 921600,
    ];
}

/// MAVLink v1 protocol constants
pub mod mavlink {
    /// v1 frame start marker
    pub const STX_V1: u8 = 0xFE;

    /// Our own identity on the link (ground control station range)
    pub const GCS_SYSTEM_ID: u8 = 255;
    pub const GCS_COMPONENT_ID: u8 = 190;

    /// Targets used when no heartbeat was seen
    pub const DEFAULT_TARGET_SYSTEM: u8 = 1;
    pub const DEFAULT_TARGET_COMPONENT: u8 = 1;

    pub const MSG_ID_HEARTBEAT: u8 = 0;
    pub const MSG_ID_COMMAND_LONG: u8 = 76;

    pub const CRC_EXTRA_HEARTBEAT: u8 = 50;
    pub const CRC_EXTRA_COMMAND_LONG: u8 = 152;

    pub const COMMAND_LONG_LEN: usize = 33;
    pub const HEARTBEAT_LEN: usize = 9;

    /// MAV_CMD_DO_CHANGE_SPEED
    pub const MAV_CMD_DO_CHANGE_SPEED: u16 = 178;

    /// Evasive "zigzag" parameters: ground speed type, 5 m/s, throttle unchanged
    pub const EVASIVE_PARAMS: [f32; 7] = [1.0, 5.0, -1.0, 0.0, 0.0, 0.0, 0.0];
}

/// Event log format
pub mod event_log {
    /// Header expected by existing log consumers
    pub const CSV_HEADER: &str = "Time,Threat,Distance,Raining";

    /// Timestamp format of the Time column
    pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

    /// Timestamp format used in alert messages
    pub const ALERT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";
}

/// Configuration file locations
pub mod paths {
    /// System-wide configuration file
    pub const SYSTEM_CONFIG: &str = "/etc/skyguard/config.json";

    /// Environment variable overriding the configuration path
    pub const CONFIG_ENV: &str = "SKYGUARD_CONFIG";

    /// Per-user configuration file, used when the system file is absent
    pub fn user_config_file() -> Option<std::path::PathBuf> {
        dirs::config_dir().map(|d| d.join("skyguard").join("config.json"))
    }
}
