//! Controller configuration
//!
//! Persistent configuration stored as JSON, by default in
//! /etc/skyguard/config.json. Every section is optional and falls back to the
//! defaults in [`crate::constants`]; unknown keys are rejected so a typo never
//! silently leaves a default in place.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use sg_error::{Result, SkyguardError};

use crate::constants::{control, detection, devices, paths, pins, script};

/// Complete controller configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct SkyguardConfig {
    /// Thermal classification parameters
    #[serde(default)]
    pub detection: DetectionSettings,

    /// BCM pin assignments
    #[serde(default)]
    pub pins: PinMap,

    /// Deterrent script durations
    #[serde(default)]
    pub script: ScriptDurations,

    /// Control loop timing
    #[serde(default)]
    pub control: ControlSettings,

    /// Device paths and serial parameters
    #[serde(default)]
    pub devices: DeviceSettings,
}

/// Thermal classification parameters
///
/// The area breakpoints are in working-resolution pixels; they must be
/// re-tuned whenever `upscale_width`/`upscale_height` change, since contour
/// area grows with the square of the scale factor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct DetectionSettings {
    pub frame_rows: usize,
    pub frame_cols: usize,
    pub upscale_width: usize,
    pub upscale_height: usize,
    pub hot_threshold_celsius: f32,
    /// Area at which a blob becomes Moderate (below is Mild)
    pub moderate_area: f64,
    /// Area at which a blob becomes Severe
    pub severe_area: f64,
}

/// BCM pin assignments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct PinMap {
    pub trigger: u32,
    pub echo: u32,
    pub light: u32,
    pub speaker: u32,
    pub rain: u32,
}

/// Deterrent script durations in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ScriptDurations {
    pub mild_speaker_ms: u64,
    pub moderate_hold_ms: u64,
    pub severe_hold_ms: u64,
    pub evasive_settle_ms: u64,
}

/// Control loop timing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ControlSettings {
    pub period_ms: u64,
    pub distance_timeout_ms: u64,
}

/// Device paths and serial parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct DeviceSettings {
    pub gpio_root: PathBuf,
    pub thermal_frame_path: PathBuf,
    pub thermal_read_timeout_ms: u64,
    pub vehicle_port: PathBuf,
    pub vehicle_baud: u32,
    pub vehicle_handshake_ms: u64,
    pub alert_port: PathBuf,
    pub alert_baud: u32,
    pub alert_timeout_ms: u64,
    pub event_log_path: PathBuf,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            frame_rows: detection::FRAME_ROWS,
            frame_cols: detection::FRAME_COLS,
            upscale_width: detection::UPSCALE_WIDTH,
            upscale_height: detection::UPSCALE_HEIGHT,
            hot_threshold_celsius: detection::HOT_THRESHOLD_CELSIUS,
            moderate_area: detection::MODERATE_AREA,
            severe_area: detection::SEVERE_AREA,
        }
    }
}

impl Default for PinMap {
    fn default() -> Self {
        Self {
            trigger: pins::TRIGGER,
            echo: pins::ECHO,
            light: pins::LIGHT,
            speaker: pins::SPEAKER,
            rain: pins::RAIN,
        }
    }
}

impl Default for ScriptDurations {
    fn default() -> Self {
        Self {
            mild_speaker_ms: script::MILD_SPEAKER_MS,
            moderate_hold_ms: script::MODERATE_HOLD_MS,
            severe_hold_ms: script::SEVERE_HOLD_MS,
            evasive_settle_ms: script::EVASIVE_SETTLE_MS,
        }
    }
}

impl Default for ControlSettings {
    fn default() -> Self {
        Self {
            period_ms: control::PERIOD_MS,
            distance_timeout_ms: control::DISTANCE_TIMEOUT_MS,
        }
    }
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            gpio_root: PathBuf::from(devices::GPIO_ROOT),
            thermal_frame_path: PathBuf::from(devices::THERMAL_FRAME_PATH),
            thermal_read_timeout_ms: devices::THERMAL_READ_TIMEOUT_MS,
            vehicle_port: PathBuf::from(devices::VEHICLE_PORT),
            vehicle_baud: devices::VEHICLE_BAUD,
            vehicle_handshake_ms: devices::VEHICLE_HANDSHAKE_MS,
            alert_port: PathBuf::from(devices::ALERT_PORT),
            alert_baud: devices::ALERT_BAUD,
            alert_timeout_ms: devices::ALERT_TIMEOUT_MS,
            event_log_path: PathBuf::from(devices::EVENT_LOG_PATH),
        }
    }
}

impl DetectionSettings {
    /// Check the sensor grid, working resolution and area breakpoints
    pub fn validate(&self) -> Result<()> {
        let d = self;

        if d.frame_rows == 0 || d.frame_cols == 0 {
            return Err(SkyguardError::invalid_config(
                "detection.frame_rows/frame_cols",
                "sensor grid must not be empty",
            ));
        }
        if d.upscale_height < d.frame_rows || d.upscale_width < d.frame_cols {
            return Err(SkyguardError::invalid_config(
                "detection.upscale_width/upscale_height",
                format!(
                    "working resolution {}x{} is smaller than the sensor grid {}x{}",
                    d.upscale_width, d.upscale_height, d.frame_cols, d.frame_rows
                ),
            ));
        }
        if !d.hot_threshold_celsius.is_finite() {
            return Err(SkyguardError::invalid_config(
                "detection.hot_threshold_celsius",
                "must be a finite temperature",
            ));
        }
        if !(d.moderate_area > 0.0 && d.moderate_area < d.severe_area && d.severe_area.is_finite()) {
            return Err(SkyguardError::invalid_config(
                "detection.moderate_area/severe_area",
                format!(
                    "need 0 < moderate_area < severe_area (got {} and {})",
                    d.moderate_area, d.severe_area
                ),
            ));
        }
        Ok(())
    }
}

impl ScriptDurations {
    pub fn mild_speaker(&self) -> Duration {
        Duration::from_millis(self.mild_speaker_ms)
    }

    pub fn moderate_hold(&self) -> Duration {
        Duration::from_millis(self.moderate_hold_ms)
    }

    pub fn severe_hold(&self) -> Duration {
        Duration::from_millis(self.severe_hold_ms)
    }

    pub fn evasive_settle(&self) -> Duration {
        Duration::from_millis(self.evasive_settle_ms)
    }
}

impl DeviceSettings {
    pub fn thermal_read_timeout(&self) -> Duration {
        Duration::from_millis(self.thermal_read_timeout_ms)
    }
}

impl ControlSettings {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }

    pub fn distance_timeout(&self) -> Duration {
        Duration::from_millis(self.distance_timeout_ms)
    }
}

impl SkyguardConfig {
    /// Check every value the controller relies on
    pub fn validate(&self) -> Result<()> {
        self.detection.validate()?;

        let p = &self.pins;
        let all = [p.trigger, p.echo, p.light, p.speaker, p.rain];
        let unique: HashSet<u32> = all.iter().copied().collect();
        if unique.len() != all.len() {
            return Err(SkyguardError::invalid_config("pins", "pin assignments must be distinct"));
        }

        if self.control.period_ms < control::MIN_PERIOD_MS {
            return Err(SkyguardError::invalid_config(
                "control.period_ms",
                format!("must be at least {} ms", control::MIN_PERIOD_MS),
            ));
        }
        if self.control.distance_timeout_ms == 0 {
            return Err(SkyguardError::invalid_config("control.distance_timeout_ms", "must be non-zero"));
        }
        if self.devices.thermal_read_timeout_ms == 0 {
            return Err(SkyguardError::invalid_config("devices.thermal_read_timeout_ms", "must be non-zero"));
        }

        for (field, baud) in [
            ("devices.vehicle_baud", self.devices.vehicle_baud),
            ("devices.alert_baud", self.devices.alert_baud),
        ] {
            if !devices::SUPPORTED_BAUD_RATES.contains(&baud) {
                return Err(SkyguardError::invalid_config(field, format!("unsupported baud rate {}", baud)));
            }
        }

        Ok(())
    }
}

/// Resolve which configuration file to use
///
/// Order: explicit path, `SKYGUARD_CONFIG`, the system file if it exists,
/// then the per-user file. Returns None when nothing applies.
pub fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Ok(env_path) = std::env::var(paths::CONFIG_ENV) {
        if !env_path.is_empty() {
            return Some(PathBuf::from(env_path));
        }
    }
    let system = PathBuf::from(paths::SYSTEM_CONFIG);
    if system.exists() {
        return Some(system);
    }
    paths::user_config_file()
}

/// Load and validate a configuration file
///
/// A missing file yields the defaults.
pub fn load_config(path: &Path) -> Result<SkyguardConfig> {
    if !path.exists() {
        tracing::info!("No configuration at {:?}, using defaults", path);
        let config = SkyguardConfig::default();
        config.validate()?;
        return Ok(config);
    }

    let content = fs::read_to_string(path).map_err(|e| SkyguardError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    let config: SkyguardConfig = serde_json::from_str(&content)
        .map_err(|e| SkyguardError::config(format!("Failed to parse {:?}: {}", path, e)))?;

    config.validate()?;
    Ok(config)
}

/// Write a configuration file atomically (temp file then rename)
pub fn save_config(path: &Path, config: &SkyguardConfig) -> Result<()> {
    use std::io::Write;

    config.validate()?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| SkyguardError::FileWrite {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
    }

    let json = serde_json::to_string_pretty(config)?;
    let temp_path = path.with_extension("json.tmp");

    let write = |p: &Path| -> std::io::Result<()> {
        let mut file = fs::File::create(p)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()
    };
    write(&temp_path).map_err(|e| SkyguardError::FileWrite {
        path: temp_path.clone(),
        source: e,
    })?;

    fs::rename(&temp_path, path).map_err(|e| SkyguardError::FileWrite {
        path: path.to_path_buf(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_are_valid() {
        let config = SkyguardConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.detection.frame_rows * config.detection.frame_cols, 768);
        assert_eq!(config.control.period(), Duration::from_millis(500));
        assert_eq!(config.pins.light, 18);
    }

    #[test]
    fn test_partial_document_fills_defaults() {
        let json = r#"{ "detection": { "hot_threshold_celsius": 30.5 }, "control": { "period_ms": 250 } }"#;
        let config: SkyguardConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.detection.hot_threshold_celsius, 30.5);
        assert_eq!(config.detection.severe_area, 150.0);
        assert_eq!(config.control.period_ms, 250);
        assert_eq!(config.control.distance_timeout_ms, 40);
        assert_eq!(config.devices.alert_baud, 9600);
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let json = r#"{ "detection": { "hot_threshold": 30.0 } }"#;
        assert!(serde_json::from_str::<SkyguardConfig>(json).is_err());

        let json = r#"{ "extras": {} }"#;
        assert!(serde_json::from_str::<SkyguardConfig>(json).is_err());
    }

    #[test]
    fn test_validation_failures() {
        let mut config = SkyguardConfig::default();
        config.detection.moderate_area = 200.0;
        assert!(matches!(config.validate(), Err(SkyguardError::InvalidConfig { .. })));

        let mut config = SkyguardConfig::default();
        config.pins.speaker = config.pins.light;
        assert!(config.validate().is_err());

        let mut config = SkyguardConfig::default();
        config.control.period_ms = 10;
        assert!(config.validate().is_err());

        let mut config = SkyguardConfig::default();
        config.devices.alert_baud = 12345;
        assert!(config.validate().is_err());

        let mut config = SkyguardConfig::default();
        config.detection.upscale_width = 16;
        assert!(config.validate().is_err());

        let mut config = SkyguardConfig::default();
        config.detection.hot_threshold_celsius = f32::NAN;
        assert!(config.validate().is_err());

        let mut config = SkyguardConfig::default();
        config.devices.thermal_read_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = SkyguardConfig::default();
        config.script.severe_hold_ms = 3000;
        config.devices.event_log_path = dir.path().join("events.csv");
        save_config(&path, &config).unwrap();

        let loaded = load_config(&path).unwrap();
        assert_eq!(loaded, config);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let loaded = load_config(&dir.path().join("absent.json")).unwrap();
        assert_eq!(loaded, SkyguardConfig::default());
    }

    #[test]
    fn test_load_invalid_values_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "detection": { "moderate_area": 0.0 } }"#).unwrap();
        assert!(load_config(&path).is_err());

        fs::write(&path, "not json").unwrap();
        assert!(matches!(load_config(&path), Err(SkyguardError::Config(_))));
    }

    #[test]
    #[serial]
    fn test_resolve_prefers_explicit_then_env() {
        let explicit = PathBuf::from("/tmp/explicit.json");
        std::env::set_var(paths::CONFIG_ENV, "/tmp/from_env.json");

        assert_eq!(resolve_config_path(Some(&explicit)), Some(explicit.clone()));
        assert_eq!(resolve_config_path(None), Some(PathBuf::from("/tmp/from_env.json")));

        std::env::remove_var(paths::CONFIG_ENV);
    }
}
