//! SkyGuard Daemon (skyguardd)
//!
//! Runs the deterrence control loop on the installation host.
//!
//! # Lifecycle
//! - **Startup**: parse arguments, initialise logging, load and validate the
//!   configuration, open every device. Any failure here ends the process.
//! - **Run**: the control loop polls sensors at a fixed period until a
//!   SIGINT/SIGTERM arrives.
//! - **Shutdown**: the signal handler only sets the shutdown flag; the loop
//!   unwinds, switches every actuator off and flushes the event log. GPIO
//!   pins are unexported when their handles drop.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use sg_core::hw::{
    CsvEventSink, FrameFileSource, GpioRainSensor, MavlinkLink, SerialAlertTransport, SysfsGpio,
    UltrasonicRanger,
};
use sg_core::{load_config, resolve_config_path, Collaborators, ControlLoop, Shutdown, SkyguardConfig};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Environment variable holding the log filter
const LOG_ENV: &str = "SKYGUARD_LOG";

const JOURNALD_SOCKET: &str = "/run/systemd/journal/socket";

// ============================================================================
// CLI
// ============================================================================

#[derive(Debug, Default, PartialEq)]
struct Options {
    config: Option<PathBuf>,
    check_config: bool,
}

#[derive(Debug, PartialEq)]
enum Command {
    Run(Options),
    Help,
    Version,
}

fn parse_args(args: &[String]) -> std::result::Result<Command, String> {
    let mut options = Options::default();
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-h" | "--help" => return Ok(Command::Help),
            "-v" | "--version" => return Ok(Command::Version),
            "--check-config" => options.check_config = true,
            "-c" | "--config" => {
                let path = iter
                    .next()
                    .ok_or_else(|| format!("{} requires a path argument", arg))?;
                options.config = Some(PathBuf::from(path));
            }
            other => return Err(format!("Unknown argument: {}", other)),
        }
    }

    Ok(Command::Run(options))
}

fn print_help() {
    eprintln!("skyguardd {} - SkyGuard threat deterrence controller", VERSION);
    eprintln!();
    eprintln!("USAGE:");
    eprintln!("    skyguardd [OPTIONS]");
    eprintln!();
    eprintln!("OPTIONS:");
    eprintln!("    -c, --config PATH   Configuration file (default /etc/skyguard/config.json)");
    eprintln!("        --check-config  Validate the configuration, print it and exit");
    eprintln!("    -v, --version       Print version");
    eprintln!("    -h, --help          Print this help");
    eprintln!();
    eprintln!("ENVIRONMENT:");
    eprintln!("    SKYGUARD_CONFIG     Configuration file path");
    eprintln!("    SKYGUARD_LOG        Log level (trace, debug, info, warn, error)");
}

// ============================================================================
// Logging
// ============================================================================

/// Journald when the journal socket exists, stdout otherwise.
/// Returns whether journald is in use.
fn init_logging(log_level: &str) -> bool {
    if std::path::Path::new(JOURNALD_SOCKET).exists() {
        match tracing_journald::layer() {
            Ok(journald_layer) => {
                use tracing_subscriber::prelude::*;
                tracing_subscriber::registry()
                    .with(journald_layer)
                    .with(tracing_subscriber::EnvFilter::new(log_level))
                    .init();
                return true;
            }
            Err(e) => {
                eprintln!("Failed to create journald layer: {}, falling back to stdout", e);
            }
        }
    }

    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_env_filter(log_level)
        .init();
    false
}

// ============================================================================
// Startup
// ============================================================================

fn check_privileges() {
    // SAFETY: geteuid only returns the process's effective user id
    let euid = unsafe { libc::geteuid() };
    if euid != 0 {
        warn!(
            "Running as uid {} - GPIO and serial access need the gpio/dialout groups",
            euid
        );
    }
}

/// Open every device the loop needs; any failure is fatal
fn open_collaborators(config: &SkyguardConfig) -> Result<Collaborators> {
    let devices = &config.devices;
    let root = devices.gpio_root.as_path();

    let thermal = FrameFileSource::open(&devices.thermal_frame_path, devices.thermal_read_timeout())
        .context("Thermal camera unavailable")?;
    let actuator = SysfsGpio::open(root, &config.pins).context("Failed to set up light/speaker GPIO")?;
    let rain = GpioRainSensor::open(root, &config.pins).context("Failed to set up rain sensor GPIO")?;
    let distance = UltrasonicRanger::open(root, &config.pins, &config.control)
        .context("Failed to set up ultrasonic ranger GPIO")?;

    info!("STARTUP: Connecting to vehicle on {:?}", devices.vehicle_port);
    let vehicle = MavlinkLink::open(devices)
        .with_context(|| format!("Failed to open vehicle link {:?}", devices.vehicle_port))?;
    let (system, component) = vehicle.targets();
    info!("STARTUP: Vehicle target system {} component {}", system, component);

    let sink = CsvEventSink::open(&devices.event_log_path)
        .with_context(|| format!("Failed to open event log {:?}", devices.event_log_path))?;

    Ok(Collaborators {
        distance: Box::new(distance),
        thermal: Box::new(thermal),
        rain: Box::new(rain),
        actuator: Box::new(actuator),
        vehicle: Box::new(vehicle),
        alert: Box::new(SerialAlertTransport::from_settings(devices)),
        sink: Box::new(sink),
    })
}

fn load(options: &Options) -> Result<SkyguardConfig> {
    match resolve_config_path(options.config.as_deref()) {
        Some(path) => {
            info!("STARTUP: Configuration {:?}", path);
            load_config(&path).with_context(|| format!("Invalid configuration {:?}", path))
        }
        None => {
            info!("STARTUP: No configuration file, using defaults");
            let config = SkyguardConfig::default();
            config.validate().context("Default configuration is invalid")?;
            Ok(config)
        }
    }
}

fn run(options: Options) -> Result<()> {
    // PHASE 1: Configuration
    let config = load(&options)?;
    if options.check_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    // PHASE 2: Privilege check (warn only; group membership may suffice)
    check_privileges();

    // PHASE 3: Devices
    let collaborators = open_collaborators(&config)?;

    // PHASE 4: Signal handling
    let shutdown = Shutdown::new();
    let handler_shutdown = shutdown.clone();
    ctrlc::set_handler(move || {
        handler_shutdown.request();
    })
    .context("Failed to install signal handler")?;

    // PHASE 5: Control loop (returns after shutdown with outputs off)
    let mut control = ControlLoop::new(&config, collaborators, shutdown)?;
    info!(
        "SkyGuard online (period {:?}, threshold {} C)",
        Duration::from_millis(config.control.period_ms),
        config.detection.hot_threshold_celsius
    );
    control.run();

    info!("SHUTDOWN: SkyGuard stopped");
    Ok(())
}

// ============================================================================
// Main Entry Point
// ============================================================================

fn main() {
    // PHASE 0: Log panics before unwinding runs the actuator guards
    std::panic::set_hook(Box::new(|panic_info| {
        let location = panic_info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown".to_string());

        let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };

        eprintln!("PANIC at {}: {}", location, message);
    }));

    let args: Vec<String> = std::env::args().skip(1).collect();
    let options = match parse_args(&args) {
        Ok(Command::Help) => {
            print_help();
            return;
        }
        Ok(Command::Version) => {
            println!("skyguardd {}", VERSION);
            return;
        }
        Ok(Command::Run(options)) => options,
        Err(e) => {
            eprintln!("Error: {}", e);
            print_help();
            std::process::exit(1);
        }
    };

    let log_level = std::env::var(LOG_ENV).unwrap_or_else(|_| "info".to_string());
    let journald = init_logging(&log_level);
    info!("STARTUP: skyguardd {} starting", VERSION);
    info!("STARTUP: Logging to {}", if journald { "systemd journal" } else { "stdout" });

    if let Err(e) = run(options) {
        error!("{:#}", e);
        std::process::exit(1);
    }
}
