//! Control Loop
//!
//! Fixed-period polling: read the environment, capture a thermal frame,
//! classify it and, for a real threat, run the deterrent script and record
//! the event.
//!
//! # Safety Features
//! - **Iteration isolation**: sensor and frame errors skip one iteration and
//!   never stop the loop
//! - **Error counting**: consecutive failures are counted; the first and every
//!   tenth are logged at error level
//! - **Guaranteed OFF**: actuators are forced off before the first iteration
//!   and on every exit from [`ControlLoop::run`]

use std::time::{Duration, Instant};

use chrono::Local;
use sg_error::Result;
use tracing::{debug, error, info, warn};

use super::classifier::ThreatClassifier;
use super::deterrent::{DeterrentStateMachine, ExecutionReport, ScriptOutputs};
use super::shutdown::Shutdown;
use crate::config::SkyguardConfig;
use crate::constants::control::ERROR_LOG_EVERY;
use crate::data::{ActuatorPin, EnvironmentContext, Severity};
use crate::dispatch::{AlertDispatcher, EvasiveDispatcher};
use crate::hw::{Actuator, AlertTransport, DistanceSensor, EventSink, RainSensor, ThermalSensor, VehicleLink};
use crate::recorder::EventRecorder;

/// The external collaborators one loop owns
pub struct Collaborators {
    pub distance: Box<dyn DistanceSensor>,
    pub thermal: Box<dyn ThermalSensor>,
    pub rain: Box<dyn RainSensor>,
    pub actuator: Box<dyn Actuator>,
    pub vehicle: Box<dyn VehicleLink>,
    pub alert: Box<dyn AlertTransport>,
    pub sink: Box<dyn EventSink>,
}

/// Result of one successful iteration
#[derive(Debug, Clone, PartialEq)]
pub struct IterationOutcome {
    pub severity: Severity,
    pub environment: EnvironmentContext,
    /// Present whenever a deterrent script ran
    pub report: Option<ExecutionReport>,
    /// An event record reached the sink
    pub recorded: bool,
}

pub struct ControlLoop {
    classifier: ThreatClassifier,
    deterrent: DeterrentStateMachine,
    distance: Box<dyn DistanceSensor>,
    thermal: Box<dyn ThermalSensor>,
    rain: Box<dyn RainSensor>,
    actuator: Box<dyn Actuator>,
    evasive: EvasiveDispatcher,
    alert: AlertDispatcher,
    recorder: EventRecorder,
    period: Duration,
    shutdown: Shutdown,
    consecutive_errors: u32,
    iterations: u64,
}

impl ControlLoop {
    pub fn new(config: &SkyguardConfig, collaborators: Collaborators, shutdown: Shutdown) -> Result<Self> {
        let Collaborators {
            distance,
            thermal,
            rain,
            actuator,
            vehicle,
            alert,
            sink,
        } = collaborators;

        Ok(Self {
            classifier: ThreatClassifier::new(config.detection.clone())?,
            deterrent: DeterrentStateMachine::new(config.script),
            distance,
            thermal,
            rain,
            actuator,
            evasive: EvasiveDispatcher::new(vehicle, config.script.evasive_settle()),
            alert: AlertDispatcher::new(alert),
            recorder: EventRecorder::new(sink),
            period: config.control.period(),
            shutdown,
            consecutive_errors: 0,
            iterations: 0,
        })
    }

    pub fn consecutive_errors(&self) -> u32 {
        self.consecutive_errors
    }

    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    /// Poll the rain and distance sensors
    ///
    /// A distance failure leaves the distance unknown for this iteration; a
    /// rain failure fails the iteration, since the script depends on it.
    fn read_environment(&mut self) -> Result<EnvironmentContext> {
        let is_raining = self.rain.is_raining()?;
        let distance_cm = match self.distance.read_cm() {
            Ok(cm) => Some(cm),
            Err(e) => {
                debug!("Distance unavailable this iteration: {}", e);
                None
            }
        };
        Ok(EnvironmentContext::new(distance_cm, is_raining))
    }

    /// One full poll → classify → act → record cycle
    pub fn run_iteration(&mut self) -> Result<IterationOutcome> {
        self.iterations += 1;

        let environment = self.read_environment()?;
        let samples = self.thermal.read_frame()?;
        let severity = self.classifier.classify_samples(samples)?;

        let distance = environment
            .distance_cm
            .map(|cm| format!("{:.2}", cm))
            .unwrap_or_else(|| "n/a".to_string());
        info!(
            "Threat: {} | Distance: {} cm | Rain: {}",
            severity, distance, environment.is_raining
        );

        let mut outcome = IterationOutcome {
            severity,
            environment,
            report: None,
            recorded: false,
        };
        if !severity.is_threat() {
            return Ok(outcome);
        }

        let now = Local::now();
        let script = self.deterrent.decide(severity, &environment, now);
        let report = self.deterrent.execute(
            &script,
            ScriptOutputs {
                actuator: self.actuator.as_mut(),
                evasive: &mut self.evasive,
                alert: &mut self.alert,
            },
            &self.shutdown,
        );
        for (kind, e) in &report.failures {
            warn!("Deterrent {:?} dispatch failed: {}", kind, e);
        }
        outcome.report = Some(report);

        match self.recorder.record(severity, &environment, now) {
            Ok(record) => outcome.recorded = record.is_some(),
            Err(e) => error!("Failed to record event: {}", e),
        }

        Ok(outcome)
    }

    /// Run until shutdown is requested
    pub fn run(&mut self) {
        info!("Control loop starting (period {:?})", self.period);
        self.force_outputs_off();

        while !self.shutdown.is_requested() {
            let started = Instant::now();

            match self.run_iteration() {
                Ok(_) => {
                    if self.consecutive_errors > 0 {
                        debug!("Control loop recovered after {} errors", self.consecutive_errors);
                        self.consecutive_errors = 0;
                    }
                }
                Err(e) => {
                    self.consecutive_errors += 1;
                    if self.consecutive_errors == 1 || self.consecutive_errors % ERROR_LOG_EVERY == 0 {
                        error!("Iteration skipped (count: {}): {}", self.consecutive_errors, e);
                    } else {
                        debug!("Iteration skipped (count: {}): {}", self.consecutive_errors, e);
                    }
                }
            }

            let elapsed = started.elapsed();
            if elapsed < self.period {
                self.shutdown.sleep(self.period - elapsed);
            } else {
                debug!("Iteration overran period by {:?}", elapsed - self.period);
            }
        }

        info!("Control loop shutting down");
        self.shutdown();
    }

    fn force_outputs_off(&mut self) {
        for pin in ActuatorPin::ALL {
            self.actuator.set(pin, false);
        }
    }

    /// Force every actuator off and flush the event log
    pub fn shutdown(&mut self) {
        self.force_outputs_off();
        if let Err(e) = self.recorder.flush() {
            error!("Failed to flush event log: {}", e);
        }
        info!("Control loop stopped after {} iterations", self.iterations);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScriptDurations;
    use crate::hw::{
        MockActuator, MockAlertTransport, MockDistanceSensor, MockEventSink, MockRainSensor,
        MockThermalSensor, MockVehicleLink,
    };
    use sg_error::{SensorError, SkyguardError};

    fn test_config() -> SkyguardConfig {
        let mut config = SkyguardConfig::default();
        config.script = ScriptDurations {
            mild_speaker_ms: 0,
            moderate_hold_ms: 0,
            severe_hold_ms: 0,
            evasive_settle_ms: 0,
        };
        config.control.period_ms = 50;
        config
    }

    /// Mocks that accept any call; individual tests tighten the ones they need
    fn quiet_collaborators() -> Collaborators {
        let mut distance = MockDistanceSensor::new();
        distance.expect_read_cm().returning(|| Ok(100.0));
        let mut thermal = MockThermalSensor::new();
        thermal.expect_read_frame().returning(|| Ok(vec![20.0; 768]));
        let mut rain = MockRainSensor::new();
        rain.expect_is_raining().returning(|| Ok(false));
        let mut actuator = MockActuator::new();
        actuator.expect_set().return_const(());
        let mut sink = MockEventSink::new();
        sink.expect_append().returning(|_| Ok(()));
        sink.expect_flush().returning(|| Ok(()));

        Collaborators {
            distance: Box::new(distance),
            thermal: Box::new(thermal),
            rain: Box::new(rain),
            actuator: Box::new(actuator),
            vehicle: Box::new(MockVehicleLink::new()),
            alert: Box::new(MockAlertTransport::new()),
            sink: Box::new(sink),
        }
    }

    #[test]
    fn test_quiet_iteration_records_nothing() {
        let mut collaborators = quiet_collaborators();
        let mut sink = MockEventSink::new();
        sink.expect_append().times(0);
        collaborators.sink = Box::new(sink);

        let mut control = ControlLoop::new(&test_config(), collaborators, Shutdown::new()).unwrap();
        let outcome = control.run_iteration().unwrap();
        assert_eq!(outcome.severity, Severity::None);
        assert_eq!(outcome.environment, EnvironmentContext::new(Some(100.0), false));
        assert!(outcome.report.is_none());
        assert!(!outcome.recorded);
    }

    #[test]
    fn test_distance_failure_is_not_fatal() {
        let mut collaborators = quiet_collaborators();
        let mut distance = MockDistanceSensor::new();
        distance
            .expect_read_cm()
            .returning(|| Err(SensorError::Timeout { sensor: "distance", timeout_ms: 40 }));
        collaborators.distance = Box::new(distance);

        let mut control = ControlLoop::new(&test_config(), collaborators, Shutdown::new()).unwrap();
        let outcome = control.run_iteration().unwrap();
        assert_eq!(outcome.environment.distance_cm, None);
    }

    #[test]
    fn test_thermal_failure_skips_iteration() {
        let mut collaborators = quiet_collaborators();
        let mut thermal = MockThermalSensor::new();
        thermal
            .expect_read_frame()
            .returning(|| Err(SensorError::read("thermal", "frame source closed")));
        collaborators.thermal = Box::new(thermal);

        let mut control = ControlLoop::new(&test_config(), collaborators, Shutdown::new()).unwrap();
        let err = control.run_iteration().unwrap_err();
        assert!(matches!(err, SkyguardError::Sensor(_)));
        assert!(err.is_transient());
    }

    #[test]
    fn test_short_frame_is_input_error() {
        let mut collaborators = quiet_collaborators();
        let mut thermal = MockThermalSensor::new();
        thermal.expect_read_frame().returning(|| Ok(vec![20.0; 100]));
        collaborators.thermal = Box::new(thermal);

        let mut control = ControlLoop::new(&test_config(), collaborators, Shutdown::new()).unwrap();
        assert!(matches!(control.run_iteration(), Err(SkyguardError::Input(_))));
    }

    #[test]
    fn test_mild_threat_runs_speaker_only() {
        let mut collaborators = quiet_collaborators();
        let mut thermal = MockThermalSensor::new();
        thermal.expect_read_frame().returning(|| {
            let mut frame = vec![20.0; 768];
            frame[10 * 32 + 14] = 40.0;
            Ok(frame)
        });
        collaborators.thermal = Box::new(thermal);

        let mut control = ControlLoop::new(&test_config(), collaborators, Shutdown::new()).unwrap();
        let outcome = control.run_iteration().unwrap();
        assert_eq!(outcome.severity, Severity::Mild);
        assert!(outcome.recorded);
        let report = outcome.report.unwrap();
        assert_eq!(
            report.actuator_ops,
            vec![(ActuatorPin::Speaker, true), (ActuatorPin::Speaker, false)]
        );
    }

    #[test]
    fn test_run_stops_on_shutdown_and_forces_off() {
        let shutdown = Shutdown::new();
        let mut collaborators = quiet_collaborators();

        let mut actuator = MockActuator::new();
        // Start-up off, shutdown off
        actuator.expect_set().withf(|_, on| !*on).times(4).return_const(());
        collaborators.actuator = Box::new(actuator);

        let mut sink = MockEventSink::new();
        sink.expect_flush().times(1).returning(|| Ok(()));
        collaborators.sink = Box::new(sink);

        let trigger = shutdown.clone();
        let mut thermal = MockThermalSensor::new();
        thermal.expect_read_frame().returning(move || {
            trigger.request();
            Ok(vec![20.0; 768])
        });
        collaborators.thermal = Box::new(thermal);

        let mut control = ControlLoop::new(&test_config(), collaborators, shutdown).unwrap();
        control.run();
        assert_eq!(control.iterations(), 1);
    }

    #[test]
    fn test_errors_are_counted_and_reset() {
        let shutdown = Shutdown::new();
        let mut collaborators = quiet_collaborators();

        let trigger = shutdown.clone();
        let mut calls = 0u32;
        let mut rain = MockRainSensor::new();
        rain.expect_is_raining().returning(move || {
            calls += 1;
            if calls >= 3 {
                trigger.request();
            }
            Err(SensorError::read("rain", "gpio value unreadable"))
        });
        collaborators.rain = Box::new(rain);

        let mut config = test_config();
        config.control.period_ms = 1;
        let mut control = ControlLoop::new(&config, collaborators, shutdown).unwrap();
        control.run();
        assert_eq!(control.consecutive_errors(), 3);
        assert_eq!(control.iterations(), 3);
    }
}
