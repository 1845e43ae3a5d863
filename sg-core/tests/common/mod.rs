//! In-memory collaborators shared by the integration tests
//!
//! Every fake writes into one shared [`Trace`] so a test can assert on the
//! exact interleaving of actuator writes, dispatches and records.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use sg_core::hw::{
    Actuator, AlertTransport, DistanceSensor, EventSink, RainSensor, ThermalSensor, VehicleLink,
};
use sg_core::{
    Ack, ActuatorPin, Collaborators, DispatchError, EventRecord, ScriptDurations, SensorError,
    SkyguardConfig, VehicleCommand,
};

pub const COLD: f32 = 20.0;
pub const HOT: f32 = 40.0;

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Set(ActuatorPin, bool),
    Evasive(VehicleCommand),
    Alert(String),
    Record(EventRecord),
    Flush,
}

#[derive(Debug, Clone, Default)]
pub struct Trace(Arc<Mutex<Vec<Event>>>);

impl Trace {
    pub fn push(&self, event: Event) {
        self.0.lock().unwrap().push(event);
    }

    pub fn events(&self) -> Vec<Event> {
        self.0.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }

    pub fn records(&self) -> Vec<EventRecord> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Record(r) => Some(r),
                _ => None,
            })
            .collect()
    }

    /// Everything except the flush markers
    pub fn actions(&self) -> Vec<Event> {
        self.events()
            .into_iter()
            .filter(|e| !matches!(e, Event::Record(_) | Event::Flush))
            .collect()
    }
}

// ============================================================================
// Frames
// ============================================================================

/// 24x32 frame, all cold
pub fn cold_frame() -> Vec<f32> {
    vec![COLD; 24 * 32]
}

/// 24x32 frame with a hot square of `side` raw pixels at (row, col)
pub fn frame_with_blob(row: usize, col: usize, side: usize) -> Vec<f32> {
    let mut samples = cold_frame();
    for r in row..row + side {
        for c in col..col + side {
            samples[r * 32 + c] = HOT;
        }
    }
    samples
}

/// A blob large enough to classify as Severe
pub fn severe_frame() -> Vec<f32> {
    frame_with_blob(8, 12, 4)
}

// ============================================================================
// Fakes
// ============================================================================

pub struct FakeDistance(pub Result<f64, SensorError>);

impl DistanceSensor for FakeDistance {
    fn read_cm(&mut self) -> Result<f64, SensorError> {
        self.0.clone()
    }
}

/// Plays back frames in order, repeating the last one
pub struct FakeThermal {
    frames: Vec<Result<Vec<f32>, SensorError>>,
    next: usize,
}

impl FakeThermal {
    pub fn new(frames: Vec<Result<Vec<f32>, SensorError>>) -> Self {
        Self { frames, next: 0 }
    }

    pub fn fixed(frame: Vec<f32>) -> Self {
        Self::new(vec![Ok(frame)])
    }
}

impl ThermalSensor for FakeThermal {
    fn read_frame(&mut self) -> Result<Vec<f32>, SensorError> {
        let index = self.next.min(self.frames.len() - 1);
        self.next += 1;
        self.frames[index].clone()
    }
}

pub struct FakeRain(pub Result<bool, SensorError>);

impl RainSensor for FakeRain {
    fn is_raining(&mut self) -> Result<bool, SensorError> {
        self.0.clone()
    }
}

pub struct FakeActuator(pub Trace);

impl Actuator for FakeActuator {
    fn set(&mut self, pin: ActuatorPin, on: bool) {
        self.0.push(Event::Set(pin, on));
    }
}

pub struct FakeVehicle {
    pub trace: Trace,
    pub fail: Option<DispatchError>,
    pub seq: u8,
}

impl VehicleLink for FakeVehicle {
    fn send_command(&mut self, command: &VehicleCommand) -> Result<Ack, DispatchError> {
        self.trace.push(Event::Evasive(*command));
        if let Some(e) = &self.fail {
            return Err(e.clone());
        }
        let sequence = self.seq;
        self.seq = self.seq.wrapping_add(1);
        Ok(Ack { target_system: 1, target_component: 1, sequence })
    }
}

pub struct FakeAlert {
    pub trace: Trace,
    pub fail: Option<DispatchError>,
}

impl AlertTransport for FakeAlert {
    fn send(&mut self, payload: &[u8]) -> Result<(), DispatchError> {
        self.trace.push(Event::Alert(String::from_utf8_lossy(payload).into_owned()));
        match &self.fail {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }
}

pub struct FakeSink(pub Trace);

impl EventSink for FakeSink {
    fn append(&mut self, record: &EventRecord) -> sg_core::Result<()> {
        self.0.push(Event::Record(record.clone()));
        Ok(())
    }

    fn flush(&mut self) -> sg_core::Result<()> {
        self.0.push(Event::Flush);
        Ok(())
    }
}

// ============================================================================
// Harness
// ============================================================================

/// Scene description for one test
pub struct Scene {
    pub frames: Vec<Result<Vec<f32>, SensorError>>,
    pub distance: Result<f64, SensorError>,
    pub raining: Result<bool, SensorError>,
    pub vehicle_fail: Option<DispatchError>,
    pub alert_fail: Option<DispatchError>,
}

impl Default for Scene {
    fn default() -> Self {
        Self {
            frames: vec![Ok(cold_frame())],
            distance: Ok(120.0),
            raining: Ok(false),
            vehicle_fail: None,
            alert_fail: None,
        }
    }
}

impl Scene {
    pub fn collaborators(self, trace: &Trace) -> Collaborators {
        Collaborators {
            distance: Box::new(FakeDistance(self.distance)),
            thermal: Box::new(FakeThermal::new(self.frames)),
            rain: Box::new(FakeRain(self.raining)),
            actuator: Box::new(FakeActuator(trace.clone())),
            vehicle: Box::new(FakeVehicle {
                trace: trace.clone(),
                fail: self.vehicle_fail,
                seq: 0,
            }),
            alert: Box::new(FakeAlert {
                trace: trace.clone(),
                fail: self.alert_fail,
            }),
            sink: Box::new(FakeSink(trace.clone())),
        }
    }
}

/// Default configuration with every delay shrunk to keep tests fast
pub fn fast_config() -> SkyguardConfig {
    let mut config = SkyguardConfig::default();
    config.script = ScriptDurations {
        mild_speaker_ms: 1,
        moderate_hold_ms: 1,
        severe_hold_ms: 1,
        evasive_settle_ms: 0,
    };
    config.control.period_ms = 50;
    config
}
