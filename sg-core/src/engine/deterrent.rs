//! Deterrent state machine
//!
//! `decide` maps a severity and the environment to a fixed, ordered script;
//! `execute` runs it against the actuator and dispatchers.
//!
//! # Safety Features
//! - **Guaranteed OFF**: an [`ActuatorGuard`] owns the actuator for the whole
//!   script and switches everything off on every exit path, panics included
//! - **Failure isolation**: dispatch failures are collected in the
//!   [`ExecutionReport`] and never interrupt the script
//! - **Cancellable holds**: a shutdown request cuts a hold short and skips
//!   every remaining step except the OFF writes

use chrono::{DateTime, Local};
use sg_error::DispatchError;
use tracing::{debug, warn};

use super::shutdown::Shutdown;
use crate::config::ScriptDurations;
use crate::data::{Ack, ActuatorPin, DeterrentAction, EnvironmentContext, Severity};
use crate::dispatch::{AlertDispatcher, EvasiveDispatcher};
use crate::hw::Actuator;

/// Which dispatcher a failure came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchKind {
    Evasive,
    Alert,
}

/// What one script execution actually did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionReport {
    /// Every actuator write, in order, including the guard's cleanup
    pub actuator_ops: Vec<(ActuatorPin, bool)>,
    /// Dispatch failures, in order
    pub failures: Vec<(DispatchKind, DispatchError)>,
    pub ack: Option<Ack>,
    pub alert_sent: bool,
    /// A shutdown request cut the script short
    pub cancelled: bool,
}

impl ExecutionReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && !self.cancelled
    }
}

/// Everything a script acts on
pub struct ScriptOutputs<'a> {
    pub actuator: &'a mut dyn Actuator,
    pub evasive: &'a mut EvasiveDispatcher,
    pub alert: &'a mut AlertDispatcher,
}

// ============================================================================
// Actuator guard
// ============================================================================

/// Scoped owner of the actuator during a script
///
/// `finish` switches off whatever the script left on. Dropping an unfinished
/// guard forces every pin off.
pub struct ActuatorGuard<'a> {
    actuator: &'a mut dyn Actuator,
    on: [bool; 2],
    ops: Vec<(ActuatorPin, bool)>,
    finished: bool,
}

impl<'a> ActuatorGuard<'a> {
    pub fn new(actuator: &'a mut dyn Actuator) -> Self {
        Self {
            actuator,
            on: [false; 2],
            ops: Vec::new(),
            finished: false,
        }
    }

    fn slot(pin: ActuatorPin) -> usize {
        match pin {
            ActuatorPin::Light => 0,
            ActuatorPin::Speaker => 1,
        }
    }

    pub fn set(&mut self, pin: ActuatorPin, on: bool) {
        self.actuator.set(pin, on);
        self.on[Self::slot(pin)] = on;
        self.ops.push((pin, on));
    }

    pub fn is_on(&self, pin: ActuatorPin) -> bool {
        self.on[Self::slot(pin)]
    }

    /// Switch off anything still on and hand back the write log
    pub fn finish(mut self) -> Vec<(ActuatorPin, bool)> {
        for pin in ActuatorPin::ALL {
            if self.is_on(pin) {
                self.set(pin, false);
            }
        }
        self.finished = true;
        std::mem::take(&mut self.ops)
    }
}

impl Drop for ActuatorGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            warn!("Deterrent script aborted, forcing actuators off");
            for pin in ActuatorPin::ALL {
                self.actuator.set(pin, false);
            }
        }
    }
}

// ============================================================================
// State machine
// ============================================================================

/// Stateless mapping from severity to deterrent script
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeterrentStateMachine {
    durations: ScriptDurations,
}

impl DeterrentStateMachine {
    pub fn new(durations: ScriptDurations) -> Self {
        Self { durations }
    }

    /// The script for `severity`; `now` stamps the alert text
    pub fn decide(
        &self,
        severity: Severity,
        env: &EnvironmentContext,
        now: DateTime<Local>,
    ) -> Vec<DeterrentAction> {
        use DeterrentAction::*;

        let light = !env.is_raining;
        let mut script = Vec::new();

        match severity {
            Severity::None => {}
            Severity::Mild => {
                script.push(Speaker(true));
                script.push(Hold(self.durations.mild_speaker()));
                script.push(Speaker(false));
            }
            Severity::Moderate => {
                if light {
                    script.push(Light(true));
                }
                script.push(Speaker(true));
                script.push(Hold(self.durations.moderate_hold()));
                if light {
                    script.push(Light(false));
                }
                script.push(Speaker(false));
            }
            Severity::Severe => {
                if light {
                    script.push(Light(true));
                }
                script.push(Speaker(true));
                script.push(IssueEvasiveCommand);
                script.push(SendAlert(AlertDispatcher::format_message(now)));
                script.push(Hold(self.durations.severe_hold()));
                if light {
                    script.push(Light(false));
                }
                script.push(Speaker(false));
            }
        }

        script
    }

    /// Run a script to completion; never fails
    pub fn execute(
        &self,
        actions: &[DeterrentAction],
        outputs: ScriptOutputs<'_>,
        shutdown: &Shutdown,
    ) -> ExecutionReport {
        let ScriptOutputs { actuator, evasive, alert } = outputs;
        let mut guard = ActuatorGuard::new(actuator);
        let mut report = ExecutionReport::default();

        for action in actions {
            if report.cancelled {
                // Only OFF writes survive a cancellation
                if let Some((pin, false)) = action.actuator_op() {
                    guard.set(pin, false);
                }
                continue;
            }

            match action {
                DeterrentAction::Light(on) => guard.set(ActuatorPin::Light, *on),
                DeterrentAction::Speaker(on) => guard.set(ActuatorPin::Speaker, *on),
                DeterrentAction::IssueEvasiveCommand => {
                    match evasive.issue_evasive_command(shutdown) {
                        Ok(ack) => report.ack = Some(ack),
                        Err(e) => report.failures.push((DispatchKind::Evasive, e)),
                    }
                    if shutdown.is_requested() {
                        report.cancelled = true;
                    }
                }
                DeterrentAction::SendAlert(message) => match alert.send_alert(message) {
                    Ok(()) => report.alert_sent = true,
                    Err(e) => report.failures.push((DispatchKind::Alert, e)),
                },
                DeterrentAction::Hold(duration) => {
                    if !shutdown.sleep(*duration) {
                        debug!("Deterrent hold interrupted by shutdown");
                        report.cancelled = true;
                    }
                }
            }
        }

        report.actuator_ops = guard.finish();
        report
    }
}
