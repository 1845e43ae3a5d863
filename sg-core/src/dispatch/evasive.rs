//! Evasive command dispatcher
//!
//! Sends the fixed speed-change command once and waits for the vehicle to
//! settle. Failures are reported to the caller, never retried. The settle
//! wait ends early on shutdown.

use std::time::Duration;

use sg_error::DispatchError;
use tracing::{debug, info, warn};

use crate::data::{Ack, VehicleCommand};
use crate::engine::Shutdown;
use crate::hw::VehicleLink;

pub struct EvasiveDispatcher {
    link: Box<dyn VehicleLink>,
    settle: Duration,
}

impl EvasiveDispatcher {
    pub fn new(link: Box<dyn VehicleLink>, settle: Duration) -> Self {
        Self { link, settle }
    }

    /// Send the evasive maneuver; the settle delay follows both success and
    /// failure so the deterrent script keeps its timing
    pub fn issue_evasive_command(&mut self, shutdown: &Shutdown) -> Result<Ack, DispatchError> {
        let command = VehicleCommand::evasive();
        info!("Sending evasive maneuver to vehicle");

        let result = self.link.send_command(&command);
        match &result {
            Ok(ack) => info!(
                target_system = ack.target_system,
                target_component = ack.target_component,
                seq = ack.sequence,
                "Evasive command sent"
            ),
            Err(e) => warn!("Evasive command failed: {}", e),
        }

        if !shutdown.sleep(self.settle) {
            debug!("Evasive settle interrupted by shutdown");
        }
        result
    }
}
