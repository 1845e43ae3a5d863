//! Alert dispatcher
//!
//! Formats the operator alert and makes one delivery attempt. A failed
//! attempt is returned to the caller and logged; it is never fatal.

use chrono::{DateTime, Local};
use sg_error::DispatchError;
use tracing::{info, warn};

use crate::constants::event_log::ALERT_TIME_FORMAT;
use crate::hw::AlertTransport;

pub struct AlertDispatcher {
    transport: Box<dyn AlertTransport>,
}

impl AlertDispatcher {
    pub fn new(transport: Box<dyn AlertTransport>) -> Self {
        Self { transport }
    }

    /// Alert text for a threat seen at `at`
    pub fn format_message(at: DateTime<Local>) -> String {
        format!("ALERT: Bird Attack at {}", at.format(ALERT_TIME_FORMAT))
    }

    /// One best-effort delivery attempt
    pub fn send_alert(&mut self, message: &str) -> Result<(), DispatchError> {
        match self.transport.send(message.as_bytes()) {
            Ok(()) => {
                info!("Alert delivered: {}", message);
                Ok(())
            }
            Err(e) => {
                warn!("Alert transport not responding: {}", e);
                Err(e)
            }
        }
    }
}
