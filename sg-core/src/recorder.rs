//! Event recorder
//!
//! Assembles the record for one classified threat and hands it to the sink.
//! Records are only produced for real threats; `Severity::None` is refused.

use chrono::{DateTime, Local};
use sg_error::Result;
use tracing::debug;

use crate::data::{EnvironmentContext, EventRecord, Severity};
use crate::hw::EventSink;

pub struct EventRecorder {
    sink: Box<dyn EventSink>,
}

impl EventRecorder {
    pub fn new(sink: Box<dyn EventSink>) -> Self {
        Self { sink }
    }

    /// Build the record for a threat observed at `at`
    pub fn assemble(
        severity: Severity,
        env: &EnvironmentContext,
        at: DateTime<Local>,
    ) -> Option<EventRecord> {
        severity.is_threat().then(|| EventRecord {
            timestamp: at,
            severity,
            distance_cm: env.distance_cm,
            is_raining: env.is_raining,
        })
    }

    /// Append one record; returns whether anything was written
    pub fn record(
        &mut self,
        severity: Severity,
        env: &EnvironmentContext,
        at: DateTime<Local>,
    ) -> Result<Option<EventRecord>> {
        let Some(record) = Self::assemble(severity, env, at) else {
            return Ok(None);
        };
        self.sink.append(&record)?;
        debug!(%severity, "Event recorded");
        Ok(Some(record))
    }

    pub fn flush(&mut self) -> Result<()> {
        self.sink.flush()
    }
}
