//! Outbound dispatchers: vehicle evasive command and operator alert

mod alert;
mod evasive;

pub use alert::AlertDispatcher;
pub use evasive::EvasiveDispatcher;
