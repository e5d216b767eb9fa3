//! Error kinds shared across the fabric.
//!
//! Crates that need their own error shape define one (`dispatch-process` has
//! `ProcessError`); `dispatch-bus` has no error enum of its own and instead
//! uses `anyhow::Result` at its public boundary. This enum collects the
//! kinds that don't belong to a single component -- the wire-protocol and
//! routing failures the bus relay, the scheduler binary, and
//! `SchedulerManager` all need to report.

use std::fmt;

/// Errors raised while decoding or routing bus traffic.
#[derive(Debug)]
pub enum DispatchError {
    /// A frame was not valid JSON, or was missing required fields.
    MalformedMessage(String),
    /// The WebSocket connection to the bus closed.
    BusDisconnect(String),
    /// No bin in the manager accepted a task.
    AdmissionRejected,
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedMessage(detail) => write!(f, "malformed message: {detail}"),
            Self::BusDisconnect(detail) => write!(f, "bus connection closed: {detail}"),
            Self::AdmissionRejected => write!(f, "no bin accepted the task"),
        }
    }
}

impl std::error::Error for DispatchError {}
