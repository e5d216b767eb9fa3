//! The bus's line-delimited JSON frame shapes.
//!
//! Producers and schedulers speak two different frame shapes over the same
//! WebSocket: the registration/request envelope they *send*, and the bare
//! payload object schedulers *receive* (the bus strips the envelope before
//! re-broadcasting, see SPEC_FULL.md §6).

use serde::{Deserialize, Serialize};

/// Which role a peer is registering as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegisterKind {
    Producer,
    Scheduler,
}

/// `{"runtime":<int>,"priority":<int>}` -- what a scheduler actually reads
/// off the wire, and what the bus re-broadcasts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JobPayload {
    pub runtime: f64,
    pub priority: i32,
}

/// A frame as sent by a producer or scheduler to the bus. Tagged on `cmd`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum Envelope {
    Register { #[serde(rename = "type")] kind: RegisterKind },
    JobRequest { payload: JobPayload },
}

impl Envelope {
    pub fn register(kind: RegisterKind) -> Self {
        Envelope::Register { kind }
    }

    pub fn job_request(payload: JobPayload) -> Self {
        Envelope::JobRequest { payload }
    }

    /// Serializes to the single-line JSON text frame sent over the wire.
    pub fn to_frame(&self) -> String {
        serde_json::to_string(self).expect("Envelope serialization is infallible")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_frame_matches_wire_shape() {
        let frame = Envelope::register(RegisterKind::Scheduler).to_frame();
        assert_eq!(frame, r#"{"cmd":"register","type":"scheduler"}"#);
    }

    #[test]
    fn job_request_frame_matches_wire_shape() {
        let frame = Envelope::job_request(JobPayload { runtime: 10.0, priority: 5 }).to_frame();
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["cmd"], "job_request");
        assert_eq!(value["payload"]["runtime"], 10.0);
        assert_eq!(value["payload"]["priority"], 5);
    }

    #[test]
    fn bare_payload_deserializes_without_envelope() {
        let raw = r#"{"runtime":7,"priority":2}"#;
        let payload: JobPayload = serde_json::from_str(raw).unwrap();
        assert_eq!(payload.runtime, 7.0);
        assert_eq!(payload.priority, 2);
    }

    #[test]
    fn malformed_frame_fails_to_parse() {
        let raw = r#"{"runtime":"not a number"}"#;
        let result: Result<JobPayload, _> = serde_json::from_str(raw);
        assert!(result.is_err());
    }
}
