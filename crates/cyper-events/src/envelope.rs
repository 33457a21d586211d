//! Wire envelopes exchanged with realtime clients.
//!
//! Outbound: `{"type", "user_id"?, "data", "timestamp"}`.
//! Inbound: `{"type", "data"?}`; only `ping`, `subscribe` and `unsubscribe`
//! are understood.

use chrono::{DateTime, Utc};
use cyper_core::UserId;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Known outbound event type names.
pub mod event_type {
    /// Scan progress update.
    pub const SCAN_PROGRESS: &str = "scan_progress";
    /// Scan finished.
    pub const SCAN_COMPLETE: &str = "scan_complete";
    /// New finding during a scan.
    pub const VULNERABILITY_FOUND: &str = "vulnerability_found";
    /// Security alert.
    pub const ALERT: &str = "alert";
    /// The user's session authorization was revoked.
    pub const AUTH_REVOKED: &str = "auth_revoked";
    /// System-wide status, sent to every client.
    pub const SYSTEM_STATUS: &str = "system_status";
    /// Reply to a client ping.
    pub const PONG: &str = "pong";
}

/// An outbound message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Event type name.
    #[serde(rename = "type")]
    pub kind: String,
    /// Addressed user; absent for broadcasts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    /// Event payload.
    pub data: Value,
    /// When the hub accepted the publish.
    pub timestamp: DateTime<Utc>,
}

/// Typed outbound events.
#[derive(Debug, Clone, PartialEq)]
pub enum RealtimeEvent {
    /// Scan progress.
    ScanProgress {
        /// Scan identifier.
        scan_id: String,
        /// Percent complete.
        progress: u8,
        /// Current phase name.
        phase: String,
    },
    /// Scan finished.
    ScanComplete {
        /// Scan identifier.
        scan_id: String,
        /// Result summary.
        summary: Value,
    },
    /// Finding reported during a scan.
    VulnerabilityFound {
        /// Scan identifier.
        scan_id: String,
        /// The finding.
        finding: Value,
    },
    /// Free-form security alert.
    Alert(Value),
    /// Authorization revoked.
    AuthRevoked {
        /// Why.
        reason: String,
    },
    /// System status.
    SystemStatus(Value),
}

impl RealtimeEvent {
    /// Wire type name.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ScanProgress { .. } => event_type::SCAN_PROGRESS,
            Self::ScanComplete { .. } => event_type::SCAN_COMPLETE,
            Self::VulnerabilityFound { .. } => event_type::VULNERABILITY_FOUND,
            Self::Alert(_) => event_type::ALERT,
            Self::AuthRevoked { .. } => event_type::AUTH_REVOKED,
            Self::SystemStatus(_) => event_type::SYSTEM_STATUS,
        }
    }

    /// Wire payload.
    #[must_use]
    pub fn into_data(self) -> Value {
        match self {
            Self::ScanProgress {
                scan_id,
                progress,
                phase,
            } => json!({ "scan_id": scan_id, "progress": progress, "phase": phase }),
            Self::ScanComplete { scan_id, summary } => {
                json!({ "scan_id": scan_id, "summary": summary })
            },
            Self::VulnerabilityFound { scan_id, finding } => {
                json!({ "scan_id": scan_id, "finding": finding })
            },
            Self::AuthRevoked { reason } => json!({ "reason": reason }),
            Self::Alert(data) | Self::SystemStatus(data) => data,
        }
    }
}

/// A message received from a client.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InboundMessage {
    /// Message type name.
    #[serde(rename = "type")]
    pub kind: String,
    /// Optional payload.
    #[serde(default)]
    pub data: Value,
}

/// What a client asked for.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientCommand {
    /// Liveness check; answered with `pong`.
    Ping,
    /// Topic subscription request.
    Subscribe(Value),
    /// Topic unsubscription request.
    Unsubscribe(Value),
    /// Anything else.
    Unknown(String),
}

impl From<InboundMessage> for ClientCommand {
    fn from(msg: InboundMessage) -> Self {
        match msg.kind.as_str() {
            "ping" => Self::Ping,
            "subscribe" => Self::Subscribe(msg.data),
            "unsubscribe" => Self::Unsubscribe(msg.data),
            _ => Self::Unknown(msg.kind),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_omits_absent_user() {
        let envelope = Envelope {
            kind: event_type::SYSTEM_STATUS.into(),
            user_id: None,
            data: json!({"ok": true}),
            timestamp: DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
        };
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["type"], "system_status");
        assert!(value.get("user_id").is_none());
    }

    #[test]
    fn test_scan_progress_payload() {
        let event = RealtimeEvent::ScanProgress {
            scan_id: "s1".into(),
            progress: 40,
            phase: "ports".into(),
        };
        assert_eq!(event.kind(), "scan_progress");
        assert_eq!(
            event.into_data(),
            json!({"scan_id": "s1", "progress": 40, "phase": "ports"})
        );
    }

    #[test]
    fn test_inbound_commands() {
        let ping: InboundMessage = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert_eq!(ClientCommand::from(ping), ClientCommand::Ping);

        let sub: InboundMessage =
            serde_json::from_str(r#"{"type":"subscribe","data":{"topic":"scans"}}"#).unwrap();
        assert_eq!(
            ClientCommand::from(sub),
            ClientCommand::Subscribe(json!({"topic": "scans"}))
        );

        let other: InboundMessage = serde_json::from_str(r#"{"type":"dance"}"#).unwrap();
        assert_eq!(
            ClientCommand::from(other),
            ClientCommand::Unknown("dance".into())
        );
    }
}
