//! Error types for the realtime hub and connections.

use cyper_core::{Classify, ErrorClass};

/// Errors produced by the event hub and client connections.
#[derive(Debug, thiserror::Error)]
pub enum EventsError {
    /// The hub dispatch loop has stopped.
    #[error("event hub is not running")]
    HubClosed,

    /// A client's outbound queue is saturated.
    #[error("client outbound queue is full")]
    QueueFull,

    /// `WebSocket` transport error.
    #[error("WebSocket error: {0}")]
    WebSocket(Box<tokio_tungstenite::tungstenite::Error>),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// No frame arrived within the read deadline.
    #[error("read deadline exceeded")]
    ReadDeadline,

    /// A frame could not be written within the write timeout.
    #[error("write timed out")]
    WriteTimeout,
}

impl From<tokio_tungstenite::tungstenite::Error> for EventsError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(Box::new(err))
    }
}

impl Classify for EventsError {
    fn class(&self) -> ErrorClass {
        match self {
            Self::QueueFull => ErrorClass::Capacity,
            Self::Json(_) => ErrorClass::Validation,
            Self::HubClosed | Self::WebSocket(_) | Self::ReadDeadline | Self::WriteTimeout => {
                ErrorClass::TransientInfrastructure
            },
        }
    }
}

/// Result type for hub operations.
pub type EventsResult<T> = Result<T, EventsError>;
