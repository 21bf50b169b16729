//! Classification of inbound event-channel frames.
//!
//! Echo suppression needs the client's last published id, so it is left to
//! the caller: every content event comes back as [`InboundFrame::Event`].

use serde_json::Value;

use crate::constants::{EVENT_HEARTBEAT, FIELD_MODE};
use crate::message::FhircastMessage;

/// Errors from parsing an inbound frame.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("frame is not a JSON object")]
    NotAnObject,
}

/// What an inbound text frame turned out to be.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    /// Subscription confirmation sent by the hub over the channel.
    Acknowledgment { mode: String },
    /// Keepalive from the hub.
    Heartbeat,
    /// A context-change notification.
    Event(FhircastMessage),
    /// Valid JSON without an `event` object.
    Unrecognized,
}

/// Parses and classifies a text frame.
///
/// Checks run in a fixed order: acknowledgment, heartbeat, content event.
pub fn parse_frame(text: &str) -> Result<InboundFrame, FrameError> {
    let value: Value = serde_json::from_str(text)?;
    let obj = value.as_object().ok_or(FrameError::NotAnObject)?;

    if let Some(mode) = obj.get(FIELD_MODE).and_then(mode_text) {
        return Ok(InboundFrame::Acknowledgment { mode });
    }

    let Some(event) = obj.get("event").and_then(Value::as_object) else {
        return Ok(InboundFrame::Unrecognized);
    };

    if event.get("hub.event").and_then(Value::as_str) == Some(EVENT_HEARTBEAT) {
        return Ok(InboundFrame::Heartbeat);
    }

    let message: FhircastMessage = serde_json::from_value(value)?;
    Ok(InboundFrame::Event(message))
}

/// `hub.mode` only counts when it is truthy: null, false, 0 and "" do not.
fn mode_text(mode: &Value) -> Option<String> {
    match mode {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) if s.is_empty() => None,
        Value::Number(n) if n.as_f64() == Some(0.0) => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
