//! Message envelope exchanged on every frame.
//!
//! Every frame is a JSON object tagged by `type`. Decoding is best effort:
//! text that is not a JSON object is handed back untouched so task streams
//! can still show it as output.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::wire::{self, DecodeError};

/// A typed protocol message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Envelope {
    /// Output from the server. Plain text for tasks, base64 for terminals.
    Output { data: String },
    /// Final task status.
    Status {
        status: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        exit_code: Option<i64>,
    },
    /// Server-side failure.
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    /// Terminal input (base64 encoded).
    Input { data: String },
    /// Resize the remote terminal.
    Resize { cols: u16, rows: u16 },
    /// Remote terminal is ready.
    Connected,
    /// Remote end is closing the session.
    Closed {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
}

/// Result of decoding one inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// A recognised envelope.
    Envelope(Envelope),
    /// A JSON object whose `type` is unknown or whose fields don't fit it.
    Unrecognized { kind: Option<String> },
    /// Anything that isn't a JSON object, verbatim.
    RawText(String),
}

impl Envelope {
    /// Create an input message from raw bytes.
    #[must_use]
    pub fn input(data: &[u8]) -> Self {
        Self::Input {
            data: wire::to_wire(data),
        }
    }

    /// Create an output message from raw bytes.
    #[must_use]
    pub fn output_bytes(data: &[u8]) -> Self {
        Self::Output {
            data: wire::to_wire(data),
        }
    }

    /// Decode the payload of an `output` or `input` envelope as bytes.
    ///
    /// Returns `None` for other variants.
    pub fn decode_bytes(&self) -> Option<Result<Vec<u8>, DecodeError>> {
        match self {
            Self::Output { data } | Self::Input { data } => Some(wire::from_wire(data)),
            _ => None,
        }
    }

    /// The `type` tag of this envelope.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Output { .. } => "output",
            Self::Status { .. } => "status",
            Self::Error { .. } => "error",
            Self::Input { .. } => "input",
            Self::Resize { .. } => "resize",
            Self::Connected => "connected",
            Self::Closed { .. } => "closed",
        }
    }

    /// Serialize into a single text frame.
    #[must_use]
    pub fn encode(&self) -> String {
        // Every variant is a plain struct of strings and integers.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Classify a raw text frame.
#[must_use]
pub fn decode(raw: &str) -> Inbound {
    let value = match serde_json::from_str::<Value>(raw) {
        Ok(value @ Value::Object(_)) => value,
        _ => return Inbound::RawText(raw.to_owned()),
    };
    let kind = value.get("type").and_then(Value::as_str).map(str::to_owned);
    match serde_json::from_value::<Envelope>(value) {
        Ok(envelope) => Inbound::Envelope(envelope),
        Err(_) => Inbound::Unrecognized { kind },
    }
}
