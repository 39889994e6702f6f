//! Wire Protocol Messages
//!
//! Defines the envelope exchanged between client and host, and the
//! success/error return message carried inside reply payloads.

use serde::{Deserialize, Serialize};

/// Reserved system service and its function names.
pub mod system {
    /// Name of the built-in management service.
    pub const SERVICE: &str = "_";
    pub const TRANSFER: &str = "Transfer";
    pub const INSTALL: &str = "Install";
    pub const UNINSTALL: &str = "Uninstall";
    pub const LIST: &str = "List";
}

/// Keys under which per-function call statistics are reported.
pub mod stats {
    pub const COUNT: &str = "Count";
    pub const TOTAL: &str = "Total";
    pub const RESULT: &str = "Result";
}

/// Request/reply envelope
///
/// Both directions use the same shape. A reply echoes `service` and
/// `function` from the request; `data` carries the function's opaque
/// string payload, or a serialized [`ReturnMessage`] for dispatch-level
/// failures and system-service results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub service: String,
    #[serde(default)]
    pub function: String,
    #[serde(default)]
    pub data: String,
}

impl Envelope {
    /// Create a call envelope
    pub fn new(
        service: impl Into<String>,
        function: impl Into<String>,
        data: impl Into<String>,
    ) -> Self {
        Self {
            service: service.into(),
            function: function.into(),
            data: data.into(),
        }
    }

    /// Build a reply to this envelope, echoing `service` and `function`
    pub fn reply(&self, data: impl Into<String>) -> Envelope {
        Envelope {
            service: self.service.clone(),
            function: self.function.clone(),
            data: data.into(),
        }
    }

    /// Build an error reply to this envelope
    pub fn reply_error(&self, message: impl AsRef<str>) -> Envelope {
        self.reply(error_json(message))
    }
}

/// Outcome kind carried in a [`ReturnMessage`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReturnKind {
    Success,
    Error,
}

/// Structured result payload
///
/// Serializes as `{"type": "Success"|"Error", "result": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnMessage {
    #[serde(rename = "type")]
    pub kind: ReturnKind,
    pub result: String,
}

impl ReturnMessage {
    /// Create a success message
    pub fn success(result: impl Into<String>) -> Self {
        Self {
            kind: ReturnKind::Success,
            result: result.into(),
        }
    }

    /// Create an error message
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: ReturnKind::Error,
            result: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.kind == ReturnKind::Success
    }
}

/// Serialize a success [`ReturnMessage`] to its wire form
pub fn success_json(result: impl AsRef<str>) -> String {
    serde_json::json!({ "type": "Success", "result": result.as_ref() }).to_string()
}

/// Serialize an error [`ReturnMessage`] to its wire form
pub fn error_json(message: impl AsRef<str>) -> String {
    serde_json::json!({ "type": "Error", "result": message.as_ref() }).to_string()
}
