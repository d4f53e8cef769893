//! Error types for the course API client.
//!
//! # Design
//! Transport failures (no response at all) and status failures (a non-2xx
//! response, possibly carrying a validation message) are kept apart so
//! callers can branch on them, but the response middleware turns both into a
//! single user-facing notification with [`ApiError::notification_text`].

use serde_json::Value;

/// Fallback text when an error carries neither a server message nor a status.
pub const GENERIC_ERROR_MESSAGE: &str = "An error occurred";

/// Errors returned by the client pipeline.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ApiError {
    /// The request never produced a response (DNS, refused connection, timeout).
    #[error("request failed: {0}")]
    Transport(String),

    /// The server answered with a non-2xx status. `body` is the parsed JSON
    /// body, the raw text as a JSON string, or `None` when empty.
    #[error("HTTP {status}")]
    Status { status: u16, body: Option<Value> },

    /// The base URL or a request path could not be turned into a URL.
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    /// The request payload could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// A response body could not be deserialized into the expected type.
    #[error("deserialization failed: {0}")]
    Deserialization(String),
}

impl ApiError {
    /// HTTP status of the failed response, if there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The `message` field of the server's error body.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            ApiError::Status {
                body: Some(Value::Object(map)),
                ..
            } => map
                .get("message")
                .and_then(Value::as_str)
                .filter(|m| !m.is_empty()),
            _ => None,
        }
    }

    /// Human-readable text: server message, else status code, else a generic fallback.
    pub fn notification_text(&self) -> String {
        if let Some(message) = self.server_message() {
            return message.to_string();
        }
        match self.status() {
            Some(status) => status.to_string(),
            None => GENERIC_ERROR_MESSAGE.to_string(),
        }
    }
}
