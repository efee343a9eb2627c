//! Error bodies returned by the API.
//!
//! The service answers failures in one of three shapes. They are normalized
//! here so callers classify by status code and never by message text.

use serde::Deserialize;
use std::fmt;

/// Normalized body of an error response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorDetail {
    /// `{"errors": ["...", "..."]}`, usually field-level validation messages.
    Messages(Vec<String>),
    /// `{"error": "..."}`.
    Message(String),
    /// Anything else, kept verbatim.
    Raw(String),
}

/// Classification of an error response by status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Unauthorized,
    Conflict,
    Server,
    Other,
}

/// An error response from the API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    /// HTTP status code.
    pub status: u16,
    /// Normalized body.
    pub detail: ErrorDetail,
}

#[derive(Deserialize)]
struct MultiError {
    #[serde(default)]
    errors: Vec<String>,
}

#[derive(Deserialize)]
struct SingleError {
    #[serde(default)]
    error: String,
}

impl ApiError {
    /// Create an error with a single message.
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            detail: ErrorDetail::Message(message.into()),
        }
    }

    /// Parse a response body into the matching shape.
    ///
    /// `{"errors": [..]}` wins over `{"error": ".."}`; an empty list or empty
    /// string falls through to the next shape, and finally to the raw text.
    pub fn parse(status: u16, body: &[u8]) -> Self {
        if let Ok(multi) = serde_json::from_slice::<MultiError>(body) {
            if !multi.errors.is_empty() {
                return Self {
                    status,
                    detail: ErrorDetail::Messages(multi.errors),
                };
            }
        }

        if let Ok(single) = serde_json::from_slice::<SingleError>(body) {
            if !single.error.is_empty() {
                return Self {
                    status,
                    detail: ErrorDetail::Message(single.error),
                };
            }
        }

        Self {
            status,
            detail: ErrorDetail::Raw(String::from_utf8_lossy(body).into_owned()),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self.status {
            404 => ErrorKind::NotFound,
            401 => ErrorKind::Unauthorized,
            409 => ErrorKind::Conflict,
            500..=599 => ErrorKind::Server,
            _ => ErrorKind::Other,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    pub fn is_unauthorized(&self) -> bool {
        self.kind() == ErrorKind::Unauthorized
    }

    pub fn is_conflict(&self) -> bool {
        self.kind() == ErrorKind::Conflict
    }

    /// All messages carried by the error, in order.
    pub fn messages(&self) -> Vec<&str> {
        match &self.detail {
            ErrorDetail::Messages(msgs) => msgs.iter().map(String::as_str).collect(),
            ErrorDetail::Message(msg) | ErrorDetail::Raw(msg) => vec![msg.as_str()],
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "API error {}: {}", self.status, self.messages().join("; "))
    }
}

impl std::error::Error for ApiError {}
