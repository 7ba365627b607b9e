use std::fmt;

use serde_json::Value;
use thiserror::Error;

/// Message surfaced when no response arrives within the timeout.
pub const TIMEOUT_MESSAGE: &str = "timeout";
/// Message surfaced for network-level failures.
pub const SERVICE_UNREACHABLE_MESSAGE: &str = "service temporarily unreachable";
/// Message surfaced when a response body cannot be decoded.
pub const RESOURCE_UNREACHABLE_MESSAGE: &str = "resource temporarily unreachable";

/// Decoded response body.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Structured mode: the decoded JSON envelope.
    Json(Value),
    /// Raw mode: the body text.
    Text(String),
}

impl Payload {
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            Self::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Json(_) => None,
        }
    }
}

/// Result of a command the server accepted.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecOutcome {
    pub payload: Payload,
    /// Informational messages joined by `". "` (structured mode) or the body
    /// text (raw mode).
    pub message: String,
    /// `endpoint?query` rendering of the request, for display only.
    pub diagnostic_url: String,
}

/// Failure classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// No response within the configured window.
    Timeout,
    /// Network error or non-2xx status.
    Transport,
    /// The body could not be decoded in the expected format.
    Decode,
    /// The envelope carried at least one error message.
    Application,
}

impl FailureKind {
    /// Fixed message for the kinds that are normalized. Application
    /// failures keep the server's text verbatim.
    pub fn normalized_message(self) -> Option<&'static str> {
        match self {
            Self::Timeout => Some(TIMEOUT_MESSAGE),
            Self::Transport => Some(SERVICE_UNREACHABLE_MESSAGE),
            Self::Decode => Some(RESOURCE_UNREACHABLE_MESSAGE),
            Self::Application => None,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Timeout => "timeout",
            Self::Transport => "transport",
            Self::Decode => "decode",
            Self::Application => "application",
        };
        f.write_str(label)
    }
}

/// A command that did not succeed, with everything needed to report it.
///
/// In structured mode `payload` is always JSON: the server's own envelope for
/// application failures, or a synthesized envelope whose only error is the
/// normalized message for every other kind.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct ExecFailure {
    pub kind: FailureKind,
    pub payload: Payload,
    pub message: String,
    pub diagnostic_url: String,
}

impl ExecFailure {
    pub fn new(kind: FailureKind, payload: Payload, message: impl Into<String>, diagnostic_url: impl Into<String>) -> Self {
        Self {
            kind,
            payload,
            message: message.into(),
            diagnostic_url: diagnostic_url.into(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        self.kind == FailureKind::Timeout
    }
}
