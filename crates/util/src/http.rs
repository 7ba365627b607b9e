//! # HTTP Response Decoding
//!
//! Strict decoding of response bodies returned by the AMI front end.

use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

/// Parse HTTP response text into JSON, providing detailed errors on failure.
///
/// Any parse error is decorated with the originating HTTP status code plus a
/// truncated preview of the body, so a half-written or HTML error page can be
/// told apart from a malformed envelope in the logs.
///
/// # Example
/// ```rust
/// use ami_util::http::decode_json;
/// use reqwest::StatusCode;
///
/// let value = decode_json(r#"{"AMIMessage": []}"#, Some(StatusCode::OK)).unwrap();
/// assert!(value.get("AMIMessage").is_some());
///
/// let error = decode_json("<html>busy</html>", Some(StatusCode::OK)).unwrap_err();
/// assert_eq!(error.body_preview(), "<html>busy</html>");
/// ```
pub fn decode_json(text: &str, status: Option<StatusCode>) -> Result<Value, DecodeError> {
    serde_json::from_str::<Value>(text).map_err(|error| {
        let status_note = status
            .map(|code| format!("status {code}"))
            .unwrap_or_else(|| "unknown status".to_string());
        DecodeError::new(status_note, error, truncate_response_preview(text, 200))
    })
}

fn truncate_response_preview(text: &str, limit: usize) -> String {
    if text.trim().is_empty() {
        return "<empty>".to_string();
    }

    let mut preview = String::new();
    for ch in text.chars() {
        if preview.len() >= limit {
            preview.push_str("...");
            break;
        }
        match ch {
            '\n' | '\r' | '\t' => {
                if !preview.ends_with(' ') {
                    preview.push(' ');
                }
            }
            _ => preview.push(ch),
        }
    }

    preview.trim().to_string()
}

/// Error returned when a response body is not valid JSON.
#[derive(Debug, Error)]
#[error("failed to decode AMI response ({status_note}): {source}. body preview: {body_preview}")]
pub struct DecodeError {
    status_note: String,
    #[source]
    source: serde_json::Error,
    body_preview: String,
}

impl DecodeError {
    pub fn new(status_note: String, source: serde_json::Error, body_preview: String) -> Self {
        Self {
            status_note,
            source,
            body_preview,
        }
    }

    /// Truncated, whitespace-collapsed body captured during decoding.
    pub fn body_preview(&self) -> &str {
        &self.body_preview
    }
}
