//! HTTP transport used by the executor.
//!
//! The executor only sees the [`Transport`] trait, so the timeout race and
//! response classification can be exercised against in-memory stubs.

use std::env;
use std::time::Instant;

use ami_types::FailureKind;
use reqwest::{Client, Request, StatusCode, header};
use thiserror::Error;
use tracing::debug;

/// `Content-Type` of every command request.
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded; charset=UTF-8";

/// One form-encoded POST.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportRequest {
    pub endpoint: String,
    /// Already form-encoded body.
    pub body: String,
    /// Value of the `Accept` header.
    pub accept: &'static str,
}

/// A 2xx response with its body read as text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: StatusCode,
    pub body: String,
}

impl TransportResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: StatusCode::OK,
            body: body.into(),
        }
    }
}

/// Failures below the application layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("network error: {message}")]
    Network { message: String },

    #[error("HTTP {status}")]
    Status { status: StatusCode },

    #[error("could not read response body: {message}")]
    Body { message: String },
}

impl TransportError {
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network { message: message.into() }
    }

    pub fn body(message: impl Into<String>) -> Self {
        Self::Body { message: message.into() }
    }

    /// Body read failures are decode problems; everything else means the
    /// service could not be reached.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::Network { .. } | Self::Status { .. } => FailureKind::Transport,
            Self::Body { .. } => FailureKind::Decode,
        }
    }
}

/// Sends a form-encoded POST and returns the body text of a 2xx response.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn post_form(&self, request: TransportRequest) -> Result<TransportResponse, TransportError>;
}

/// [`Transport`] backed by a shared `reqwest::Client`.
///
/// The client keeps a cookie store so the server session survives between
/// calls, and every request disables caching.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    http: Client,
    user_agent: String,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, reqwest::Error> {
        let http = Client::builder().cookie_store(true).gzip(true).brotli(true).deflate(true).build()?;
        Ok(Self {
            http,
            user_agent: format!("ami-client/{}; {}", env!("CARGO_PKG_VERSION"), env::consts::OS),
        })
    }

    /// Build the POST for `request` without sending it.
    pub fn build_request(&self, request: &TransportRequest) -> Result<Request, reqwest::Error> {
        self.http
            .post(request.endpoint.as_str())
            .header(header::CONTENT_TYPE, FORM_CONTENT_TYPE)
            .header(header::ACCEPT, request.accept)
            .header(header::CACHE_CONTROL, "no-cache")
            .header(header::PRAGMA, "no-cache")
            .header(header::USER_AGENT, &self.user_agent)
            .body(request.body.clone())
            .build()
    }
}

#[async_trait::async_trait]
impl Transport for ReqwestTransport {
    async fn post_form(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        let start = Instant::now();
        let http_request = self
            .build_request(&request)
            .map_err(|error| TransportError::network(error.to_string()))?;

        let response = self
            .http
            .execute(http_request)
            .await
            .map_err(|error| TransportError::network(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            debug!(endpoint = %request.endpoint, status = %status, "AMI endpoint returned an error status");
            return Err(TransportError::Status { status });
        }

        let body = response.text().await.map_err(|error| TransportError::body(error.to_string()))?;
        debug!(
            endpoint = %request.endpoint,
            status = %status,
            body_len = body.len(),
            duration_ms = start.elapsed().as_millis(),
            "AMI endpoint responded"
        );
        Ok(TransportResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(accept: &'static str) -> TransportRequest {
        TransportRequest {
            endpoint: "https://ami.example.org/AMI/FrontEnd".to_string(),
            body: "Command=GetSessionInfo&Converter=AMIXmlToJson.xsl".to_string(),
            accept,
        }
    }

    #[test]
    fn build_request_posts_form_without_caching() {
        let transport = ReqwestTransport::new().expect("client builds");
        let built = transport.build_request(&request("application/json")).expect("request builds");

        assert_eq!(built.method(), reqwest::Method::POST);
        assert_eq!(built.url().as_str(), "https://ami.example.org/AMI/FrontEnd");
        let headers = built.headers();
        assert_eq!(headers[header::CONTENT_TYPE], FORM_CONTENT_TYPE);
        assert_eq!(headers[header::ACCEPT], "application/json");
        assert_eq!(headers[header::CACHE_CONTROL], "no-cache");
        assert_eq!(headers[header::PRAGMA], "no-cache");
        let body = built.body().and_then(|body| body.as_bytes()).expect("buffered body");
        assert_eq!(body, b"Command=GetSessionInfo&Converter=AMIXmlToJson.xsl");
    }

    #[test]
    fn build_request_rejects_invalid_endpoints() {
        let transport = ReqwestTransport::new().expect("client builds");
        let mut bad = request("text/plain");
        bad.endpoint = "not a url".to_string();
        assert!(transport.build_request(&bad).is_err());
    }

    #[test]
    fn failure_kinds_follow_the_error_taxonomy() {
        assert_eq!(TransportError::network("reset").failure_kind(), FailureKind::Transport);
        assert_eq!(
            TransportError::Status {
                status: StatusCode::SERVICE_UNAVAILABLE
            }
            .failure_kind(),
            FailureKind::Transport
        );
        assert_eq!(TransportError::body("truncated").failure_kind(), FailureKind::Decode);
    }
}
