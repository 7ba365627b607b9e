//! Command execution: the timeout race and success/failure classification.

use std::time::{Duration, Instant};

use ami_types::{ExecFailure, ExecOutcome, ExecutionOptions, FailureKind, Payload, ResponseFormat};
use ami_util::http::decode_json;
use ami_util::{error_envelope, error_messages, info_messages, join_messages, redact_sensitive};
use reqwest::StatusCode;
use serde_json::Value;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::client::AmiClient;
use crate::transport::TransportRequest;

impl AmiClient {
    /// Execute `command` and classify the response.
    ///
    /// The transport call is raced against a timer. Whichever finishes first
    /// decides the outcome and the other is dropped: a late response can
    /// never settle a call that already timed out, and a finished call leaves
    /// no timer behind.
    ///
    /// In structured mode the envelope's error messages decide the
    /// classification; in raw mode any 2xx body is a success.
    pub async fn execute(&self, command: &str, options: ExecutionOptions) -> Result<ExecOutcome, ExecFailure> {
        let ExecutionOptions {
            endpoint,
            converter,
            extras,
            params,
            timeout_ms,
        } = options;

        let endpoint = endpoint.as_deref().map(str::trim).unwrap_or(self.endpoint.as_str()).to_string();
        let converter = converter.as_deref().map(str::trim).unwrap_or(self.converter.as_str()).to_string();
        let time_limit = timeout_ms.map(Duration::from_millis).unwrap_or(self.timeout);
        let format = ResponseFormat::from_converter(&converter);

        let built = self.builder.build(command, params, &converter, &extras);
        let diagnostic_url = built.diagnostic_url(&endpoint);
        let request = TransportRequest {
            endpoint: endpoint.clone(),
            body: built.form_body(),
            accept: format.accept_header(),
        };

        let start = Instant::now();
        debug!(
            endpoint = %endpoint,
            converter = %converter,
            timeout_ms = time_limit.as_millis(),
            command = %redact_sensitive(&built.command),
            "AMI command started"
        );

        let response = match timeout(time_limit, self.transport.post_form(request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(error)) => {
                warn!(
                    endpoint = %endpoint,
                    error = %error,
                    duration_ms = start.elapsed().as_millis(),
                    "AMI command transport failed"
                );
                return Err(normalized_failure(error.failure_kind(), format, diagnostic_url));
            }
            Err(_) => {
                warn!(
                    endpoint = %endpoint,
                    timeout_ms = time_limit.as_millis(),
                    "AMI command timed out"
                );
                return Err(normalized_failure(FailureKind::Timeout, format, diagnostic_url));
            }
        };

        let result = match format {
            ResponseFormat::Structured => classify_structured(&response.body, response.status, diagnostic_url),
            ResponseFormat::Raw => Ok(ExecOutcome {
                payload: Payload::Text(response.body.clone()),
                message: response.body,
                diagnostic_url,
            }),
        };

        match &result {
            Ok(_) => debug!(endpoint = %endpoint, duration_ms = start.elapsed().as_millis(), "AMI command succeeded"),
            Err(failure) => debug!(
                endpoint = %endpoint,
                kind = %failure.kind,
                duration_ms = start.elapsed().as_millis(),
                "AMI command failed"
            ),
        }
        result
    }
}

/// Decode a structured response body and classify it.
pub fn classify_structured(body: &str, status: StatusCode, diagnostic_url: String) -> Result<ExecOutcome, ExecFailure> {
    match decode_json(body, Some(status)) {
        Ok(document) => classify_envelope(document, diagnostic_url),
        Err(error) => {
            warn!(error = %error, "AMI response is not a JSON envelope");
            Err(normalized_failure(FailureKind::Decode, ResponseFormat::Structured, diagnostic_url))
        }
    }
}

/// A decoded envelope is a success exactly when it carries no error message.
pub fn classify_envelope(document: Value, diagnostic_url: String) -> Result<ExecOutcome, ExecFailure> {
    let errors = error_messages(&document);
    if errors.is_empty() {
        let message = join_messages(&info_messages(&document));
        return Ok(ExecOutcome {
            payload: Payload::Json(document),
            message,
            diagnostic_url,
        });
    }
    Err(ExecFailure::new(
        FailureKind::Application,
        Payload::Json(document),
        join_messages(&errors),
        diagnostic_url,
    ))
}

/// Failure carrying the fixed message of `kind`. Structured mode wraps the
/// message in an envelope so it reads like a server-reported error.
fn normalized_failure(kind: FailureKind, format: ResponseFormat, diagnostic_url: String) -> ExecFailure {
    let message = kind.normalized_message().unwrap_or_default();
    let payload = match format {
        ResponseFormat::Structured => Payload::Json(error_envelope(message)),
        ResponseFormat::Raw => Payload::Text(message.to_string()),
    };
    ExecFailure::new(kind, payload, message, diagnostic_url)
}
