use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use ami_types::{DEFAULT_CONVERTER, DEFAULT_TIMEOUT_MS, RowsetBindings};
use ami_util::{AmiConfig, CommandBuilder, PathQueryError};
use serde_json::Value;
use thiserror::Error;
use url::Url;

use crate::transport::{ReqwestTransport, Transport};

/// Errors raised while constructing an [`AmiClient`].
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("no AMI endpoint configured; set AMI_ENDPOINT or `endpoint` in the config file")]
    MissingEndpoint,

    #[error("invalid AMI endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("could not build the HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Client for the AMI command front end.
///
/// Configuration (endpoint, converter, timeout, placeholder pattern and
/// rowset bindings) is fixed once the client is built. Each call owns its own
/// timer, so concurrent calls on one client never interact.
#[derive(Clone)]
pub struct AmiClient {
    pub(crate) endpoint: String,
    pub(crate) converter: String,
    pub(crate) timeout: Duration,
    pub(crate) bindings: RowsetBindings,
    pub(crate) builder: CommandBuilder,
    pub(crate) transport: Arc<dyn Transport>,
}

impl fmt::Debug for AmiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AmiClient")
            .field("endpoint", &self.endpoint)
            .field("converter", &self.converter)
            .field("timeout", &self.timeout)
            .field("bindings", &self.bindings)
            .finish_non_exhaustive()
    }
}

impl AmiClient {
    /// Client for `endpoint` using the HTTP transport and default settings.
    pub fn new(endpoint: &str) -> Result<Self, ClientError> {
        Self::with_transport(endpoint, Arc::new(ReqwestTransport::new()?))
    }

    /// Client for `endpoint` sending requests through `transport`.
    pub fn with_transport(endpoint: &str, transport: Arc<dyn Transport>) -> Result<Self, ClientError> {
        let endpoint = endpoint.trim();
        validate_endpoint(endpoint)?;
        Ok(Self {
            endpoint: endpoint.to_string(),
            converter: DEFAULT_CONVERTER.to_string(),
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            bindings: RowsetBindings::default(),
            builder: CommandBuilder::default(),
            transport,
        })
    }

    /// Client configured from an [`AmiConfig`].
    pub fn from_config(config: &AmiConfig) -> Result<Self, ClientError> {
        let endpoint = config.endpoint.as_deref().ok_or(ClientError::MissingEndpoint)?;
        Ok(Self::new(endpoint)?
            .with_converter(&config.converter)
            .with_timeout(Duration::from_millis(config.timeout_ms))
            .with_rowset_bindings(config.rowset_bindings.clone()))
    }

    pub fn with_converter(mut self, converter: &str) -> Self {
        self.converter = converter.trim().to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_rowset_bindings(mut self, bindings: RowsetBindings) -> Self {
        self.bindings = bindings;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn converter(&self) -> &str {
        &self.converter
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn rowset_bindings(&self) -> &RowsetBindings {
        &self.bindings
    }

    /// Evaluate a path query against a decoded payload.
    pub fn query<'a>(&self, path: &str, document: &'a Value) -> Result<Vec<&'a Value>, PathQueryError> {
        ami_util::query(path, document)
    }
}

/// The endpoint must be an absolute `http`/`https` URL with a host.
fn validate_endpoint(endpoint: &str) -> Result<(), ClientError> {
    let invalid = |reason: String| ClientError::InvalidEndpoint {
        endpoint: endpoint.to_string(),
        reason,
    };
    let parsed = Url::parse(endpoint).map_err(|error| invalid(error.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme '{}'", parsed.scheme())));
    }
    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(invalid("missing host".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn endpoints_must_be_http_urls_with_a_host() {
        assert!(validate_endpoint("https://ami.example.org/AMI/FrontEnd").is_ok());
        assert!(validate_endpoint("http://localhost:8080/AMI/FrontEnd").is_ok());
        assert!(matches!(
            validate_endpoint("ftp://ami.example.org"),
            Err(ClientError::InvalidEndpoint { .. })
        ));
        assert!(matches!(validate_endpoint("/AMI/FrontEnd"), Err(ClientError::InvalidEndpoint { .. })));
    }

    #[test]
    fn new_client_uses_defaults_and_trims_endpoint() {
        let client = AmiClient::new("  https://ami.example.org/AMI/FrontEnd ").expect("client builds");
        assert_eq!(client.endpoint(), "https://ami.example.org/AMI/FrontEnd");
        assert_eq!(client.converter(), "AMIXmlToJson.xsl");
        assert_eq!(client.timeout(), Duration::from_millis(120_000));
        assert_eq!(client.rowset_bindings(), &RowsetBindings::current());
    }

    #[test]
    fn from_config_requires_an_endpoint() {
        let config = AmiConfig::default();
        assert!(matches!(AmiClient::from_config(&config), Err(ClientError::MissingEndpoint)));

        let config = AmiConfig {
            endpoint: Some("https://ami.example.org/AMI/FrontEnd".into()),
            converter: " ".into(),
            timeout_ms: 50,
            rowset_bindings: RowsetBindings::legacy(),
        };
        let client = AmiClient::from_config(&config).expect("client builds");
        assert_eq!(client.converter(), "");
        assert_eq!(client.timeout(), Duration::from_millis(50));
        assert_eq!(client.rowset_bindings(), &RowsetBindings::legacy());
    }

    #[test]
    fn query_delegates_to_the_path_engine() {
        let client = AmiClient::new("https://ami.example.org/AMI/FrontEnd").expect("client builds");
        let document = json!({"AMIMessage": [{"error": [{"$": "bad password"}]}]});
        assert_eq!(client.query(".AMIMessage.error.$", &document).expect("path parses"), vec![&json!("bad password")]);
        assert!(client.query("AMIMessage", &document).is_err());
    }
}
