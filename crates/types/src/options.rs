use indexmap::IndexMap;
use serde_json::Value;

/// Converter that asks the server for the structured JSON envelope.
pub const DEFAULT_CONVERTER: &str = "AMIXmlToJson.xsl";

/// Default request timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 120_000;

/// How a response body is interpreted, derived from the converter name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    /// JSON envelope with info/error messages and rowsets.
    Structured,
    /// Opaque text passed through untouched.
    Raw,
}

impl ResponseFormat {
    /// Only the default converter yields the structured envelope; anything
    /// else (including an empty converter) is raw text.
    pub fn from_converter(converter: &str) -> Self {
        if converter.trim() == DEFAULT_CONVERTER {
            Self::Structured
        } else {
            Self::Raw
        }
    }

    /// Value of the `Accept` header for this format.
    pub fn accept_header(self) -> &'static str {
        match self {
            Self::Structured => "application/json",
            Self::Raw => "text/plain",
        }
    }
}

/// Per-call options for executing a command.
///
/// Every field is optional; unset values fall back to the client's
/// configuration. `params` are consumed left to right by the `-name=?`
/// placeholders of the command template.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionOptions {
    /// Endpoint override for this call.
    pub endpoint: Option<String>,
    /// Converter override for this call.
    pub converter: Option<String>,
    /// Literal form fields merged into the request. `None` values are sent
    /// as empty fields.
    pub extras: IndexMap<String, Option<String>>,
    /// Positional parameters for placeholder substitution.
    pub params: Vec<Value>,
    /// Timeout override in milliseconds.
    pub timeout_ms: Option<u64>,
}

impl ExecutionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_converter(mut self, converter: impl Into<String>) -> Self {
        self.converter = Some(converter.into());
        self
    }

    /// Append one positional parameter.
    pub fn with_param(mut self, param: impl Into<Value>) -> Self {
        self.params.push(param.into());
        self
    }

    /// Replace the positional parameters.
    pub fn with_params<I, V>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.params = params.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: Option<String>) -> Self {
        self.extras.insert(key.into(), value);
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }
}
