//! Command template substitution and request field assembly.
//!
//! A command template such as `GetSessionInfo -AMIUser=? -AMIPass=?` carries
//! positional placeholders of the form `-<name>=?`. Building a command
//! consumes one parameter per placeholder, left to right, and replaces the
//! placeholder with `-<name>="<escaped value>"`.
//!
//! Escaping is applied in a fixed order so that no character is escaped
//! twice: backslash, then newline, then double quote. Non-string parameters
//! are rendered as their JSON text before escaping.

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use regex::{Captures, Regex};
use serde_json::Value;
use tracing::warn;

/// Form field carrying the substituted command.
pub const COMMAND_FIELD: &str = "Command";
/// Form field carrying the converter name.
pub const CONVERTER_FIELD: &str = "Converter";

static PLACEHOLDER_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"-([a-zA-Z][a-zA-Z0-9]*)=\?").expect("placeholder pattern compiles"));

/// Characters left as-is in the diagnostic query string (RFC 3986 unreserved
/// plus the sub-delimiters browsers leave in URI components).
const QUERY_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// A fully assembled request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltCommand {
    /// The substituted command text.
    pub command: String,
    /// Form fields in send order: `Command`, `Converter`, then extras.
    pub fields: IndexMap<String, String>,
    /// Percent-encoded rendering of `fields`, for display only.
    pub query_string: String,
}

impl BuiltCommand {
    /// `application/x-www-form-urlencoded` request body.
    pub fn form_body(&self) -> String {
        url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.fields.iter())
            .finish()
    }

    /// `endpoint?query` string returned alongside results and errors.
    pub fn diagnostic_url(&self, endpoint: &str) -> String {
        format!("{}?{}", endpoint, self.query_string)
    }
}

/// Substitutes placeholders and assembles form fields.
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    placeholder: Regex,
}

impl Default for CommandBuilder {
    fn default() -> Self {
        Self {
            placeholder: PLACEHOLDER_PATTERN.clone(),
        }
    }
}

impl CommandBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace each placeholder of the trimmed `template` with the next
    /// parameter from `params`.
    ///
    /// Exactly one parameter is pulled per placeholder, so any surplus stays
    /// in the iterator. When parameters run out the remaining placeholders are
    /// left untouched.
    pub fn substitute<I>(&self, template: &str, params: &mut I) -> String
    where
        I: Iterator<Item = Value>,
    {
        let mut missing = 0usize;
        let substituted = self.placeholder.replace_all(template.trim(), |captures: &Captures| match params.next() {
            Some(value) => format!("-{}=\"{}\"", &captures[1], escape_parameter(&render_parameter(&value))),
            None => {
                missing += 1;
                captures[0].to_string()
            }
        });
        if missing > 0 {
            warn!(missing, "command template has more placeholders than parameters");
        }
        substituted.into_owned()
    }

    /// Build the request fields for `template`.
    ///
    /// Extras are merged after `Command` and `Converter`; an extra with no
    /// value is sent as an empty field.
    pub fn build<I>(&self, template: &str, params: I, converter: &str, extras: &IndexMap<String, Option<String>>) -> BuiltCommand
    where
        I: IntoIterator<Item = Value>,
    {
        let mut params = params.into_iter();
        let command = self.substitute(template, &mut params);

        let mut fields = IndexMap::with_capacity(extras.len() + 2);
        fields.insert(COMMAND_FIELD.to_string(), command.clone());
        fields.insert(CONVERTER_FIELD.to_string(), converter.to_string());
        for (key, value) in extras {
            fields.insert(key.clone(), value.clone().unwrap_or_default());
        }

        let query_string = encode_query_string(&fields);
        BuiltCommand {
            command,
            fields,
            query_string,
        }
    }
}

/// Escape a parameter for use inside a double-quoted command argument.
pub fn escape_parameter(raw: &str) -> String {
    raw.replace('\\', "\\\\").replace('\n', "\\n").replace('"', "\\\"")
}

fn render_parameter(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Percent-encode fields as `key=value&key=value`.
pub fn encode_query_string(fields: &IndexMap<String, String>) -> String {
    fields
        .iter()
        .map(|(key, value)| {
            format!(
                "{}={}",
                utf8_percent_encode(key, QUERY_COMPONENT),
                utf8_percent_encode(value, QUERY_COMPONENT)
            )
        })
        .collect::<Vec<_>>()
        .join("&")
}
