//! Helpers shared by the AMI client crates: command assembly, path queries
//! over response envelopes, response decoding and configuration.

pub mod command;
pub mod config;
pub mod envelope;
pub mod http;
pub mod query;

pub use command::*;
pub use config::*;
pub use envelope::*;
pub use query::*;

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;

static REDACTION_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r#"(?i)(-AMI(?:Pass|Code|Token)=)("(?:[^"\\]|\\.)*"|\S+)"#,
        r"(?i)(authorization: )([\w\-\.=:/+]+)",
        r"(?i)([A-Z0-9_]*?(?:KEY|TOKEN|SECRET|PASSWORD|PASS)=)([^\s]+)",
    ]
    .into_iter()
    .map(|pattern| Regex::new(pattern).expect("redaction pattern compiles"))
    .collect()
});

/// Redacts values that look like secrets in a string.
///
/// Covers credential arguments of AMI commands (`-AMIPass="..."`,
/// `-AMICode=...`, `-AMIToken=...`) as well as header and `NAME=value` forms.
pub fn redact_sensitive(input: &str) -> String {
    let mut redacted = input.to_string();
    for pattern in REDACTION_PATTERNS.iter() {
        redacted = pattern
            .replace_all(&redacted, |caps: &regex::Captures| {
                let prefix = caps.get(1).map(|m| m.as_str()).unwrap_or("");
                format!("{}<redacted>", prefix)
            })
            .to_string();
    }
    redacted
}

/// Redacts the command fields of a diagnostic `endpoint?query` string.
///
/// Credentials inside the query are percent-encoded, so each field is decoded,
/// redacted and re-encoded.
pub fn redact_diagnostic_url(diagnostic_url: &str) -> String {
    let Some((endpoint, query)) = diagnostic_url.split_once('?') else {
        return redact_sensitive(diagnostic_url);
    };
    let fields = url::form_urlencoded::parse(query.as_bytes())
        .map(|(key, value)| (key.into_owned(), redact_sensitive(&value)))
        .collect::<IndexMap<_, _>>();
    format!("{}?{}", endpoint, encode_query_string(&fields))
}
