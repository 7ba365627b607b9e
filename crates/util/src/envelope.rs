//! Accessors for the structured AMI response envelope.
//!
//! Messages live at `AMIMessage.info[].$` and `AMIMessage.error[].$`.
//! Result tables are `rowset` nodes, nested at any depth and tagged with an
//! `@type` attribute; each holds `row[].field[]` entries whose name is the
//! `@name` attribute and whose value is `$`.

use once_cell::sync::Lazy;
use serde_json::{Value, json};

use crate::query::{PathQuery, PathQueryError, quote_literal, scalar_text};

pub const INFO_PATH: &str = ".AMIMessage.info.$";
pub const ERROR_PATH: &str = ".AMIMessage.error.$";

const MESSAGE_SEPARATOR: &str = ". ";

static INFO_QUERY: Lazy<PathQuery> = Lazy::new(|| PathQuery::parse(INFO_PATH).expect("info path compiles"));
static ERROR_QUERY: Lazy<PathQuery> = Lazy::new(|| PathQuery::parse(ERROR_PATH).expect("error path compiles"));
static FIELD_QUERY: Lazy<PathQuery> = Lazy::new(|| PathQuery::parse(".field").expect("field path compiles"));

/// Informational messages, in document order.
pub fn info_messages(document: &Value) -> Vec<String> {
    collect_text(&INFO_QUERY, document)
}

/// Error messages, in document order.
pub fn error_messages(document: &Value) -> Vec<String> {
    collect_text(&ERROR_QUERY, document)
}

pub fn join_messages(messages: &[String]) -> String {
    messages.join(MESSAGE_SEPARATOR)
}

/// Envelope whose only content is one error message.
pub fn error_envelope(message: &str) -> Value {
    json!({"AMIMessage": [{"error": [{"$": message}]}]})
}

/// Path selecting every row of the rowsets tagged `rowset_type`.
pub fn rowset_rows_path(rowset_type: &str) -> String {
    format!("..rowset{{.@type === {}}}.row", quote_literal(rowset_type))
}

/// Rows of every rowset tagged `rowset_type`, in document order.
pub fn rowset_rows<'a>(document: &'a Value, rowset_type: &str) -> Result<Vec<&'a Value>, PathQueryError> {
    Ok(PathQuery::parse(&rowset_rows_path(rowset_type))?.select(document))
}

/// `(name, value)` pairs of one row. Fields without a name are skipped; a
/// missing value reads as an empty string.
pub fn row_fields(row: &Value) -> Vec<(String, String)> {
    FIELD_QUERY
        .select(row)
        .into_iter()
        .filter_map(|field| {
            let name = field.get("@name").and_then(scalar_text)?;
            let value = match field.get("$") {
                Some(value) => scalar_text(value).unwrap_or_else(|| value.to_string()),
                None => String::new(),
            };
            Some((name, value))
        })
        .collect()
}

fn collect_text(query: &PathQuery, document: &Value) -> Vec<String> {
    query
        .select(document)
        .into_iter()
        .map(|value| scalar_text(value).unwrap_or_else(|| value.to_string()))
        .collect()
}
