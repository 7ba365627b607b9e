//! Declarative path queries over JSON documents.
//!
//! A path is a chain of steps applied to a set of nodes:
//!
//! - `.key` selects the child `key` of each node
//! - `..key` selects every descendant named `key`, at any depth
//! - `.*` / `..*` select all children / all descendants
//! - `{.sub.path === "literal"}` keeps nodes whose sub-path has a value equal
//!   to the literal (`==`, `!==` and `!=` are accepted too); `{.sub.path}`
//!   keeps nodes where the sub-path exists
//!
//! Arrays are transparent: a step applied to an array applies to each
//! element, and a selected array contributes its elements. This matches the
//! shape of AMI envelopes, where every level is wrapped in a list.
//!
//! ```rust
//! use ami_util::query;
//! use serde_json::json;
//!
//! let envelope = json!({"AMIMessage": [{"info": [{"$": "ok"}]}]});
//! let infos = query(".AMIMessage.info.$", &envelope).unwrap();
//! assert_eq!(infos, vec![&json!("ok")]);
//! ```

use serde_json::Value;
use thiserror::Error;

/// Error returned when a path cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathQueryError {
    #[error("path query '{path}' must start with '.'")]
    MissingLeadingDot { path: String },

    #[error("path query '{path}' has an empty key at offset {offset}")]
    EmptyKey { path: String, offset: usize },

    #[error("path query '{path}' has an unterminated predicate")]
    UnterminatedPredicate { path: String },

    #[error("path query '{path}' has an invalid predicate '{predicate}'")]
    InvalidPredicate { path: String, predicate: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Selector {
    Child(String),
    Descendant(String),
    AllChildren,
    AllDescendants,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PredicateTest {
    Exists,
    Equals(String),
    NotEquals(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Predicate {
    steps: Vec<Step>,
    test: PredicateTest,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Step {
    selector: Selector,
    predicates: Vec<Predicate>,
}

/// A compiled path query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathQuery {
    source: String,
    steps: Vec<Step>,
}

impl PathQuery {
    /// Compile `path`. A lone `.` selects the document itself.
    pub fn parse(path: &str) -> Result<Self, PathQueryError> {
        let source = path.trim().to_string();
        let steps = parse_steps(&source, &source)?;
        Ok(Self { source, steps })
    }

    /// The path this query was compiled from.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Every node matched by the query, in document order.
    pub fn select<'a>(&self, document: &'a Value) -> Vec<&'a Value> {
        select_steps(&self.steps, document)
    }
}

/// Compile `path` and evaluate it against `document`.
pub fn query<'a>(path: &str, document: &'a Value) -> Result<Vec<&'a Value>, PathQueryError> {
    Ok(PathQuery::parse(path)?.select(document))
}

/// Quote `text` as a predicate literal.
pub fn quote_literal(text: &str) -> String {
    format!("\"{}\"", text.replace('\\', "\\\\").replace('"', "\\\""))
}

/// String form of a scalar used in predicate comparisons and field values.
pub fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Null => Some(String::new()),
        Value::Array(_) | Value::Object(_) => None,
    }
}

fn select_steps<'a>(steps: &[Step], document: &'a Value) -> Vec<&'a Value> {
    let mut current = vec![document];
    for step in steps {
        let mut next = Vec::new();
        for node in current {
            apply_selector(&step.selector, node, &mut next);
        }
        next.retain(|candidate| step.predicates.iter().all(|predicate| predicate.matches(candidate)));
        current = next;
    }
    current
}

fn apply_selector<'a>(selector: &Selector, node: &'a Value, out: &mut Vec<&'a Value>) {
    match node {
        Value::Array(items) => {
            for item in items {
                apply_selector(selector, item, out);
            }
        }
        Value::Object(map) => match selector {
            Selector::Child(key) => {
                if let Some(child) = map.get(key) {
                    push_flattened(child, out);
                }
            }
            Selector::AllChildren => {
                for child in map.values() {
                    push_flattened(child, out);
                }
            }
            Selector::Descendant(_) | Selector::AllDescendants => collect_descendants(selector, node, out),
        },
        _ => {}
    }
}

fn collect_descendants<'a>(selector: &Selector, node: &'a Value, out: &mut Vec<&'a Value>) {
    match node {
        Value::Object(map) => {
            for (key, child) in map {
                let selected = match selector {
                    Selector::Descendant(wanted) => wanted == key,
                    _ => true,
                };
                if selected {
                    push_flattened(child, out);
                }
                collect_descendants(selector, child, out);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_descendants(selector, item, out);
            }
        }
        _ => {}
    }
}

fn push_flattened<'a>(value: &'a Value, out: &mut Vec<&'a Value>) {
    match value {
        Value::Array(items) => {
            for item in items {
                push_flattened(item, out);
            }
        }
        other => out.push(other),
    }
}

impl Predicate {
    fn matches(&self, candidate: &Value) -> bool {
        let values = select_steps(&self.steps, candidate);
        match &self.test {
            PredicateTest::Exists => !values.is_empty(),
            PredicateTest::Equals(literal) => values.iter().any(|value| scalar_text(value).as_deref() == Some(literal.as_str())),
            PredicateTest::NotEquals(literal) => !values.iter().any(|value| scalar_text(value).as_deref() == Some(literal.as_str())),
        }
    }
}

fn parse_steps(text: &str, source: &str) -> Result<Vec<Step>, PathQueryError> {
    if text == "." {
        return Ok(Vec::new());
    }
    if !text.starts_with('.') {
        return Err(PathQueryError::MissingLeadingDot { path: source.to_string() });
    }

    let chars = text.char_indices().collect::<Vec<_>>();
    let mut steps = Vec::new();
    let mut index = 0;

    while index < chars.len() {
        // Every step begins with one or two dots.
        if chars[index].1 != '.' {
            return Err(PathQueryError::EmptyKey {
                path: source.to_string(),
                offset: chars[index].0,
            });
        }
        index += 1;
        let descendant = index < chars.len() && chars[index].1 == '.';
        if descendant {
            index += 1;
        }

        let key_start = index;
        while index < chars.len() && !matches!(chars[index].1, '.' | '{' | '}') {
            index += 1;
        }
        let key = chars[key_start..index].iter().map(|(_, character)| *character).collect::<String>();
        if key.is_empty() || key.chars().any(char::is_whitespace) {
            let offset = chars.get(key_start).map(|(offset, _)| *offset).unwrap_or(text.len());
            return Err(PathQueryError::EmptyKey {
                path: source.to_string(),
                offset,
            });
        }

        let selector = match (descendant, key.as_str()) {
            (false, "*") => Selector::AllChildren,
            (true, "*") => Selector::AllDescendants,
            (false, _) => Selector::Child(key),
            (true, _) => Selector::Descendant(key),
        };

        let mut predicates = Vec::new();
        while index < chars.len() && chars[index].1 == '{' {
            let body_start = index + 1;
            let body_end = find_predicate_end(&chars, body_start).ok_or_else(|| PathQueryError::UnterminatedPredicate {
                path: source.to_string(),
            })?;
            let body = chars[body_start..body_end].iter().map(|(_, character)| *character).collect::<String>();
            predicates.push(parse_predicate(&body, source)?);
            index = body_end + 1;
        }
        if index < chars.len() && chars[index].1 == '}' {
            return Err(PathQueryError::InvalidPredicate {
                path: source.to_string(),
                predicate: "}".to_string(),
            });
        }

        steps.push(Step { selector, predicates });
    }

    Ok(steps)
}

/// Index of the `}` closing a predicate body, skipping quoted literals and
/// nested predicates.
fn find_predicate_end(chars: &[(usize, char)], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (position, (_, character)) in chars.iter().enumerate().skip(start) {
        if let Some(open) = quote {
            if escaped {
                escaped = false;
            } else if *character == '\\' {
                escaped = true;
            } else if *character == open {
                quote = None;
            }
            continue;
        }
        match character {
            '"' | '\'' => quote = Some(*character),
            '{' => depth += 1,
            '}' if depth == 0 => return Some(position),
            '}' => depth -= 1,
            _ => {}
        }
    }
    None
}

fn parse_predicate(body: &str, source: &str) -> Result<Predicate, PathQueryError> {
    let invalid = || PathQueryError::InvalidPredicate {
        path: source.to_string(),
        predicate: body.to_string(),
    };
    let trimmed = body.trim();

    let Some((operator_start, operator)) = find_operator(trimmed) else {
        let steps = parse_steps(trimmed, source).map_err(|_| invalid())?;
        if steps.is_empty() {
            return Err(invalid());
        }
        return Ok(Predicate {
            steps,
            test: PredicateTest::Exists,
        });
    };

    let left = trimmed[..operator_start].trim();
    let right = trimmed[operator_start + operator.len()..].trim();
    let steps = parse_steps(left, source).map_err(|_| invalid())?;
    if steps.is_empty() {
        return Err(invalid());
    }
    let literal = parse_literal(right).ok_or_else(invalid)?;
    let test = if operator.starts_with('!') {
        PredicateTest::NotEquals(literal)
    } else {
        PredicateTest::Equals(literal)
    };
    Ok(Predicate { steps, test })
}

/// Byte offset and text of the first comparison operator outside quotes.
fn find_operator(text: &str) -> Option<(usize, &'static str)> {
    const OPERATORS: [&str; 4] = ["===", "!==", "==", "!="];
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (offset, character) in text.char_indices() {
        if let Some(open) = quote {
            if escaped {
                escaped = false;
            } else if character == '\\' {
                escaped = true;
            } else if character == open {
                quote = None;
            }
            continue;
        }
        if character == '"' || character == '\'' {
            quote = Some(character);
            continue;
        }
        if let Some(operator) = OPERATORS.iter().find(|operator| text[offset..].starts_with(**operator)) {
            return Some((offset, *operator));
        }
    }
    None
}

fn parse_literal(text: &str) -> Option<String> {
    let mut chars = text.chars();
    let open = chars.next().filter(|character| *character == '"' || *character == '\'')?;

    let mut literal = String::new();
    let mut escaped = false;
    while let Some(character) = chars.next() {
        if escaped {
            literal.push(character);
            escaped = false;
        } else if character == '\\' {
            escaped = true;
        } else if character == open {
            return chars.as_str().is_empty().then_some(literal);
        } else {
            literal.push(character);
        }
    }
    None
}
