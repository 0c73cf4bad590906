//! Edge conditions
//!
//! Conditions are small expressions evaluated against the output of the edge's
//! source node. They are parsed once, when the graph is compiled.
//!
//! | form                 | holds when                                          |
//! |----------------------|-----------------------------------------------------|
//! | `approved`           | the value at `approved` is truthy                   |
//! | `!approved`          | the value is missing or falsy                       |
//! | `status == "done"`   | JSON equality (numbers compare numerically)         |
//! | `score >= 0.5`       | numeric or string ordering (`>`, `>=`, `<`, `<=`)   |
//! | `reply =~ /^yes/i`   | the string value matches the regex                  |
//! | `a && b`, `a \|\| b` | conjunction / disjunction, `&&` binds tighter       |
//! | `true`, `false`      | constant                                            |
//!
//! Paths are dot separated (`review.decision`, `items.0.id`); a leading `$.`
//! is accepted. Right-hand literals are JSON (`3`, `"text"`, `null`), single
//! quoted strings, or bare words taken as strings.

use crate::error::{GraphError, Result};
use regex::Regex;
use serde_json::Value;
use std::cmp::Ordering;

/// Comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

/// A parsed edge condition
#[derive(Debug, Clone)]
pub enum Condition {
    /// Constant
    Const(bool),
    /// Value at path is truthy
    Truthy(Vec<String>),
    /// Value at path is missing or falsy
    Falsy(Vec<String>),
    /// Compare value at path with a literal
    Compare {
        path: Vec<String>,
        op: CompareOp,
        value: Value,
    },
    /// String value at path matches a regex
    Matches { path: Vec<String>, regex: Regex },
    /// Every condition holds
    All(Vec<Condition>),
    /// At least one condition holds
    Any(Vec<Condition>),
}

impl Condition {
    /// Parse a condition expression
    pub fn parse(expression: &str) -> Result<Self> {
        let trimmed = expression.trim();
        if trimmed.is_empty() {
            return Ok(Condition::Const(true));
        }

        let alternatives = split_top_level(trimmed, "||");
        let mut any = Vec::with_capacity(alternatives.len());
        for alternative in alternatives {
            let terms = split_top_level(alternative, "&&");
            let mut all = Vec::with_capacity(terms.len());
            for term in terms {
                all.push(parse_atom(term.trim(), expression)?);
            }
            any.push(if all.len() == 1 {
                all.remove(0)
            } else {
                Condition::All(all)
            });
        }

        Ok(if any.len() == 1 {
            any.remove(0)
        } else {
            Condition::Any(any)
        })
    }

    /// Evaluate against a node's output state
    pub fn evaluate(&self, state: &Value) -> bool {
        match self {
            Condition::Const(value) => *value,
            Condition::Truthy(path) => lookup(state, path).map(is_truthy).unwrap_or(false),
            Condition::Falsy(path) => !lookup(state, path).map(is_truthy).unwrap_or(false),
            Condition::Compare { path, op, value } => match lookup(state, path) {
                Some(actual) => compare(actual, *op, value),
                None => match op {
                    CompareOp::Eq => value.is_null(),
                    CompareOp::Ne => !value.is_null(),
                    _ => false,
                },
            },
            Condition::Matches { path, regex } => lookup(state, path)
                .and_then(Value::as_str)
                .map(|s| regex.is_match(s))
                .unwrap_or(false),
            Condition::All(conditions) => conditions.iter().all(|c| c.evaluate(state)),
            Condition::Any(conditions) => conditions.iter().any(|c| c.evaluate(state)),
        }
    }
}

/// Split on `separator` outside of quoted strings
fn split_top_level<'a>(input: &'a str, separator: &str) -> Vec<&'a str> {
    let mut parts = Vec::new();
    let mut quote: Option<char> = None;
    let mut start = 0;
    let mut iter = input.char_indices();

    while let Some((idx, ch)) = iter.next() {
        match quote {
            Some(_) if ch == '\\' => {
                iter.next();
            }
            Some(q) if ch == q => quote = None,
            Some(_) => {}
            None if ch == '"' || ch == '\'' => quote = Some(ch),
            None if input[idx..].starts_with(separator) => {
                parts.push(&input[start..idx]);
                start = idx + separator.len();
                for _ in 1..separator.len() {
                    iter.next();
                }
            }
            None => {}
        }
    }
    parts.push(&input[start..]);
    parts
}

fn invalid(expression: &str, reason: impl Into<String>) -> GraphError {
    GraphError::Condition {
        expression: expression.to_string(),
        reason: reason.into(),
    }
}

fn is_path_char(ch: char) -> bool {
    ch.is_alphanumeric() || matches!(ch, '_' | '.' | '-' | '$')
}

fn parse_path(raw: &str, expression: &str) -> Result<Vec<String>> {
    let raw = raw.strip_prefix("$.").or_else(|| raw.strip_prefix('$')).unwrap_or(raw);
    if raw.is_empty() {
        return Err(invalid(expression, "missing path"));
    }
    let segments: Vec<String> = raw.split('.').map(str::to_string).collect();
    if segments.iter().any(String::is_empty) {
        return Err(invalid(expression, format!("malformed path '{}'", raw)));
    }
    Ok(segments)
}

fn parse_atom(term: &str, expression: &str) -> Result<Condition> {
    if term.is_empty() {
        return Err(invalid(expression, "empty term"));
    }
    match term {
        "true" => return Ok(Condition::Const(true)),
        "false" => return Ok(Condition::Const(false)),
        _ => {}
    }

    if let Some(rest) = term.strip_prefix('!') {
        if !rest.starts_with('=') {
            let rest = rest.trim();
            if !rest.chars().all(is_path_char) {
                return Err(invalid(expression, "negation applies to a path only"));
            }
            return Ok(Condition::Falsy(parse_path(rest, expression)?));
        }
    }

    let path_end = term
        .char_indices()
        .find(|(_, ch)| !is_path_char(*ch))
        .map(|(idx, _)| idx)
        .unwrap_or(term.len());
    let path = parse_path(&term[..path_end], expression)?;
    let rest = term[path_end..].trim_start();

    if rest.is_empty() {
        return Ok(Condition::Truthy(path));
    }

    let (op, literal) = if let Some(lit) = rest.strip_prefix("=~") {
        return Ok(Condition::Matches {
            path,
            regex: parse_regex(lit.trim(), expression)?,
        });
    } else if let Some(lit) = rest.strip_prefix("==") {
        (CompareOp::Eq, lit)
    } else if let Some(lit) = rest.strip_prefix("!=") {
        (CompareOp::Ne, lit)
    } else if let Some(lit) = rest.strip_prefix(">=") {
        (CompareOp::Ge, lit)
    } else if let Some(lit) = rest.strip_prefix("<=") {
        (CompareOp::Le, lit)
    } else if let Some(lit) = rest.strip_prefix('>') {
        (CompareOp::Gt, lit)
    } else if let Some(lit) = rest.strip_prefix('<') {
        (CompareOp::Lt, lit)
    } else {
        return Err(invalid(expression, format!("unexpected '{}'", rest)));
    };

    Ok(Condition::Compare {
        path,
        op,
        value: parse_literal(literal.trim(), expression)?,
    })
}

fn parse_literal(raw: &str, expression: &str) -> Result<Value> {
    if raw.is_empty() {
        return Err(invalid(expression, "missing value"));
    }
    if let Ok(value) = serde_json::from_str::<Value>(raw) {
        return Ok(value);
    }
    if raw.len() >= 2 && raw.starts_with('\'') && raw.ends_with('\'') {
        return Ok(Value::String(raw[1..raw.len() - 1].to_string()));
    }
    if raw.chars().any(char::is_whitespace) {
        return Err(invalid(expression, format!("unquoted value '{}'", raw)));
    }
    Ok(Value::String(raw.to_string()))
}

/// Parse `/pattern/flags` or a bare pattern
fn parse_regex(raw: &str, expression: &str) -> Result<Regex> {
    let (pattern, case_insensitive) = match raw.strip_prefix('/').and_then(|r| {
        r.rfind('/').map(|end| (&r[..end], r[end + 1..].contains('i')))
    }) {
        Some(parsed) => parsed,
        None => (raw, false),
    };

    let pattern = if case_insensitive {
        format!("(?i){}", pattern)
    } else {
        pattern.to_string()
    };

    Regex::new(&pattern).map_err(|e| invalid(expression, e.to_string()))
}

fn lookup<'a>(state: &'a Value, path: &[String]) -> Option<&'a Value> {
    path.iter().try_fold(state, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

fn compare(actual: &Value, op: CompareOp, expected: &Value) -> bool {
    let ordering = match (actual, expected) {
        (Value::Number(a), Value::Number(b)) => a
            .as_f64()
            .zip(b.as_f64())
            .and_then(|(a, b)| a.partial_cmp(&b)),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    };

    match op {
        CompareOp::Eq => ordering.map(|o| o == Ordering::Equal).unwrap_or(actual == expected),
        CompareOp::Ne => ordering.map(|o| o != Ordering::Equal).unwrap_or(actual != expected),
        CompareOp::Gt => ordering == Some(Ordering::Greater),
        CompareOp::Ge => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
        CompareOp::Lt => ordering == Some(Ordering::Less),
        CompareOp::Le => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
    }
}
