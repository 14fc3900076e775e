//! Parsers for structured content inside model responses
//!
//! Each parser tries, in order: a fenced code block, a bare pattern, and
//! (for SQL only) the whole response. When nothing matches the caller gets
//! `None` or an error naming what was missing.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};
use thiserror::Error;

#[allow(clippy::expect_used)]
static FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[ \t]*([A-Za-z0-9_+-]*)[^\n]*\n(.*?)```").expect("constant regex pattern is valid")
});

#[allow(clippy::expect_used)]
static REPORT_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)report[_ \t-]*start[: \t]*").expect("constant regex pattern is valid"));

#[allow(clippy::expect_used)]
static LEADING_HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#{1,6}[ \t]+\S").expect("constant regex pattern is valid"));

#[allow(clippy::expect_used)]
static HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*#{1,6}[ \t]+\S").expect("constant regex pattern is valid"));

/// Why no JSON object could be taken from a response
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JsonExtractError {
    #[error("No JSON was found in the response")]
    NotFound,

    #[error("Invalid JSON: {0}")]
    Malformed(String),
}

struct Fence<'a> {
    lang: &'a str,
    body: &'a str,
}

fn fences(text: &str) -> Vec<Fence<'_>> {
    FENCE
        .captures_iter(text)
        .filter_map(|caps| {
            Some(Fence {
                lang: caps.get(1).map(|m| m.as_str()).unwrap_or(""),
                body: caps.get(2)?.as_str(),
            })
        })
        .collect()
}

/// Drop a dangling opening or closing fence line
fn trim_fence_markers(text: &str) -> &str {
    let mut body = text.trim();
    if body.starts_with("```") {
        body = body.split_once('\n').map(|(_, rest)| rest).unwrap_or("");
    }
    body.trim_end().trim_end_matches("```").trim()
}

/// Take a SQL statement from a response
///
/// Prefers a block fenced as `sql`, then any fenced block, then the whole
/// response.
pub fn extract_sql(text: &str) -> Option<String> {
    let blocks = fences(text);
    let body = blocks
        .iter()
        .find(|f| f.lang.eq_ignore_ascii_case("sql"))
        .or_else(|| blocks.first())
        .map(|f| f.body)
        .unwrap_or(text);

    let sql = trim_fence_markers(body);
    if sql.is_empty() { None } else { Some(sql.to_string()) }
}

fn parse_object(candidate: &str) -> Result<Map<String, Value>, String> {
    match serde_json::from_str::<Value>(candidate.trim()) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err("expected a JSON object".to_string()),
        Err(e) => Err(e.to_string()),
    }
}

/// Balanced `{...}` spans in order of their opening brace
fn brace_spans(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut spans = Vec::new();

    for (start, _) in text.match_indices('{') {
        let mut depth = 0usize;
        let mut in_string = false;
        let mut escaped = false;

        for (offset, &b) in bytes[start..].iter().enumerate() {
            if in_string {
                match b {
                    _ if escaped => escaped = false,
                    b'\\' => escaped = true,
                    b'"' => in_string = false,
                    _ => {}
                }
                continue;
            }
            match b {
                b'"' => in_string = true,
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        spans.push(&text[start..=start + offset]);
                        break;
                    }
                }
                _ => {}
            }
        }
    }
    spans
}

/// Take the first JSON object from a response
///
/// Blocks fenced as `json` are tried first, then every balanced brace span.
/// When candidates exist but none parse, the first parse error is returned.
pub fn extract_json_object(text: &str) -> Result<Map<String, Value>, JsonExtractError> {
    let mut first_error: Option<String> = None;

    let fenced = fences(text);
    let candidates = fenced
        .iter()
        .filter(|f| f.lang.eq_ignore_ascii_case("json"))
        .map(|f| f.body)
        .chain(brace_spans(text));

    for candidate in candidates {
        match parse_object(candidate) {
            Ok(map) => return Ok(map),
            Err(e) => {
                first_error.get_or_insert(e);
            }
        }
    }

    Err(first_error.map(JsonExtractError::Malformed).unwrap_or(JsonExtractError::NotFound))
}

/// Take the report from a response: everything from the first markdown
/// heading on
///
/// A heading may also follow a `REPORT_START` marker on the same line.
pub fn extract_report(text: &str) -> Option<String> {
    let at_line_start = HEADING.find(text).map(|m| m.start());
    let after_marker = REPORT_MARKER
        .find_iter(text)
        .map(|m| m.end())
        .find(|&end| LEADING_HEADING.is_match(&text[end..]));

    let start = match (at_line_start, after_marker) {
        (Some(a), Some(b)) => a.min(b),
        (a, b) => a.or(b)?,
    };
    Some(text[start..].trim().to_string())
}

/// Take the query from a `{"query": "..."}` answer, falling back to SQL
/// extraction
pub fn extract_query(text: &str) -> Option<String> {
    if let Ok(map) = extract_json_object(text)
        && let Some(Value::String(query)) = map.get("query")
        && !query.trim().is_empty()
    {
        return Some(query.trim().to_string());
    }
    extract_sql(text)
}
