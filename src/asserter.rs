use core::fmt;
use std::fmt::Display;

use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use serde::Serialize;
use serde_json::Value;

use crate::context::TemplateError;
use crate::context::TestContext;
use crate::error::CaseError;
use crate::path::JsonPath;
use crate::request::CapturedResponse;
use crate::schema::Schema;
use crate::shape::ExpectedShape;
use crate::shape::JsonType;

const BODY_SNIPPET_LEN: usize = 200;

/// One violated constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Mismatch {
    pub path: String,
    pub reason: String,
}

impl Mismatch {
    pub fn new(path: &JsonPath, reason: impl Into<String>) -> Self {
        Self {
            path: path.to_string(),
            reason: reason.into(),
        }
    }
}

impl Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.reason)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// Closed objects, arrays of equal length.
    Exact,
    /// Extra object members and trailing array elements are allowed.
    Like,
}

#[derive(Debug, Clone)]
pub enum Expectation {
    Json(ExpectedShape),
    JsonLike(ExpectedShape),
    Schema(Schema),
    Headers(HeaderMap),
}

impl Display for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expectation::Json(_) => write!(f, "JSON test"),
            Expectation::JsonLike(_) => write!(f, "JSON like test"),
            Expectation::Schema(_) => write!(f, "JSON schema test"),
            Expectation::Headers(_) => write!(f, "Header test"),
        }
    }
}

impl Expectation {
    pub fn render(&self, ctx: &TestContext) -> Result<Self, TemplateError> {
        Ok(match self {
            Expectation::Json(shape) => Expectation::Json(shape.render(ctx)?),
            Expectation::JsonLike(shape) => Expectation::JsonLike(shape.render(ctx)?),
            other => other.clone(),
        })
    }

    pub fn check(&self, response: &CapturedResponse) -> Vec<Mismatch> {
        match self {
            Expectation::Json(shape) => check_body(shape, response, MatchMode::Exact),
            Expectation::JsonLike(shape) => check_body(shape, response, MatchMode::Like),
            Expectation::Schema(schema) => match &response.body_json {
                Some(body) => schema.validate(body),
                None => vec![not_json(response)],
            },
            Expectation::Headers(expected) => assert_headers(expected, &response.headers),
        }
    }
}

/// Checks the status first; body and header expectations only run when it
/// matches, so a wrong status is the single reported failure.
pub fn assert_response(
    expected_status: StatusCode,
    expectations: &[Expectation],
    response: &CapturedResponse,
) -> Result<(), CaseError> {
    assert_status(expected_status, response)?;

    let mismatches: Vec<Mismatch> = expectations
        .iter()
        .flat_map(|expectation| expectation.check(response))
        .collect();

    if mismatches.is_empty() {
        Ok(())
    } else {
        Err(CaseError::ShapeMismatch(mismatches))
    }
}

fn assert_status(expected: StatusCode, response: &CapturedResponse) -> Result<(), CaseError> {
    if expected == response.status {
        return Ok(());
    }

    Err(CaseError::StatusMismatch {
        expected,
        actual: response.status,
        body: snippet(&response.body_text),
    })
}

/// Subset match: every expected header must be present with the same value.
fn assert_headers(expected: &HeaderMap, actual: &HeaderMap) -> Vec<Mismatch> {
    let mut mismatches = vec![];

    for (key, expected_value) in expected {
        let path = JsonPath::root().key("headers").key(key.as_str());
        let expected_str = expected_value.to_str().unwrap_or("<invalid utf8>");

        match actual.get(key) {
            None => mismatches.push(Mismatch::new(
                &path,
                format!("missing header, expected {expected_str:?}"),
            )),
            Some(actual_value) if actual_value.as_bytes() != expected_value.as_bytes() => {
                mismatches.push(Mismatch::new(
                    &path,
                    format!(
                        "expected {expected_str:?}, got {:?}",
                        actual_value.to_str().unwrap_or("<invalid utf8>")
                    ),
                ))
            }
            Some(_) => {}
        }
    }

    mismatches
}

fn check_body(shape: &ExpectedShape, response: &CapturedResponse, mode: MatchMode) -> Vec<Mismatch> {
    match &response.body_json {
        Some(body) => match_shape(shape, body, mode),
        None => vec![not_json(response)],
    }
}

fn not_json(response: &CapturedResponse) -> Mismatch {
    Mismatch::new(
        &JsonPath::root(),
        format!("response body is not JSON: {:?}", snippet(&response.body_text)),
    )
}

/// Depth-first comparison collecting every mismatch. A mismatching node is
/// reported once and not descended into; its siblings are still visited.
pub fn match_shape(expected: &ExpectedShape, actual: &Value, mode: MatchMode) -> Vec<Mismatch> {
    let mut mismatches = vec![];
    walk(expected, actual, &JsonPath::root(), mode, &mut mismatches);
    mismatches
}

fn walk(
    expected: &ExpectedShape,
    actual: &Value,
    path: &JsonPath,
    mode: MatchMode,
    out: &mut Vec<Mismatch>,
) {
    match expected {
        ExpectedShape::Literal(literal) => {
            if !literal_eq(literal, actual) {
                out.push(Mismatch::new(path, format!("expected {literal}, got {actual}")));
            }
        }
        ExpectedShape::TypeAny(ty) => {
            if !ty.accepts(actual) {
                out.push(Mismatch::new(
                    path,
                    format!("expected any {ty}, got {} {actual}", JsonType::of(actual)),
                ));
            }
        }
        ExpectedShape::RegexString(regex) => match actual.as_str() {
            Some(s) if regex.is_match(s) => {}
            Some(s) => out.push(Mismatch::new(
                path,
                format!("expected string matching /{}/, got {s:?}", regex.as_str()),
            )),
            None => out.push(Mismatch::new(
                path,
                format!(
                    "expected string matching /{}/, got {} {actual}",
                    regex.as_str(),
                    JsonType::of(actual)
                ),
            )),
        },
        ExpectedShape::Object(fields) => {
            let Some(members) = actual.as_object() else {
                out.push(Mismatch::new(
                    path,
                    format!("expected object, got {}", JsonType::of(actual)),
                ));
                return;
            };

            for (key, shape) in fields {
                match members.get(key) {
                    Some(member) => walk(shape, member, &path.key(key), mode, out),
                    None => out.push(Mismatch::new(&path.key(key), "missing member")),
                }
            }

            if mode == MatchMode::Exact {
                for key in members.keys().filter(|k| !fields.contains_key(*k)) {
                    out.push(Mismatch::new(&path.key(key), "unexpected member"));
                }
            }
        }
        ExpectedShape::Array(items) => {
            let Some(elements) = actual.as_array() else {
                out.push(Mismatch::new(
                    path,
                    format!("expected array, got {}", JsonType::of(actual)),
                ));
                return;
            };

            let length_ok = match mode {
                MatchMode::Exact => elements.len() == items.len(),
                MatchMode::Like => elements.len() >= items.len(),
            };
            if !length_ok {
                out.push(Mismatch::new(
                    path,
                    format!(
                        "expected {} element(s), got {}",
                        items.len(),
                        elements.len()
                    ),
                ));
                return;
            }

            for (i, (shape, element)) in items.iter().zip(elements).enumerate() {
                walk(shape, element, &path.index(i), mode, out);
            }
        }
    }
}

/// Numbers compare by value, so `20` equals `20.0`.
fn literal_eq(expected: &Value, actual: &Value) -> bool {
    match (expected, actual) {
        (Value::Number(a), Value::Number(b)) => {
            if let (Some(a), Some(b)) = (a.as_i64(), b.as_i64()) {
                a == b
            } else if let (Some(a), Some(b)) = (a.as_u64(), b.as_u64()) {
                a == b
            } else {
                a.as_f64() == b.as_f64()
            }
        }
        _ => expected == actual,
    }
}

fn snippet(text: &str) -> String {
    match text.char_indices().nth(BODY_SNIPPET_LEN) {
        Some((end, _)) => format!("{}…", &text[..end]),
        None => text.to_owned(),
    }
}
