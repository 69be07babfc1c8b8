use miette::NamedSource;
use reqwest::header::HeaderMap;
use reqwest::header::HeaderName;
use reqwest::header::HeaderValue;
use toml::Value;

use super::ValidationError;
use super::Validator;
use super::find_span;
use super::validation_err;
use crate::asserter::Expectation;
use crate::parser::Test;
use crate::schema::Schema;
use crate::shape::ExpectedShape;

/// Parses a single header key-value pair and adds it to the HeaderMap.
fn parse_single_header(
    header_map: &mut HeaderMap,
    key: &str,
    value: &Value,
    validator: &Validator,
) -> Result<(), ValidationError> {
    let v_str = value.as_str().ok_or_else(|| {
        validation_err!(
            key,
            format!("Header value must be a string, got {value}"),
            validator,
            key
        )
    })?;

    let name = HeaderName::from_bytes(key.as_bytes()).map_err(|e| {
        validation_err!(
            key,
            format!("Invalid header name `{key}`: {e}"),
            validator,
            key
        )
    })?;

    let h_value = HeaderValue::from_str(v_str).map_err(|e| {
        validation_err!(
            key,
            format!("Invalid header value for `{key}`: {e}"),
            validator,
            v_str
        )
    })?;

    header_map.insert(name, h_value);
    Ok(())
}

/// Parses a TOML table of header names to string values.
pub fn parse_header_map(value: &Value, validator: &Validator) -> Result<HeaderMap, ValidationError> {
    let map = value.as_table().ok_or_else(|| {
        validation_err!(
            "headers",
            format!("Expected a table for headers, got {value}"),
            validator,
            "headers"
        )
    })?;

    let mut header_map = HeaderMap::new();

    for (k, v) in map {
        parse_single_header(&mut header_map, k, v, validator)?;
    }

    Ok(header_map)
}

/// Collects every body and header expectation declared on a test.
pub fn parse_expectations(
    test: &Test,
    validator: &Validator,
) -> Result<Vec<Expectation>, ValidationError> {
    let mut expectations = vec![];

    let shape = |field: &str, value: &serde_json::Value| {
        ExpectedShape::from_json(value).map_err(|e| {
            validation_err!(format!("{} - {field}", test.name), e, validator, field)
        })
    };

    if let Some(value) = &test.assert_json {
        expectations.push(Expectation::Json(shape("assert_json", value)?));
    }

    if let Some(value) = &test.assert_json_like {
        expectations.push(Expectation::JsonLike(shape("assert_json_like", value)?));
    }

    if let Some(value) = &test.assert_schema {
        let schema = Schema::compile(value).map_err(|e| {
            validation_err!(
                format!("{} - assert_schema", test.name),
                e,
                validator,
                "assert_schema"
            )
        })?;
        expectations.push(Expectation::Schema(schema));
    }

    if let Some(value) = &test.assert_headers {
        expectations.push(Expectation::Headers(parse_header_map(value, validator)?));
    }

    Ok(expectations)
}
