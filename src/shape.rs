use std::collections::BTreeMap;
use std::fmt;

use regex::Regex;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use thiserror::Error;

use crate::context::TemplateError;
use crate::context::TestContext;
use crate::path::JsonPath;

const TYPE_PLACEHOLDER: &str = "$type";
const REGEX_PLACEHOLDER: &str = "$regex";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JsonType {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
    Null,
}

impl JsonType {
    /// The most specific type of `value`; integers report as `Number`.
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(_) => Self::Boolean,
            Value::Number(_) => Self::Number,
            Value::String(_) => Self::String,
            Value::Array(_) => Self::Array,
            Value::Object(_) => Self::Object,
        }
    }

    pub fn accepts(self, value: &Value) -> bool {
        match self {
            Self::Integer => {
                value.is_i64()
                    || value.is_u64()
                    || value.as_f64().is_some_and(|n| n.fract() == 0.0)
            }
            Self::Number => value.is_number(),
            other => Self::of(value) == other,
        }
    }

    fn parse(name: &str) -> Option<Self> {
        serde_json::from_value(Value::String(name.to_owned())).ok()
    }
}

impl fmt::Display for JsonType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
            Self::Null => "null",
        };
        write!(f, "{name}")
    }
}

/// Expected JSON value where some leaves may be placeholders.
///
/// Placeholders are written as single-key objects in contract files:
/// `{ "$type": "number" }` or `{ "$regex": "^\\d{14}$" }`.
#[derive(Debug, Clone)]
pub enum ExpectedShape {
    /// Scalar compared by value.
    Literal(Value),
    /// Any value of the given type.
    TypeAny(JsonType),
    /// Any string matching the pattern.
    RegexString(Regex),
    Object(BTreeMap<String, ExpectedShape>),
    Array(Vec<ExpectedShape>),
}

#[derive(Debug, Error)]
pub enum ShapeError {
    #[error("`{path}`: unknown type `{name}` in $type placeholder")]
    UnknownType { path: String, name: String },

    #[error("`{path}`: {placeholder} placeholder must be a string")]
    NotAString {
        path: String,
        placeholder: &'static str,
    },

    #[error("`{path}`: invalid regex `{pattern}`: {source}")]
    InvalidRegex {
        path: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

impl ExpectedShape {
    pub fn from_json(value: &Value) -> Result<Self, ShapeError> {
        Self::parse_at(value, &JsonPath::root())
    }

    fn parse_at(value: &Value, path: &JsonPath) -> Result<Self, ShapeError> {
        match value {
            Value::Object(map) => {
                if let Some(placeholder) = Self::parse_placeholder(map, path)? {
                    return Ok(placeholder);
                }

                let fields = map
                    .iter()
                    .map(|(key, member)| Ok((key.clone(), Self::parse_at(member, &path.key(key))?)))
                    .collect::<Result<BTreeMap<_, _>, ShapeError>>()?;
                Ok(Self::Object(fields))
            }
            Value::Array(items) => {
                let items = items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| Self::parse_at(item, &path.index(i)))
                    .collect::<Result<Vec<_>, ShapeError>>()?;
                Ok(Self::Array(items))
            }
            scalar => Ok(Self::Literal(scalar.clone())),
        }
    }

    fn parse_placeholder(
        map: &Map<String, Value>,
        path: &JsonPath,
    ) -> Result<Option<Self>, ShapeError> {
        if map.len() != 1 {
            return Ok(None);
        }

        if let Some(name) = map.get(TYPE_PLACEHOLDER) {
            let name = name.as_str().ok_or_else(|| ShapeError::NotAString {
                path: path.to_string(),
                placeholder: TYPE_PLACEHOLDER,
            })?;
            let ty = JsonType::parse(name).ok_or_else(|| ShapeError::UnknownType {
                path: path.to_string(),
                name: name.to_owned(),
            })?;
            return Ok(Some(Self::TypeAny(ty)));
        }

        if let Some(pattern) = map.get(REGEX_PLACEHOLDER) {
            let pattern = pattern.as_str().ok_or_else(|| ShapeError::NotAString {
                path: path.to_string(),
                placeholder: REGEX_PLACEHOLDER,
            })?;
            let regex = Regex::new(pattern).map_err(|source| ShapeError::InvalidRegex {
                path: path.to_string(),
                pattern: pattern.to_owned(),
                source,
            })?;
            return Ok(Some(Self::RegexString(regex)));
        }

        Ok(None)
    }

    /// Substitutes context variables into string literals.
    ///
    /// A literal that is exactly `{var}` takes the variable's JSON value,
    /// so `"{market_id}"` can stand for a numeric id.
    pub fn render(&self, ctx: &TestContext) -> Result<Self, TemplateError> {
        Ok(match self {
            Self::Literal(value) => Self::Literal(ctx.render(value)?),
            Self::TypeAny(ty) => Self::TypeAny(*ty),
            Self::RegexString(regex) => Self::RegexString(regex.clone()),
            Self::Object(fields) => Self::Object(
                fields
                    .iter()
                    .map(|(key, shape)| Ok((key.clone(), shape.render(ctx)?)))
                    .collect::<Result<_, TemplateError>>()?,
            ),
            Self::Array(items) => Self::Array(
                items
                    .iter()
                    .map(|item| item.render(ctx))
                    .collect::<Result<_, TemplateError>>()?,
            ),
        })
    }
}

impl fmt::Display for ExpectedShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(value) => write!(f, "{value}"),
            Self::TypeAny(ty) => write!(f, "any {ty}"),
            Self::RegexString(regex) => write!(f, "string matching /{}/", regex.as_str()),
            Self::Object(_) => write!(f, "object"),
            Self::Array(items) => write!(f, "array of {} element(s)", items.len()),
        }
    }
}
