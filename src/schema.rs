use std::fmt;
use std::sync::Arc;

use jsonschema::Draft;
use jsonschema::Validator;
use jsonschema::error::ValidationErrorKind;
use serde_json::Value;
use thiserror::Error;

use crate::asserter::Mismatch;
use crate::path::JsonPath;

#[derive(Error, Debug)]
#[error("invalid JSON schema: {0}")]
pub struct SchemaError(String);

/// A compiled JSON Schema (draft 2020-12 unless the document says
/// otherwise). Objects stay open unless the schema closes them with
/// `additionalProperties`.
#[derive(Clone)]
pub struct Schema {
    source: Value,
    validator: Arc<Validator>,
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Schema").field(&self.source).finish()
    }
}

impl Schema {
    pub fn compile(source: &Value) -> Result<Self, SchemaError> {
        let validator = jsonschema::options()
            .with_draft(Draft::Draft202012)
            .build(source)
            .map_err(|err| SchemaError(err.to_string()))?;

        Ok(Self {
            source: source.clone(),
            validator: Arc::new(validator),
        })
    }

    /// Every violation in `value`, one mismatch per failed keyword.
    pub fn validate(&self, value: &Value) -> Vec<Mismatch> {
        self.validator
            .iter_errors(value)
            .map(|error| {
                let path = resolve_pointer(value, &error.instance_path.to_string());
                match &error.kind {
                    ValidationErrorKind::Required { property } => {
                        let name = property
                            .as_str()
                            .map(str::to_owned)
                            .unwrap_or_else(|| property.to_string());
                        Mismatch::new(&path.key(&name), "missing required property")
                    }
                    _ => Mismatch::new(&path, error.to_string()),
                }
            })
            .collect()
    }
}

/// Turns a JSON pointer into a `JsonPath`, walking `root` so that numeric
/// object keys stay keys.
fn resolve_pointer(root: &Value, pointer: &str) -> JsonPath {
    let mut path = JsonPath::root();
    let mut current = Some(root);

    for token in pointer.split('/').skip(1) {
        let token = token.replace("~1", "/").replace("~0", "~");
        match (current, token.parse::<usize>()) {
            (Some(Value::Array(elements)), Ok(i)) => {
                current = elements.get(i);
                path = path.index(i);
            }
            (node, _) => {
                current = node.and_then(|n| n.get(&token));
                path = path.key(&token);
            }
        }
    }

    path
}
