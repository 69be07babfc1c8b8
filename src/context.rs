use std::collections::BTreeMap;
use std::sync::LazyLock;

use rand::Rng;
use regex::Captures;
use regex::Regex;
use serde_json::Value;
use thiserror::Error;

use crate::fixture::FixtureGenerator;
use crate::fixture::FixtureKind;
use crate::path::JsonPath;

static VARIABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("variable pattern is a valid regex")
});

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown variable `{name}` in `{template}`")]
pub struct TemplateError {
    pub name: String,
    pub template: String,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("cannot capture `{var}`: response body is not JSON")]
    NoJsonBody { var: String },

    #[error("cannot capture `{var}`: `{path}` is not present in the response")]
    MissingPath { var: String, path: String },
}

/// Copies the value at `path` in a response body into variable `var`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capture {
    pub var: String,
    pub path: JsonPath,
}

/// Per-suite state: generated fixtures plus values captured from earlier
/// responses. Later cases read it through `{var}` templates.
#[derive(Debug, Clone, Default)]
pub struct TestContext {
    vars: BTreeMap<String, Value>,
}

impl TestContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a context holding one freshly generated value per fixture.
    pub fn with_fixtures<R: Rng>(
        fixtures: &BTreeMap<String, FixtureKind>,
        generator: &mut FixtureGenerator<R>,
    ) -> Self {
        let vars = fixtures
            .iter()
            .map(|(name, kind)| (name.clone(), Value::String(generator.generate(*kind))))
            .collect();

        Self { vars }
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.vars.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    pub fn vars(&self) -> &BTreeMap<String, Value> {
        &self.vars
    }

    /// Interpolates every `{var}` in `template`.
    pub fn render_str(&self, template: &str) -> Result<String, TemplateError> {
        let mut missing = None;
        let rendered = VARIABLE.replace_all(template, |caps: &Captures<'_>| {
            match self.vars.get(&caps[1]) {
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => {
                    missing.get_or_insert_with(|| caps[1].to_owned());
                    String::new()
                }
            }
        });

        match missing {
            Some(name) => Err(TemplateError {
                name,
                template: template.to_owned(),
            }),
            None => Ok(rendered.into_owned()),
        }
    }

    /// Renders every string inside `template`. A string that is exactly
    /// `{var}` is replaced by the variable's value with its JSON type intact.
    pub fn render(&self, template: &Value) -> Result<Value, TemplateError> {
        match template {
            Value::String(s) => {
                if let Some(caps) = VARIABLE.captures(s)
                    && caps[0].len() == s.len()
                {
                    return self.vars.get(&caps[1]).cloned().ok_or_else(|| TemplateError {
                        name: caps[1].to_owned(),
                        template: s.clone(),
                    });
                }
                Ok(Value::String(self.render_str(s)?))
            }
            Value::Array(items) => Ok(Value::Array(
                items
                    .iter()
                    .map(|item| self.render(item))
                    .collect::<Result<_, _>>()?,
            )),
            Value::Object(map) => Ok(Value::Object(
                map.iter()
                    .map(|(key, value)| Ok((key.clone(), self.render(value)?)))
                    .collect::<Result<_, TemplateError>>()?,
            )),
            scalar => Ok(scalar.clone()),
        }
    }

    /// Stores every capture or fails on the first one that is absent.
    pub fn capture(&mut self, captures: &[Capture], body: Option<&Value>) -> Result<(), CaptureError> {
        for capture in captures {
            let Some(body) = body else {
                return Err(CaptureError::NoJsonBody {
                    var: capture.var.clone(),
                });
            };

            let value = capture
                .path
                .lookup(body)
                .ok_or_else(|| CaptureError::MissingPath {
                    var: capture.var.clone(),
                    path: capture.path.to_string(),
                })?;

            self.vars.insert(capture.var.clone(), value.clone());
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use std::collections::BTreeMap;

    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use serde_json::json;

    use super::Capture;
    use super::CaptureError;
    use super::TestContext;
    use crate::fixture::FixtureGenerator;
    use crate::fixture::FixtureKind;
    use crate::path::JsonPath;

    fn context() -> TestContext {
        let mut ctx = TestContext::new();
        ctx.set("market_id", json!(12));
        ctx.set("market_name", json!("Mercado Central"));
        ctx
    }

    #[test]
    fn render_str_interpolates_and_leaves_regex_quantifiers() {
        let ctx = context();
        assert_eq!(
            ctx.render_str("/mercado/{market_id}/produtos").unwrap(),
            "/mercado/12/produtos"
        );
        assert_eq!(
            ctx.render_str("{market_name} Atualizado").unwrap(),
            "Mercado Central Atualizado"
        );
        assert_eq!(ctx.render_str(r"^\d{14}$").unwrap(), r"^\d{14}$");
    }

    #[test]
    fn render_keeps_type_of_whole_variable_strings() {
        let ctx = context();
        let body = ctx
            .render(&json!({
                "id": "{market_id}",
                "path": "mercado/{market_id}",
                "itens": ["{market_name}", 20, null]
            }))
            .unwrap();

        assert_eq!(
            body,
            json!({
                "id": 12,
                "path": "mercado/12",
                "itens": ["Mercado Central", 20, null]
            })
        );
    }

    #[test]
    fn unknown_variables_fail() {
        let ctx = context();
        let err = ctx.render_str("/mercado/{fruit_id}").unwrap_err();
        assert_eq!(err.name, "fruit_id");

        let err = ctx.render(&json!({ "id": "{vegetable_id}" })).unwrap_err();
        assert_eq!(err.name, "vegetable_id");
    }

    #[test]
    fn capture_reads_nested_values() {
        let mut ctx = TestContext::new();
        let captures = [Capture {
            var: "market_id".into(),
            path: JsonPath::parse("novoMercado.id").unwrap(),
        }];

        ctx.capture(&captures, Some(&json!({ "novoMercado": { "id": 41 } })))
            .unwrap();
        assert_eq!(ctx.get("market_id"), Some(&json!(41)));

        let err = ctx
            .capture(&captures, Some(&json!({ "message": "ok" })))
            .unwrap_err();
        assert!(matches!(err, CaptureError::MissingPath { .. }));

        let err = ctx.capture(&captures, None).unwrap_err();
        assert!(matches!(err, CaptureError::NoJsonBody { .. }));
    }

    #[test]
    fn with_fixtures_generates_one_value_per_name() {
        let fixtures = BTreeMap::from([
            ("market_name".to_string(), FixtureKind::CompanyName),
            ("market_cnpj".to_string(), FixtureKind::TaxId),
        ]);
        let mut generator = FixtureGenerator::from_rng(StdRng::seed_from_u64(7));

        let ctx = TestContext::with_fixtures(&fixtures, &mut generator);

        assert_eq!(ctx.vars().len(), 2);
        let cnpj = ctx.get("market_cnpj").and_then(|v| v.as_str()).unwrap();
        assert_eq!(cnpj.len(), 14);
    }
}
