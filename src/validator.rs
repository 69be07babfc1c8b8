use std::collections::BTreeMap;
use std::time::Duration;

use miette::Diagnostic;
use miette::NamedSource;
use miette::SourceSpan;
use reqwest::Method;
use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use serde_json::Value;
use thiserror::Error;

mod parser_assertion;

use crate::asserter::Expectation;
use crate::context::Capture;
use crate::context::TestContext;
use crate::error::CaseError;
use crate::fixture::FixtureKind;
use crate::parser;
use crate::parser::ContractFile;
use crate::path::JsonPath;
use crate::request::DEFAULT_TIMEOUT;
use crate::request::RequestSpec;
use crate::request::compose_url;
use crate::request::parse_method;
use crate::request::validate_base_url;

// Error messages for parsing URLs
const BASE_URL_ENDS_WITH: &str =
    "The base URL from setup can't end with a /, and each URL in test must start with one";
const PATH_URL_MISSING_SLASH: &str =
    "The URL field in a test is required to begin with a leading /.";

/// A validated suite, ready to run.
#[derive(Debug, Clone)]
pub struct Suite {
    pub name: String,
    pub base_url: String,
    pub timeout: Duration,
    pub fixtures: BTreeMap<String, FixtureKind>,
    pub cases: Vec<ContractCase>,
}

#[derive(Debug, Clone)]
pub struct ContractCase {
    pub name: String,
    pub method: Method,
    /// Request path, may contain `{var}` templates.
    pub path: String,
    /// Global headers merged with the case's own.
    pub headers: HeaderMap,
    pub body: Option<Value>,
    pub expected_status: StatusCode,
    pub expectations: Vec<Expectation>,
    pub captures: Vec<Capture>,
    pub log: Option<String>,
}

impl ContractCase {
    /// Renders the case's templates against `ctx` and composes the request.
    pub fn request(&self, base_url: &str, ctx: &TestContext) -> Result<RequestSpec, CaseError> {
        let path = ctx.render_str(&self.path)?;
        let url = compose_url(base_url, &path)?;

        let builder = RequestSpec::builder(self.method.clone(), url).headers(&self.headers);
        let builder = match &self.body {
            Some(body) => builder.json(ctx.render(body)?),
            None => builder,
        };

        Ok(builder.build())
    }
}

#[derive(Debug, Error, Diagnostic)]
#[error("Invalid field `{field}`: {message}")]
pub struct ValidationError {
    field: String,
    message: String,
    #[source_code]
    src: Option<NamedSource<String>>,
    #[label("invalid value here")]
    span: Option<SourceSpan>,
}

impl ValidationError {
    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum ContractError {
    #[error("Failed to parse contract file: {message}")]
    #[diagnostic(code(contract::toml))]
    Toml {
        message: String,
        #[source_code]
        src: NamedSource<String>,
        #[label("here")]
        span: Option<SourceSpan>,
    },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Validation(#[from] ValidationError),
}

/// Parses and validates a contract file in one step.
pub fn load_contract(toml_src: &str, file_name: &str) -> Result<Suite, ContractError> {
    let contract: ContractFile = toml::from_str(toml_src).map_err(|e| ContractError::Toml {
        message: e.message().to_owned(),
        src: NamedSource::new(file_name, toml_src.to_owned()),
        span: e.span().map(SourceSpan::from),
    })?;

    Ok(Validator::new(&contract, toml_src, file_name).validate()?)
}

macro_rules! validation_err {
    ($field:expr, $msg:expr, $self:expr, $snippet:expr) => {
        ValidationError {
            field: $field.to_string(),
            message: $msg.to_string(),
            src: Some(NamedSource::new(
                $self.file_name.clone(),
                $self.toml_src.clone(),
            )),
            span: find_span($snippet, &$self.toml_src),
        }
    };
}

pub(crate) use validation_err;

pub struct Validator {
    contract: ContractFile,
    toml_src: String,
    file_name: String,
}

impl Validator {
    pub fn new(contract: &ContractFile, toml_src: &str, file_name: &str) -> Self {
        Self {
            contract: contract.clone(),
            toml_src: toml_src.into(),
            file_name: file_name.into(),
        }
    }

    pub fn validate(&self) -> Result<Suite, ValidationError> {
        let setup = &self.contract.setup;

        validate_base_url(&setup.base_url).map_err(|e| {
            let message = if setup.base_url.ends_with('/') {
                BASE_URL_ENDS_WITH.to_owned()
            } else {
                e.to_string()
            };
            validation_err!("setup.base_url", message, self, &setup.base_url)
        })?;

        let timeout = match setup.timeout_secs {
            Some(0) => {
                return Err(validation_err!(
                    "setup.timeout_secs",
                    "timeout must be at least one second",
                    self,
                    "timeout_secs"
                ));
            }
            Some(secs) => Duration::from_secs(secs),
            None => DEFAULT_TIMEOUT,
        };

        let global_headers = match &self.contract.global.headers {
            Some(value) => parser_assertion::parse_header_map(value, self)?,
            None => HeaderMap::new(),
        };

        let cases = self
            .contract
            .tests
            .iter()
            .map(|test| self.create_case(test, &global_headers))
            .collect::<Result<Vec<_>, ValidationError>>()?;

        Ok(Suite {
            name: setup.name.clone(),
            base_url: setup.base_url.clone(),
            timeout,
            fixtures: setup.fixtures.clone(),
            cases,
        })
    }

    fn create_case(
        &self,
        test: &parser::Test,
        global_headers: &HeaderMap,
    ) -> Result<ContractCase, ValidationError> {
        let method = parse_method(&test.method).map_err(|e| {
            validation_err!(format!("{} - method", test.name), e, self, &test.method)
        })?;

        if !test.url.starts_with('/') {
            return Err(validation_err!(
                format!("{}/url", test.name),
                PATH_URL_MISSING_SLASH,
                self,
                &test.url
            ));
        }

        let expected_status = StatusCode::from_u16(test.assert_status).map_err(|e| {
            validation_err!(
                format!("{} - assert_status", test.name),
                e,
                self,
                &test.assert_status.to_string()
            )
        })?;

        // Test headers take precedence over global ones with the same name
        let mut headers = global_headers.clone();
        if let Some(value) = &test.headers {
            let test_headers = parser_assertion::parse_header_map(value, self)?;
            for (key, value) in test_headers {
                if let Some(key) = key {
                    headers.insert(key, value);
                }
            }
        }

        let expectations = parser_assertion::parse_expectations(test, self)?;
        let captures = self.create_captures(test)?;

        Ok(ContractCase {
            name: test.name.clone(),
            method,
            path: test.url.clone(),
            headers,
            body: test.body.clone(),
            expected_status,
            expectations,
            captures,
            log: test.log.clone(),
        })
    }

    fn create_captures(&self, test: &parser::Test) -> Result<Vec<Capture>, ValidationError> {
        test.capture
            .iter()
            .map(|(var, path)| {
                if !is_identifier(var) {
                    return Err(validation_err!(
                        format!("{} - capture", test.name),
                        format!("`{var}` is not a valid variable name"),
                        self,
                        var
                    ));
                }

                let path = JsonPath::parse(path).map_err(|e| {
                    validation_err!(format!("{} - capture", test.name), e, self, path)
                })?;

                Ok(Capture {
                    var: var.clone(),
                    path,
                })
            })
            .collect()
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn find_span(needle: &str, toml_src: &str) -> Option<SourceSpan> {
    let pattern = format!("\"{needle}\"");
    toml_src
        .find(&pattern)
        .map(|start| SourceSpan::new((start + 1).into(), needle.len()))
        .or_else(|| {
            toml_src
                .find(needle)
                .map(|start| SourceSpan::new(start.into(), needle.len()))
        })
}
