use std::error::Error as _;
use std::str::FromStr;
use std::time::Duration;

use reqwest::Client;
use reqwest::Method;
use reqwest::Response;
use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use reqwest::header::HeaderName;
use reqwest::header::HeaderValue;
use serde_json::Value;
use thiserror::Error;
use url::Url;

/// Per-request timeout used when a suite does not set one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(90);

#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("{method} {url} timed out after {}s", .timeout.as_secs_f64())]
    Timeout {
        method: Method,
        url: Url,
        timeout: Duration,
    },

    #[error("{method} {url} could not connect: {message}")]
    Connect {
        method: Method,
        url: Url,
        message: String,
    },

    #[error("{method} {url} failed: {message}")]
    Transport {
        method: Method,
        url: Url,
        message: String,
    },

    #[error("{method} {url} returned a body that could not be read: {message}")]
    Body {
        method: Method,
        url: Url,
        message: String,
    },

    #[error("failed to build http client: {0}")]
    Client(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UrlError {
    #[error("base URL `{0}` must not end with a /")]
    BaseUrlEndsWithSlash(String),

    #[error("path `{0}` must begin with a leading /")]
    PathMissingSlash(String),

    #[error("failed to parse URL `{url}`: {source}")]
    Parse {
        url: String,
        #[source]
        source: url::ParseError,
    },
}

/// Checks that a base URL can be used to compose request URLs.
pub fn validate_base_url(base_url: &str) -> Result<Url, UrlError> {
    if base_url.ends_with('/') {
        return Err(UrlError::BaseUrlEndsWithSlash(base_url.to_owned()));
    }

    Url::parse(base_url).map_err(|source| UrlError::Parse {
        url: base_url.to_owned(),
        source,
    })
}

/// Joins `base_url` and an absolute `path` into a request URL.
pub fn compose_url(base_url: &str, path: &str) -> Result<Url, UrlError> {
    if base_url.ends_with('/') {
        return Err(UrlError::BaseUrlEndsWithSlash(base_url.to_owned()));
    }

    if !path.starts_with('/') {
        return Err(UrlError::PathMissingSlash(path.to_owned()));
    }

    let url = format!("{base_url}{path}");
    Url::parse(&url).map_err(|source| UrlError::Parse { url, source })
}

pub fn parse_method(method: &str) -> Result<Method, String> {
    let method = Method::from_str(&method.to_uppercase()).map_err(|e| e.to_string())?;

    if !matches!(
        method,
        Method::GET
            | Method::POST
            | Method::PUT
            | Method::DELETE
            | Method::PATCH
            | Method::HEAD
            | Method::OPTIONS
    ) {
        return Err(format!("Invalid HTTP method: {method}"));
    }

    Ok(method)
}

/// A fully resolved request. Built once per case and never mutated.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    method: Method,
    url: Url,
    headers: HeaderMap,
    json_body: Option<Value>,
}

impl RequestSpec {
    pub fn builder(method: Method, url: Url) -> RequestBuilder {
        RequestBuilder {
            method,
            url,
            headers: HeaderMap::new(),
            json_body: None,
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn json_body(&self) -> Option<&Value> {
        self.json_body.as_ref()
    }
}

#[derive(Debug)]
pub struct RequestBuilder {
    method: Method,
    url: Url,
    headers: HeaderMap,
    json_body: Option<Value>,
}

impl RequestBuilder {
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Merges `headers` into the request; later values replace earlier ones.
    pub fn headers(mut self, headers: &HeaderMap) -> Self {
        for (name, value) in headers {
            self.headers.insert(name.clone(), value.clone());
        }
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.json_body = Some(body);
        self
    }

    pub fn build(self) -> RequestSpec {
        RequestSpec {
            method: self.method,
            url: self.url,
            headers: self.headers,
            json_body: self.json_body,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CapturedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body_text: String,
    pub body_json: Option<Value>,
}

impl CapturedResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body_text: impl Into<String>) -> Self {
        let body_text = body_text.into();
        // Non-JSON bodies are kept as text only
        let body_json = serde_json::from_str::<Value>(&body_text).ok();

        Self {
            status,
            headers,
            body_text,
            body_json,
        }
    }

    async fn from_response(resp: Response) -> Result<Self, reqwest::Error> {
        let status = resp.status();
        let headers = resp.headers().clone();
        let body_text = resp.text().await?;

        Ok(Self::new(status, headers, body_text))
    }
}

/// Executes [`RequestSpec`]s with a fixed per-request timeout. No retries.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    timeout: Duration,
}

impl HttpClient {
    pub fn new(timeout: Duration) -> Result<Self, NetworkError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NetworkError::Client(error_chain(&e)))?;

        Ok(Self { client, timeout })
    }

    pub async fn execute(&self, spec: &RequestSpec) -> Result<CapturedResponse, NetworkError> {
        let mut request = self
            .client
            .request(spec.method.clone(), spec.url.clone())
            .headers(spec.headers.clone());

        if let Some(body) = &spec.json_body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| self.classify(spec, e, false))?;

        CapturedResponse::from_response(response)
            .await
            .map_err(|e| self.classify(spec, e, true))
    }

    fn classify(&self, spec: &RequestSpec, error: reqwest::Error, reading_body: bool) -> NetworkError {
        let method = spec.method.clone();
        let url = spec.url.clone();

        if error.is_timeout() {
            return NetworkError::Timeout {
                method,
                url,
                timeout: self.timeout,
            };
        }

        let message = error_chain(&error);
        if reading_body {
            NetworkError::Body {
                method,
                url,
                message,
            }
        } else if error.is_connect() {
            NetworkError::Connect {
                method,
                url,
                message,
            }
        } else {
            NetworkError::Transport {
                method,
                url,
                message,
            }
        }
    }
}

/// reqwest hides the interesting part (DNS, refused, reset) in the source chain.
fn error_chain(error: &reqwest::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(inner) = source {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        source = inner.source();
    }
    message
}
