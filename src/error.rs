use miette::Diagnostic;
use reqwest::StatusCode;
use serde::Serialize;
use thiserror::Error;

use crate::asserter::Mismatch;
use crate::context::CaptureError;
use crate::context::TemplateError;
use crate::request::NetworkError;
use crate::request::UrlError;

/// Why a single contract case failed.
#[derive(Error, Debug, Diagnostic)]
pub enum CaseError {
    #[error(transparent)]
    #[diagnostic(code(contract::network))]
    Network(#[from] NetworkError),

    #[error("expected status {expected}, got {actual}")]
    #[diagnostic(code(contract::status_mismatch), help("response body: {body}"))]
    StatusMismatch {
        expected: StatusCode,
        actual: StatusCode,
        body: String,
    },

    #[error("response did not match ({} mismatch(es)):\n{}", .0.len(), render_mismatches(.0))]
    #[diagnostic(code(contract::shape_mismatch))]
    ShapeMismatch(Vec<Mismatch>),

    #[error(transparent)]
    #[diagnostic(code(contract::template))]
    Template(#[from] TemplateError),

    #[error(transparent)]
    #[diagnostic(code(contract::capture))]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    #[diagnostic(code(contract::url))]
    Url(#[from] UrlError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Network,
    StatusMismatch,
    ShapeMismatch,
    Template,
    Capture,
    Url,
}

impl CaseError {
    pub fn kind(&self) -> FailureKind {
        match self {
            CaseError::Network(_) => FailureKind::Network,
            CaseError::StatusMismatch { .. } => FailureKind::StatusMismatch,
            CaseError::ShapeMismatch(_) => FailureKind::ShapeMismatch,
            CaseError::Template(_) => FailureKind::Template,
            CaseError::Capture(_) => FailureKind::Capture,
            CaseError::Url(_) => FailureKind::Url,
        }
    }

    pub fn mismatches(&self) -> &[Mismatch] {
        match self {
            CaseError::ShapeMismatch(mismatches) => mismatches,
            _ => &[],
        }
    }
}

fn render_mismatches(mismatches: &[Mismatch]) -> String {
    mismatches
        .iter()
        .map(|m| format!("  - {m}"))
        .collect::<Vec<_>>()
        .join("\n")
}
