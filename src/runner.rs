use std::time::Instant;

use chrono::Utc;
use futures::future::join_all;
use miette::Diagnostic;
use thiserror::Error;

use crate::asserter::Expectation;
use crate::asserter::assert_response;
use crate::context::TestContext;
use crate::error::CaseError;
use crate::fixture::FixtureGenerator;
use crate::reporter::CaseRecord;
use crate::reporter::FlushedReport;
use crate::reporter::Reporter;
use crate::reporter::ReporterError;
use crate::request::HttpClient;
use crate::request::NetworkError;
use crate::request::RequestSpec;
use crate::validator::ContractCase;
use crate::validator::Suite;

#[derive(Error, Debug, Diagnostic)]
pub enum RunnerError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Reporter(#[from] ReporterError),

    #[error("failed to build HTTP client")]
    #[diagnostic(code(runner::client))]
    Client(#[source] NetworkError),
}

/// Runs every case of `suite` in order, threading one [`TestContext`]
/// through them. A failing case is recorded and the suite carries on.
pub async fn run_suite(suite: &Suite, reporter: &mut Reporter) -> Result<FlushedReport, RunnerError> {
    let client = HttpClient::new(suite.timeout).map_err(RunnerError::Client)?;

    // ThreadRng is not Send, keep it out of the async state
    let mut ctx = {
        let mut generator = FixtureGenerator::new();
        TestContext::with_fixtures(&suite.fixtures, &mut generator)
    };

    let mut scope = reporter.attach()?;
    tracing::info!(
        suite = %suite.name,
        base_url = %suite.base_url,
        cases = suite.cases.len(),
        "running suite"
    );

    for case in &suite.cases {
        let started_at = Utc::now();
        let start = Instant::now();

        let (url, result) = run_case(&client, &suite.base_url, case, &mut ctx).await;

        match &result {
            Ok(()) => log_passed(case, &ctx),
            Err(error) => tracing::debug!(case = %case.name, %url, %error, "case failed"),
        }

        scope.record(CaseRecord::new(
            &case.name,
            case.method.as_str(),
            &url,
            started_at,
            start.elapsed(),
            &result,
        ))?;
    }

    Ok(scope.finish()?)
}

/// Runs each suite with its own reporter and context, concurrently.
pub async fn run_all(runs: &mut [(Suite, Reporter)]) -> Vec<Result<FlushedReport, RunnerError>> {
    join_all(
        runs.iter_mut()
            .map(|(suite, reporter)| run_suite(suite, reporter)),
    )
    .await
}

/// Returns the URL that was requested (or the path template when it could
/// not be rendered) alongside the outcome.
async fn run_case(
    client: &HttpClient,
    base_url: &str,
    case: &ContractCase,
    ctx: &mut TestContext,
) -> (String, Result<(), CaseError>) {
    match prepare_case(base_url, case, ctx) {
        Ok((request, expectations)) => {
            let url = request.url().to_string();
            let result = execute_case(client, &request, &expectations, case, ctx).await;
            (url, result)
        }
        Err(error) => (case.path.clone(), Err(error)),
    }
}

/// Renders everything before sending, so a broken template never reaches
/// the server.
fn prepare_case(
    base_url: &str,
    case: &ContractCase,
    ctx: &TestContext,
) -> Result<(RequestSpec, Vec<Expectation>), CaseError> {
    let request = case.request(base_url, ctx)?;
    let expectations = case
        .expectations
        .iter()
        .map(|expectation| expectation.render(ctx))
        .collect::<Result<Vec<_>, _>>()?;

    Ok((request, expectations))
}

async fn execute_case(
    client: &HttpClient,
    request: &RequestSpec,
    expectations: &[Expectation],
    case: &ContractCase,
    ctx: &mut TestContext,
) -> Result<(), CaseError> {
    tracing::debug!(case = %case.name, method = %request.method(), url = %request.url(), "sending request");

    let response = client.execute(request).await?;
    assert_response(case.expected_status, expectations, &response)?;
    ctx.capture(&case.captures, response.body_json.as_ref())?;

    Ok(())
}

fn log_passed(case: &ContractCase, ctx: &TestContext) {
    let Some(template) = &case.log else {
        return;
    };

    match ctx.render_str(template) {
        Ok(message) => tracing::info!(case = %case.name, "{message}"),
        Err(error) => tracing::warn!(case = %case.name, %error, "could not render log message"),
    }
}
