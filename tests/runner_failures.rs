mod common;

use std::time::Duration;

use httpmock::Method::GET;
use httpmock::Method::POST;
use httpmock::MockServer;
use mercado_contract::error::FailureKind;
use mercado_contract::outputter::OutPutter;
use mercado_contract::reporter::CaseOutcome;
use mercado_contract::reporter::CaseRecord;
use mercado_contract::reporter::JsonFileSink;
use mercado_contract::reporter::Reporter;
use mercado_contract::runner::run_suite;
use serde_json::json;

use crate::common::MemorySink;
use crate::common::suite;

fn single_case(method: &str, url: &str, extra: &str) -> String {
    format!(
        r#"
[setup]
name = "failures"
base_url = "http://localhost"

[[tests]]
name = "case"
method = "{method}"
url = "{url}"
{extra}
"#
    )
}

fn failure(record: &CaseRecord) -> (FailureKind, &str, Vec<String>) {
    match &record.outcome {
        CaseOutcome::Failed {
            kind,
            reason,
            mismatches,
        } => (
            *kind,
            reason.as_str(),
            mismatches.iter().map(ToString::to_string).collect(),
        ),
        CaseOutcome::Passed => panic!("expected {} to fail", record.name),
    }
}

#[tokio::test]
async fn status_mismatch_is_the_only_failure() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(GET).path("/mercado");
            then.status(500).json_body(json!({ "erro": "interno" }));
        })
        .await;

    let contract = single_case(
        "GET",
        "/mercado",
        "assert_status = 200\nassert_json = { nome = \"x\" }\nassert_headers = { x-total = \"1\" }",
    );
    let suite = suite(&contract, &server.base_url());
    let mut reporter = Reporter::new(&suite.name);
    let flushed = run_suite(&suite, &mut reporter).await.unwrap();

    mock.assert_async().await;
    let (kind, reason, mismatches) = failure(&flushed.report.cases[0]);
    assert_eq!(kind, FailureKind::StatusMismatch);
    assert!(reason.contains("500"), "{reason}");
    assert!(mismatches.is_empty());
}

#[tokio::test]
async fn every_shape_mismatch_is_reported() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/mercado/1/produtos");
            then.status(200).json_body(json!({
                "produtos": {
                    "hortifruit": [{ "nome": 1, "valor": "vinte" }]
                },
                "extra": true
            }));
        })
        .await;

    let contract = single_case(
        "GET",
        "/mercado/1/produtos",
        r#"assert_status = 200
assert_json = { produtos = { hortifruit = [{ nome = { "$type" = "string" }, valor = { "$type" = "number" } }] } }"#,
    );
    let suite = suite(&contract, &server.base_url());
    let mut reporter = Reporter::new(&suite.name);
    let flushed = run_suite(&suite, &mut reporter).await.unwrap();

    let (kind, _, mismatches) = failure(&flushed.report.cases[0]);
    assert_eq!(kind, FailureKind::ShapeMismatch);
    assert_eq!(
        mismatches,
        [
            "produtos.hortifruit[0].nome: expected any string, got number 1",
            "produtos.hortifruit[0].valor: expected any number, got string \"vinte\"",
            "extra: unexpected member",
        ]
    );
}

#[tokio::test]
async fn non_json_body_fails_json_expectations_at_root() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/mercado");
            then.status(200).body("<html>manutenção</html>");
        })
        .await;

    let contract = single_case(
        "GET",
        "/mercado",
        "assert_status = 200\nassert_schema = { type = \"array\" }",
    );
    let suite = suite(&contract, &server.base_url());
    let mut reporter = Reporter::new(&suite.name);
    let flushed = run_suite(&suite, &mut reporter).await.unwrap();

    let (kind, _, mismatches) = failure(&flushed.report.cases[0]);
    assert_eq!(kind, FailureKind::ShapeMismatch);
    assert_eq!(mismatches.len(), 1);
    assert!(mismatches[0].starts_with("$: response body is not JSON"), "{mismatches:?}");
}

#[tokio::test]
async fn slow_server_times_out() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/mercado");
            then.status(200)
                .json_body(json!([]))
                .delay(Duration::from_secs(3));
        })
        .await;

    let contract = single_case("GET", "/mercado", "assert_status = 200");
    let mut suite = suite(&contract, &server.base_url());
    suite.timeout = Duration::from_millis(300);

    let mut reporter = Reporter::new(&suite.name);
    let flushed = run_suite(&suite, &mut reporter).await.unwrap();

    let (kind, reason, _) = failure(&flushed.report.cases[0]);
    assert_eq!(kind, FailureKind::Network);
    assert!(reason.contains("timed out"), "{reason}");
}

#[tokio::test]
async fn refused_connection_is_a_network_failure() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let contract = single_case("GET", "/mercado", "assert_status = 200");
    let suite = suite(&contract, &format!("http://{addr}"));

    let mut reporter = Reporter::new(&suite.name);
    let flushed = run_suite(&suite, &mut reporter).await.unwrap();

    let (kind, _, _) = failure(&flushed.report.cases[0]);
    assert_eq!(kind, FailureKind::Network);
}

#[tokio::test]
async fn missing_capture_path_fails_the_case() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/mercado");
            then.status(201).json_body(json!({ "message": "ok" }));
        })
        .await;

    let contract = single_case(
        "POST",
        "/mercado",
        "assert_status = 201\ncapture = { market_id = \"novoMercado.id\" }",
    );
    let suite = suite(&contract, &server.base_url());
    let mut reporter = Reporter::new(&suite.name);
    let flushed = run_suite(&suite, &mut reporter).await.unwrap();

    let (kind, reason, _) = failure(&flushed.report.cases[0]);
    assert_eq!(kind, FailureKind::Capture);
    assert!(reason.contains("novoMercado.id"), "{reason}");
}

#[tokio::test]
async fn failing_cases_do_not_stop_the_suite() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/mercado");
            then.status(200).json_body(json!([]));
        })
        .await;

    let contract = r#"
[setup]
name = "mixed"
base_url = "http://localhost"

[[tests]]
name = "wrong status"
method = "GET"
url = "/mercado"
assert_status = 404

[[tests]]
name = "right status"
method = "GET"
url = "/mercado"
assert_status = 200
"#;
    let suite = suite(contract, &server.base_url());
    let sink = MemorySink::default();
    let mut reporter = Reporter::new(&suite.name).with_sink(sink.clone());
    let flushed = run_suite(&suite, &mut reporter).await.unwrap();

    assert_eq!(flushed.report.failed, 1);
    assert_eq!(flushed.report.passed, 1);
    assert!(!flushed.report.all_passed());
    assert_eq!(sink.reports()[0].cases.len(), 2);
}

#[tokio::test]
async fn report_file_and_progress_are_produced() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/mercado");
            then.status(200).json_body(json!([]));
        })
        .await;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("api-mercado.json");

    let contract = single_case("GET", "/mercado", "assert_status = 200");
    let suite = suite(&contract, &server.base_url());

    let (tx, rx) = flume::unbounded();
    let outputter = tokio::spawn(OutPutter::start(rx, suite.name.clone(), suite.cases.len()));
    let mut reporter = Reporter::new(&suite.name)
        .with_progress(tx)
        .with_sink(JsonFileSink::new(&path));

    let flushed = run_suite(&suite, &mut reporter).await.unwrap();
    assert!(flushed.sink_errors.is_empty());

    // The reporter dropped its sender on finish, so the outputter returns
    tokio::time::timeout(Duration::from_secs(5), outputter)
        .await
        .unwrap()
        .unwrap();

    let written: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(written["suite"], "failures");
    assert_eq!(written["passed"], 1);
    assert_eq!(written["cases"][0]["method"], "GET");
}
