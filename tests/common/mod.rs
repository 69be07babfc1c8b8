#![allow(dead_code)]

use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use mercado_contract::reporter::ReportSink;
use mercado_contract::reporter::ReporterError;
use mercado_contract::reporter::RunReport;
use mercado_contract::validator::Suite;
use mercado_contract::validator::load_contract;
use tokio::net::TcpListener;

/// Starts a fresh fake Mercado on an ephemeral port and returns its base URL.
pub async fn spawn_fake_mercado() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        fake_mercado::serve(listener).await.unwrap();
    });

    format!("http://{addr}")
}

/// Loads an inline contract and points it at `base_url`.
pub fn suite(contract: &str, base_url: &str) -> Suite {
    let mut suite = load_contract(contract, "inline.toml").unwrap();
    suite.base_url = base_url.to_owned();
    suite.timeout = Duration::from_secs(5);
    suite
}

#[derive(Clone, Default)]
pub struct MemorySink(pub Arc<Mutex<Vec<RunReport>>>);

impl MemorySink {
    pub fn reports(&self) -> Vec<RunReport> {
        self.0.lock().unwrap().clone()
    }
}

impl ReportSink for MemorySink {
    fn flush(&mut self, report: &RunReport) -> Result<(), ReporterError> {
        self.0.lock().unwrap().push(report.clone());
        Ok(())
    }
}
