//! Run reporter: per-case records and a consolidated report per suite.
//!
//! A [`Reporter`] moves through `NotStarted → Running → Finished`. Attaching
//! hands out a [`ReportScope`]; the report is flushed to every sink when the
//! scope is finished, or when it is dropped on an early return or panic.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use chrono::DateTime;
use chrono::Utc;
use flume::Sender;
use miette::Diagnostic;
use serde::Serialize;
use thiserror::Error;

use crate::asserter::Mismatch;
use crate::error::CaseError;
use crate::error::FailureKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SuiteState {
    NotStarted,
    Running,
    Finished,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum CaseOutcome {
    Passed,
    Failed {
        kind: FailureKind,
        reason: String,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        mismatches: Vec<Mismatch>,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct CaseRecord {
    pub name: String,
    pub method: String,
    pub url: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub outcome: CaseOutcome,
}

impl CaseRecord {
    pub fn new(
        name: &str,
        method: &str,
        url: &str,
        started_at: DateTime<Utc>,
        elapsed: Duration,
        result: &Result<(), CaseError>,
    ) -> Self {
        let outcome = match result {
            Ok(()) => CaseOutcome::Passed,
            Err(error) => CaseOutcome::Failed {
                kind: error.kind(),
                reason: error.to_string(),
                mismatches: error.mismatches().to_vec(),
            },
        };

        Self {
            name: name.to_owned(),
            method: method.to_owned(),
            url: url.to_owned(),
            started_at,
            finished_at: Utc::now(),
            duration_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            outcome,
        }
    }

    pub fn passed(&self) -> bool {
        self.outcome == CaseOutcome::Passed
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub suite: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub passed: usize,
    pub failed: usize,
    pub cases: Vec<CaseRecord>,
}

impl RunReport {
    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }

    pub fn failures(&self) -> impl Iterator<Item = &CaseRecord> {
        self.cases.iter().filter(|case| !case.passed())
    }
}

#[derive(Error, Debug, Diagnostic)]
pub enum ReporterError {
    #[error("cannot {action} reporter for `{suite}` while it is {state:?}")]
    #[diagnostic(code(reporter::invalid_state))]
    InvalidState {
        suite: String,
        state: SuiteState,
        action: &'static str,
    },

    #[error("failed to write report to {}: {source}", .path.display())]
    #[diagnostic(code(reporter::io))]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize report: {0}")]
    #[diagnostic(code(reporter::serialize))]
    Serialize(#[from] serde_json::Error),
}

/// Destination for a finished [`RunReport`].
pub trait ReportSink: Send {
    fn flush(&mut self, report: &RunReport) -> Result<(), ReporterError>;
}

/// Writes the report as pretty JSON, creating parent directories.
pub struct JsonFileSink {
    path: PathBuf,
}

impl JsonFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ReportSink for JsonFileSink {
    fn flush(&mut self, report: &RunReport) -> Result<(), ReporterError> {
        let io_err = |source| ReporterError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let json = serde_json::to_string_pretty(report)?;
        fs::write(&self.path, json).map_err(io_err)
    }
}

/// A flushed report plus any sink failures. Sink failures never change the
/// pass/fail outcome carried by `report`.
#[derive(Debug)]
pub struct FlushedReport {
    pub report: RunReport,
    pub sink_errors: Vec<ReporterError>,
}

pub struct Reporter {
    suite: String,
    state: SuiteState,
    started_at: Option<DateTime<Utc>>,
    records: Vec<CaseRecord>,
    sinks: Vec<Box<dyn ReportSink>>,
    progress: Option<Sender<CaseRecord>>,
}

impl Reporter {
    pub fn new(suite: impl Into<String>) -> Self {
        Self {
            suite: suite.into(),
            state: SuiteState::NotStarted,
            started_at: None,
            records: vec![],
            sinks: vec![],
            progress: None,
        }
    }

    pub fn with_sink(mut self, sink: impl ReportSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    /// Every recorded case is also sent to `tx`. The sender is dropped when
    /// the reporter finishes, which ends the receiving loop.
    pub fn with_progress(mut self, tx: Sender<CaseRecord>) -> Self {
        self.progress = Some(tx);
        self
    }

    pub fn state(&self) -> SuiteState {
        self.state
    }

    pub fn records(&self) -> &[CaseRecord] {
        &self.records
    }

    pub fn attach(&mut self) -> Result<ReportScope<'_>, ReporterError> {
        self.expect_state(SuiteState::NotStarted, "attach")?;

        self.state = SuiteState::Running;
        self.started_at = Some(Utc::now());
        tracing::debug!(suite = %self.suite, "reporter attached");

        Ok(ReportScope { reporter: self })
    }

    pub fn record(&mut self, record: CaseRecord) -> Result<(), ReporterError> {
        self.expect_state(SuiteState::Running, "record")?;

        if let Some(tx) = &self.progress
            && tx.send(record.clone()).is_err()
        {
            tracing::warn!(suite = %self.suite, "progress receiver is gone");
        }

        self.records.push(record);
        Ok(())
    }

    /// Flushes to every sink and moves to `Finished`. All sinks are tried even
    /// if one fails.
    pub fn finish(&mut self) -> Result<FlushedReport, ReporterError> {
        self.expect_state(SuiteState::Running, "finish")?;

        self.state = SuiteState::Finished;
        self.progress = None;

        let passed = self.records.iter().filter(|r| r.passed()).count();
        let report = RunReport {
            suite: self.suite.clone(),
            started_at: self.started_at.unwrap_or_else(Utc::now),
            finished_at: Utc::now(),
            passed,
            failed: self.records.len() - passed,
            cases: self.records.clone(),
        };

        let sink_errors = self
            .sinks
            .iter_mut()
            .filter_map(|sink| sink.flush(&report).err())
            .collect();

        Ok(FlushedReport {
            report,
            sink_errors,
        })
    }

    fn expect_state(&self, expected: SuiteState, action: &'static str) -> Result<(), ReporterError> {
        if self.state == expected {
            return Ok(());
        }

        Err(ReporterError::InvalidState {
            suite: self.suite.clone(),
            state: self.state,
            action,
        })
    }
}

/// Live attachment of a [`Reporter`]. Dropping it without calling
/// [`ReportScope::finish`] still flushes.
pub struct ReportScope<'a> {
    reporter: &'a mut Reporter,
}

impl ReportScope<'_> {
    pub fn record(&mut self, record: CaseRecord) -> Result<(), ReporterError> {
        self.reporter.record(record)
    }

    pub fn finish(self) -> Result<FlushedReport, ReporterError> {
        // Drop runs right after and sees `Finished`
        self.reporter.finish()
    }
}

impl Drop for ReportScope<'_> {
    fn drop(&mut self) {
        if self.reporter.state != SuiteState::Running {
            return;
        }

        tracing::warn!(suite = %self.reporter.suite, "suite ended early, flushing partial report");
        match self.reporter.finish() {
            Ok(flushed) => {
                for error in flushed.sink_errors {
                    tracing::error!(suite = %self.reporter.suite, %error, "report sink failed");
                }
            }
            Err(error) => tracing::error!(suite = %self.reporter.suite, %error, "report flush failed"),
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;
    use std::sync::Mutex;
    use std::time::Duration;

    use chrono::Utc;
    use reqwest::StatusCode;

    use super::CaseOutcome;
    use super::CaseRecord;
    use super::JsonFileSink;
    use super::ReportSink;
    use super::Reporter;
    use super::ReporterError;
    use super::RunReport;
    use super::SuiteState;
    use crate::error::CaseError;
    use crate::error::FailureKind;

    #[derive(Clone, Default)]
    struct MemorySink(Arc<Mutex<Vec<RunReport>>>);

    impl ReportSink for MemorySink {
        fn flush(&mut self, report: &RunReport) -> Result<(), ReporterError> {
            self.0.lock().unwrap().push(report.clone());
            Ok(())
        }
    }

    struct FailingSink;

    impl ReportSink for FailingSink {
        fn flush(&mut self, _report: &RunReport) -> Result<(), ReporterError> {
            Err(ReporterError::Io {
                path: "/dev/full".into(),
                source: std::io::Error::other("disk full"),
            })
        }
    }

    fn record(name: &str, result: Result<(), CaseError>) -> CaseRecord {
        CaseRecord::new(
            name,
            "GET",
            "http://localhost/mercado",
            Utc::now(),
            Duration::from_millis(5),
            &result,
        )
    }

    #[test]
    fn state_machine_runs_forward_only() {
        let sink = MemorySink::default();
        let mut reporter = Reporter::new("API Mercado").with_sink(sink.clone());
        assert_eq!(reporter.state(), SuiteState::NotStarted);

        assert!(matches!(
            reporter.record(record("early", Ok(()))),
            Err(ReporterError::InvalidState { state: SuiteState::NotStarted, .. })
        ));

        let mut scope = reporter.attach().unwrap();
        scope.record(record("Buscar todos os Mercados", Ok(()))).unwrap();
        let flushed = scope.finish().unwrap();

        assert_eq!(flushed.report.passed, 1);
        assert_eq!(reporter.state(), SuiteState::Finished);
        assert_eq!(sink.0.lock().unwrap().len(), 1);

        assert!(matches!(
            reporter.record(record("late", Ok(()))),
            Err(ReporterError::InvalidState { state: SuiteState::Finished, .. })
        ));
        assert!(reporter.attach().is_err());
        assert!(reporter.finish().is_err());
        assert_eq!(reporter.records().len(), 1);
    }

    #[test]
    fn dropped_scope_still_flushes() {
        let sink = MemorySink::default();
        let mut reporter = Reporter::new("API Mercado").with_sink(sink.clone());

        {
            let mut scope = reporter.attach().unwrap();
            scope
                .record(record(
                    "Criar um novo Mercado",
                    Err(CaseError::StatusMismatch {
                        expected: StatusCode::CREATED,
                        actual: StatusCode::OK,
                        body: "{}".into(),
                    }),
                ))
                .unwrap();
        }

        assert_eq!(reporter.state(), SuiteState::Finished);
        let reports = sink.0.lock().unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].failed, 1);
        assert!(matches!(
            reports[0].cases[0].outcome,
            CaseOutcome::Failed { kind: FailureKind::StatusMismatch, .. }
        ));
    }

    #[test]
    fn sink_failure_does_not_mask_outcome() {
        let sink = MemorySink::default();
        let mut reporter = Reporter::new("API Mercado")
            .with_sink(FailingSink)
            .with_sink(sink.clone());

        let mut scope = reporter.attach().unwrap();
        scope
            .record(record("Buscar Mercado por ID", Err(CaseError::ShapeMismatch(vec![]))))
            .unwrap();
        let flushed = scope.finish().unwrap();

        assert_eq!(flushed.sink_errors.len(), 1);
        assert!(!flushed.report.all_passed());
        assert_eq!(sink.0.lock().unwrap().len(), 1);
    }

    #[test]
    fn progress_channel_receives_records_and_closes() {
        let (tx, rx) = flume::unbounded();
        let mut reporter = Reporter::new("API Mercado").with_progress(tx);

        let mut scope = reporter.attach().unwrap();
        scope.record(record("Buscar Frutas", Ok(()))).unwrap();
        scope.finish().unwrap();

        let received: Vec<_> = rx.drain().collect();
        assert_eq!(received.len(), 1);
        assert!(rx.recv().is_err());
    }

    #[test]
    fn json_file_sink_writes_report() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports").join("mercado.json");
        let mut reporter = Reporter::new("API Mercado").with_sink(JsonFileSink::new(&path));

        let mut scope = reporter.attach().unwrap();
        scope.record(record("Buscar Legumes", Ok(()))).unwrap();
        let flushed = scope.finish().unwrap();
        assert!(flushed.sink_errors.is_empty());

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["suite"], "API Mercado");
        assert_eq!(written["cases"][0]["outcome"]["status"], "passed");
    }
}
