#![allow(clippy::result_large_err)]

use std::path::Path;

use clap::Parser;
use miette::Diagnostic;
use miette::Report;
use miette::Result;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use mercado_contract::cli::Cli;
use mercado_contract::config::report_path;
use mercado_contract::mercado::builtin_suite;
use mercado_contract::outputter::OutPutter;
use mercado_contract::reporter::JsonFileSink;
use mercado_contract::reporter::Reporter;
use mercado_contract::request::UrlError;
use mercado_contract::runner::run_all;
use mercado_contract::validator::ContractError;
use mercado_contract::validator::Suite;
use mercado_contract::validator::load_contract;

#[derive(Error, Debug, Diagnostic)]
pub enum HarnessError {
    #[error("Failed to read contract file {path}")]
    FileError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Contract(#[from] ContractError),

    #[error("Invalid --base-url override")]
    Override(#[source] UrlError),
}

/// Reads every contract file given on the command line, or the built-in
/// Mercado suite when there are none, and applies CLI overrides.
fn load_suites(cli: &Cli) -> Result<Vec<Suite>, HarnessError> {
    let mut suites = if cli.contracts.is_empty() {
        vec![builtin_suite()?]
    } else {
        cli.contracts
            .iter()
            .map(|path| load_suite(path))
            .collect::<Result<Vec<_>, _>>()?
    };

    let overrides = cli.overrides();
    for suite in &mut suites {
        overrides.apply(suite).map_err(HarnessError::Override)?;
    }

    Ok(suites)
}

fn load_suite(path: &Path) -> Result<Suite, HarnessError> {
    let file_name = path.display().to_string();
    let contents = std::fs::read_to_string(path).map_err(|source| HarnessError::FileError {
        path: file_name.clone(),
        source,
    })?;

    Ok(load_contract(&contents, &file_name)?)
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let suites = load_suites(&cli)?;

    // One reporter and one outputter task per suite, connected by a flume
    // channel. The reporter drops its sender on finish, which ends the task.
    let mut runs = Vec::with_capacity(suites.len());
    let mut outputters = Vec::with_capacity(suites.len());
    for suite in suites {
        let (tx, rx) = flume::unbounded();
        let mut reporter = Reporter::new(&suite.name).with_progress(tx);
        if let Some(dir) = &cli.report_dir {
            reporter = reporter.with_sink(JsonFileSink::new(report_path(dir, &suite.name)));
        }

        outputters.push(tokio::spawn(OutPutter::start(
            rx,
            suite.name.clone(),
            suite.cases.len(),
        )));
        runs.push((suite, reporter));
    }

    let results = run_all(&mut runs).await;
    // Reporters that never attached still hold their sender
    drop(runs);
    let _ = futures::future::join_all(outputters).await;

    let mut all_passed = true;
    for result in results {
        match result {
            Ok(flushed) => {
                all_passed &= flushed.report.all_passed();
                for error in flushed.sink_errors {
                    eprintln!("{:?}", Report::new(error));
                }
            }
            Err(error) => {
                all_passed = false;
                eprintln!("{:?}", Report::new(error));
            }
        }
    }

    if !all_passed {
        std::process::exit(1);
    }

    Ok(())
}
