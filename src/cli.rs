use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::config::Overrides;

/// Verifies a REST API against declarative HTTP contracts
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Contract files to run. Runs the built-in Mercado suite when none are
    /// given
    pub contracts: Vec<PathBuf>,

    /// Base URL used instead of the one in each contract's setup
    #[arg(long, env = "MERCADO_BASE_URL")]
    pub base_url: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long, env = "MERCADO_TIMEOUT_SECS", value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout_secs: Option<u64>,

    /// Directory where a JSON report is written for every suite
    #[arg(long)]
    pub report_dir: Option<PathBuf>,
}

impl Cli {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            base_url: self.base_url.clone(),
            timeout: self.timeout_secs.map(Duration::from_secs),
        }
    }
}
