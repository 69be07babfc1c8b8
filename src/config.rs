use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use crate::request::UrlError;
use crate::request::validate_base_url;
use crate::validator::Suite;

/// Values from the command line or environment that win over the ones
/// declared in contract files.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub base_url: Option<String>,
    pub timeout: Option<Duration>,
}

impl Overrides {
    pub fn apply(&self, suite: &mut Suite) -> Result<(), UrlError> {
        if let Some(base_url) = &self.base_url {
            validate_base_url(base_url)?;
            suite.base_url = base_url.clone();
        }

        if let Some(timeout) = self.timeout {
            suite.timeout = timeout;
        }

        Ok(())
    }
}

/// `<dir>/<suite-slug>.json`, e.g. `reports/api-mercado.json`.
pub fn report_path(dir: &Path, suite: &str) -> PathBuf {
    let mut slug = String::with_capacity(suite.len());
    for c in suite.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }

    let slug = slug.trim_end_matches('-');
    let slug = if slug.is_empty() { "suite" } else { slug };

    dir.join(format!("{slug}.json"))
}
