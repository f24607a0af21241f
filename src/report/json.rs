//! Machine-readable JSON report mirroring the result model.

use crate::model::SuiteResult;
use anyhow::{Context, Result};
use std::path::Path;

pub fn render(suites: &[SuiteResult]) -> Result<String> {
    serde_json::to_string_pretty(suites).context("could not serialize results to JSON")
}

pub fn write_to(suites: &[SuiteResult], path: &Path) -> Result<()> {
    let rendered = render(suites)?;
    std::fs::write(path, rendered)
        .with_context(|| format!("could not write JSON report to {}", path.display()))
}
