//! Human console report: one line per step, a summary per case and per
//! suite.

use crate::model::{CaseResult, Status, StepResult, SuiteResult};
use crate::util::truncate_with_ellipsis;
use console::style;
use std::fmt::Write as _;

/// Truncation width for the per-step message column.
const MESSAGE_WIDTH: usize = 80;

fn styled_status(status: Status) -> String {
    let glyph = status.glyph();
    match status {
        Status::Pass => style(glyph).green().to_string(),
        Status::Fail => style(glyph).red().to_string(),
        Status::Error => style(glyph).red().bold().to_string(),
        Status::Skipped => style(glyph).dim().to_string(),
    }
}

fn step_line(step: &StepResult) -> String {
    let mut line = format!(
        "  {} {} [{}] ({:.1}ms)",
        styled_status(step.status),
        step.step_name,
        step.action,
        step.duration.as_secs_f64() * 1000.0
    );
    let message = truncate_with_ellipsis(&step.summary(), MESSAGE_WIDTH);
    if !message.is_empty() {
        let _ = write!(line, " {message}");
    }
    if let Some(error) = &step.error {
        let _ = write!(
            line,
            " [{}.{}]",
            error.category,
            style(&error.code).yellow()
        );
    }
    line
}

fn case_block(case: &CaseResult) -> String {
    let mut out = format!(
        "{} {} ({:.2}s)\n",
        style(&case.case_name).bold(),
        case.status,
        case.duration.as_secs_f64()
    );
    for step in &case.steps {
        out.push_str(&step_line(step));
        out.push('\n');
    }
    out
}

pub fn render_suite(suite: &SuiteResult) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", style(format!("suite {}", suite.suite_name)).underlined());
    for case in &suite.cases {
        out.push_str(&case_block(case));
    }
    let totals = suite.totals;
    let _ = writeln!(
        out,
        "{} cases: {} passed, {} failed, {} skipped ({:.2}s)",
        totals.total,
        style(totals.passed).green(),
        if totals.failed > 0 {
            style(totals.failed).red().to_string()
        } else {
            totals.failed.to_string()
        },
        totals.skipped,
        suite.duration.as_secs_f64()
    );
    out
}

pub fn print_suite(suite: &SuiteResult) {
    print!("{}", render_suite(suite));
}
