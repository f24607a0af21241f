//! JUnit XML report: suite → `testsuite`, case → `testcase`, FAIL/ERROR →
//! `failure`/`error` elements, SKIPPED → `skipped`.

use crate::model::{CaseResult, Status, StepResult, SuiteResult};
use anyhow::{Context, Result};
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use std::path::Path;

fn seconds(duration: std::time::Duration) -> String {
    format!("{:.3}", duration.as_secs_f64())
}

/// First step that made the case non-passing, if any.
fn offending_step(case: &CaseResult) -> Option<&StepResult> {
    case.steps
        .iter()
        .find(|step| matches!(step.status, Status::Fail | Status::Error))
}

pub fn render(suites: &[SuiteResult]) -> Result<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let total: usize = suites.iter().map(|s| s.totals.total).sum();
    let failures: usize = suites.iter().map(|s| s.totals.failed).sum();
    let skipped: usize = suites.iter().map(|s| s.totals.skipped).sum();
    let time: f64 = suites.iter().map(|s| s.duration.as_secs_f64()).sum();

    let mut root = BytesStart::new("testsuites");
    root.push_attribute(("tests", total.to_string().as_str()));
    root.push_attribute(("failures", failures.to_string().as_str()));
    root.push_attribute(("skipped", skipped.to_string().as_str()));
    root.push_attribute(("time", format!("{time:.3}").as_str()));
    writer.write_event(Event::Start(root))?;

    for suite in suites {
        write_suite(&mut writer, suite)?;
    }

    writer.write_event(Event::End(BytesEnd::new("testsuites")))?;
    String::from_utf8(writer.into_inner()).context("JUnit report is not valid UTF-8")
}

fn write_suite(writer: &mut Writer<Vec<u8>>, suite: &SuiteResult) -> Result<()> {
    let mut element = BytesStart::new("testsuite");
    element.push_attribute(("name", suite.suite_name.as_str()));
    element.push_attribute(("tests", suite.totals.total.to_string().as_str()));
    element.push_attribute(("failures", suite.totals.failed.to_string().as_str()));
    element.push_attribute(("skipped", suite.totals.skipped.to_string().as_str()));
    element.push_attribute(("time", seconds(suite.duration).as_str()));
    writer.write_event(Event::Start(element))?;

    for case in &suite.cases {
        write_case(writer, suite, case)?;
    }

    writer.write_event(Event::End(BytesEnd::new("testsuite")))?;
    Ok(())
}

fn write_case(writer: &mut Writer<Vec<u8>>, suite: &SuiteResult, case: &CaseResult) -> Result<()> {
    let mut element = BytesStart::new("testcase");
    element.push_attribute(("name", case.case_name.as_str()));
    element.push_attribute(("classname", suite.suite_name.as_str()));
    element.push_attribute(("time", seconds(case.duration).as_str()));

    match case.status {
        Status::Pass => {
            writer.write_event(Event::Empty(element))?;
        }
        Status::Skipped => {
            writer.write_event(Event::Start(element))?;
            writer.write_event(Event::Empty(BytesStart::new("skipped")))?;
            writer.write_event(Event::End(BytesEnd::new("testcase")))?;
        }
        Status::Fail | Status::Error => {
            writer.write_event(Event::Start(element))?;
            match offending_step(case) {
                Some(StepResult {
                    error: Some(info),
                    output,
                    ..
                }) => {
                    let mut error = BytesStart::new("error");
                    error.push_attribute(("message", info.message.as_str()));
                    error.push_attribute((
                        "type",
                        format!("{}.{}", info.category, info.code).as_str(),
                    ));
                    writer.write_event(Event::Start(error))?;
                    writer.write_event(Event::Text(BytesText::new(output)))?;
                    writer.write_event(Event::End(BytesEnd::new("error")))?;
                }
                Some(step) => {
                    let message = step
                        .failure
                        .as_ref()
                        .map(|f| f.message.clone())
                        .unwrap_or_else(|| step.output.clone());
                    let mut failure = BytesStart::new("failure");
                    failure.push_attribute(("message", message.as_str()));
                    writer.write_event(Event::Start(failure))?;
                    writer.write_event(Event::Text(BytesText::new(&step.output)))?;
                    writer.write_event(Event::End(BytesEnd::new("failure")))?;
                }
                None => {
                    let mut failure = BytesStart::new("failure");
                    failure.push_attribute(("message", "case failed"));
                    writer.write_event(Event::Empty(failure))?;
                }
            }
            writer.write_event(Event::End(BytesEnd::new("testcase")))?;
        }
    }
    Ok(())
}

pub fn write_to(suites: &[SuiteResult], path: &Path) -> Result<()> {
    let rendered = render(suites)?;
    std::fs::write(path, rendered)
        .with_context(|| format!("could not write JUnit report to {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ErrorCategory, ErrorInfo, FailureInfo, Totals};
    use crate::value::Value;
    use chrono::Utc;
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn step(status: Status) -> StepResult {
        StepResult {
            step_name: "s".into(),
            action: "assert".into(),
            status,
            output: "details".into(),
            data: None,
            error: None,
            failure: None,
            duration: Duration::from_millis(10),
            started_at: Utc::now(),
            ended_at: Utc::now(),
        }
    }

    fn suite_with(cases: Vec<CaseResult>) -> SuiteResult {
        let totals = Totals::tally(&cases);
        SuiteResult {
            suite_name: "nightly".into(),
            cases,
            totals,
            duration: Duration::from_secs(2),
        }
    }

    #[test]
    fn passing_case_is_a_bare_testcase() {
        let suite = suite_with(vec![CaseResult {
            case_name: "ok".into(),
            status: Status::Pass,
            steps: vec![step(Status::Pass)],
            duration: Duration::from_millis(10),
        }]);
        let xml = render(&[suite]).unwrap();
        assert!(xml.contains(r#"<testsuite name="nightly""#));
        assert!(xml.contains(r#"<testcase name="ok""#));
        assert!(!xml.contains("<failure"));
        assert!(!xml.contains("<error"));
    }

    #[test]
    fn failing_case_emits_failure_element() {
        let mut failing = step(Status::Fail);
        failing.failure = Some(FailureInfo {
            expected: Value::String("b".into()),
            actual: Value::String("a".into()),
            operator: "==".into(),
            message: "assertion failed: a == b".into(),
        });
        let suite = suite_with(vec![CaseResult {
            case_name: "bad".into(),
            status: Status::Fail,
            steps: vec![failing],
            duration: Duration::from_millis(10),
        }]);
        let xml = render(&[suite]).unwrap();
        assert!(xml.contains(r#"<failure message="assertion failed: a == b""#));
    }

    #[test]
    fn error_case_emits_error_element_with_type() {
        let mut erroring = step(Status::Error);
        erroring.error = Some(ErrorInfo {
            category: ErrorCategory::Timeout,
            code: "EXECUTION_TIMEOUT".into(),
            message: "too slow".into(),
            context: BTreeMap::new(),
            suggestions: Vec::new(),
        });
        let suite = suite_with(vec![CaseResult {
            case_name: "slow".into(),
            status: Status::Fail,
            steps: vec![erroring],
            duration: Duration::from_millis(10),
        }]);
        let xml = render(&[suite]).unwrap();
        assert!(xml.contains(r#"type="timeout.EXECUTION_TIMEOUT""#));
    }

    #[test]
    fn skipped_case_emits_skipped_element() {
        let suite = suite_with(vec![CaseResult {
            case_name: "later".into(),
            status: Status::Skipped,
            steps: vec![],
            duration: Duration::ZERO,
        }]);
        let xml = render(&[suite]).unwrap();
        assert!(xml.contains("<skipped/>"));
    }

    #[test]
    fn attributes_escape_special_characters() {
        let suite = suite_with(vec![CaseResult {
            case_name: "a <b> & \"c\"".into(),
            status: Status::Pass,
            steps: vec![],
            duration: Duration::ZERO,
        }]);
        let xml = render(&[suite]).unwrap();
        assert!(xml.contains("a &lt;b&gt; &amp;"));
    }
}
