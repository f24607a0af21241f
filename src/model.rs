//! Data model: test documents in, execution results out.
//!
//! The document side (`TestCase`, `TestSuite`, `Step`) is what the parser
//! produces; the result side (`StepResult`, `CaseResult`, `SuiteResult`)
//! is what the report formatters consume. Both sides are plain serde types
//! with no behavior beyond aggregation.

use crate::value::Value;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Outcome of a step, case or suite. The set is closed; unknown statuses
/// must not propagate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Pass,
    Fail,
    Error,
    Skipped,
}

impl Status {
    /// Console glyph for the per-step status line.
    pub fn glyph(self) -> &'static str {
        match self {
            Status::Pass => "✓",
            Status::Fail => "✗",
            Status::Error => "!",
            Status::Skipped => "-",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Pass => "PASS",
            Status::Fail => "FAIL",
            Status::Error => "ERROR",
            Status::Skipped => "SKIPPED",
        };
        f.write_str(s)
    }
}

/// Closed set of error categories. These appear verbatim in reports, so the
/// names are stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    Validation,
    Network,
    Database,
    Messaging,
    Filesystem,
    Timeout,
    Variable,
    Security,
    System,
    Execution,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCategory::Validation => "validation",
            ErrorCategory::Network => "network",
            ErrorCategory::Database => "database",
            ErrorCategory::Messaging => "messaging",
            ErrorCategory::Filesystem => "filesystem",
            ErrorCategory::Timeout => "timeout",
            ErrorCategory::Variable => "variable",
            ErrorCategory::Security => "security",
            ErrorCategory::System => "system",
            ErrorCategory::Execution => "execution",
        };
        f.write_str(s)
    }
}

/// System/engine problem attached to an ERROR result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub category: ErrorCategory,
    /// Stable UPPERCASE_WITH_UNDERSCORES code, e.g. `UNRESOLVED_VARIABLE`.
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}: {}", self.category, self.code, self.message)
    }
}

/// Test-logical mismatch attached to a FAIL result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureInfo {
    pub expected: Value,
    pub actual: Value,
    pub operator: String,
    pub message: String,
}

impl fmt::Display for FailureInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "expected {} {} {}",
            self.actual.render(),
            self.operator,
            self.expected.render()
        )
    }
}

/// One declarative instruction within a case: an action invocation or a
/// control-flow construct (`if`/`for`/`while` with nested steps).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Step {
    pub name: String,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub args: Vec<Value>,
    #[serde(default)]
    pub options: BTreeMap<String, Value>,
    /// Variable name the action output is bound under on PASS.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default)]
    pub continue_on_failure: bool,
    /// Per-step timeout, e.g. `"5s"` or `"100ms"`; falls back to the
    /// engine default when absent.
    #[serde(
        default,
        deserialize_with = "de_opt_duration",
        serialize_with = "ser_opt_duration",
        skip_serializing_if = "Option::is_none"
    )]
    pub timeout: Option<Duration>,
    #[serde(default)]
    pub no_log: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sensitive_fields: Vec<String>,
    /// Condition expression; when false the step is SKIPPED.
    #[serde(default, rename = "if", skip_serializing_if = "Option::is_none")]
    pub if_cond: Option<String>,
    /// Loop source: `"start..end"`, a sequence literal, or `${var}` bound
    /// to a sequence.
    #[serde(default, rename = "for", skip_serializing_if = "Option::is_none")]
    pub for_source: Option<Value>,
    /// Loop condition, re-evaluated before each iteration.
    #[serde(default, rename = "while", skip_serializing_if = "Option::is_none")]
    pub while_cond: Option<String>,
    /// Nested steps for `if`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub then: Vec<Step>,
    /// Nested steps for `for`/`while`.
    #[serde(default, rename = "do", skip_serializing_if = "Vec::is_empty")]
    pub body: Vec<Step>,
}

/// Ordered sequence of steps with initial bindings and optional text
/// templates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TestCase {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub variables: BTreeMap<String, Value>,
    #[serde(default)]
    pub steps: Vec<Step>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub templates: BTreeMap<String, String>,
}

/// Suite-level parallelism knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParallelConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_concurrency")]
    pub max_concurrency: usize,
    /// Fan cases out onto the worker pool.
    #[serde(default = "default_true")]
    pub cases: bool,
    /// Allow batch actions to fan sub-operations out internally.
    #[serde(default)]
    pub batch_subops: bool,
}

fn default_concurrency() -> usize {
    4
}

fn default_true() -> bool {
    true
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_concurrency: default_concurrency(),
            cases: true,
            batch_subops: false,
        }
    }
}

/// Reference to a case inside a suite document: a path to another file or
/// an inline case definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CaseRef {
    Path(String),
    Inline(TestCase),
}

/// Collection of cases, optionally run in parallel.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TestSuite {
    pub name: String,
    #[serde(default)]
    pub testcases: Vec<CaseRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallel: Option<ParallelConfig>,
}

/// Machine-readable outcome of one step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub step_name: String,
    pub action: String,
    pub status: Status,
    /// String rendering for logs; masked when `no_log` is set.
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureInfo>,
    #[serde(
        deserialize_with = "de_duration_secs",
        serialize_with = "ser_duration_secs"
    )]
    pub duration: Duration,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

impl StepResult {
    /// Short message for the console status line.
    pub fn summary(&self) -> String {
        if let Some(err) = &self.error {
            return err.to_string();
        }
        if let Some(fail) = &self.failure {
            return fail.message.clone();
        }
        self.output.clone()
    }
}

/// Ordered step results for one case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseResult {
    pub case_name: String,
    pub status: Status,
    pub steps: Vec<StepResult>,
    #[serde(
        deserialize_with = "de_duration_secs",
        serialize_with = "ser_duration_secs"
    )]
    pub duration: Duration,
}

impl CaseResult {
    /// A case passes iff every non-skipped step passed; any FAIL or ERROR
    /// makes it FAIL. An all-skipped case reports SKIPPED.
    pub fn aggregate_status(steps: &[StepResult]) -> Status {
        let mut saw_pass = false;
        for step in steps {
            match step.status {
                Status::Fail | Status::Error => return Status::Fail,
                Status::Pass => saw_pass = true,
                Status::Skipped => {}
            }
        }
        if saw_pass || steps.is_empty() {
            Status::Pass
        } else {
            Status::Skipped
        }
    }
}

/// Pass/fail/skip counters over a suite.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Totals {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl Totals {
    pub fn tally(cases: &[CaseResult]) -> Totals {
        let mut totals = Totals {
            total: cases.len(),
            ..Totals::default()
        };
        for case in cases {
            match case.status {
                Status::Pass => totals.passed += 1,
                Status::Fail | Status::Error => totals.failed += 1,
                Status::Skipped => totals.skipped += 1,
            }
        }
        totals
    }
}

/// Case results in submission order plus aggregate counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteResult {
    pub suite_name: String,
    pub cases: Vec<CaseResult>,
    pub totals: Totals,
    #[serde(
        deserialize_with = "de_duration_secs",
        serialize_with = "ser_duration_secs"
    )]
    pub duration: Duration,
}

impl SuiteResult {
    pub fn all_passed(&self) -> bool {
        self.totals.failed == 0 && self.totals.total > 0
    }
}

// ── serde helpers ────────────────────────────────────────────────

fn de_opt_duration<'de, D: Deserializer<'de>>(de: D) -> Result<Option<Duration>, D::Error> {
    let raw: Option<String> = Option::deserialize(de)?;
    match raw {
        None => Ok(None),
        Some(s) => humantime::parse_duration(s.trim())
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

fn ser_opt_duration<S: Serializer>(d: &Option<Duration>, ser: S) -> Result<S::Ok, S::Error> {
    match d {
        Some(d) => ser.serialize_str(&humantime::format_duration(*d).to_string()),
        None => ser.serialize_none(),
    }
}

/// Durations cross the report boundary as seconds-with-fractions.
fn ser_duration_secs<S: Serializer>(d: &Duration, ser: S) -> Result<S::Ok, S::Error> {
    ser.serialize_f64(d.as_secs_f64())
}

fn de_duration_secs<'de, D: Deserializer<'de>>(de: D) -> Result<Duration, D::Error> {
    let secs = f64::deserialize(de)?;
    Ok(Duration::from_secs_f64(secs.max(0.0)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step_result(status: Status) -> StepResult {
        StepResult {
            step_name: "s".into(),
            action: "log".into(),
            status,
            output: String::new(),
            data: None,
            error: None,
            failure: None,
            duration: Duration::from_millis(1),
            started_at: Utc::now(),
            ended_at: Utc::now(),
        }
    }

    #[test]
    fn status_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&Status::Pass).unwrap(), "\"PASS\"");
        assert_eq!(
            serde_json::to_string(&Status::Skipped).unwrap(),
            "\"SKIPPED\""
        );
    }

    #[test]
    fn aggregate_all_pass() {
        let steps = vec![step_result(Status::Pass), step_result(Status::Skipped)];
        assert_eq!(CaseResult::aggregate_status(&steps), Status::Pass);
    }

    #[test]
    fn aggregate_fail_on_error() {
        let steps = vec![step_result(Status::Pass), step_result(Status::Error)];
        assert_eq!(CaseResult::aggregate_status(&steps), Status::Fail);
    }

    #[test]
    fn aggregate_all_skipped() {
        let steps = vec![step_result(Status::Skipped)];
        assert_eq!(CaseResult::aggregate_status(&steps), Status::Skipped);
    }

    #[test]
    fn step_timeout_parses_humantime() {
        let step: Step =
            serde_yaml::from_str("{name: t, action: sleep, timeout: 100ms}").unwrap();
        assert_eq!(step.timeout, Some(Duration::from_millis(100)));
    }

    #[test]
    fn step_control_flow_keys_map() {
        let yaml = r#"
name: loop
for: "1..3"
do:
  - name: inner
    action: log
    args: ["${iteration}"]
"#;
        let step: Step = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(step.for_source, Some(Value::String("1..3".into())));
        assert_eq!(step.body.len(), 1);
    }

    #[test]
    fn totals_tally() {
        let cases = vec![
            CaseResult {
                case_name: "a".into(),
                status: Status::Pass,
                steps: vec![],
                duration: Duration::ZERO,
            },
            CaseResult {
                case_name: "b".into(),
                status: Status::Fail,
                steps: vec![],
                duration: Duration::ZERO,
            },
        ];
        let totals = Totals::tally(&cases);
        assert_eq!(totals.total, 2);
        assert_eq!(totals.passed, 1);
        assert_eq!(totals.failed, 1);
    }

    #[test]
    fn duration_reports_as_fractional_seconds() {
        let result = step_result(Status::Pass);
        let json = serde_json::to_value(&result).unwrap();
        assert!(json["duration"].as_f64().unwrap() < 1.0);
    }

    #[test]
    fn parallel_defaults() {
        let p: ParallelConfig = serde_yaml::from_str("{enabled: true}").unwrap();
        assert!(p.enabled);
        assert_eq!(p.max_concurrency, 4);
        assert!(p.cases);
        assert!(!p.batch_subops);
    }
}
