//! End-to-end scenarios: parsed YAML documents driven through the case
//! and suite runners, with a mock HTTP server for the http action.

use robogo::actions::traits::{Action, ActionContext, ActionResult, ensure_args_resolved};
use robogo::actions::ActionRegistry;
use robogo::engine::case::{RunOptions, run_case};
use robogo::engine::suite::run_suite;
use robogo::model::{ParallelConfig, Status, TestCase};
use robogo::parser::{Document, parse_document};
use robogo::value::Value;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn registry() -> Arc<ActionRegistry> {
    Arc::new(ActionRegistry::with_builtins())
}

fn case_from_yaml(doc: &str) -> TestCase {
    match parse_document(doc).expect("document parses") {
        Document::Case(case) => case,
        Document::Suite(_) => panic!("expected a case document"),
    }
}

async fn run(case: &TestCase) -> robogo::model::CaseResult {
    run_case(
        case,
        registry(),
        CancellationToken::new(),
        &RunOptions::default(),
    )
    .await
}

#[tokio::test]
async fn variable_bind_then_numeric_assert() {
    let case = case_from_yaml(
        r#"
testcase:
  name: bind and assert
  steps:
    - name: bind
      action: variable
      args: ["n", 7]
    - name: compare
      action: assert
      args: ["${n}", ">", "5"]
"#,
    );
    let result = run(&case).await;
    assert_eq!(result.status, Status::Pass);
    let statuses: Vec<Status> = result.steps.iter().map(|s| s.status).collect();
    assert_eq!(statuses, vec![Status::Pass, Status::Pass]);
}

struct SpyAction {
    hits: Arc<AtomicUsize>,
}

#[async_trait]
impl Action for SpyAction {
    fn name(&self) -> &'static str {
        "spy"
    }
    fn description(&self) -> &'static str {
        "records invocations"
    }
    async fn execute(
        &self,
        args: &[Value],
        options: &BTreeMap<String, Value>,
        _ctx: &ActionContext<'_>,
    ) -> ActionResult {
        if let Err(blocked) = ensure_args_resolved(self.name(), args, options) {
            return blocked;
        }
        self.hits.fetch_add(1, Ordering::SeqCst);
        ActionResult::pass(Value::Null, "spied")
    }
}

#[tokio::test]
async fn unresolved_variable_blocks_dispatch() {
    let hits = Arc::new(AtomicUsize::new(0));
    let mut reg = ActionRegistry::with_builtins();
    reg.register(Arc::new(SpyAction { hits: hits.clone() }));

    let case = case_from_yaml(
        r#"
testcase:
  name: unresolved
  steps:
    - name: greet
      action: spy
      args: ["hello ${missing}"]
"#,
    );
    let result = run_case(
        &case,
        Arc::new(reg),
        CancellationToken::new(),
        &RunOptions::default(),
    )
    .await;

    assert_eq!(result.status, Status::Fail);
    let step = &result.steps[0];
    assert_eq!(step.status, Status::Error);
    let info = step.error.as_ref().expect("error info present");
    assert_eq!(info.category.to_string(), "variable");
    assert_eq!(info.code, "UNRESOLVED_VARIABLE");
    assert_eq!(hits.load(Ordering::SeqCst), 0, "action was never invoked");
}

#[tokio::test]
async fn step_timeout_is_bounded() {
    let case = case_from_yaml(
        r#"
testcase:
  name: slow
  steps:
    - name: nap
      action: sleep
      args: ["5s"]
      timeout: 100ms
"#,
    );
    let result = run(&case).await;
    let step = &result.steps[0];
    assert_eq!(step.status, Status::Error);
    assert_eq!(step.error.as_ref().unwrap().code, "EXECUTION_TIMEOUT");
    assert!(step.duration >= Duration::from_millis(100));
    assert!(step.duration <= Duration::from_millis(200));
}

#[tokio::test]
async fn assertion_fail_carries_failure_info_not_error() {
    let case = case_from_yaml(
        r#"
testcase:
  name: mismatch
  steps:
    - name: compare
      action: assert
      args: ["a", "==", "b"]
"#,
    );
    let result = run(&case).await;
    let step = &result.steps[0];
    assert_eq!(step.status, Status::Fail);
    let failure = step.failure.as_ref().expect("failure info present");
    assert_eq!(failure.expected, Value::String("b".into()));
    assert_eq!(failure.actual, Value::String("a".into()));
    assert_eq!(failure.operator, "==");
    assert!(step.error.is_none());
}

#[tokio::test]
async fn for_loop_binds_iteration_variables() {
    let case = case_from_yaml(
        r#"
testcase:
  name: loops
  steps:
    - name: count
      for: "1..3"
      do:
        - name: remember
          action: variable
          args: ["last", "${iteration}"]
    - name: final value
      action: assert
      args: ["${last}", "==", "3"]
"#,
    );
    let result = run(&case).await;
    assert_eq!(result.status, Status::Pass);
    assert!(result.steps.iter().all(|s| s.status == Status::Pass));
}

#[tokio::test]
async fn parallel_suite_overlaps_and_reports_in_submission_order() {
    fn sleeping(name: &str, duration: &str) -> TestCase {
        case_from_yaml(&format!(
            "testcase:\n  name: {name}\n  steps:\n    - name: nap\n      action: sleep\n      args: [\"{duration}\"]\n"
        ))
    }

    let cases = vec![
        sleeping("A", "200ms"),
        sleeping("B", "50ms"),
        sleeping("C", "100ms"),
    ];
    let parallel = ParallelConfig {
        enabled: true,
        max_concurrency: 3,
        cases: true,
        batch_subops: false,
    };

    let started = Instant::now();
    let result = run_suite(
        "overlapping",
        cases,
        &parallel,
        registry(),
        CancellationToken::new(),
        RunOptions::default(),
    )
    .await;

    assert!(
        started.elapsed() < Duration::from_millis(250),
        "cases did not overlap: {:?}",
        started.elapsed()
    );
    let names: Vec<&str> = result.cases.iter().map(|c| c.case_name.as_str()).collect();
    assert_eq!(names, vec!["A", "B", "C"]);
    assert!(result.all_passed());
}

#[tokio::test]
async fn no_log_hides_variable_values_from_output() {
    let case = case_from_yaml(
        r#"
testcase:
  name: secrets
  variables:
    password: hunter2
  steps:
    - name: leaky
      action: log
      args: ["the password is ${password}"]
      no_log: true
"#,
    );
    let result = run(&case).await;
    let step = &result.steps[0];
    assert_eq!(step.status, Status::Pass);
    assert!(!step.output.contains("hunter2"));
}

#[tokio::test]
async fn http_response_flows_through_jq_into_assert() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "ok": true,
            "version": "1.2.3"
        })))
        .mount(&server)
        .await;

    let case = case_from_yaml(&format!(
        r#"
testcase:
  name: health check
  steps:
    - name: call
      action: http
      args: ["GET", "{}/health"]
      options:
        expect_status: 200
      result: resp
    - name: extract
      action: jq
      args: ["${{resp}}", ".body.version"]
      result: version
    - name: verify
      action: assert
      args: ["${{version}}", "==", "1.2.3"]
"#,
        server.uri()
    ));
    let result = run(&case).await;
    assert_eq!(result.status, Status::Pass, "steps: {:#?}", result.steps);
}

#[tokio::test]
async fn http_unexpected_status_is_a_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let case = case_from_yaml(&format!(
        r#"
testcase:
  name: not found
  steps:
    - name: call
      action: http
      args: ["GET", "{}/missing"]
      options:
        expect_status: 200
"#,
        server.uri()
    ));
    let result = run(&case).await;
    let step = &result.steps[0];
    assert_eq!(step.status, Status::Fail);
    let failure = step.failure.as_ref().unwrap();
    assert_eq!(failure.actual, Value::Int(404));
    assert_eq!(failure.expected, Value::Int(200));
}

#[tokio::test]
async fn http_batch_preserves_submission_order() {
    let server = MockServer::start().await;
    for (route, body) in [("/one", "1"), ("/two", "2"), ("/three", "3")] {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(body)
                    .set_delay(Duration::from_millis(if body == "1" { 80 } else { 10 })),
            )
            .mount(&server)
            .await;
    }

    let case = case_from_yaml(&format!(
        r#"
testcase:
  name: batched
  steps:
    - name: fan out
      action: http_batch
      args:
        - - url: "{base}/one"
          - url: "{base}/two"
          - url: "{base}/three"
      result: responses
    - name: first is one
      action: jq
      args: ["${{responses}}", "[0].body"]
      result: first
    - name: verify
      action: assert
      args: ["${{first}}", "==", "1"]
"#,
        base = server.uri()
    ));

    let options = RunOptions {
        batch_concurrency: 3,
        ..RunOptions::default()
    };
    let result = run_case(&case, registry(), CancellationToken::new(), &options).await;
    assert_eq!(result.status, Status::Pass, "steps: {:#?}", result.steps);
}

#[tokio::test]
async fn cancellation_skips_pending_cases_but_keeps_order() {
    let make_case = |name: &str| {
        case_from_yaml(&format!(
            "testcase:\n  name: {name}\n  steps:\n    - name: nap\n      action: sleep\n      args: [\"30ms\"]\n"
        ))
    };
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        child.cancel();
    });

    let result = run_suite(
        "interrupted",
        vec![make_case("first"), make_case("second"), make_case("third")],
        &ParallelConfig::default(),
        registry(),
        token,
        RunOptions::default(),
    )
    .await;

    let names: Vec<&str> = result.cases.iter().map(|c| c.case_name.as_str()).collect();
    assert_eq!(names, vec!["first", "second", "third"]);
    // The in-flight sleep observes the cancel signal and reports it; the
    // cases that never started are skipped.
    assert_eq!(result.cases[0].status, Status::Fail);
    assert_eq!(
        result.cases[0].steps[0].error.as_ref().unwrap().code,
        "CANCELLED"
    );
    assert_eq!(result.totals.skipped, 2, "totals: {:?}", result.totals);
}
