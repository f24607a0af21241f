//! Suite runner: fan cases out onto a bounded worker pool.
//!
//! Each worker owns a case from start to finish. Results are joined in
//! submission order no matter when workers complete, so reports are
//! deterministic. Cancellation stops new cases from starting; in-flight
//! cases finish their current step on their own.

use crate::actions::ActionRegistry;
use crate::engine::case::{RunOptions, run_case};
use crate::model::{
    CaseResult, ErrorCategory, ErrorInfo, ParallelConfig, Status, StepResult, SuiteResult,
    TestCase, Totals,
};
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub async fn run_suite(
    name: &str,
    cases: Vec<TestCase>,
    parallel: &ParallelConfig,
    registry: Arc<ActionRegistry>,
    cancel: CancellationToken,
    options: RunOptions,
) -> SuiteResult {
    let start = Instant::now();
    let fan_out = parallel.enabled && parallel.cases && cases.len() > 1;
    info!(
        suite = %name,
        cases = cases.len(),
        parallel = fan_out,
        "running suite"
    );

    let options = RunOptions {
        batch_concurrency: if parallel.enabled && parallel.batch_subops {
            parallel.max_concurrency.max(1)
        } else {
            1
        },
        ..options
    };

    let results = if fan_out {
        run_parallel(cases, parallel.max_concurrency.max(1), registry, cancel, options).await
    } else {
        run_sequential(cases, registry, cancel, options).await
    };

    let totals = Totals::tally(&results);
    info!(
        suite = %name,
        passed = totals.passed,
        failed = totals.failed,
        skipped = totals.skipped,
        "suite finished"
    );

    SuiteResult {
        suite_name: name.to_string(),
        cases: results,
        totals,
        duration: start.elapsed(),
    }
}

async fn run_sequential(
    cases: Vec<TestCase>,
    registry: Arc<ActionRegistry>,
    cancel: CancellationToken,
    options: RunOptions,
) -> Vec<CaseResult> {
    let mut results = Vec::with_capacity(cases.len());
    for case in &cases {
        if cancel.is_cancelled() {
            results.push(skipped_case(&case.name));
            continue;
        }
        let case_token = cancel.child_token();
        results.push(run_case(case, registry.clone(), case_token, &options).await);
    }
    results
}

async fn run_parallel(
    cases: Vec<TestCase>,
    max_concurrency: usize,
    registry: Arc<ActionRegistry>,
    cancel: CancellationToken,
    options: RunOptions,
) -> Vec<CaseResult> {
    let limiter = Arc::new(Semaphore::new(max_concurrency));

    // Spawn in submission order, join in submission order.
    let handles: Vec<_> = cases
        .into_iter()
        .map(|case| {
            let limiter = Arc::clone(&limiter);
            let registry = Arc::clone(&registry);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let Ok(_permit) = limiter.acquire().await else {
                    return skipped_case(&case.name);
                };
                // Pending slot short-circuits once the suite is cancelled.
                if cancel.is_cancelled() {
                    return skipped_case(&case.name);
                }
                let case_token = cancel.child_token();
                run_case(&case, registry, case_token, &options).await
            })
        })
        .collect();

    let mut results = Vec::with_capacity(handles.len());
    for (index, handle) in handles.into_iter().enumerate() {
        match handle.await {
            Ok(result) => results.push(result),
            Err(join_err) => {
                // A worker panic is localized: the case reports ERROR and
                // the suite carries on.
                warn!(case_index = index, error = %join_err, "case worker died");
                results.push(panicked_case(index, &join_err));
            }
        }
    }
    results
}

fn skipped_case(name: &str) -> CaseResult {
    CaseResult {
        case_name: name.to_string(),
        status: Status::Skipped,
        steps: Vec::new(),
        duration: Duration::ZERO,
    }
}

fn panicked_case(index: usize, join_err: &tokio::task::JoinError) -> CaseResult {
    let now = Utc::now();
    let step = StepResult {
        step_name: "<worker>".to_string(),
        action: String::new(),
        status: Status::Error,
        output: join_err.to_string(),
        data: None,
        error: Some(ErrorInfo {
            category: ErrorCategory::Execution,
            code: "PANIC".to_string(),
            message: format!("case worker panicked: {join_err}"),
            context: BTreeMap::new(),
            suggestions: Vec::new(),
        }),
        failure: None,
        duration: Duration::ZERO,
        started_at: now,
        ended_at: now,
    };
    CaseResult {
        case_name: format!("<case {index}>"),
        status: Status::Fail,
        steps: vec![step],
        duration: Duration::ZERO,
    }
}
