//! Case runner: an ordered loop over one case's steps.
//!
//! Each case gets a fresh variable store built from its `variables` block
//! (environment placeholders expanded eagerly) and never shared with
//! sibling cases. A FAIL or ERROR stops the case unless the offending step
//! carries `continue_on_failure`; SKIPPED never stops it.

use crate::actions::ActionRegistry;
use crate::engine::step::run_step;
use crate::engine::{CaseContext, DEFAULT_STEP_TIMEOUT};
use crate::model::{CaseResult, Status, TestCase};
use crate::vars::VariableStore;
use crate::vars::subst;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Engine-level knobs shared by every case of a run.
#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    pub default_timeout: Duration,
    /// Cap for batch actions fanning out internally.
    pub batch_concurrency: usize,
    /// Log the variable snapshot after every step.
    pub debug_vars: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            default_timeout: DEFAULT_STEP_TIMEOUT,
            batch_concurrency: 1,
            debug_vars: false,
        }
    }
}

pub async fn run_case(
    case: &TestCase,
    registry: Arc<ActionRegistry>,
    cancel: CancellationToken,
    options: &RunOptions,
) -> CaseResult {
    let start = Instant::now();
    info!(case = %case.name, steps = case.steps.len(), "running case");

    let initial = case
        .variables
        .iter()
        .map(|(name, value)| (name.clone(), subst::expand_env(value)))
        .collect();
    let ctx = CaseContext::new(registry, cancel)
        .with_vars(VariableStore::from_map(initial))
        .with_templates(case.templates.clone())
        .with_default_timeout(options.default_timeout)
        .with_batch_concurrency(options.batch_concurrency);

    let mut results = Vec::new();
    for step in &case.steps {
        if ctx.cancel.is_cancelled() {
            break;
        }
        let step_results = run_step(step, &ctx).await;
        let failed = step_results
            .iter()
            .any(|result| matches!(result.status, Status::Fail | Status::Error));
        results.extend(step_results);

        if options.debug_vars {
            debug!(case = %case.name, step = %step.name, vars = ?ctx.vars.snapshot());
        }
        if failed && !step.continue_on_failure {
            break;
        }
    }

    let status = if results.is_empty() && ctx.cancel.is_cancelled() {
        // Cancelled before any step ran.
        Status::Skipped
    } else {
        CaseResult::aggregate_status(&results)
    };
    info!(case = %case.name, %status, "case finished");

    CaseResult {
        case_name: case.name.clone(),
        status,
        steps: results,
        duration: start.elapsed(),
    }
}
