//! Control-flow steps: `if`, `for`, `while`.
//!
//! Implemented at the executor layer so nested steps see the same
//! case-level variable store and produce ordinary step results. The loop
//! variables `iteration`, `index` and `item` are saved around a loop and
//! restored afterwards.

use crate::actions::traits::{ActionResult, codes};
use crate::engine::condition::{self, ConditionError};
use crate::engine::step::{assemble, run_step};
use crate::engine::CaseContext;
use crate::model::{ErrorCategory, Status, Step, StepResult};
use crate::value::Value;
use crate::vars::subst;
use std::time::Instant;

/// Hard cap on `while` iterations to bound nontermination.
pub const WHILE_MAX_ITERATIONS: usize = 10;

pub async fn run_control(step: &Step, ctx: &CaseContext) -> Vec<StepResult> {
    if step.if_cond.is_some() {
        run_if(step, ctx).await
    } else if step.for_source.is_some() {
        run_for(step, ctx).await
    } else {
        run_while(step, ctx).await
    }
}

fn condition_error_result(
    step: &Step,
    label: &str,
    err: &ConditionError,
    start: Instant,
    ctx: &CaseContext,
) -> StepResult {
    let result = match err {
        ConditionError::Unresolved(_) => ActionResult::error(
            ErrorCategory::Variable,
            codes::UNRESOLVED_VARIABLE,
            err.to_string(),
        ),
        ConditionError::Invalid(_) => ActionResult::error(
            ErrorCategory::Validation,
            codes::CONDITION_INVALID,
            err.to_string(),
        ),
    };
    assemble(step, label, result, start, ctx)
}

/// Run nested steps sequentially. Returns the results and whether the
/// sequence stopped early on a FAIL/ERROR without `continue_on_failure`.
async fn run_sequence(steps: &[Step], ctx: &CaseContext) -> (Vec<StepResult>, bool) {
    let mut results = Vec::new();
    for nested in steps {
        let nested_results = run_step(nested, ctx).await;
        let failed = nested_results
            .iter()
            .any(|r| matches!(r.status, Status::Fail | Status::Error));
        results.extend(nested_results);
        if failed && !nested.continue_on_failure {
            return (results, true);
        }
    }
    (results, false)
}

async fn run_if(step: &Step, ctx: &CaseContext) -> Vec<StepResult> {
    let start = Instant::now();
    let expr = step.if_cond.as_deref().unwrap_or_default();

    match condition::evaluate(expr, &ctx.vars) {
        Err(err) => vec![condition_error_result(step, "if", &err, start, ctx)],
        Ok(false) => {
            let result = ActionResult::skipped(format!("condition '{expr}' is false"));
            vec![assemble(step, "if", result, start, ctx)]
        }
        Ok(true) => {
            let (mut results, _aborted) = Box::pin(run_sequence(&step.then, ctx)).await;
            let summary = ActionResult::pass(
                Value::Bool(true),
                format!("condition '{expr}' is true, ran {} steps", results.len()),
            );
            results.insert(0, assemble(step, "if", summary, start, ctx));
            results
        }
    }
}

/// Loop sources: `"start..end"` inclusive ranges, sequence literals, or a
/// substituted variable holding a sequence.
fn loop_items(source: &Value, ctx: &CaseContext) -> Result<Vec<Value>, String> {
    let resolved = subst::substitute_value(source, &ctx.vars);
    if subst::contains_unresolved(&resolved) {
        return Err(format!(
            "loop source references an unresolved variable: {}",
            source.render()
        ));
    }
    match resolved {
        Value::Array(items) => Ok(items),
        Value::String(s) => {
            let trimmed = s.trim();
            let Some((lo, hi)) = trimmed.split_once("..") else {
                return Err(format!("'{trimmed}' is not a range or sequence"));
            };
            let lo: i64 = lo
                .trim()
                .parse()
                .map_err(|_| format!("bad range start in '{trimmed}'"))?;
            let hi: i64 = hi
                .trim()
                .parse()
                .map_err(|_| format!("bad range end in '{trimmed}'"))?;
            if lo > hi {
                return Err(format!("empty range '{trimmed}'"));
            }
            Ok((lo..=hi).map(Value::Int).collect())
        }
        other => Err(format!("cannot iterate over {}", other.render())),
    }
}

/// Saved loop bindings, restored when the loop is done.
struct LoopBindings {
    saved: Vec<(&'static str, Option<Value>)>,
}

impl LoopBindings {
    fn save(ctx: &CaseContext) -> Self {
        let saved = ["iteration", "index", "item"]
            .into_iter()
            .map(|name| (name, ctx.vars.get(name)))
            .collect();
        Self { saved }
    }

    fn bind(ctx: &CaseContext, index: usize, item: &Value) {
        ctx.vars.set("iteration", Value::Int(index as i64 + 1));
        ctx.vars.set("index", Value::Int(index as i64));
        ctx.vars.set("item", item.clone());
    }

    fn restore(self, ctx: &CaseContext) {
        for (name, previous) in self.saved {
            match previous {
                Some(value) => ctx.vars.set(name, value),
                None => ctx.vars.unset(name),
            }
        }
    }
}

async fn run_for(step: &Step, ctx: &CaseContext) -> Vec<StepResult> {
    let start = Instant::now();
    let source = step.for_source.as_ref().cloned().unwrap_or(Value::Null);

    let items = match loop_items(&source, ctx) {
        Ok(items) => items,
        Err(reason) => {
            let result = if reason.contains("unresolved") {
                ActionResult::error(ErrorCategory::Variable, codes::UNRESOLVED_VARIABLE, reason)
            } else {
                ActionResult::error(ErrorCategory::Validation, codes::CONDITION_INVALID, reason)
            };
            return vec![assemble(step, "for", result, start, ctx)];
        }
    };

    let bindings = LoopBindings::save(ctx);
    let mut results = Vec::new();
    let mut completed = 0usize;
    let mut aborted = false;

    for (index, item) in items.iter().enumerate() {
        if ctx.cancel.is_cancelled() {
            break;
        }
        LoopBindings::bind(ctx, index, item);
        let (nested, stopped) = Box::pin(run_sequence(&step.body, ctx)).await;
        results.extend(nested);
        completed += 1;
        // A failing iteration aborts the loop unless the for step itself
        // says to continue.
        if stopped && !step.continue_on_failure {
            aborted = true;
            break;
        }
    }
    bindings.restore(ctx);

    let summary = if aborted {
        ActionResult::pass(
            Value::Int(completed as i64),
            format!("aborted after {completed} of {} iterations", items.len()),
        )
    } else {
        ActionResult::pass(
            Value::Int(completed as i64),
            format!("{completed} iterations"),
        )
    };
    results.push(assemble(step, "for", summary, start, ctx));
    results
}

async fn run_while(step: &Step, ctx: &CaseContext) -> Vec<StepResult> {
    let start = Instant::now();
    let expr = step.while_cond.as_deref().unwrap_or_default();

    let bindings = LoopBindings::save(ctx);
    let mut results = Vec::new();
    let mut iterations = 0usize;
    let mut overflowed = false;
    let mut aborted = false;

    loop {
        match condition::evaluate(expr, &ctx.vars) {
            Err(err) => {
                bindings.restore(ctx);
                results.push(condition_error_result(step, "while", &err, start, ctx));
                return results;
            }
            Ok(false) => break,
            Ok(true) => {}
        }
        if iterations >= WHILE_MAX_ITERATIONS {
            overflowed = true;
            break;
        }
        if ctx.cancel.is_cancelled() {
            break;
        }
        LoopBindings::bind(ctx, iterations, &Value::Int(iterations as i64));
        let (nested, stopped) = Box::pin(run_sequence(&step.body, ctx)).await;
        results.extend(nested);
        iterations += 1;
        if stopped && !step.continue_on_failure {
            aborted = true;
            break;
        }
    }
    bindings.restore(ctx);

    let summary = if overflowed {
        ActionResult::error(
            ErrorCategory::Execution,
            codes::WHILE_LIMIT_EXCEEDED,
            format!(
                "while condition '{expr}' still true after {WHILE_MAX_ITERATIONS} iterations"
            ),
        )
    } else if aborted {
        ActionResult::pass(
            Value::Int(iterations as i64),
            format!("aborted after {iterations} iterations"),
        )
    } else {
        ActionResult::pass(
            Value::Int(iterations as i64),
            format!("{iterations} iterations"),
        )
    };
    results.push(assemble(step, "while", summary, start, ctx));
    results
}
