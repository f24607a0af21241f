//! Step executor: resolve → dispatch → bound by timeout → normalize →
//! mask → bind.
//!
//! This is the only layer that binds variables, enforces timeouts and
//! applies masking. Actions run inside a recovery boundary so a panic
//! becomes a normalized ERROR instead of taking the worker down.

use crate::actions::traits::{ActionContext, ActionResult, VarOp, codes};
use crate::engine::CaseContext;
use crate::engine::control;
use crate::masking;
use crate::model::{ErrorCategory, Status, Step, StepResult};
use crate::value::Value;
use crate::vars::subst;
use chrono::Utc;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::time::Instant;
use tracing::debug;

/// Run one step, control-flow constructs included. Plain action steps
/// yield a single result; `if`/`for`/`while` also yield the results of
/// their nested steps, in execution order.
pub fn run_step<'a>(step: &'a Step, ctx: &'a CaseContext) -> BoxFuture<'a, Vec<StepResult>> {
    async move {
        if step.if_cond.is_some() || step.for_source.is_some() || step.while_cond.is_some() {
            return control::run_control(step, ctx).await;
        }
        if step.action == "skip" {
            let reason = step
                .args
                .first()
                .map(Value::render)
                .unwrap_or_else(|| "skipped".to_string());
            return vec![assemble(
                step,
                "skip",
                ActionResult::skipped(reason),
                Instant::now(),
                ctx,
            )];
        }
        vec![execute_action_step(step, ctx).await]
    }
    .boxed()
}

/// The §single-action path: everything except control flow.
async fn execute_action_step(step: &Step, ctx: &CaseContext) -> StepResult {
    let start = Instant::now();

    // Resolve args and options against the store.
    let resolved_args: Vec<Value> = step
        .args
        .iter()
        .map(|arg| subst::substitute_value(arg, &ctx.vars))
        .collect();
    let resolved_options: BTreeMap<String, Value> = step
        .options
        .iter()
        .map(|(key, value)| {
            (
                subst::substitute_str(key, &ctx.vars),
                subst::substitute_value(value, &ctx.vars),
            )
        })
        .collect();

    // Unresolved arguments block dispatch: the action is never invoked.
    let unresolved = resolved_args.iter().any(subst::contains_unresolved)
        || resolved_options
            .iter()
            .any(|(k, v)| k.contains(subst::UNRESOLVED) || subst::contains_unresolved(v));
    if unresolved {
        let result = ActionResult::error(
            ErrorCategory::Variable,
            codes::UNRESOLVED_VARIABLE,
            format!(
                "step '{}' has arguments with unresolved variables",
                step.name
            ),
        )
        .with_suggestion("define the variable in the case or the environment");
        return assemble(step, &step.action, result, start, ctx);
    }

    let Some(action) = ctx.registry.get(&step.action) else {
        let result = ActionResult::error(
            ErrorCategory::Execution,
            codes::UNKNOWN_ACTION,
            format!("no action named '{}' is registered", step.action),
        )
        .with_suggestion("run `robogo list` to see the registered actions");
        return assemble(step, &step.action, result, start, ctx);
    };

    if ctx.cancel.is_cancelled() {
        let result = ActionResult::error(
            ErrorCategory::Execution,
            codes::CANCELLED,
            format!("step '{}' cancelled before dispatch", step.name),
        );
        return assemble(step, &step.action, result, start, ctx);
    }

    let effective_timeout = step.timeout.unwrap_or(ctx.default_timeout);
    let step_token = ctx.cancel.child_token();
    // Guarantees the child token is cancelled on every return path, so
    // anything the action spawned from it winds down.
    let _cancel_guard = step_token.clone().drop_guard();

    let action_ctx = ActionContext {
        vars: &ctx.vars,
        templates: &ctx.templates,
        cancel: step_token.clone(),
        batch_concurrency: ctx.batch_concurrency,
    };

    debug!(step = %step.name, action = %step.action, "dispatching");
    let dispatch = AssertUnwindSafe(action.execute(&resolved_args, &resolved_options, &action_ctx))
        .catch_unwind();

    let result = match tokio::time::timeout(effective_timeout, dispatch).await {
        Err(_deadline) => {
            // Cancel so the action's scoped cleanup runs, then report.
            step_token.cancel();
            ActionResult::error(
                ErrorCategory::Timeout,
                codes::EXECUTION_TIMEOUT,
                format!(
                    "action '{}' did not return within {}",
                    step.action,
                    humantime::format_duration(effective_timeout)
                ),
            )
            .with_context(
                "elapsed_ms",
                Value::Int(start.elapsed().as_millis() as i64),
            )
            .with_context(
                "timeout_ms",
                Value::Int(effective_timeout.as_millis() as i64),
            )
        }
        Ok(Err(panic)) => ActionResult::error(
            ErrorCategory::Execution,
            codes::PANIC,
            format!(
                "action '{}' panicked: {}",
                step.action,
                panic_message(panic.as_ref())
            ),
        )
        .with_context("step", Value::String(step.name.clone())),
        Ok(Ok(result)) => result,
    };

    assemble(step, &step.action, normalize(&step.action, result), start, ctx)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Enforce the result invariant: exactly one of error/failure, matching
/// the status. Violations are coerced to `ERROR/execution
/// CONTRACT_VIOLATION` with the original status recorded.
fn normalize(action: &str, result: ActionResult) -> ActionResult {
    let consistent = match result.status {
        Status::Pass | Status::Skipped => result.error.is_none() && result.failure.is_none(),
        Status::Error => result.error.is_some() && result.failure.is_none(),
        Status::Fail => result.failure.is_some() && result.error.is_none(),
    };
    if consistent {
        return result;
    }
    ActionResult::error(
        ErrorCategory::Execution,
        codes::CONTRACT_VIOLATION,
        format!("action '{action}' returned an inconsistent result envelope"),
    )
    .with_context(
        "reported_status",
        Value::String(result.status.to_string()),
    )
    .with_context("had_error_info", Value::Bool(result.error.is_some()))
    .with_context("had_failure_info", Value::Bool(result.failure.is_some()))
}

/// Masking, binding and final assembly into a [`StepResult`].
pub(crate) fn assemble(
    step: &Step,
    action_label: &str,
    result: ActionResult,
    start: Instant,
    ctx: &CaseContext,
) -> StepResult {
    let ActionResult {
        status,
        data,
        output,
        error,
        failure,
        var_ops,
    } = result;

    // Masking first; the bound value is the masked one.
    let mut data = data;
    let mut output = output;
    if let Some(value) = data.as_mut() {
        let leaked = masking::mask_value(value, &step.sensitive_fields);
        if !leaked.is_empty() {
            output = masking::scrub_output(&output, &leaked);
        }
    }
    if step.no_log {
        output = masking::REDACTED_OUTPUT.to_string();
    }

    // Binding happens here and only here, and only on PASS.
    if status == Status::Pass {
        for op in var_ops {
            match op {
                VarOp::Set(name, value) => ctx.vars.set(name, value),
                VarOp::Unset(name) => ctx.vars.unset(&name),
            }
        }
        if let Some(result_name) = step.result.as_deref().filter(|name| !name.is_empty()) {
            ctx.vars
                .set(result_name, data.clone().unwrap_or(Value::Null));
        }
    }

    let ended_at = Utc::now();
    let duration = start.elapsed();
    StepResult {
        step_name: step.name.clone(),
        action: action_label.to_string(),
        status,
        output,
        data,
        error,
        failure,
        duration,
        started_at: ended_at
            - chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::zero()),
        ended_at,
    }
}
