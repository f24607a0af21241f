//! Action contract: the uniform call shape every action obeys.
//!
//! An action receives already-substituted args and options, a read-only view
//! of the case variables, and a cancellation token. It returns an
//! [`ActionResult`] envelope — it never mutates the store and never decides
//! about binding, masking or timeouts; the step executor owns those.

use crate::model::{ErrorCategory, ErrorInfo, FailureInfo, Status};
use crate::value::Value;
use crate::vars::VariableStore;
use crate::vars::subst::UNRESOLVED;
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;

/// Stable error codes. They appear in reports and must not change between
/// versions.
pub mod codes {
    pub const UNRESOLVED_VARIABLE: &str = "UNRESOLVED_VARIABLE";
    pub const UNKNOWN_ACTION: &str = "UNKNOWN_ACTION";
    pub const MISSING_ARGUMENT: &str = "MISSING_ARGUMENT";
    pub const INVALID_ARGUMENT: &str = "INVALID_ARGUMENT";
    pub const EXECUTION_TIMEOUT: &str = "EXECUTION_TIMEOUT";
    pub const CANCELLED: &str = "CANCELLED";
    pub const PANIC: &str = "PANIC";
    pub const CONTRACT_VIOLATION: &str = "CONTRACT_VIOLATION";
    pub const CONDITION_INVALID: &str = "CONDITION_INVALID";
    pub const WHILE_LIMIT_EXCEEDED: &str = "WHILE_LIMIT_EXCEEDED";
    pub const PARSE_FAILED: &str = "PARSE_FAILED";
    pub const REQUEST_FAILED: &str = "REQUEST_FAILED";
    pub const UNEXPECTED_STATUS: &str = "UNEXPECTED_STATUS";
    pub const RENDER_FAILED: &str = "RENDER_FAILED";
    pub const QUERY_FAILED: &str = "QUERY_FAILED";
    pub const DECODE_FAILED: &str = "DECODE_FAILED";
}

/// Per-invocation view handed to an action by the step executor.
pub struct ActionContext<'a> {
    /// Read-only variable access. Binding results is the executor's job.
    pub vars: &'a VariableStore,
    /// Case-level text templates, keyed by name.
    pub templates: &'a BTreeMap<String, String>,
    /// Step-scoped token; actions must honor it at their next I/O
    /// checkpoint. Batch fan-out derives children from it.
    pub cancel: CancellationToken,
    /// Upper bound for internal batch fan-out.
    pub batch_concurrency: usize,
}

/// Store mutation requested by an action. Actions never touch the store
/// directly; the step executor applies these on PASS, keeping the
/// single-writer rule literal.
#[derive(Debug, Clone, PartialEq)]
pub enum VarOp {
    Set(String, Value),
    Unset(String),
}

/// Envelope every action returns. Exactly one of `error`/`failure` may be
/// set, matching `status` (ERROR/FAIL); the executor coerces violations.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionResult {
    pub status: Status,
    pub data: Option<Value>,
    /// One-line string rendering for logs.
    pub output: String,
    pub error: Option<ErrorInfo>,
    pub failure: Option<FailureInfo>,
    /// Requested store mutations, applied by the executor on PASS.
    pub var_ops: Vec<VarOp>,
}

impl ActionResult {
    pub fn pass(data: Value, output: impl Into<String>) -> Self {
        Self {
            status: Status::Pass,
            data: Some(data),
            output: output.into(),
            error: None,
            failure: None,
            var_ops: Vec::new(),
        }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            status: Status::Skipped,
            data: None,
            output: reason.into(),
            error: None,
            failure: None,
            var_ops: Vec::new(),
        }
    }

    pub fn fail(failure: FailureInfo) -> Self {
        let output = failure.message.clone();
        Self {
            status: Status::Fail,
            data: None,
            output,
            error: None,
            failure: Some(failure),
            var_ops: Vec::new(),
        }
    }

    pub fn error(
        category: ErrorCategory,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        let info = ErrorInfo {
            category,
            code: code.into(),
            message: message.into(),
            context: BTreeMap::new(),
            suggestions: Vec::new(),
        };
        let output = info.to_string();
        Self {
            status: Status::Error,
            data: None,
            output,
            error: Some(info),
            failure: None,
            var_ops: Vec::new(),
        }
    }

    /// Attach a context entry to an ERROR result. No-op on other statuses.
    pub fn with_context(mut self, key: impl Into<String>, value: Value) -> Self {
        if let Some(info) = self.error.as_mut() {
            info.context.insert(key.into(), value);
        }
        self
    }

    /// Attach a suggestion to an ERROR result. No-op on other statuses.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        if let Some(info) = self.error.as_mut() {
            info.suggestions.push(suggestion.into());
        }
        self
    }

    /// Request a store mutation to be applied by the executor on PASS.
    pub fn with_var_op(mut self, op: VarOp) -> Self {
        self.var_ops.push(op);
        self
    }

    /// Shorthand for `ERROR/validation MISSING_ARGUMENT`.
    pub fn missing_arg(action: &str, what: &str) -> Self {
        Self::error(
            ErrorCategory::Validation,
            codes::MISSING_ARGUMENT,
            format!("{action}: missing argument: {what}"),
        )
    }

    /// Shorthand for `ERROR/validation INVALID_ARGUMENT`.
    pub fn invalid_arg(action: &str, what: impl Into<String>) -> Self {
        Self::error(
            ErrorCategory::Validation,
            codes::INVALID_ARGUMENT,
            format!("{action}: {}", what.into()),
        )
    }
}

/// Named unit of work dispatched by the step executor.
#[async_trait]
pub trait Action: Send + Sync {
    /// Registry key.
    fn name(&self) -> &'static str;

    /// One-line description for `robogo list`.
    fn description(&self) -> &'static str;

    async fn execute(
        &self,
        args: &[Value],
        options: &BTreeMap<String, Value>,
        ctx: &ActionContext<'_>,
    ) -> ActionResult;
}

/// Gate shared by every action: reject arguments still carrying the
/// unresolved sentinel before any side effect happens.
pub fn ensure_args_resolved(
    action: &str,
    args: &[Value],
    options: &BTreeMap<String, Value>,
) -> Result<(), ActionResult> {
    let tainted_arg = args
        .iter()
        .position(|arg| crate::vars::subst::contains_unresolved(arg));
    if let Some(index) = tainted_arg {
        return Err(ActionResult::error(
            ErrorCategory::Variable,
            codes::UNRESOLVED_VARIABLE,
            format!("{action}: argument {index} contains {UNRESOLVED}"),
        )
        .with_context("argument_index", Value::Int(index as i64)));
    }
    for (key, value) in options {
        if key.contains(UNRESOLVED) || crate::vars::subst::contains_unresolved(value) {
            return Err(ActionResult::error(
                ErrorCategory::Variable,
                codes::UNRESOLVED_VARIABLE,
                format!("{action}: option '{key}' contains {UNRESOLVED}"),
            ));
        }
    }
    Ok(())
}
