//! `assert` — the test-logical comparison action.
//!
//! One argument asserts truthiness; three or more compare `args[0]` against
//! `args[2..]` using `args[1]` as operator. Two arguments are ambiguous and
//! rejected. A mismatch is a FAIL with failure details, never an ERROR.

use super::traits::{Action, ActionContext, ActionResult, ensure_args_resolved};
use crate::engine::condition::compare_values;
use crate::model::FailureInfo;
use crate::value::Value;
use async_trait::async_trait;
use std::collections::BTreeMap;

pub struct AssertAction;

#[async_trait]
impl Action for AssertAction {
    fn name(&self) -> &'static str {
        "assert"
    }

    fn description(&self) -> &'static str {
        "Assert truthiness of one value, or compare two values with an operator"
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

        match args.len() {
            0 => ActionResult::missing_arg(self.name(), "value to assert"),
            1 => assert_truthy(&args[0]),
            2 => ActionResult::invalid_arg(
                self.name(),
                "two arguments are ambiguous; use one (truthiness) or three (comparison)",
            ),
            _ => assert_comparison(&args[0], &args[1], &args[2]),
        }
    }
}

fn assert_truthy(value: &Value) -> ActionResult {
    if value.is_truthy() {
        ActionResult::pass(Value::Bool(true), format!("{} is true", value.render()))
    } else {
        ActionResult::fail(FailureInfo {
            expected: Value::Bool(true),
            actual: value.clone(),
            operator: "truthy".to_string(),
            message: format!("expected a true value, got {}", value.render()),
        })
    }
}

fn assert_comparison(lhs: &Value, op: &Value, rhs: &Value) -> ActionResult {
    let operator = op.render();
    match compare_values(lhs, &operator, rhs) {
        Ok(true) => ActionResult::pass(
            Value::Bool(true),
            format!("{} {} {}", lhs.render(), operator, rhs.render()),
        ),
        Ok(false) => ActionResult::fail(FailureInfo {
            expected: rhs.clone(),
            actual: lhs.clone(),
            operator: operator.clone(),
            message: format!(
                "assertion failed: {} {} {}",
                lhs.render(),
                operator,
                rhs.render()
            ),
        }),
        Err(reason) => ActionResult::invalid_arg("assert", reason),
    }
}
