//! Minimal, total condition grammar: `LHS OP RHS` or a single boolean
//! token. Operands are substituted before comparison; numeric promotion is
//! attempted first, string comparison is the fallback.

use crate::value::Value;
use crate::vars::VariableStore;
use crate::vars::subst::{self, UNRESOLVED};
use thiserror::Error;

pub const OPERATORS: &[&str] = &[
    "==",
    "!=",
    ">=",
    "<=",
    ">",
    "<",
    "contains",
    "starts_with",
    "ends_with",
];

/// Why a condition could not be evaluated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConditionError {
    /// A placeholder in the expression had no binding.
    #[error("condition references an unresolved variable: {0}")]
    Unresolved(String),
    /// The expression does not match the grammar.
    #[error("invalid condition: {0}")]
    Invalid(String),
}

/// Compare two runtime values with one of the nine operators. Numbers
/// compare numerically when both sides have a numeric reading; everything
/// else falls back to the rendered string form.
pub fn compare_values(lhs: &Value, op: &str, rhs: &Value) -> Result<bool, String> {
    let lhs_num = numeric(lhs);
    let rhs_num = numeric(rhs);

    match op {
        "contains" => Ok(contains(lhs, rhs)),
        "starts_with" => Ok(lhs.render().starts_with(&rhs.render())),
        "ends_with" => Ok(lhs.render().ends_with(&rhs.render())),
        "==" | "!=" | ">" | "<" | ">=" | "<=" => {
            let ordering = match (lhs_num, rhs_num) {
                (Some(a), Some(b)) => a.partial_cmp(&b),
                _ => Some(lhs.render().cmp(&rhs.render())),
            };
            let Some(ordering) = ordering else {
                // NaN has no ordering; only `!=` holds.
                return Ok(op == "!=");
            };
            Ok(match op {
                "==" => ordering.is_eq(),
                "!=" => !ordering.is_eq(),
                ">" => ordering.is_gt(),
                "<" => ordering.is_lt(),
                ">=" => ordering.is_ge(),
                _ => ordering.is_le(),
            })
        }
        other => Err(format!("unknown operator: {other}")),
    }
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Int(_) | Value::Float(_) => value.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn contains(lhs: &Value, rhs: &Value) -> bool {
    match lhs {
        Value::Array(items) => items.iter().any(|item| item == rhs),
        other => other.render().contains(&rhs.render()),
    }
}

/// Substitute and evaluate a condition expression against the store.
pub fn evaluate(expr: &str, store: &VariableStore) -> Result<bool, ConditionError> {
    let resolved = subst::substitute_str(expr, store);
    if resolved.contains(UNRESOLVED) {
        return Err(ConditionError::Unresolved(expr.to_string()));
    }

    let tokens: Vec<&str> = resolved.split_whitespace().collect();
    if tokens.is_empty() {
        return Err(ConditionError::Invalid(expr.to_string()));
    }

    // Single bare token: boolean literal forms only.
    if tokens.len() == 1 {
        return match tokens[0].to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(ConditionError::Invalid(expr.to_string())),
        };
    }

    let op_index = tokens
        .iter()
        .position(|token| OPERATORS.contains(token))
        .ok_or_else(|| ConditionError::Invalid(expr.to_string()))?;
    if op_index == 0 || op_index == tokens.len() - 1 {
        return Err(ConditionError::Invalid(expr.to_string()));
    }

    let lhs = Value::String(tokens[..op_index].join(" "));
    let rhs = Value::String(tokens[op_index + 1..].join(" "));
    compare_values(&lhs, tokens[op_index], &rhs)
        .map_err(|_| ConditionError::Invalid(expr.to_string()))
}
