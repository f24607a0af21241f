//! `variable` — bind, re-bind or remove case variables.
//!
//! `[name, value]` binds the value as-is. The `operation` option selects
//! the other modes: `from_json` parses `args[1]` as raw JSON text before
//! binding, `unset` removes the binding named by `args[0]`. The action only
//! requests the mutation; the step executor applies it.

use super::traits::{Action, ActionContext, ActionResult, VarOp, codes, ensure_args_resolved};
use crate::model::ErrorCategory;
use crate::value::Value;
use async_trait::async_trait;
use std::collections::BTreeMap;

pub struct VariableAction;

#[async_trait]
impl Action for VariableAction {
    fn name(&self) -> &'static str {
        "variable"
    }

    fn description(&self) -> &'static str {
        "Set a variable (optionally parsing raw JSON), or unset one"
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

        let Some(name) = args.first().and_then(Value::as_str) else {
            return ActionResult::missing_arg(self.name(), "variable name (string)");
        };
        if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') || name.is_empty() {
            return ActionResult::invalid_arg(
                self.name(),
                format!("'{name}' is not a valid identifier ([A-Za-z0-9_]+)"),
            );
        }

        let operation = options
            .get("operation")
            .and_then(Value::as_str)
            .unwrap_or("set");

        match operation {
            "unset" => ActionResult::pass(Value::Null, format!("unset {name}"))
                .with_var_op(VarOp::Unset(name.to_string())),
            "from_json" => {
                let Some(raw) = args.get(1).and_then(Value::as_str) else {
                    return ActionResult::missing_arg(self.name(), "raw JSON text");
                };
                match serde_json::from_str::<serde_json::Value>(raw) {
                    Ok(parsed) => {
                        let value = Value::from_json(&parsed);
                        ActionResult::pass(value.clone(), format!("{name} = {}", value.render()))
                            .with_var_op(VarOp::Set(name.to_string(), value))
                    }
                    Err(err) => ActionResult::error(
                        ErrorCategory::Variable,
                        codes::PARSE_FAILED,
                        format!("'{name}': invalid JSON: {err}"),
                    ),
                }
            }
            "set" => {
                let Some(value) = args.get(1) else {
                    return ActionResult::missing_arg(self.name(), "value");
                };
                ActionResult::pass(value.clone(), format!("{name} = {}", value.render()))
                    .with_var_op(VarOp::Set(name.to_string(), value.clone()))
            }
            other => ActionResult::invalid_arg(
                self.name(),
                format!("unknown operation '{other}' (set, from_json, unset)"),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Status;
    use crate::vars::VariableStore;
    use tokio_util::sync::CancellationToken;

    async fn run(args: Vec<Value>, options: BTreeMap<String, Value>) -> ActionResult {
        let vars = VariableStore::new();
        let templates = BTreeMap::new();
        let ctx = ActionContext {
            vars: &vars,
            templates: &templates,
            cancel: CancellationToken::new(),
            batch_concurrency: 1,
        };
        VariableAction.execute(&args, &options, &ctx).await
    }

    #[tokio::test]
    async fn set_requests_binding() {
        let result = run(
            vec![Value::String("n".into()), Value::Int(7)],
            BTreeMap::new(),
        )
        .await;
        assert_eq!(result.status, Status::Pass);
        assert_eq!(result.data, Some(Value::Int(7)));
        assert_eq!(result.var_ops, vec![VarOp::Set("n".into(), Value::Int(7))]);
    }

    #[tokio::test]
    async fn set_preserves_structured_values() {
        let list = Value::Array(vec![Value::Int(1), Value::Int(2)]);
        let result = run(
            vec![Value::String("xs".into()), list.clone()],
            BTreeMap::new(),
        )
        .await;
        assert_eq!(result.var_ops, vec![VarOp::Set("xs".into(), list)]);
    }

    #[tokio::test]
    async fn from_json_parses_raw_text() {
        let mut options = BTreeMap::new();
        options.insert("operation".to_string(), Value::String("from_json".into()));
        let result = run(
            vec![
                Value::String("obj".into()),
                Value::String(r#"{"a": 1}"#.into()),
            ],
            options,
        )
        .await;
        assert_eq!(result.status, Status::Pass);
        match &result.var_ops[0] {
            VarOp::Set(name, Value::Object(map)) => {
                assert_eq!(name, "obj");
                assert_eq!(map["a"], Value::Int(1));
            }
            other => panic!("unexpected op: {other:?}"),
        }
    }

    #[tokio::test]
    async fn from_json_rejects_invalid_text() {
        let mut options = BTreeMap::new();
        options.insert("operation".to_string(), Value::String("from_json".into()));
        let result = run(
            vec![Value::String("obj".into()), Value::String("{broken".into())],
            options,
        )
        .await;
        assert_eq!(result.status, Status::Error);
        let info = result.error.unwrap();
        assert_eq!(info.category, ErrorCategory::Variable);
        assert_eq!(info.code, codes::PARSE_FAILED);
        assert!(result.var_ops.is_empty());
    }

    #[tokio::test]
    async fn unset_requests_removal() {
        let mut options = BTreeMap::new();
        options.insert("operation".to_string(), Value::String("unset".into()));
        let result = run(vec![Value::String("gone".into())], options).await;
        assert_eq!(result.status, Status::Pass);
        assert_eq!(result.var_ops, vec![VarOp::Unset("gone".into())]);
    }

    #[tokio::test]
    async fn invalid_identifier_rejected() {
        let result = run(
            vec![Value::String("not valid".into()), Value::Int(1)],
            BTreeMap::new(),
        )
        .await;
        assert_eq!(result.status, Status::Error);
        assert_eq!(result.error.unwrap().code, codes::INVALID_ARGUMENT);
    }

    #[tokio::test]
    async fn missing_value_rejected() {
        let result = run(vec![Value::String("n".into())], BTreeMap::new()).await;
        assert_eq!(result.status, Status::Error);
        assert_eq!(result.error.unwrap().code, codes::MISSING_ARGUMENT);
    }
}
