//! `log` — render arguments to the step output and the tracing log.

use super::traits::{Action, ActionContext, ActionResult, ensure_args_resolved};
use crate::value::Value;
use async_trait::async_trait;
use std::collections::BTreeMap;
use tracing::info;

pub struct LogAction;

#[async_trait]
impl Action for LogAction {
    fn name(&self) -> &'static str {
        "log"
    }

    fn description(&self) -> &'static str {
        "Render arguments into the step output"
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

        let message = args
            .iter()
            .map(Value::render)
            .collect::<Vec<_>>()
            .join(" ");
        info!(target: "robogo::steps", "{message}");
        ActionResult::pass(Value::String(message.clone()), message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Status;
    use crate::vars::VariableStore;
    use crate::vars::subst::UNRESOLVED;
    use tokio_util::sync::CancellationToken;

    async fn run(args: Vec<Value>) -> ActionResult {
        let vars = VariableStore::new();
        let templates = BTreeMap::new();
        let ctx = ActionContext {
            vars: &vars,
            templates: &templates,
            cancel: CancellationToken::new(),
            batch_concurrency: 1,
        };
        LogAction.execute(&args, &BTreeMap::new(), &ctx).await
    }

    #[tokio::test]
    async fn joins_rendered_args() {
        let result = run(vec![Value::String("n".into()), Value::Int(7)]).await;
        assert_eq!(result.status, Status::Pass);
        assert_eq!(result.output, "n 7");
        assert_eq!(result.data, Some(Value::String("n 7".into())));
    }

    #[tokio::test]
    async fn empty_args_log_empty_line() {
        let result = run(vec![]).await;
        assert_eq!(result.status, Status::Pass);
        assert_eq!(result.output, "");
    }

    #[tokio::test]
    async fn unresolved_argument_blocks() {
        let result = run(vec![Value::String(format!("hello {UNRESOLVED}"))]).await;
        assert_eq!(result.status, Status::Error);
        assert_eq!(result.error.unwrap().code, "UNRESOLVED_VARIABLE");
    }
}
