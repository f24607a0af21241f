//! `sleep` — pause for a duration, honoring cancellation.

use super::traits::{Action, ActionContext, ActionResult, codes, ensure_args_resolved};
use crate::model::ErrorCategory;
use crate::value::Value;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::time::Duration;

pub struct SleepAction;

fn parse_duration_arg(arg: &Value) -> Option<Duration> {
    match arg {
        Value::String(s) => humantime::parse_duration(s.trim()).ok(),
        Value::Int(n) if *n >= 0 => Some(Duration::from_secs(*n as u64)),
        Value::Float(f) if *f >= 0.0 => Some(Duration::from_secs_f64(*f)),
        _ => None,
    }
}

#[async_trait]
impl Action for SleepAction {
    fn name(&self) -> &'static str {
        "sleep"
    }

    fn description(&self) -> &'static str {
        "Pause for a duration such as \"250ms\" or \"2s\""
    }

    async fn execute(
        &self,
        args: &[Value],
        options: &BTreeMap<String, Value>,
        ctx: &ActionContext<'_>,
    ) -> ActionResult {
        if let Err(blocked) = ensure_args_resolved(self.name(), args, options) {
            return blocked;
        }

        let Some(arg) = args.first() else {
            return ActionResult::missing_arg(self.name(), "duration");
        };
        let Some(duration) = parse_duration_arg(arg) else {
            return ActionResult::invalid_arg(
                self.name(),
                format!("'{}' is not a duration", arg.render()),
            );
        };

        tokio::select! {
            () = tokio::time::sleep(duration) => ActionResult::pass(
                Value::String(format!("{}", humantime::format_duration(duration))),
                format!("slept {}", humantime::format_duration(duration)),
            ),
            () = ctx.cancel.cancelled() => ActionResult::error(
                ErrorCategory::Execution,
                codes::CANCELLED,
                "sleep interrupted by cancellation",
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

    async fn run(args: Vec<Value>, cancel: CancellationToken) -> ActionResult {
        let vars = VariableStore::new();
        let templates = BTreeMap::new();
        let ctx = ActionContext {
            vars: &vars,
            templates: &templates,
            cancel,
            batch_concurrency: 1,
        };
        SleepAction.execute(&args, &BTreeMap::new(), &ctx).await
    }

    #[tokio::test]
    async fn sleeps_for_requested_duration() {
        let started = std::time::Instant::now();
        let result = run(
            vec![Value::String("20ms".into())],
            CancellationToken::new(),
        )
        .await;
        assert_eq!(result.status, Status::Pass);
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[tokio::test]
    async fn integer_arg_means_seconds() {
        assert_eq!(
            parse_duration_arg(&Value::Int(2)),
            Some(Duration::from_secs(2))
        );
    }

    #[tokio::test]
    async fn cancellation_interrupts() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = run(vec![Value::String("10s".into())], cancel).await;
        assert_eq!(result.status, Status::Error);
        assert_eq!(result.error.unwrap().code, codes::CANCELLED);
    }

    #[tokio::test]
    async fn garbage_duration_rejected() {
        let result = run(
            vec![Value::String("soon".into())],
            CancellationToken::new(),
        )
        .await;
        assert_eq!(result.status, Status::Error);
        assert_eq!(result.error.unwrap().code, codes::INVALID_ARGUMENT);
    }
}
