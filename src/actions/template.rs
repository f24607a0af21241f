//! `template` — render a text template against the case variables.
//!
//! `args[0]` names an entry in the case's `templates` table; the `source`
//! option supplies inline template text instead. The render context is the
//! variable snapshot, optionally overlaid with a `context` mapping option.

use super::traits::{Action, ActionContext, ActionResult, codes, ensure_args_resolved};
use crate::model::ErrorCategory;
use crate::value::Value;
use async_trait::async_trait;
use std::collections::BTreeMap;

pub struct TemplateAction;

#[async_trait]
impl Action for TemplateAction {
    fn name(&self) -> &'static str {
        "template"
    }

    fn description(&self) -> &'static str {
        "Render a named or inline text template with the case variables"
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

        let source = match options.get("source").and_then(Value::as_str) {
            Some(inline) => inline.to_string(),
            None => {
                let Some(name) = args.first().and_then(Value::as_str) else {
                    return ActionResult::missing_arg(
                        self.name(),
                        "template name (or a 'source' option)",
                    );
                };
                match ctx.templates.get(name) {
                    Some(source) => source.clone(),
                    None => {
                        return ActionResult::invalid_arg(
                            self.name(),
                            format!("no template named '{name}' in this case"),
                        );
                    }
                }
            }
        };

        let mut render_vars = ctx.vars.snapshot();
        if let Some(Value::Object(overlay)) = options.get("context") {
            for (key, value) in overlay {
                render_vars.insert(key.clone(), value.clone());
            }
        }

        let json = Value::Object(render_vars).to_json();
        let context = match tera::Context::from_serialize(&json) {
            Ok(context) => context,
            Err(err) => {
                return ActionResult::error(
                    ErrorCategory::Execution,
                    codes::RENDER_FAILED,
                    format!("template context: {err}"),
                );
            }
        };

        match tera::Tera::one_off(&source, &context, false) {
            Ok(rendered) => {
                let output = rendered.clone();
                ActionResult::pass(Value::String(rendered), output)
            }
            Err(err) => ActionResult::error(
                ErrorCategory::Execution,
                codes::RENDER_FAILED,
                format!("template render failed: {err}"),
            )
            .with_suggestion("check the template syntax against the case variables"),
        }
    }
}
