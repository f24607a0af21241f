//! Built-in actions and the registry that dispatches to them.

pub mod assert;
pub mod base64_codec;
pub mod http;
pub mod jq;
pub mod log;
pub mod sleep;
pub mod template;
pub mod traits;
pub mod variable;

pub use assert::AssertAction;
pub use base64_codec::Base64Action;
pub use http::{HttpAction, HttpBatchAction};
pub use jq::JqAction;
pub use log::LogAction;
pub use sleep::SleepAction;
pub use template::TemplateAction;
pub use traits::{Action, ActionContext, ActionResult, codes, ensure_args_resolved};
pub use variable::VariableAction;

use std::collections::HashMap;
use std::sync::Arc;

/// Name → action map. Read-only after construction; the case runner
/// receives a reference, there is no global registry.
#[derive(Clone, Default)]
pub struct ActionRegistry {
    actions: HashMap<String, Arc<dyn Action>>,
}

impl ActionRegistry {
    /// Registry with every built-in action registered.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        for action in builtin_actions() {
            registry.register(action);
        }
        registry
    }

    /// Empty registry, useful for tests that need full control over
    /// dispatch.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn register(&mut self, action: Arc<dyn Action>) {
        self.actions.insert(action.name().to_string(), action);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Action>> {
        self.actions.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.actions.contains_key(name)
    }

    /// Registered names, sorted for stable listings.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.actions.keys().cloned().collect();
        names.sort();
        names
    }

    /// `(name, description)` pairs for `robogo list`, sorted by name.
    pub fn descriptions(&self) -> Vec<(String, String)> {
        let mut entries: Vec<(String, String)> = self
            .actions
            .values()
            .map(|a| (a.name().to_string(), a.description().to_string()))
            .collect();
        entries.sort();
        entries
    }

    /// Names starting with `prefix`, sorted, for shell completion.
    pub fn completions(&self, prefix: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .actions
            .keys()
            .filter(|name| name.starts_with(prefix))
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

fn builtin_actions() -> Vec<Arc<dyn Action>> {
    vec![
        Arc::new(AssertAction),
        Arc::new(Base64Action),
        Arc::new(HttpAction),
        Arc::new(HttpBatchAction),
        Arc::new(JqAction),
        Arc::new(LogAction),
        Arc::new(SleepAction),
        Arc::new(TemplateAction),
        Arc::new(VariableAction),
    ]
}
