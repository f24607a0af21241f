//! Execution engine: step executor, control flow, case and suite runners.
//!
//! There is no process-wide mutable state. Everything a step needs —
//! registry, variables, templates, cancellation — travels in a
//! [`CaseContext`] handed down explicitly.

pub mod case;
pub mod condition;
pub mod control;
pub mod shutdown;
pub mod step;
pub mod suite;

use crate::actions::ActionRegistry;
use crate::vars::VariableStore;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Fallback per-step timeout when a step does not carry its own.
pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(30);

/// Everything the step executor needs to run the steps of one case.
pub struct CaseContext {
    pub registry: Arc<ActionRegistry>,
    /// Case-scoped store; the case runner is the single writer.
    pub vars: VariableStore,
    /// Case-level text templates, keyed by name.
    pub templates: BTreeMap<String, String>,
    /// Case-level token, derived from the suite token.
    pub cancel: CancellationToken,
    pub default_timeout: Duration,
    /// Cap for batch actions fanning out internally.
    pub batch_concurrency: usize,
}

impl CaseContext {
    pub fn new(registry: Arc<ActionRegistry>, cancel: CancellationToken) -> Self {
        Self {
            registry,
            vars: VariableStore::new(),
            templates: BTreeMap::new(),
            cancel,
            default_timeout: DEFAULT_STEP_TIMEOUT,
            batch_concurrency: 1,
        }
    }

    pub fn with_vars(mut self, vars: VariableStore) -> Self {
        self.vars = vars;
        self
    }

    pub fn with_templates(mut self, templates: BTreeMap<String, String>) -> Self {
        self.templates = templates;
        self
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn with_batch_concurrency(mut self, limit: usize) -> Self {
        self.batch_concurrency = limit.max(1);
        self
    }
}
