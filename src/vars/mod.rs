//! Case-scoped variable store.
//!
//! One store per case, created from the case's `variables` block and
//! discarded at case end. The case runner is the only writer; the lock
//! exists so the store can be handed to actions and debug introspection
//! by shared reference without aliasing hazards.

pub mod subst;

use crate::value::Value;
use anyhow::{Context, Result};
use parking_lot::RwLock;
use std::collections::BTreeMap;

#[derive(Debug, Default)]
pub struct VariableStore {
    inner: RwLock<BTreeMap<String, Value>>,
}

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(initial: BTreeMap<String, Value>) -> Self {
        Self {
            inner: RwLock::new(initial),
        }
    }

    /// Store a value as-is. No re-parsing happens here; use
    /// [`VariableStore::set_from_json`] to parse raw JSON text.
    pub fn set(&self, name: impl Into<String>, value: Value) {
        self.inner.write().insert(name.into(), value);
    }

    /// Parse `raw` as JSON and bind the result. Invalid JSON is an error
    /// the caller surfaces as `variable/PARSE_FAILED`.
    pub fn set_from_json(&self, name: impl Into<String>, raw: &str) -> Result<()> {
        let name = name.into();
        let parsed: serde_json::Value = serde_json::from_str(raw)
            .with_context(|| format!("variable '{name}' is not valid JSON"))?;
        self.inner.write().insert(name, Value::from_json(&parsed));
        Ok(())
    }

    /// Remove a binding. Removing an absent name is not an error.
    pub fn unset(&self, name: &str) {
        self.inner.write().remove(name);
    }

    /// The underlying value, not its stringification; structured values
    /// flow through unchanged when a whole placeholder matches.
    pub fn get(&self, name: &str) -> Option<Value> {
        self.inner.read().get(name).cloned()
    }

    pub fn has(&self, name: &str) -> bool {
        self.inner.read().contains_key(name)
    }

    /// Immutable copy of the current bindings.
    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        self.inner.read().clone()
    }

    /// Independent store with the same bindings.
    pub fn deep_clone(&self) -> VariableStore {
        VariableStore::from_map(self.snapshot())
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}
