//! `${name}` / `${ENV:NAME}` substitution over strings and nested values.
//!
//! A single pass resolves every placeholder; the output never re-enters
//! substitution. Input values are never mutated — resolution builds a new
//! tree, so a failed lookup can never leave a structure half-substituted.

use crate::value::Value;
use crate::vars::VariableStore;
use regex::Regex;
use std::sync::LazyLock;

/// Sentinel replacing placeholders that cannot be resolved. Its presence in
/// a resolved argument blocks action dispatch.
pub const UNRESOLVED: &str = "__UNRESOLVED__";

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{(ENV:)?([A-Za-z0-9_]+)\}").unwrap());

fn lookup(store: &VariableStore, env_prefix: bool, name: &str) -> Option<Value> {
    if env_prefix {
        // Empty environment values count as unresolved.
        std::env::var(name)
            .ok()
            .filter(|v| !v.is_empty())
            .map(Value::String)
    } else {
        store.get(name)
    }
}

/// Expand every placeholder in `template`, rendering substituted values to
/// their string form. Total: always returns a string, with misses replaced
/// by [`UNRESOLVED`].
pub fn substitute_str(template: &str, store: &VariableStore) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &regex::Captures| {
            let env_prefix = caps.get(1).is_some();
            let name = &caps[2];
            match lookup(store, env_prefix, name) {
                Some(value) => value.render(),
                None => UNRESOLVED.to_string(),
            }
        })
        .into_owned()
}

/// True when `s` is exactly one placeholder and nothing else.
fn whole_placeholder(s: &str) -> Option<(bool, &str)> {
    let caps = PLACEHOLDER.captures(s)?;
    let m = caps.get(0).unwrap();
    if m.start() == 0 && m.end() == s.len() {
        let name = caps.get(2).unwrap().as_str();
        Some((caps.get(1).is_some(), name))
    } else {
        None
    }
}

/// Resolve a value tree. A string that is exactly `${name}` becomes the raw
/// stored value, preserving its type; any other string is expanded
/// piecewise. Mapping keys are substituted as strings. Non-string scalars
/// pass through unchanged.
pub fn substitute_value(value: &Value, store: &VariableStore) -> Value {
    match value {
        Value::String(s) => {
            if let Some((env_prefix, name)) = whole_placeholder(s) {
                match lookup(store, env_prefix, name) {
                    Some(resolved) => resolved,
                    None => Value::String(UNRESOLVED.to_string()),
                }
            } else {
                Value::String(substitute_str(s, store))
            }
        }
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| substitute_value(item, store))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (substitute_str(k, store), substitute_value(v, store)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Expand only `${ENV:NAME}` placeholders, leaving `${name}` store
/// references intact. Used when a case's `variables` block is loaded:
/// environment values are fixed eagerly, store references resolve at step
/// time.
pub fn expand_env(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(
            PLACEHOLDER
                .replace_all(s, |caps: &regex::Captures| {
                    if caps.get(1).is_none() {
                        return caps[0].to_string();
                    }
                    match lookup(&VariableStore::new(), true, &caps[2]) {
                        Some(resolved) => resolved.render(),
                        None => UNRESOLVED.to_string(),
                    }
                })
                .into_owned(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(expand_env).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), expand_env(v)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Walk a resolved value and report whether any string still carries the
/// unresolved sentinel (keys included).
pub fn contains_unresolved(value: &Value) -> bool {
    match value {
        Value::String(s) => s.contains(UNRESOLVED),
        Value::Array(items) => items.iter().any(contains_unresolved),
        Value::Object(map) => map
            .iter()
            .any(|(k, v)| k.contains(UNRESOLVED) || contains_unresolved(v)),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn store() -> VariableStore {
        let vars = VariableStore::new();
        vars.set("name", Value::String("world".into()));
        vars.set("n", Value::Int(7));
        vars.set(
            "list",
            Value::Array(vec![Value::Int(1), Value::Int(2), Value::Int(3)]),
        );
        vars
    }

    #[test]
    fn expands_embedded_placeholder() {
        assert_eq!(substitute_str("hello ${name}!", &store()), "hello world!");
    }

    #[test]
    fn expands_numbers_to_string_form() {
        assert_eq!(substitute_str("n=${n}", &store()), "n=7");
    }

    #[test]
    fn miss_becomes_sentinel() {
        assert_eq!(
            substitute_str("hello ${missing}", &store()),
            format!("hello {UNRESOLVED}")
        );
    }

    #[test]
    fn whole_placeholder_preserves_type() {
        let resolved = substitute_value(&Value::String("${list}".into()), &store());
        assert_eq!(
            resolved,
            Value::Array(vec![Value::Int(1), Value::Int(2), Value::Int(3)])
        );
    }

    #[test]
    fn partial_placeholder_renders_to_string() {
        let resolved = substitute_value(&Value::String("items: ${list}".into()), &store());
        assert_eq!(resolved, Value::String("items: [1,2,3]".into()));
    }

    #[test]
    fn env_placeholder_resolves() {
        unsafe { std::env::set_var("ROBOGO_SUBST_TEST", "abc") };
        assert_eq!(
            substitute_str("v=${ENV:ROBOGO_SUBST_TEST}", &store()),
            "v=abc"
        );
        unsafe { std::env::remove_var("ROBOGO_SUBST_TEST") };
    }

    #[test]
    fn empty_env_is_unresolved() {
        unsafe { std::env::set_var("ROBOGO_SUBST_EMPTY", "") };
        assert_eq!(
            substitute_str("${ENV:ROBOGO_SUBST_EMPTY}", &store()),
            UNRESOLVED
        );
        unsafe { std::env::remove_var("ROBOGO_SUBST_EMPTY") };
    }

    #[test]
    fn recursion_covers_keys_and_values() {
        let mut map = BTreeMap::new();
        map.insert(
            "key_${name}".to_string(),
            Value::String("${n}".to_string()),
        );
        let resolved = substitute_value(&Value::Object(map), &store());
        let obj = resolved.as_object().unwrap();
        assert_eq!(obj["key_world"], Value::Int(7));
    }

    #[test]
    fn non_string_scalars_unchanged() {
        assert_eq!(
            substitute_value(&Value::Bool(true), &store()),
            Value::Bool(true)
        );
        assert_eq!(substitute_value(&Value::Int(5), &store()), Value::Int(5));
    }

    #[test]
    fn substitution_is_idempotent_on_resolved_strings() {
        let once = substitute_str("hello ${name}", &store());
        let twice = substitute_str(&once, &store());
        assert_eq!(once, twice);
    }

    #[test]
    fn dotted_names_are_not_substitution_syntax() {
        assert_eq!(
            substitute_str("${a.b}", &store()),
            "${a.b}",
            "dots are the jq action's job"
        );
    }

    #[test]
    fn expand_env_leaves_store_refs_alone() {
        unsafe { std::env::set_var("ROBOGO_SUBST_EAGER", "from-env") };
        let value = Value::String("${ENV:ROBOGO_SUBST_EAGER} and ${later}".into());
        assert_eq!(
            expand_env(&value),
            Value::String("from-env and ${later}".into())
        );
        unsafe { std::env::remove_var("ROBOGO_SUBST_EAGER") };
    }

    #[test]
    fn detects_unresolved_nested() {
        let mut map = BTreeMap::new();
        map.insert("k".to_string(), Value::String(UNRESOLVED.into()));
        assert!(contains_unresolved(&Value::Object(map)));
        assert!(!contains_unresolved(&Value::Int(1)));
    }
}
