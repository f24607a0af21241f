//! Masking of sensitive values in step data and rendered output.
//!
//! Two triggers: the step's `sensitive_fields` list, and a built-in
//! pattern set for key names that habitually hold credentials. Masked
//! values are replaced by exactly `****`; structured data keeps its keys.

use crate::value::Value;
use regex::RegexSet;
use std::sync::LazyLock;

/// Wire format for masked values.
pub const MASK: &str = "****";

/// Replacement for a whole output suppressed by `no_log`.
pub const REDACTED_OUTPUT: &str = "<redacted>";

static SENSITIVE_KEY_PATTERNS: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"(?i)password",
        r"(?i)token",
        r"(?i)secret",
        r"(?i)api[_-]?key",
        r"(?i)authorization",
    ])
    .unwrap()
});

/// Whether `key` must be masked: listed explicitly, or matching the
/// built-in credential patterns.
pub fn is_sensitive_key(key: &str, extra_fields: &[String]) -> bool {
    extra_fields.iter().any(|field| field == key) || SENSITIVE_KEY_PATTERNS.is_match(key)
}

/// Walk a value tree and replace every value under a sensitive key with
/// [`MASK`]. Returns the original string renderings so the caller can
/// scrub them out of already-rendered output.
pub fn mask_value(value: &mut Value, extra_fields: &[String]) -> Vec<String> {
    let mut leaked = Vec::new();
    mask_value_inner(value, extra_fields, &mut leaked);
    leaked
}

fn mask_value_inner(value: &mut Value, extra_fields: &[String], leaked: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            for (key, entry) in map.iter_mut() {
                if is_sensitive_key(key, extra_fields) {
                    match entry {
                        Value::Object(_) | Value::Array(_) => {
                            mask_value_inner(entry, extra_fields, leaked);
                        }
                        Value::Null => {}
                        scalar => {
                            let rendered = scalar.render();
                            if !rendered.is_empty() {
                                leaked.push(rendered);
                            }
                            *scalar = Value::String(MASK.to_string());
                        }
                    }
                } else {
                    mask_value_inner(entry, extra_fields, leaked);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                mask_value_inner(item, extra_fields, leaked);
            }
        }
        _ => {}
    }
}

/// Replace every occurrence of the given secrets in `output` with
/// [`MASK`]. Longer secrets first, so substrings of other secrets cannot
/// resurface partial values.
pub fn scrub_output(output: &str, secrets: &[String]) -> String {
    let mut ordered: Vec<&String> = secrets.iter().filter(|s| !s.is_empty()).collect();
    ordered.sort_by_key(|s| std::cmp::Reverse(s.len()));
    let mut scrubbed = output.to_string();
    for secret in ordered {
        scrubbed = scrubbed.replace(secret.as_str(), MASK);
    }
    scrubbed
}
