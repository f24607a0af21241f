//! `jq` — navigate structured data.
//!
//! Variable substitution deliberately knows nothing about paths or
//! expressions; this action is where structured values are taken apart.
//! The supported query subset: identity (`.`), field access (`.a.b`),
//! indexing (`.items[0]`, negative from the end), and the trailing
//! functions `| length` and `| keys`. Missing paths yield null.

use super::traits::{Action, ActionContext, ActionResult, ensure_args_resolved};
use crate::value::Value;
use async_trait::async_trait;
use std::collections::BTreeMap;

pub struct JqAction;

#[derive(Debug, PartialEq)]
enum Segment {
    Field(String),
    Index(i64),
}

#[derive(Debug, PartialEq)]
enum Tail {
    None,
    Length,
    Keys,
}

fn parse_query(query: &str) -> Result<(Vec<Segment>, Tail), String> {
    let mut parts = query.split('|').map(str::trim);
    let path = parts.next().unwrap_or("");
    let tail = match parts.next() {
        None => Tail::None,
        Some("length") => Tail::Length,
        Some("keys") => Tail::Keys,
        Some(other) => return Err(format!("unsupported function: {other}")),
    };
    if parts.next().is_some() {
        return Err("at most one pipe is supported".to_string());
    }

    if path == "." || path.is_empty() {
        return Ok((Vec::new(), tail));
    }
    let path = path.strip_prefix('.').unwrap_or(path);

    let mut segments = Vec::new();
    for raw in path.split('.') {
        if raw.is_empty() {
            return Err(format!("empty path segment in '{query}'"));
        }
        let mut rest = raw;
        // Field part before any bracket.
        if let Some(bracket) = rest.find('[') {
            let field = &rest[..bracket];
            if !field.is_empty() {
                segments.push(Segment::Field(field.to_string()));
            }
            rest = &rest[bracket..];
            while let Some(stripped) = rest.strip_prefix('[') {
                let Some(end) = stripped.find(']') else {
                    return Err(format!("unclosed index in '{raw}'"));
                };
                let index: i64 = stripped[..end]
                    .trim()
                    .parse()
                    .map_err(|_| format!("bad index in '{raw}'"))?;
                segments.push(Segment::Index(index));
                rest = &stripped[end + 1..];
            }
            if !rest.is_empty() {
                return Err(format!("trailing garbage in '{raw}'"));
            }
        } else {
            segments.push(Segment::Field(rest.to_string()));
        }
    }
    Ok((segments, tail))
}

fn walk(input: &Value, segments: &[Segment]) -> Value {
    let mut current = input.clone();
    for segment in segments {
        current = match (&current, segment) {
            (Value::Object(map), Segment::Field(name)) => {
                map.get(name).cloned().unwrap_or(Value::Null)
            }
            (Value::Array(items), Segment::Index(index)) => {
                let len = items.len() as i64;
                let actual = if *index < 0 { len + index } else { *index };
                if actual >= 0 && actual < len {
                    items[actual as usize].clone()
                } else {
                    Value::Null
                }
            }
            _ => Value::Null,
        };
    }
    current
}

fn apply_tail(value: Value, tail: &Tail) -> Value {
    match tail {
        Tail::None => value,
        Tail::Length => match &value {
            Value::Array(items) => Value::Int(items.len() as i64),
            Value::Object(map) => Value::Int(map.len() as i64),
            Value::String(s) => Value::Int(s.chars().count() as i64),
            Value::Null => Value::Int(0),
            _ => Value::Int(1),
        },
        Tail::Keys => match &value {
            Value::Object(map) => {
                Value::Array(map.keys().map(|k| Value::String(k.clone())).collect())
            }
            _ => Value::Null,
        },
    }
}

#[async_trait]
impl Action for JqAction {
    fn name(&self) -> &'static str {
        "jq"
    }

    fn description(&self) -> &'static str {
        "Query structured data: .field paths, [index], | length, | keys"
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

        let Some(input) = args.first() else {
            return ActionResult::missing_arg(self.name(), "input value");
        };
        let Some(query) = args.get(1).and_then(Value::as_str) else {
            return ActionResult::missing_arg(self.name(), "query string");
        };

        // A string input that parses as JSON is queried as structured data.
        let input = match input {
            Value::String(s) => serde_json::from_str::<serde_json::Value>(s)
                .map(|json| Value::from_json(&json))
                .unwrap_or_else(|_| input.clone()),
            other => other.clone(),
        };

        match parse_query(query) {
            Ok((segments, tail)) => {
                let result = apply_tail(walk(&input, &segments), &tail);
                let output = format!("{query} -> {}", result.render());
                ActionResult::pass(result, output)
            }
            Err(reason) => ActionResult::invalid_arg(self.name(), reason),
        }
    }
}
