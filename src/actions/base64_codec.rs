//! `base64` — encode to and decode from base64.
//!
//! Decoding returns a string when the bytes are valid UTF-8 and an opaque
//! binary buffer otherwise.

use super::traits::{Action, ActionContext, ActionResult, codes, ensure_args_resolved};
use crate::model::ErrorCategory;
use crate::value::Value;
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use std::collections::BTreeMap;

pub struct Base64Action;

#[async_trait]
impl Action for Base64Action {
    fn name(&self) -> &'static str {
        "base64"
    }

    fn description(&self) -> &'static str {
        "Encode or decode base64: args are (encode|decode, input)"
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

        let Some(mode) = args.first().and_then(Value::as_str) else {
            return ActionResult::missing_arg(self.name(), "mode (encode or decode)");
        };
        let Some(input) = args.get(1) else {
            return ActionResult::missing_arg(self.name(), "input");
        };

        match mode {
            "encode" => {
                let encoded = match input {
                    Value::Bytes(bytes) => BASE64.encode(bytes),
                    other => BASE64.encode(other.render()),
                };
                ActionResult::pass(Value::String(encoded.clone()), encoded)
            }
            "decode" => {
                let raw = input.render();
                match BASE64.decode(raw.trim()) {
                    Ok(bytes) => match String::from_utf8(bytes) {
                        Ok(text) => ActionResult::pass(Value::String(text.clone()), text),
                        Err(not_utf8) => {
                            let bytes = not_utf8.into_bytes();
                            let output = format!("{} bytes of binary data", bytes.len());
                            ActionResult::pass(Value::Bytes(bytes), output)
                        }
                    },
                    Err(err) => ActionResult::error(
                        ErrorCategory::Validation,
                        codes::DECODE_FAILED,
                        format!("invalid base64: {err}"),
                    ),
                }
            }
            other => ActionResult::invalid_arg(
                self.name(),
                format!("unknown mode '{other}' (encode, decode)"),
            ),
        }
    }
}
