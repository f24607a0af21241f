//! `http` and `http_batch` — HTTP calls against remote endpoints.
//!
//! The client lives for exactly one invocation; nothing is pooled across
//! steps or cases. `http_batch` fans sub-requests out up to the suite's
//! batch concurrency and reassembles responses in submission order.

use super::traits::{Action, ActionContext, ActionResult, codes, ensure_args_resolved};
use crate::model::{ErrorCategory, FailureInfo};
use crate::value::Value;
use async_trait::async_trait;
use futures_util::future::join_all;
use reqwest::Client;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

/// Connect timeout for a single request; overall time is bounded by the
/// step timeout in the executor.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Responses larger than this are truncated in the rendered output.
const MAX_OUTPUT_BYTES: usize = 64 * 1024;

const METHODS: &[&str] = &["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD"];

pub struct HttpAction;

/// One parsed request, shared by the single and the batch action.
struct RequestSpec {
    method: String,
    url: String,
    body: Option<Value>,
    headers: BTreeMap<String, String>,
    expect_status: Option<u16>,
}

impl RequestSpec {
    fn from_args(
        action: &str,
        args: &[Value],
        options: &BTreeMap<String, Value>,
    ) -> Result<Self, Box<ActionResult>> {
        let Some(method) = args.first().and_then(Value::as_str) else {
            return Err(Box::new(ActionResult::missing_arg(
                action,
                "HTTP method (GET, POST, ...)",
            )));
        };
        let method = method.to_uppercase();
        if !METHODS.contains(&method.as_str()) {
            return Err(Box::new(ActionResult::invalid_arg(
                action,
                format!("unsupported HTTP method: {method}"),
            )));
        }
        let Some(url) = args.get(1).and_then(Value::as_str) else {
            return Err(Box::new(ActionResult::missing_arg(action, "URL")));
        };
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(Box::new(ActionResult::invalid_arg(
                action,
                format!("URL must be http:// or https://, got '{url}'"),
            )));
        }

        let mut headers = BTreeMap::new();
        if let Some(Value::Object(map)) = options.get("headers") {
            for (key, value) in map {
                headers.insert(key.clone(), value.render());
            }
        }
        let expect_status = options
            .get("expect_status")
            .and_then(Value::as_i64)
            .and_then(|code| u16::try_from(code).ok());

        Ok(Self {
            method,
            url: url.to_string(),
            body: args.get(2).cloned(),
            headers,
            expect_status,
        })
    }

    fn from_value(action: &str, value: &Value) -> Result<Self, Box<ActionResult>> {
        let Some(map) = value.as_object() else {
            return Err(Box::new(ActionResult::invalid_arg(
                action,
                "each batch entry must be a mapping with method and url",
            )));
        };
        let mut args = vec![
            map.get("method").cloned().unwrap_or(Value::String("GET".into())),
            map.get("url").cloned().unwrap_or(Value::Null),
        ];
        if let Some(body) = map.get("body") {
            args.push(body.clone());
        }
        let mut options = BTreeMap::new();
        if let Some(headers) = map.get("headers") {
            options.insert("headers".to_string(), headers.clone());
        }
        if let Some(expect) = map.get("expect_status") {
            options.insert("expect_status".to_string(), expect.clone());
        }
        Self::from_args(action, &args, &options)
    }
}

async fn perform(client: &Client, spec: &RequestSpec, ctx: &ActionContext<'_>) -> ActionResult {
    let started = Instant::now();
    let method = reqwest::Method::from_bytes(spec.method.as_bytes())
        .unwrap_or(reqwest::Method::GET);

    let mut request = client.request(method, &spec.url);
    for (key, value) in &spec.headers {
        request = request.header(key, value);
    }
    match &spec.body {
        Some(Value::String(body)) => request = request.body(body.clone()),
        Some(structured @ (Value::Object(_) | Value::Array(_))) => {
            request = request.json(&structured.to_json());
        }
        Some(other) if !other.is_null() => request = request.body(other.render()),
        _ => {}
    }

    let response = tokio::select! {
        response = request.send() => response,
        () = ctx.cancel.cancelled() => {
            return ActionResult::error(
                ErrorCategory::Execution,
                codes::CANCELLED,
                format!("{} {} cancelled", spec.method, spec.url),
            );
        }
    };

    let response = match response {
        Ok(response) => response,
        Err(err) => {
            return ActionResult::error(
                ErrorCategory::Network,
                codes::REQUEST_FAILED,
                format!("{} {} failed: {err}", spec.method, spec.url),
            )
            .with_context("endpoint", Value::String(spec.url.clone()))
            .with_context(
                "elapsed_ms",
                Value::Int(started.elapsed().as_millis() as i64),
            )
            .with_suggestion("check that the endpoint is reachable");
        }
    };

    let status = response.status();
    let mut header_map = BTreeMap::new();
    for (key, value) in response.headers() {
        header_map.insert(
            key.as_str().to_string(),
            Value::String(value.to_str().unwrap_or("<binary>").to_string()),
        );
    }
    let body_text = response.text().await.unwrap_or_default();
    let body_value = serde_json::from_str::<serde_json::Value>(&body_text)
        .map(|json| Value::from_json(&json))
        .unwrap_or(Value::String(body_text.clone()));

    let mut data = BTreeMap::new();
    data.insert("status".to_string(), Value::Int(i64::from(status.as_u16())));
    data.insert("headers".to_string(), Value::Object(header_map));
    data.insert("body".to_string(), body_value);
    let data = Value::Object(data);

    if let Some(expected) = spec.expect_status {
        if status.as_u16() != expected {
            return ActionResult::fail(FailureInfo {
                expected: Value::Int(i64::from(expected)),
                actual: Value::Int(i64::from(status.as_u16())),
                operator: "==".to_string(),
                message: format!(
                    "{} {} returned {}, expected {expected}",
                    spec.method,
                    spec.url,
                    status.as_u16()
                ),
            });
        }
    }

    let mut output = format!("{} {} -> {}", spec.method, spec.url, status.as_u16());
    if !body_text.is_empty() {
        let shown = if body_text.len() > MAX_OUTPUT_BYTES {
            &body_text[..MAX_OUTPUT_BYTES]
        } else {
            &body_text
        };
        output.push_str(&format!(" ({} bytes): {shown}", body_text.len()));
    }

    ActionResult::pass(data, output)
}

fn scoped_client() -> Result<Client, ActionResult> {
    Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .redirect(reqwest::redirect::Policy::limited(5))
        .build()
        .map_err(|err| {
            ActionResult::error(
                ErrorCategory::System,
                codes::REQUEST_FAILED,
                format!("could not build HTTP client: {err}"),
            )
        })
}

#[async_trait]
impl Action for HttpAction {
    fn name(&self) -> &'static str {
        "http"
    }

    fn description(&self) -> &'static str {
        "Perform one HTTP request: method, url, optional body"
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
        let spec = match RequestSpec::from_args(self.name(), args, options) {
            Ok(spec) => spec,
            Err(invalid) => return *invalid,
        };
        let client = match scoped_client() {
            Ok(client) => client,
            Err(failed) => return failed,
        };
        perform(&client, &spec, ctx).await
    }
}

pub struct HttpBatchAction;

#[async_trait]
impl Action for HttpBatchAction {
    fn name(&self) -> &'static str {
        "http_batch"
    }

    fn description(&self) -> &'static str {
        "Perform a sequence of HTTP requests with bounded internal fan-out"
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
        let Some(entries) = args.first().and_then(Value::as_array) else {
            return ActionResult::missing_arg(self.name(), "sequence of request mappings");
        };

        let mut specs = Vec::with_capacity(entries.len());
        for entry in entries {
            match RequestSpec::from_value(self.name(), entry) {
                Ok(spec) => specs.push(spec),
                Err(invalid) => return *invalid,
            }
        }

        let client = match scoped_client() {
            Ok(client) => client,
            Err(failed) => return failed,
        };
        let limiter = Arc::new(Semaphore::new(ctx.batch_concurrency.max(1)));

        // join_all keeps submission order even though sub-operations
        // complete in any order.
        let results = join_all(specs.iter().map(|spec| {
            let limiter = Arc::clone(&limiter);
            let client = &client;
            async move {
                let Ok(_permit) = limiter.acquire().await else {
                    return ActionResult::error(
                        ErrorCategory::Execution,
                        codes::CANCELLED,
                        "batch limiter closed",
                    );
                };
                perform(client, spec, ctx).await
            }
        }))
        .await;

        let mut items = Vec::with_capacity(results.len());
        let mut passed = 0usize;
        for result in &results {
            if result.status == crate::model::Status::Pass {
                passed += 1;
            }
            items.push(result.data.clone().unwrap_or(Value::Null));
        }

        // First non-PASS sub-operation decides the batch outcome.
        if let Some(bad) = results
            .iter()
            .find(|result| result.status != crate::model::Status::Pass)
        {
            return bad.clone();
        }

        ActionResult::pass(
            Value::Array(items),
            format!("{passed}/{} requests succeeded", results.len()),
        )
    }
}
