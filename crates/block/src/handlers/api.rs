//! The api handler.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use weft_workflow::{Block, BlockKind};

use crate::error::HandlerError;
use crate::handler::{BlockHandler, HandlerOutput};
use crate::scope::HandlerScope;

const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Performs the HTTP request an api block describes.
///
/// Network errors are retryable; 5xx responses are retryable; 4xx responses
/// are not. The handler re-attempts retryable failures up to the block's
/// `retries` param (default 0) before surfacing the error.
#[derive(Debug, Clone)]
pub struct ApiHandler {
    client: reqwest::Client,
}

impl ApiHandler {
    /// Create a handler over a shared HTTP client.
    #[must_use]
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn attempt(
        &self,
        method: &reqwest::Method,
        url: &str,
        headers: &[(String, String)],
        body: Option<&Value>,
        timeout: Duration,
    ) -> Result<Value, HandlerError> {
        let mut request = self
            .client
            .request(method.clone(), url)
            .timeout(timeout);
        for (key, value) in headers {
            request = request.header(key, value);
        }
        if let Some(body) = body {
            request = match body {
                Value::String(raw) => request.body(raw.clone()),
                other => request.json(other),
            };
        }

        let response = request
            .send()
            .await
            .map_err(|e| HandlerError::retryable(format!("request to {url} failed: {e}")))?;

        let status = response.status();
        let mut header_map = serde_json::Map::new();
        for (name, value) in response.headers() {
            header_map.insert(
                name.as_str().to_owned(),
                Value::String(String::from_utf8_lossy(value.as_bytes()).into_owned()),
            );
        }

        let text = response
            .text()
            .await
            .map_err(|e| HandlerError::retryable(format!("reading response body failed: {e}")))?;
        let data = serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));

        if status.is_server_error() {
            return Err(HandlerError::retryable(format!(
                "{url} answered {status}"
            )));
        }
        if status.is_client_error() {
            return Err(HandlerError::fatal(format!("{url} answered {status}")));
        }

        Ok(serde_json::json!({
            "data": data,
            "status": status.as_u16(),
            "headers": Value::Object(header_map),
        }))
    }
}

#[async_trait]
impl BlockHandler for ApiHandler {
    fn can_handle(&self, block: &Block) -> bool {
        block.kind == BlockKind::Api
    }

    async fn execute(
        &self,
        block: &Block,
        resolved: Value,
        _scope: &HandlerScope,
        cancel: CancellationToken,
    ) -> Result<HandlerOutput, HandlerError> {
        let url = resolved
            .get("url")
            .and_then(Value::as_str)
            .ok_or_else(|| HandlerError::fatal("api block has no `url` param"))?;

        let method_str = resolved
            .get("method")
            .and_then(Value::as_str)
            .unwrap_or("GET");
        let method = reqwest::Method::from_bytes(method_str.to_uppercase().as_bytes())
            .map_err(|_| HandlerError::fatal(format!("invalid http method: {method_str}")))?;

        let headers = parse_headers(resolved.get("headers"))?;
        let body = resolved.get("body").filter(|v| !v.is_null());
        let retries = resolved
            .get("retries")
            .and_then(Value::as_u64)
            .unwrap_or(0);
        let timeout = Duration::from_millis(
            resolved
                .get("timeoutMs")
                .and_then(Value::as_u64)
                .unwrap_or(DEFAULT_TIMEOUT_MS),
        );

        let mut attempt = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(HandlerError::Cancelled);
            }

            match self.attempt(&method, url, &headers, body, timeout).await {
                Ok(output) => return Ok(output.into()),
                Err(err) if err.is_retryable() && attempt < retries => {
                    attempt += 1;
                    debug!(block = %block.id, attempt, "retrying api request: {err}");
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// Headers arrive either as an object or as a `[{key, value}]` sequence.
fn parse_headers(value: Option<&Value>) -> Result<Vec<(String, String)>, HandlerError> {
    let Some(value) = value else {
        return Ok(Vec::new());
    };
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Object(map) => Ok(map
            .iter()
            .map(|(k, v)| (k.clone(), stringify(v)))
            .collect()),
        Value::Array(items) => {
            let mut headers = Vec::with_capacity(items.len());
            for item in items {
                let (Some(key), Some(val)) = (item.get("key"), item.get("value")) else {
                    return Err(HandlerError::fatal(
                        "api header entries need `key` and `value` fields",
                    ));
                };
                headers.push((stringify(key), stringify(val)));
            }
            Ok(headers)
        }
        _ => Err(HandlerError::fatal(
            "api `headers` must be an object or an array of {key, value}",
        )),
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
