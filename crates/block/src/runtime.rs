//! The user-code runtime seam.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use weft_expression::{ReferenceSource, evaluate};

use crate::error::HandlerError;

/// Executes a function block's code body.
///
/// Sandboxed language runtimes are external collaborators; the engine only
/// needs something that turns `(code, inputs)` into a value. References in
/// the code are already substituted by the time a runtime sees it.
#[async_trait]
pub trait CodeRuntime: Send + Sync + 'static {
    /// Run `code` against the resolved inputs.
    async fn run(
        &self,
        code: &str,
        inputs: &Value,
        cancel: CancellationToken,
    ) -> Result<Value, HandlerError>;
}

/// The built-in runtime: evaluates the code body as a single expression.
///
/// Accepts an optional leading `return` and trailing `;`. JSON literals pass
/// through typed; anything else goes through the condition expression
/// grammar with the resolved inputs exposed as bare identifiers.
#[derive(Debug, Default, Clone, Copy)]
pub struct TemplateRuntime;

struct InputLocals<'a> {
    inputs: &'a Value,
}

impl ReferenceSource for InputLocals<'_> {
    fn iteration_var(&self, _name: &str) -> Option<Value> {
        None
    }

    fn block_output(&self, _name_or_id: &str) -> Option<Value> {
        None
    }

    fn env_var(&self, _name: &str) -> Option<String> {
        None
    }

    fn local_var(&self, name: &str) -> Option<Value> {
        self.inputs.get(name).cloned()
    }
}

#[async_trait]
impl CodeRuntime for TemplateRuntime {
    async fn run(
        &self,
        code: &str,
        inputs: &Value,
        _cancel: CancellationToken,
    ) -> Result<Value, HandlerError> {
        let body = code
            .trim()
            .strip_prefix("return")
            .map_or_else(|| code.trim(), str::trim)
            .trim_end_matches(';')
            .trim();

        if body.is_empty() {
            return Ok(Value::Null);
        }

        // JSON literals (objects, arrays, quoted strings, numbers) pass
        // through typed.
        if let Ok(value) = serde_json::from_str::<Value>(body) {
            return Ok(value);
        }

        let locals = InputLocals { inputs };
        evaluate(body, &locals).map_err(HandlerError::from)
    }
}

/// Wrap a runtime call in the block's time budget.
pub async fn run_with_timeout(
    runtime: &dyn CodeRuntime,
    code: &str,
    inputs: &Value,
    timeout: Duration,
    cancel: CancellationToken,
) -> Result<Value, HandlerError> {
    tokio::select! {
        () = cancel.cancelled() => Err(HandlerError::Cancelled),
        result = tokio::time::timeout(timeout, runtime.run(code, inputs, cancel.clone())) => {
            result.map_err(|_| HandlerError::Timeout(timeout))?
        }
    }
}
