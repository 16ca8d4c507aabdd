//! The function handler.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use weft_expression::Resolver;
use weft_workflow::{Block, BlockKind};

use crate::error::HandlerError;
use crate::handler::{BlockHandler, HandlerOutput};
use crate::runtime::{CodeRuntime, run_with_timeout};
use crate::scope::HandlerScope;

const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Runs user code through the [`CodeRuntime`] seam.
///
/// `<block.path>` references in the code body are substituted against the
/// scope before the runtime sees it; the runtime gets plain code plus the
/// resolved inputs.
pub struct FunctionHandler {
    runtime: Arc<dyn CodeRuntime>,
}

impl FunctionHandler {
    /// Create a handler over the given runtime.
    pub fn new(runtime: Arc<dyn CodeRuntime>) -> Self {
        Self { runtime }
    }
}

impl std::fmt::Debug for FunctionHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionHandler").finish_non_exhaustive()
    }
}

#[async_trait]
impl BlockHandler for FunctionHandler {
    fn can_handle(&self, block: &Block) -> bool {
        block.kind == BlockKind::Function
    }

    async fn execute(
        &self,
        _block: &Block,
        resolved: Value,
        scope: &HandlerScope,
        cancel: CancellationToken,
    ) -> Result<HandlerOutput, HandlerError> {
        let code = resolved
            .get("code")
            .and_then(Value::as_str)
            .ok_or_else(|| HandlerError::fatal("function block has no `code` param"))?;

        let timeout = resolved
            .get("timeoutMs")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_TIMEOUT_MS);

        let code = Resolver::new(scope).resolve_angle_refs(code)?;
        let result = run_with_timeout(
            self.runtime.as_ref(),
            &code,
            &resolved,
            Duration::from_millis(timeout),
            cancel,
        )
        .await?;

        Ok(serde_json::json!({"result": result, "stdout": ""}).into())
    }
}
