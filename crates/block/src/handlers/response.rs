//! The response handler.

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use weft_workflow::{Block, BlockKind};

use crate::error::HandlerError;
use crate::handler::{BlockHandler, HandlerOutput};
use crate::scope::HandlerScope;

/// Produces the run's explicit output. The engine treats a completed
/// response block as the terminal signal once its layer finishes.
#[derive(Debug, Default, Clone, Copy)]
pub struct ResponseHandler;

#[async_trait]
impl BlockHandler for ResponseHandler {
    fn can_handle(&self, block: &Block) -> bool {
        block.kind == BlockKind::Response
    }

    async fn execute(
        &self,
        _block: &Block,
        resolved: Value,
        _scope: &HandlerScope,
        _cancel: CancellationToken,
    ) -> Result<HandlerOutput, HandlerError> {
        let data = resolved.get("data").cloned().unwrap_or(Value::Null);
        let status = resolved
            .get("status")
            .and_then(Value::as_u64)
            .unwrap_or(200);
        let headers = resolved
            .get("headers")
            .cloned()
            .unwrap_or_else(|| Value::Object(serde_json::Map::new()));

        Ok(serde_json::json!({
            "data": data,
            "status": status,
            "headers": headers,
        })
        .into())
    }
}
