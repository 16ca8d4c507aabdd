//! The starter handler.

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use weft_workflow::{Block, BlockKind};

use crate::error::HandlerError;
use crate::handler::{BlockHandler, HandlerOutput};
use crate::scope::HandlerScope;

/// Seeds the run: the starter's output is the initial envelope — a webhook
/// payload, manual input, or scheduled trigger data. The engine passes the
/// envelope in as the resolved inputs.
#[derive(Debug, Default, Clone, Copy)]
pub struct StarterHandler;

#[async_trait]
impl BlockHandler for StarterHandler {
    fn can_handle(&self, block: &Block) -> bool {
        block.kind == BlockKind::Starter
    }

    async fn execute(
        &self,
        _block: &Block,
        resolved: Value,
        _scope: &HandlerScope,
        _cancel: CancellationToken,
    ) -> Result<HandlerOutput, HandlerError> {
        Ok(resolved.into())
    }
}
