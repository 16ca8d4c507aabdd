//! The block handler trait.

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use weft_workflow::Block;

use crate::error::HandlerError;
use crate::provider::StreamingExecution;
use crate::scope::HandlerScope;

/// What a handler hands back to the engine.
#[derive(Debug)]
pub enum HandlerOutput {
    /// A plain JSON output, folded into block state.
    Value(Value),
    /// A streaming envelope. The engine records the envelope's `execution`
    /// value as the block's output and propagates the stream untouched.
    Stream(StreamingExecution),
}

impl HandlerOutput {
    /// The JSON value downstream blocks will see.
    #[must_use]
    pub fn execution_value(&self) -> &Value {
        match self {
            Self::Value(v) => v,
            Self::Stream(s) => &s.execution,
        }
    }
}

impl From<Value> for HandlerOutput {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

/// One handler per block kind.
///
/// Handlers are stateless with respect to the run: all run state arrives
/// through `resolved` (the inputs after reference substitution) and `scope`
/// (a read-only snapshot). They must not retain the scope past the call, and
/// they must honor `cancel` at their suspension points.
#[async_trait]
pub trait BlockHandler: Send + Sync + 'static {
    /// Whether this handler executes `block`.
    fn can_handle(&self, block: &Block) -> bool;

    /// Execute the block.
    async fn execute(
        &self,
        block: &Block,
        resolved: Value,
        scope: &HandlerScope,
        cancel: CancellationToken,
    ) -> Result<HandlerOutput, HandlerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handler_output_value_accessor() {
        let out = HandlerOutput::from(serde_json::json!({"a": 1}));
        assert_eq!(out.execution_value(), &serde_json::json!({"a": 1}));
    }
}
