//! The agent handler.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use weft_workflow::{Block, BlockKind};

use crate::error::HandlerError;
use crate::handler::{BlockHandler, HandlerOutput};
use crate::provider::{AgentProvider, AgentRequest};
use crate::scope::HandlerScope;

/// Calls the model provider for agent blocks.
///
/// With `stream: true` the provider's streaming envelope is handed to the
/// engine untouched; otherwise the completed response becomes the output.
pub struct AgentHandler {
    provider: Arc<dyn AgentProvider>,
}

impl AgentHandler {
    /// Create a handler over the given provider.
    pub fn new(provider: Arc<dyn AgentProvider>) -> Self {
        Self { provider }
    }
}

impl std::fmt::Debug for AgentHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentHandler").finish_non_exhaustive()
    }
}

/// Build a provider request from a block's resolved inputs.
pub(crate) fn request_from_inputs(resolved: &Value) -> AgentRequest {
    let get_str = |key: &str| {
        resolved
            .get(key)
            .and_then(Value::as_str)
            .map(str::to_owned)
    };
    AgentRequest {
        model: get_str("model"),
        system_prompt: get_str("systemPrompt"),
        prompt: get_str("prompt")
            .or_else(|| get_str("userPrompt"))
            .unwrap_or_default(),
        temperature: resolved.get("temperature").and_then(Value::as_f64),
        tools: resolved
            .get("tools")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default(),
    }
}

#[async_trait]
impl BlockHandler for AgentHandler {
    fn can_handle(&self, block: &Block) -> bool {
        block.kind == BlockKind::Agent
    }

    async fn execute(
        &self,
        _block: &Block,
        resolved: Value,
        _scope: &HandlerScope,
        cancel: CancellationToken,
    ) -> Result<HandlerOutput, HandlerError> {
        let request = request_from_inputs(&resolved);
        let streaming = resolved
            .get("stream")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        if streaming {
            let envelope = self.provider.stream(request, cancel).await?;
            return Ok(HandlerOutput::Stream(envelope));
        }

        let response = self.provider.complete(request, cancel).await?;
        Ok(response.to_output().into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{AgentResponse, TokenUsage};
    use pretty_assertions::assert_eq;
    use std::collections::{BTreeMap, HashMap};
    use weft_core::ExecutionId;
    use weft_workflow::Workflow;

    struct CannedProvider;

    #[async_trait]
    impl AgentProvider for CannedProvider {
        async fn complete(
            &self,
            request: AgentRequest,
            _cancel: CancellationToken,
        ) -> Result<AgentResponse, HandlerError> {
            Ok(AgentResponse {
                content: format!("answer to: {}", request.prompt),
                model: request.model,
                tokens: TokenUsage {
                    prompt: 10,
                    completion: 4,
                    total: 14,
                },
                provider_timing_ms: 7,
                ..AgentResponse::default()
            })
        }
    }

    fn scope() -> HandlerScope {
        HandlerScope::new(
            ExecutionId::v4(),
            Arc::new(Workflow {
                version: "1".into(),
                blocks: BTreeMap::new(),
                connections: vec![],
                loops: BTreeMap::new(),
                parallels: BTreeMap::new(),
            }),
            HashMap::new(),
        )
    }

    #[test]
    fn request_extraction() {
        let resolved = serde_json::json!({
            "model": "m1",
            "systemPrompt": "be terse",
            "prompt": "what now",
            "temperature": 0.2,
        });
        let request = request_from_inputs(&resolved);
        assert_eq!(request.model.as_deref(), Some("m1"));
        assert_eq!(request.system_prompt.as_deref(), Some("be terse"));
        assert_eq!(request.prompt, "what now");
        assert_eq!(request.temperature, Some(0.2));
    }

    #[test]
    fn user_prompt_fallback() {
        let request = request_from_inputs(&serde_json::json!({"userPrompt": "hi"}));
        assert_eq!(request.prompt, "hi");
    }

    #[tokio::test]
    async fn completed_response_becomes_output() {
        let handler = AgentHandler::new(Arc::new(CannedProvider));
        let block = Block::new("a", BlockKind::Agent, "Agent");
        let out = handler
            .execute(
                &block,
                serde_json::json!({"prompt": "what now", "model": "m1"}),
                &scope(),
                CancellationToken::new(),
            )
            .await
            .unwrap();
        let value = out.execution_value();
        assert_eq!(value["content"], "answer to: what now");
        assert_eq!(value["model"], "m1");
        assert_eq!(value["tokens"]["total"], 14);
    }

    #[tokio::test]
    async fn streaming_returns_the_envelope() {
        let handler = AgentHandler::new(Arc::new(CannedProvider));
        let block = Block::new("a", BlockKind::Agent, "Agent");
        let out = handler
            .execute(
                &block,
                serde_json::json!({"prompt": "x", "stream": true}),
                &scope(),
                CancellationToken::new(),
            )
            .await
            .unwrap();
        assert!(matches!(out, HandlerOutput::Stream(_)));
        assert_eq!(out.execution_value()["content"], "answer to: x");
    }
}
