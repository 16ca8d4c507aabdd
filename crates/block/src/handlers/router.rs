//! The router handler.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use weft_workflow::{Block, BlockKind};

use crate::error::HandlerError;
use crate::handler::{BlockHandler, HandlerOutput};
use crate::provider::{AgentProvider, AgentRequest};
use crate::scope::HandlerScope;

/// Classifier-style selection of exactly one direct successor.
///
/// The provider is asked to pick among the router's successors; the answer
/// is matched back to a successor by id (then by name). Anything else is a
/// [`HandlerError::RouterSelection`].
pub struct RouterHandler {
    provider: Arc<dyn AgentProvider>,
}

impl RouterHandler {
    /// Create a handler over the given provider.
    pub fn new(provider: Arc<dyn AgentProvider>) -> Self {
        Self { provider }
    }
}

impl std::fmt::Debug for RouterHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouterHandler").finish_non_exhaustive()
    }
}

#[async_trait]
impl BlockHandler for RouterHandler {
    fn can_handle(&self, block: &Block) -> bool {
        block.kind == BlockKind::Router
    }

    async fn execute(
        &self,
        block: &Block,
        resolved: Value,
        scope: &HandlerScope,
        cancel: CancellationToken,
    ) -> Result<HandlerOutput, HandlerError> {
        let candidates = scope.successors(&block.id);
        if candidates.is_empty() {
            return Err(HandlerError::RouterSelection(format!(
                "router {} has no successors to route to",
                block.id
            )));
        }

        let prompt = resolved
            .get("prompt")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let mut catalog = String::new();
        for candidate in &candidates {
            catalog.push_str(&format!(
                "- id: {} name: {} kind: {}\n",
                candidate.id, candidate.name, candidate.kind
            ));
        }
        let request = AgentRequest {
            model: resolved
                .get("model")
                .and_then(Value::as_str)
                .map(str::to_owned),
            system_prompt: Some(
                "Pick exactly one target block for the given input. \
                 Answer with the target's id and nothing else."
                    .into(),
            ),
            prompt: format!("{prompt}\n\nTargets:\n{catalog}"),
            temperature: Some(0.0),
            tools: Vec::new(),
        };

        let response = self.provider.complete(request, cancel).await?;
        let answer = response.content.trim();

        let target = candidates
            .iter()
            .find(|c| c.id.as_str() == answer)
            .or_else(|| {
                candidates
                    .iter()
                    .find(|c| c.name.eq_ignore_ascii_case(answer))
            })
            .ok_or_else(|| {
                HandlerError::RouterSelection(format!(
                    "router {} selected {answer:?}, which is not a direct successor",
                    block.id
                ))
            })?;

        debug!(block = %block.id, target = %target.id, "router selected target");
        Ok(serde_json::json!({
            "content": response.content,
            "model": response.model,
            "tokens": response.tokens,
            "selectedPath": {
                "blockId": target.id,
                "blockType": target.kind,
                "blockTitle": target.name,
            },
        })
        .into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::AgentResponse;
    use pretty_assertions::assert_eq;
    use std::collections::{BTreeMap, HashMap};
    use weft_core::ExecutionId;
    use weft_workflow::{Connection, Workflow};

    /// Answers with whatever it was constructed with.
    struct FixedAnswer(&'static str);

    #[async_trait]
    impl AgentProvider for FixedAnswer {
        async fn complete(
            &self,
            _request: AgentRequest,
            _cancel: CancellationToken,
        ) -> Result<AgentResponse, HandlerError> {
            Ok(AgentResponse {
                content: self.0.to_owned(),
                ..AgentResponse::default()
            })
        }
    }

    fn scope() -> HandlerScope {
        let blocks = vec![
            Block::new("router", BlockKind::Router, "Route"),
            Block::new("t1", BlockKind::Function, "Billing"),
            Block::new("t2", BlockKind::Function, "Support"),
        ];
        let workflow = Arc::new(Workflow {
            version: "1".into(),
            blocks: blocks.into_iter().map(|b| (b.id.clone(), b)).collect(),
            connections: vec![
                Connection::new("router", "t1"),
                Connection::new("router", "t2"),
            ],
            loops: BTreeMap::new(),
            parallels: BTreeMap::new(),
        });
        HandlerScope::new(ExecutionId::v4(), workflow, HashMap::new())
    }

    #[tokio::test]
    async fn selects_successor_by_id() {
        let handler = RouterHandler::new(Arc::new(FixedAnswer("t1")));
        let block = Block::new("router", BlockKind::Router, "Route");
        let out = handler
            .execute(
                &block,
                serde_json::json!({"prompt": "billing question"}),
                &scope(),
                CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(out.execution_value()["selectedPath"]["blockId"], "t1");
        assert_eq!(out.execution_value()["selectedPath"]["blockTitle"], "Billing");
    }

    #[tokio::test]
    async fn selects_successor_by_name() {
        let handler = RouterHandler::new(Arc::new(FixedAnswer("support")));
        let block = Block::new("router", BlockKind::Router, "Route");
        let out = handler
            .execute(
                &block,
                serde_json::json!({"prompt": "x"}),
                &scope(),
                CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(out.execution_value()["selectedPath"]["blockId"], "t2");
    }

    #[tokio::test]
    async fn off_graph_selection_is_an_error() {
        let handler = RouterHandler::new(Arc::new(FixedAnswer("somewhere-else")));
        let block = Block::new("router", BlockKind::Router, "Route");
        let err = handler
            .execute(
                &block,
                serde_json::json!({"prompt": "x"}),
                &scope(),
                CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::RouterSelection(_)));
    }

    #[tokio::test]
    async fn router_without_successors_is_an_error() {
        let handler = RouterHandler::new(Arc::new(FixedAnswer("t1")));
        let block = Block::new("router", BlockKind::Router, "Route");
        let lonely = HandlerScope::new(
            ExecutionId::v4(),
            Arc::new(Workflow {
                version: "1".into(),
                blocks: [(
                    block.id.clone(),
                    Block::new("router", BlockKind::Router, "Route"),
                )]
                .into(),
                connections: vec![],
                loops: BTreeMap::new(),
                parallels: BTreeMap::new(),
            }),
            HashMap::new(),
        );
        let err = handler
            .execute(
                &block,
                serde_json::json!({}),
                &lonely,
                CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::RouterSelection(_)));
    }
}
