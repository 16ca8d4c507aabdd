//! The evaluator handler.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use weft_workflow::{Block, BlockKind};

use crate::error::HandlerError;
use crate::handler::{BlockHandler, HandlerOutput};
use crate::handlers::agent::request_from_inputs;
use crate::provider::AgentProvider;
use crate::scope::HandlerScope;

/// Rubric-scored model call.
///
/// The provider is instructed to answer with a JSON object mapping
/// criterion ids to numbers; the handler parses that into `scores` and
/// derives `overall` as the mean.
pub struct EvaluatorHandler {
    provider: Arc<dyn AgentProvider>,
}

impl EvaluatorHandler {
    /// Create a handler over the given provider.
    pub fn new(provider: Arc<dyn AgentProvider>) -> Self {
        Self { provider }
    }
}

impl std::fmt::Debug for EvaluatorHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvaluatorHandler").finish_non_exhaustive()
    }
}

fn parse_scores(content: &str) -> Result<serde_json::Map<String, Value>, HandlerError> {
    // Providers sometimes wrap JSON in prose or fences; take the outermost
    // object literal.
    let start = content.find('{');
    let end = content.rfind('}');
    let (Some(start), Some(end)) = (start, end) else {
        return Err(HandlerError::Evaluation(format!(
            "evaluator response carries no JSON object: {content:?}"
        )));
    };
    let parsed: Value = serde_json::from_str(&content[start..=end]).map_err(|e| {
        HandlerError::Evaluation(format!("evaluator response is not valid JSON: {e}"))
    })?;
    let Value::Object(map) = parsed else {
        return Err(HandlerError::Evaluation(
            "evaluator response is not a JSON object".into(),
        ));
    };

    let mut scores = serde_json::Map::with_capacity(map.len());
    for (key, value) in map {
        if !value.is_number() {
            return Err(HandlerError::Evaluation(format!(
                "score for {key:?} is not a number"
            )));
        }
        scores.insert(key, value);
    }
    if scores.is_empty() {
        return Err(HandlerError::Evaluation(
            "evaluator response contains no scores".into(),
        ));
    }
    Ok(scores)
}

#[async_trait]
impl BlockHandler for EvaluatorHandler {
    fn can_handle(&self, block: &Block) -> bool {
        block.kind == BlockKind::Evaluator
    }

    async fn execute(
        &self,
        _block: &Block,
        resolved: Value,
        _scope: &HandlerScope,
        cancel: CancellationToken,
    ) -> Result<HandlerOutput, HandlerError> {
        let mut request = request_from_inputs(&resolved);
        let rubric = resolved
            .get("metrics")
            .map(|m| serde_json::to_string(m).unwrap_or_default())
            .unwrap_or_default();
        request.system_prompt = Some(format!(
            "Score the given content against each rubric criterion. Answer \
             with a JSON object mapping criterion ids to numeric scores and \
             nothing else.\nRubric: {rubric}"
        ));
        request.temperature = Some(0.0);

        let response = self.provider.complete(request, cancel).await?;
        let scores = parse_scores(&response.content)?;

        let sum: f64 = scores.values().filter_map(Value::as_f64).sum();
        let overall = sum / scores.len() as f64;

        Ok(serde_json::json!({
            "content": response.content,
            "model": response.model,
            "tokens": response.tokens,
            "scores": scores,
            "overall": overall,
        })
        .into())
    }
}
