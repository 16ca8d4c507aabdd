//! The condition handler.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use weft_expression::evaluate_condition;
use weft_workflow::{Block, BlockKind, SourceHandle};

use crate::error::HandlerError;
use crate::handler::{BlockHandler, HandlerOutput};
use crate::scope::HandlerScope;

/// One authored branch of a condition block.
#[derive(Debug, Clone, Deserialize)]
struct ConditionEntry {
    id: String,
    #[serde(default)]
    #[allow(dead_code, reason = "authored field, surfaced in editors only")]
    title: Option<String>,
    #[serde(default)]
    value: Option<String>,
}

/// Evaluates the block's ordered condition list: the first true expression
/// wins, a trailing entry with an empty `value` is the implicit else. The
/// output records the decision the path tracker acts on.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConditionHandler;

impl ConditionHandler {
    fn parse_entries(resolved: &Value) -> Result<Vec<ConditionEntry>, HandlerError> {
        let raw = resolved
            .get("conditions")
            .ok_or_else(|| {
                HandlerError::InvalidConditionsFormat("missing `conditions` param".into())
            })?;

        let parsed: Result<Vec<ConditionEntry>, _> = match raw {
            Value::String(text) => serde_json::from_str(text),
            other => serde_json::from_value(other.clone()),
        };
        let entries = parsed.map_err(|e| {
            HandlerError::InvalidConditionsFormat(format!(
                "`conditions` is not a sequence of {{id, title, value}}: {e}"
            ))
        })?;
        if entries.is_empty() {
            return Err(HandlerError::InvalidConditionsFormat(
                "`conditions` is empty".into(),
            ));
        }
        Ok(entries)
    }

    fn selected_path(block: &Block, scope: &HandlerScope, branch_id: &str) -> Value {
        let target = scope.workflow.connections.iter().find_map(|conn| {
            let handle = conn.source_handle.as_ref()?;
            (conn.source == block.id && handle.matches_condition(&block.id, branch_id))
                .then_some(&conn.target)
        });
        let Some(target) = target else {
            return Value::Null;
        };
        match scope.workflow.block(target) {
            Some(block) => serde_json::json!({
                "blockId": block.id,
                "blockType": block.kind,
                "blockTitle": block.name,
            }),
            None => Value::Null,
        }
    }
}

#[async_trait]
impl BlockHandler for ConditionHandler {
    fn can_handle(&self, block: &Block) -> bool {
        block.kind == BlockKind::Condition
    }

    async fn execute(
        &self,
        block: &Block,
        resolved: Value,
        scope: &HandlerScope,
        _cancel: CancellationToken,
    ) -> Result<HandlerOutput, HandlerError> {
        let entries = Self::parse_entries(&resolved)?;

        let mut else_branch = None;
        for entry in &entries {
            let Some(expr) = entry.value.as_deref().filter(|v| !v.trim().is_empty()) else {
                else_branch.get_or_insert(entry.id.as_str());
                continue;
            };
            if evaluate_condition(expr, scope)? {
                debug!(block = %block.id, branch = %entry.id, "condition matched");
                return Ok(serde_json::json!({
                    "conditionResult": true,
                    "selectedPath": Self::selected_path(block, scope, &entry.id),
                    "selectedConditionId": entry.id,
                })
                .into());
            }
        }

        let Some(else_id) = else_branch else {
            return Err(HandlerError::NoMatchingBranch);
        };
        debug!(block = %block.id, branch = else_id, "falling through to else branch");
        Ok(serde_json::json!({
            "conditionResult": false,
            "selectedPath": Self::selected_path(block, scope, else_id),
            "selectedConditionId": else_id,
        })
        .into())
    }
}

/// The canonical handle for a condition edge (re-exported convenience for
/// workflow builders and tests).
#[must_use]
pub fn branch_handle(block: &Block, branch_id: &str) -> SourceHandle {
    SourceHandle::condition_branch(&block.id, branch_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::{BTreeMap, HashMap};
    use std::sync::Arc;
    use weft_core::{BlockId, ExecutionId};
    use weft_workflow::{Connection, Workflow};

    fn workflow() -> Arc<Workflow> {
        let cond = Block::new("cond", BlockKind::Condition, "Check");
        let then_block = Block::new("f2", BlockKind::Function, "Then");
        let else_block = Block::new("p1", BlockKind::Parallel, "Else");
        let connections = vec![
            Connection::new("cond", "f2")
                .with_handle(SourceHandle::condition_branch(&cond.id, "cond1")),
            Connection::new("cond", "p1")
                .with_handle(SourceHandle::condition_branch(&cond.id, "else1")),
        ];
        Arc::new(Workflow {
            version: "1".into(),
            blocks: [cond, then_block, else_block]
                .into_iter()
                .map(|b| (b.id.clone(), b))
                .collect(),
            connections,
            loops: BTreeMap::new(),
            parallels: BTreeMap::new(),
        })
    }

    fn scope(locals: HashMap<String, Value>) -> HandlerScope {
        HandlerScope::new(ExecutionId::v4(), workflow(), HashMap::new()).with_locals(locals)
    }

    fn conditions_param() -> Value {
        // JSON-encoded string, the way authored workflows carry it.
        Value::String(
            serde_json::json!([
                {"id": "cond1", "title": "if", "value": "result == 'one'"},
                {"id": "else1", "title": "else", "value": ""}
            ])
            .to_string(),
        )
    }

    #[tokio::test]
    async fn first_true_branch_wins() {
        let block = Block::new("cond", BlockKind::Condition, "Check");
        let scope = scope([("result".into(), Value::from("one"))].into());
        let out = ConditionHandler
            .execute(
                &block,
                serde_json::json!({"conditions": conditions_param()}),
                &scope,
                CancellationToken::new(),
            )
            .await
            .unwrap();

        let value = out.execution_value();
        assert_eq!(value["conditionResult"], true);
        assert_eq!(value["selectedConditionId"], "cond1");
        assert_eq!(value["selectedPath"]["blockId"], "f2");
        assert_eq!(value["selectedPath"]["blockType"], "function");
        assert_eq!(value["selectedPath"]["blockTitle"], "Then");
    }

    #[tokio::test]
    async fn falls_through_to_else() {
        let block = Block::new("cond", BlockKind::Condition, "Check");
        let scope = scope([("result".into(), Value::from("two"))].into());
        let out = ConditionHandler
            .execute(
                &block,
                serde_json::json!({"conditions": conditions_param()}),
                &scope,
                CancellationToken::new(),
            )
            .await
            .unwrap();

        let value = out.execution_value();
        assert_eq!(value["conditionResult"], false);
        assert_eq!(value["selectedConditionId"], "else1");
        assert_eq!(value["selectedPath"]["blockId"], "p1");
    }

    #[tokio::test]
    async fn no_else_and_no_match_errors() {
        let block = Block::new("cond", BlockKind::Condition, "Check");
        let scope = scope([("result".into(), Value::from("two"))].into());
        let conditions =
            serde_json::json!([{"id": "cond1", "title": "if", "value": "result == 'one'"}]);
        let err = ConditionHandler
            .execute(
                &block,
                serde_json::json!({"conditions": conditions}),
                &scope,
                CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::NoMatchingBranch));
    }

    #[tokio::test]
    async fn malformed_conditions_error() {
        let block = Block::new("cond", BlockKind::Condition, "Check");
        let scope = scope(HashMap::new());
        for bad in [
            serde_json::json!({}),
            serde_json::json!({"conditions": "not json"}),
            serde_json::json!({"conditions": []}),
            serde_json::json!({"conditions": [{"title": "missing id"}]}),
        ] {
            let err = ConditionHandler
                .execute(&block, bad, &scope, CancellationToken::new())
                .await
                .unwrap_err();
            assert!(
                matches!(err, HandlerError::InvalidConditionsFormat(_)),
                "expected format error, got {err}"
            );
        }
    }

    #[tokio::test]
    async fn unresolved_reference_propagates() {
        let block = Block::new("cond", BlockKind::Condition, "Check");
        let scope = scope(HashMap::new());
        let conditions = serde_json::json!([
            {"id": "cond1", "value": "<ghost.result> == 'one'"},
            {"id": "else1", "value": ""}
        ]);
        let err = ConditionHandler
            .execute(
                &block,
                serde_json::json!({"conditions": conditions}),
                &scope,
                CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::Resolution(_)));
    }

    #[tokio::test]
    async fn unwired_branch_selects_with_null_path() {
        let block = Block::new("cond", BlockKind::Condition, "Check");
        let scope = scope([("result".into(), Value::from("one"))].into());
        let conditions = serde_json::json!([
            {"id": "unwired", "value": "result == 'one'"},
            {"id": "else1", "value": ""}
        ]);
        let out = ConditionHandler
            .execute(
                &block,
                serde_json::json!({"conditions": conditions}),
                &scope,
                CancellationToken::new(),
            )
            .await
            .unwrap();
        let value = out.execution_value();
        assert_eq!(value["selectedConditionId"], "unwired");
        assert_eq!(value["selectedPath"], Value::Null);
    }

    #[test]
    fn branch_handle_matches_grammar() {
        let block = Block::new("cond", BlockKind::Condition, "Check");
        let handle = branch_handle(&block, "cond1");
        assert_eq!(handle.as_str(), "condition-cond-cond1");
        assert!(handle.matches_condition(&BlockId::new("cond"), "cond1"));
    }
}
