//! Loop and parallel container handlers.
//!
//! Containers do no work of their own: on entry, their handler resolves the
//! subflow's configuration into a plan (iteration count plus items, or
//! branch count plus distribution) that the engine's scope bookkeeping
//! consumes. The container's final aggregate output is written by the engine
//! when the subflow completes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use weft_core::{LoopId, ParallelId};
use weft_expression::Resolver;
use weft_workflow::{Block, BlockKind, LoopKind, ParallelKind};

use crate::error::HandlerError;
use crate::handler::{BlockHandler, HandlerOutput};
use crate::scope::HandlerScope;

/// How a loop will iterate, resolved at container entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopPlan {
    /// Total number of iterations.
    pub total: u32,
    /// Per-iteration items for `forEach` loops; `None` for `for` loops.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<Value>>,
}

/// How a parallel will fan out, resolved at container entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParallelPlan {
    /// Total number of branches.
    pub total: u32,
    /// Per-branch items for `collection` parallels; `None` for `count`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<Value>>,
}

/// Resolve a `forEachItems` / `distribution` value into concrete items.
///
/// Strings resolve through the reference grammar first (both `{{…}}` and
/// `<…>` forms); arrays iterate element-wise; objects iterate as
/// `[key, value]` pairs.
fn collection_items(spec: &Value, scope: &HandlerScope) -> Result<Vec<Value>, HandlerError> {
    let resolver = Resolver::new(scope);
    let resolved = match spec {
        Value::String(text) => {
            let via_template = resolver.resolve_str(text)?;
            match via_template {
                // Still a plain string: maybe `<…>` syntax or a JSON literal.
                Value::String(s) => {
                    let substituted = resolver.resolve_angle_refs(&s)?;
                    serde_json::from_str(&substituted)
                        .unwrap_or(Value::String(substituted))
                }
                typed => typed,
            }
        }
        other => resolver.resolve_value(other)?,
    };

    match resolved {
        Value::Array(items) => Ok(items),
        Value::Object(map) => Ok(map
            .into_iter()
            .map(|(k, v)| Value::Array(vec![Value::String(k), v]))
            .collect()),
        other => Err(HandlerError::Evaluation(format!(
            "collection did not resolve to an array or object, got {other}"
        ))),
    }
}

/// Resolves a loop container's iteration plan.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoopHandler;

#[async_trait]
impl BlockHandler for LoopHandler {
    fn can_handle(&self, block: &Block) -> bool {
        block.kind == BlockKind::Loop
    }

    async fn execute(
        &self,
        block: &Block,
        _resolved: Value,
        scope: &HandlerScope,
        _cancel: CancellationToken,
    ) -> Result<HandlerOutput, HandlerError> {
        let loop_id = LoopId::new(block.id.as_str());
        let spec = scope.workflow.loops.get(&loop_id).ok_or_else(|| {
            HandlerError::fatal(format!("loop block {} has no subflow declaration", block.id))
        })?;

        let plan = match spec.loop_type {
            LoopKind::For => LoopPlan {
                total: spec.iterations.unwrap_or(0),
                items: None,
            },
            LoopKind::ForEach => {
                let source = spec.for_each_items.as_ref().ok_or_else(|| {
                    HandlerError::fatal(format!(
                        "forEach loop {} has no `forEachItems`",
                        block.id
                    ))
                })?;
                let items = collection_items(source, scope)?;
                LoopPlan {
                    total: items.len() as u32,
                    items: Some(items),
                }
            }
        };

        Ok(serde_json::to_value(plan)
            .unwrap_or(Value::Null)
            .into())
    }
}

/// Resolves a parallel container's branch plan.
#[derive(Debug, Default, Clone, Copy)]
pub struct ParallelHandler;

#[async_trait]
impl BlockHandler for ParallelHandler {
    fn can_handle(&self, block: &Block) -> bool {
        block.kind == BlockKind::Parallel
    }

    async fn execute(
        &self,
        block: &Block,
        _resolved: Value,
        scope: &HandlerScope,
        _cancel: CancellationToken,
    ) -> Result<HandlerOutput, HandlerError> {
        let parallel_id = ParallelId::new(block.id.as_str());
        let spec = scope.workflow.parallels.get(&parallel_id).ok_or_else(|| {
            HandlerError::fatal(format!(
                "parallel block {} has no subflow declaration",
                block.id
            ))
        })?;

        let plan = match spec.parallel_type {
            ParallelKind::Count => ParallelPlan {
                total: spec.count.unwrap_or(0),
                items: None,
            },
            ParallelKind::Collection => {
                let source = spec.distribution.as_ref().ok_or_else(|| {
                    HandlerError::fatal(format!(
                        "collection parallel {} has no `distribution`",
                        block.id
                    ))
                })?;
                let items = collection_items(source, scope)?;
                ParallelPlan {
                    total: items.len() as u32,
                    items: Some(items),
                }
            }
        };

        Ok(serde_json::to_value(plan)
            .unwrap_or(Value::Null)
            .into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::{BTreeMap, HashMap};
    use std::sync::Arc;
    use weft_core::{BlockId, ExecutionId};
    use weft_workflow::{LoopSpec, ParallelSpec, Workflow};

    fn workflow_with_loop(spec: LoopSpec) -> Arc<Workflow> {
        let blocks = vec![
            Block::new("loop-1", BlockKind::Loop, "Loop"),
            Block::new("body", BlockKind::Function, "Body"),
            Block::new("src", BlockKind::Function, "Source"),
        ];
        Arc::new(Workflow {
            version: "1".into(),
            blocks: blocks.into_iter().map(|b| (b.id.clone(), b)).collect(),
            connections: vec![],
            loops: [(LoopId::new("loop-1"), spec)].into(),
            parallels: BTreeMap::new(),
        })
    }

    fn scope_for(workflow: Arc<Workflow>) -> HandlerScope {
        HandlerScope::new(ExecutionId::v4(), workflow, HashMap::new()).with_outputs(
            [(
                BlockId::new("src"),
                serde_json::json!({"list": ["a", "b"]}),
            )]
            .into(),
        )
    }

    #[tokio::test]
    async fn for_loop_plan() {
        let workflow = workflow_with_loop(LoopSpec {
            nodes: [BlockId::new("body")].into(),
            loop_type: LoopKind::For,
            iterations: Some(3),
            for_each_items: None,
        });
        let block = Block::new("loop-1", BlockKind::Loop, "Loop");
        let out = LoopHandler
            .execute(
                &block,
                Value::Null,
                &scope_for(workflow),
                CancellationToken::new(),
            )
            .await
            .unwrap();
        let plan: LoopPlan = serde_json::from_value(out.execution_value().clone()).unwrap();
        assert_eq!(plan, LoopPlan { total: 3, items: None });
    }

    #[tokio::test]
    async fn for_each_literal_array() {
        let workflow = workflow_with_loop(LoopSpec {
            nodes: [BlockId::new("body")].into(),
            loop_type: LoopKind::ForEach,
            iterations: None,
            for_each_items: Some(serde_json::json!(["a", "b"])),
        });
        let block = Block::new("loop-1", BlockKind::Loop, "Loop");
        let out = LoopHandler
            .execute(
                &block,
                Value::Null,
                &scope_for(workflow),
                CancellationToken::new(),
            )
            .await
            .unwrap();
        let plan: LoopPlan = serde_json::from_value(out.execution_value().clone()).unwrap();
        assert_eq!(plan.total, 2);
        assert_eq!(plan.items, Some(vec![Value::from("a"), Value::from("b")]));
    }

    #[tokio::test]
    async fn for_each_reference_to_upstream_output() {
        let workflow = workflow_with_loop(LoopSpec {
            nodes: [BlockId::new("body")].into(),
            loop_type: LoopKind::ForEach,
            iterations: None,
            for_each_items: Some(Value::String("{{src.list}}".into())),
        });
        let block = Block::new("loop-1", BlockKind::Loop, "Loop");
        let out = LoopHandler
            .execute(
                &block,
                Value::Null,
                &scope_for(workflow),
                CancellationToken::new(),
            )
            .await
            .unwrap();
        let plan: LoopPlan = serde_json::from_value(out.execution_value().clone()).unwrap();
        assert_eq!(plan.total, 2);
    }

    #[tokio::test]
    async fn for_each_json_string_literal() {
        let workflow = workflow_with_loop(LoopSpec {
            nodes: [BlockId::new("body")].into(),
            loop_type: LoopKind::ForEach,
            iterations: None,
            for_each_items: Some(Value::String("[1, 2, 3]".into())),
        });
        let block = Block::new("loop-1", BlockKind::Loop, "Loop");
        let out = LoopHandler
            .execute(
                &block,
                Value::Null,
                &scope_for(workflow),
                CancellationToken::new(),
            )
            .await
            .unwrap();
        let plan: LoopPlan = serde_json::from_value(out.execution_value().clone()).unwrap();
        assert_eq!(plan.total, 3);
    }

    #[tokio::test]
    async fn for_each_object_iterates_entries() {
        let workflow = workflow_with_loop(LoopSpec {
            nodes: [BlockId::new("body")].into(),
            loop_type: LoopKind::ForEach,
            iterations: None,
            for_each_items: Some(serde_json::json!({"x": 1, "y": 2})),
        });
        let block = Block::new("loop-1", BlockKind::Loop, "Loop");
        let out = LoopHandler
            .execute(
                &block,
                Value::Null,
                &scope_for(workflow),
                CancellationToken::new(),
            )
            .await
            .unwrap();
        let plan: LoopPlan = serde_json::from_value(out.execution_value().clone()).unwrap();
        assert_eq!(
            plan.items,
            Some(vec![
                serde_json::json!(["x", 1]),
                serde_json::json!(["y", 2]),
            ])
        );
    }

    #[tokio::test]
    async fn scalar_collection_is_an_error() {
        let workflow = workflow_with_loop(LoopSpec {
            nodes: [BlockId::new("body")].into(),
            loop_type: LoopKind::ForEach,
            iterations: None,
            for_each_items: Some(Value::from(42)),
        });
        let block = Block::new("loop-1", BlockKind::Loop, "Loop");
        let err = LoopHandler
            .execute(
                &block,
                Value::Null,
                &scope_for(workflow),
                CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::Evaluation(_)));
    }

    #[tokio::test]
    async fn parallel_count_plan() {
        let container = Block::new("par-1", BlockKind::Parallel, "Fan");
        let workflow = Arc::new(Workflow {
            version: "1".into(),
            blocks: [
                (container.id.clone(), container),
                (
                    BlockId::new("body"),
                    Block::new("body", BlockKind::Function, "Body"),
                ),
            ]
            .into(),
            connections: vec![],
            loops: BTreeMap::new(),
            parallels: [(
                ParallelId::new("par-1"),
                ParallelSpec {
                    nodes: [BlockId::new("body")].into(),
                    parallel_type: ParallelKind::Count,
                    count: Some(4),
                    distribution: None,
                },
            )]
            .into(),
        });
        let block = Block::new("par-1", BlockKind::Parallel, "Fan");
        let out = ParallelHandler
            .execute(
                &block,
                Value::Null,
                &scope_for(workflow),
                CancellationToken::new(),
            )
            .await
            .unwrap();
        let plan: ParallelPlan = serde_json::from_value(out.execution_value().clone()).unwrap();
        assert_eq!(plan, ParallelPlan { total: 4, items: None });
    }

    #[tokio::test]
    async fn missing_declaration_is_fatal() {
        let block = Block::new("loop-x", BlockKind::Loop, "Loop");
        let workflow = workflow_with_loop(LoopSpec {
            nodes: [BlockId::new("body")].into(),
            loop_type: LoopKind::For,
            iterations: Some(1),
            for_each_items: None,
        });
        let err = LoopHandler
            .execute(
                &block,
                Value::Null,
                &scope_for(workflow),
                CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no subflow declaration"));
    }
}
