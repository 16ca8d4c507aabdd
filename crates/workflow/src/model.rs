//! The serialized workflow document model.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use weft_core::{BlockId, LoopId, ParallelId};

use crate::connection::Connection;
use crate::error::{ValidationWarning, WorkflowError};

/// The kind of work a block performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockKind {
    /// The unique entry point; seeded from the initial envelope.
    Starter,
    /// An LLM call through the provider seam.
    Agent,
    /// User code run through the code-runtime seam.
    Function,
    /// An outbound HTTP request.
    Api,
    /// Ordered branch selection by expression evaluation.
    Condition,
    /// Classifier-style selection of exactly one successor.
    Router,
    /// Loop subflow container.
    Loop,
    /// Parallel subflow container.
    Parallel,
    /// Terminal block producing the run's explicit output.
    Response,
    /// Rubric-scored LLM call.
    Evaluator,
    /// Webhook trigger; boundary-only, never dispatched in-graph.
    Webhook,
}

impl BlockKind {
    /// Returns `true` for blocks whose completion records a path decision.
    #[must_use]
    pub fn is_decision(self) -> bool {
        matches!(self, Self::Condition | Self::Router)
    }

    /// Returns `true` for loop/parallel subflow containers.
    #[must_use]
    pub fn is_container(self) -> bool {
        matches!(self, Self::Loop | Self::Parallel)
    }
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Starter => "starter",
            Self::Agent => "agent",
            Self::Function => "function",
            Self::Api => "api",
            Self::Condition => "condition",
            Self::Router => "router",
            Self::Loop => "loop",
            Self::Parallel => "parallel",
            Self::Response => "response",
            Self::Evaluator => "evaluator",
            Self::Webhook => "webhook",
        };
        f.write_str(s)
    }
}

fn default_enabled() -> bool {
    true
}

/// One node of the workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    /// Unique id within the workflow.
    pub id: BlockId,
    /// The block kind.
    #[serde(rename = "type")]
    pub kind: BlockKind,
    /// Author-chosen display name; also usable in references.
    pub name: String,
    /// Config params, already merged from user inputs at authoring time.
    #[serde(default)]
    pub params: serde_json::Map<String, serde_json::Value>,
    /// Disabled blocks never activate.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl Block {
    /// Create an enabled block with empty params.
    pub fn new(id: impl Into<BlockId>, kind: BlockKind, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            name: name.into(),
            params: serde_json::Map::new(),
            enabled: true,
        }
    }

    /// Set one config param.
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    /// Read one config param.
    #[must_use]
    pub fn param(&self, key: &str) -> Option<&serde_json::Value> {
        self.params.get(key)
    }
}

/// How a loop derives its iteration count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoopKind {
    /// Fixed iteration count.
    #[serde(rename = "for")]
    For,
    /// One iteration per element of a resolved collection.
    #[serde(rename = "forEach")]
    ForEach,
}

/// A loop subflow declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopSpec {
    /// Member blocks executed once per iteration.
    pub nodes: BTreeSet<BlockId>,
    /// Iteration strategy.
    pub loop_type: LoopKind,
    /// Iteration count; required for `for` loops, `>= 1`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iterations: Option<u32>,
    /// Collection to iterate; a literal array/object or a reference string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub for_each_items: Option<serde_json::Value>,
}

/// How a parallel derives its branch count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParallelKind {
    /// Fixed branch count.
    Count,
    /// One branch per element of a resolved collection.
    Collection,
}

/// A parallel subflow declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParallelSpec {
    /// Member blocks copied into every branch.
    pub nodes: BTreeSet<BlockId>,
    /// Branching strategy.
    pub parallel_type: ParallelKind,
    /// Branch count; required for `count` parallels, `>= 1`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
    /// Collection to distribute; a literal array/object or a reference string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distribution: Option<serde_json::Value>,
}

/// An immutable serialized workflow, as handed to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    /// Document format version.
    pub version: String,
    /// All blocks, keyed by id.
    pub blocks: BTreeMap<BlockId, Block>,
    /// Ordered edge list.
    #[serde(default)]
    pub connections: Vec<Connection>,
    /// Loop subflows, keyed by the container block's id.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub loops: BTreeMap<LoopId, LoopSpec>,
    /// Parallel subflows, keyed by the container block's id.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parallels: BTreeMap<ParallelId, ParallelSpec>,
}

impl Workflow {
    /// Look up a block by id.
    #[must_use]
    pub fn block(&self, id: &BlockId) -> Option<&Block> {
        self.blocks.get(id)
    }

    /// The workflow's unique enabled starter block, if valid.
    #[must_use]
    pub fn starter(&self) -> Option<&Block> {
        let mut starters = self
            .blocks
            .values()
            .filter(|b| b.kind == BlockKind::Starter && b.enabled);
        let first = starters.next()?;
        if starters.next().is_some() {
            return None;
        }
        Some(first)
    }

    /// The loop whose member set contains `block`, if any.
    #[must_use]
    pub fn loop_containing(&self, block: &BlockId) -> Option<(&LoopId, &LoopSpec)> {
        self.loops.iter().find(|(_, spec)| spec.nodes.contains(block))
    }

    /// The parallel whose member set contains `block`, if any.
    #[must_use]
    pub fn parallel_containing(&self, block: &BlockId) -> Option<(&ParallelId, &ParallelSpec)> {
        self.parallels
            .iter()
            .find(|(_, spec)| spec.nodes.contains(block))
    }

    /// Structural validation.
    ///
    /// Fatal problems return [`WorkflowError`]; advisory oddities come back
    /// as warnings. See [`crate::validate`] for the rule set.
    pub fn validate(&self) -> Result<Vec<ValidationWarning>, WorkflowError> {
        crate::validate::validate(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn two_block_workflow() -> Workflow {
        let starter = Block::new("start", BlockKind::Starter, "Start");
        let func = Block::new("f1", BlockKind::Function, "One")
            .with_param("code", serde_json::json!("return 'one'"));
        Workflow {
            version: "1".into(),
            blocks: [
                (starter.id.clone(), starter),
                (func.id.clone(), func),
            ]
            .into(),
            connections: vec![Connection::new("start", "f1")],
            loops: BTreeMap::new(),
            parallels: BTreeMap::new(),
        }
    }

    #[test]
    fn block_kind_serde_lowercase() {
        assert_eq!(serde_json::to_string(&BlockKind::Starter).unwrap(), "\"starter\"");
        assert_eq!(serde_json::to_string(&BlockKind::Evaluator).unwrap(), "\"evaluator\"");
        let kind: BlockKind = serde_json::from_str("\"router\"").unwrap();
        assert_eq!(kind, BlockKind::Router);
    }

    #[test]
    fn loop_kind_serde_names() {
        assert_eq!(serde_json::to_string(&LoopKind::For).unwrap(), "\"for\"");
        assert_eq!(serde_json::to_string(&LoopKind::ForEach).unwrap(), "\"forEach\"");
    }

    #[test]
    fn decision_and_container_queries() {
        assert!(BlockKind::Condition.is_decision());
        assert!(BlockKind::Router.is_decision());
        assert!(!BlockKind::Function.is_decision());
        assert!(BlockKind::Loop.is_container());
        assert!(BlockKind::Parallel.is_container());
        assert!(!BlockKind::Api.is_container());
    }

    #[test]
    fn starter_lookup() {
        let wf = two_block_workflow();
        assert_eq!(wf.starter().unwrap().id, BlockId::new("start"));
    }

    #[test]
    fn starter_lookup_ignores_disabled() {
        let mut wf = two_block_workflow();
        wf.blocks.get_mut("start").unwrap().enabled = false;
        assert!(wf.starter().is_none());
    }

    #[test]
    fn starter_lookup_rejects_duplicates() {
        let mut wf = two_block_workflow();
        let extra = Block::new("start2", BlockKind::Starter, "Another");
        wf.blocks.insert(extra.id.clone(), extra);
        assert!(wf.starter().is_none());
    }

    #[test]
    fn loop_membership_lookup() {
        let mut wf = two_block_workflow();
        let container = Block::new("loop-1", BlockKind::Loop, "Loop");
        wf.blocks.insert(container.id.clone(), container);
        wf.loops.insert(
            LoopId::new("loop-1"),
            LoopSpec {
                nodes: [BlockId::new("f1")].into(),
                loop_type: LoopKind::For,
                iterations: Some(3),
                for_each_items: None,
            },
        );

        let (lid, _) = wf.loop_containing(&BlockId::new("f1")).unwrap();
        assert_eq!(lid, &LoopId::new("loop-1"));
        assert!(wf.loop_containing(&BlockId::new("start")).is_none());
    }

    #[test]
    fn workflow_document_roundtrip() {
        let wf = two_block_workflow();
        let json = serde_json::to_string(&wf).unwrap();
        let back: Workflow = serde_json::from_str(&json).unwrap();
        assert_eq!(back, wf);
    }

    #[test]
    fn workflow_document_field_names() {
        let doc = serde_json::json!({
            "version": "1",
            "blocks": {
                "start": {"id": "start", "type": "starter", "name": "Start"},
                "loop-1": {"id": "loop-1", "type": "loop", "name": "Loop"},
                "f1": {"id": "f1", "type": "function", "name": "Body"}
            },
            "connections": [
                {"source": "start", "target": "loop-1"},
                {"source": "loop-1", "target": "f1", "sourceHandle": "loop-start-source"}
            ],
            "loops": {
                "loop-1": {"nodes": ["f1"], "loopType": "forEach", "forEachItems": ["a", "b"]}
            }
        });
        let wf: Workflow = serde_json::from_value(doc).unwrap();
        let spec = &wf.loops[&LoopId::new("loop-1")];
        assert_eq!(spec.loop_type, LoopKind::ForEach);
        assert_eq!(spec.for_each_items, Some(serde_json::json!(["a", "b"])));
        // Defaults: params empty, enabled true.
        assert!(wf.blocks[&BlockId::new("f1")].enabled);
        assert!(wf.blocks[&BlockId::new("f1")].params.is_empty());
    }
}
