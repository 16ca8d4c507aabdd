//! Parallel subflow orchestration helpers.
//!
//! A parallel container fans its member subgraph out into isolated branch
//! contexts — copy-on-write views of the outer state with the member blocks
//! cleared — and each branch runs under its own nested mini-scheduler. The
//! executor drives the branches; this module owns seeding, branch variables,
//! and result aggregation.

use std::collections::{HashMap, HashSet};

use serde_json::Value;
use weft_core::{BlockId, ExecutionId, ParallelId};
use weft_execution::{BlockLog, Decisions, ExecutionContext, RunError, RunStatus};
use weft_workflow::{HandleKind, ParallelSpec, WorkflowGraph};

/// Everything a branch context is built from, captured at dispatch time so
/// branch construction does not borrow the live context.
#[derive(Debug, Clone)]
pub struct BranchSeed {
    /// The run id (branches share it; their logs interleave into the run's).
    pub execution_id: ExecutionId,
    /// The workflow.
    pub workflow: std::sync::Arc<weft_workflow::Workflow>,
    /// Outer block outputs, minus the member blocks.
    pub outputs: HashMap<BlockId, Value>,
    /// Outer executed set, minus the member blocks.
    pub executed: HashSet<BlockId>,
    /// Outer decisions.
    pub decisions: Decisions,
    /// Run environment.
    pub environment: HashMap<String, String>,
}

impl BranchSeed {
    /// Capture a seed from the outer context, excluding `spec`'s members.
    #[must_use]
    pub fn capture(ctx: &ExecutionContext, spec: &ParallelSpec) -> Self {
        let outputs = ctx
            .block_states
            .iter()
            .filter(|(id, state)| state.executed && !spec.nodes.contains(*id))
            .map(|(id, state)| (id.clone(), state.output.clone()))
            .collect();
        let executed = ctx
            .executed_blocks
            .iter()
            .filter(|id| !spec.nodes.contains(*id))
            .cloned()
            .collect();
        Self {
            execution_id: ctx.execution_id,
            workflow: std::sync::Arc::clone(&ctx.workflow),
            outputs,
            executed,
            decisions: ctx.decisions.clone(),
            environment: ctx.environment.clone(),
        }
    }

    /// Build one branch's isolated context: the container counts as executed
    /// (holding the resolved plan), and the `parallel-start-source` targets
    /// are active.
    #[must_use]
    pub fn branch_context(&self, container: &BlockId, plan_value: &Value) -> ExecutionContext {
        let mut ctx = ExecutionContext::new(
            self.execution_id,
            std::sync::Arc::clone(&self.workflow),
            self.environment.clone(),
        );
        // A fresh context starts in Created; branches are born running.
        let _ = ctx.transition(RunStatus::Running);
        for (id, output) in &self.outputs {
            ctx.record_output(id.clone(), output.clone(), 0);
        }
        for id in &self.executed {
            ctx.executed_blocks.insert(id.clone());
        }
        ctx.decisions = self.decisions.clone();
        ctx.record_output(container.clone(), plan_value.clone(), 0);

        let graph = WorkflowGraph::new(&self.workflow);
        let targets: Vec<BlockId> = graph
            .outgoing(container)
            .iter()
            .filter(|conn| conn.handle_kind() == HandleKind::ParallelStart)
            .map(|conn| conn.target.clone())
            .collect();
        for target in targets {
            ctx.activate(target);
        }
        ctx
    }
}

/// Variables exposed to the members of one branch.
#[must_use]
pub fn branch_vars(index: u32, item: Option<&Value>) -> HashMap<String, Value> {
    let item = item.cloned().unwrap_or(Value::from(index));
    HashMap::from([
        ("index".to_owned(), Value::from(index)),
        ("currentIndex".to_owned(), Value::from(index)),
        ("item".to_owned(), item.clone()),
        ("currentItem".to_owned(), item),
    ])
}

/// What one branch produced.
#[derive(Debug)]
pub struct BranchOutcome {
    /// The branch id (0-based slot in `results`).
    pub index: u32,
    /// The branch's result value, or its captured failure.
    pub result: Result<Value, RunError>,
    /// Activation records from inside the branch.
    pub logs: Vec<BlockLog>,
    /// A response block's output, if one fired inside the branch.
    pub response: Option<Value>,
}

/// The failure value recorded in a failed branch's result slot.
#[must_use]
pub fn error_slot(error: &RunError) -> Value {
    serde_json::json!({
        "error": {
            "kind": error.kind,
            "message": error.message,
            "blockId": error.block_id,
        }
    })
}

/// The container's aggregate output.
#[must_use]
pub fn aggregate_output(slots: &[Value]) -> Value {
    serde_json::json!({
        "results": slots,
        "totalBranches": slots.len(),
    })
}

/// The parallel's entry members (`parallel-start-source` targets).
#[must_use]
pub fn entry_members(graph: &WorkflowGraph<'_>, container: &BlockId) -> HashSet<BlockId> {
    graph
        .outgoing(container)
        .iter()
        .filter(|conn| conn.handle_kind() == HandleKind::ParallelStart)
        .map(|conn| conn.target.clone())
        .collect()
}

/// The parallel id of a container block.
#[must_use]
pub fn parallel_id(container: &BlockId) -> ParallelId {
    ParallelId::new(container.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use weft_execution::RunErrorKind;
    use weft_workflow::{Block, BlockKind, Connection, ParallelKind, SourceHandle, Workflow};

    fn parallel_workflow() -> Arc<Workflow> {
        Arc::new(Workflow {
            version: "1".into(),
            blocks: [
                Block::new("start", BlockKind::Starter, "Start"),
                Block::new("par-1", BlockKind::Parallel, "Fan"),
                Block::new("body", BlockKind::Function, "Body"),
            ]
            .into_iter()
            .map(|b| (b.id.clone(), b))
            .collect(),
            connections: vec![
                Connection::new("start", "par-1"),
                Connection::new("par-1", "body").with_handle(SourceHandle::parallel_start()),
            ],
            loops: BTreeMap::new(),
            parallels: [(
                ParallelId::new("par-1"),
                ParallelSpec {
                    nodes: [BlockId::new("body")].into(),
                    parallel_type: ParallelKind::Count,
                    count: Some(2),
                    distribution: None,
                },
            )]
            .into(),
        })
    }

    #[test]
    fn seed_excludes_member_state() {
        let workflow = parallel_workflow();
        let mut ctx =
            ExecutionContext::new(ExecutionId::v4(), Arc::clone(&workflow), HashMap::new());
        ctx.record_output(BlockId::new("start"), Value::from("env"), 0);
        ctx.record_output(BlockId::new("body"), Value::from("stale"), 0);

        let spec = &workflow.parallels[&ParallelId::new("par-1")];
        let seed = BranchSeed::capture(&ctx, spec);

        assert!(seed.outputs.contains_key(&BlockId::new("start")));
        assert!(!seed.outputs.contains_key(&BlockId::new("body")));
        assert!(!seed.executed.contains(&BlockId::new("body")));
    }

    #[test]
    fn branch_context_is_born_running_with_entries_active() {
        let workflow = parallel_workflow();
        let mut ctx =
            ExecutionContext::new(ExecutionId::v4(), Arc::clone(&workflow), HashMap::new());
        ctx.record_output(BlockId::new("start"), Value::from("env"), 0);

        let spec = &workflow.parallels[&ParallelId::new("par-1")];
        let seed = BranchSeed::capture(&ctx, spec);
        let branch = seed.branch_context(&BlockId::new("par-1"), &serde_json::json!({"total": 2}));

        assert_eq!(branch.status, RunStatus::Running);
        assert!(branch.is_executed(&BlockId::new("par-1")));
        assert!(branch.is_executed(&BlockId::new("start")));
        assert!(branch.active_execution_path.contains(&BlockId::new("body")));
        assert!(!branch.is_executed(&BlockId::new("body")));
    }

    #[test]
    fn branch_vars_default_item_is_the_index() {
        let vars = branch_vars(3, None);
        assert_eq!(vars["index"], Value::from(3));
        assert_eq!(vars["currentItem"], Value::from(3));

        let vars = branch_vars(0, Some(&Value::from("a")));
        assert_eq!(vars["currentItem"], Value::from("a"));
        assert_eq!(vars["item"], Value::from("a"));
    }

    #[test]
    fn error_slot_shape() {
        let error = RunError::new(RunErrorKind::Handler, "boom").with_block(BlockId::new("body"));
        let slot = error_slot(&error);
        assert_eq!(slot["error"]["message"], "boom");
        assert_eq!(slot["error"]["kind"], "handler");
        assert_eq!(slot["error"]["blockId"], "body");
    }

    #[test]
    fn aggregate_shape() {
        let slots = vec![Value::from(0), Value::from(1)];
        let out = aggregate_output(&slots);
        assert_eq!(out["totalBranches"], 2);
        assert_eq!(out["results"][1], 1);
    }

    #[test]
    fn entry_member_lookup() {
        let workflow = parallel_workflow();
        let graph = WorkflowGraph::new(&workflow);
        assert_eq!(
            entry_members(&graph, &BlockId::new("par-1")),
            [BlockId::new("body")].into()
        );
    }
}
