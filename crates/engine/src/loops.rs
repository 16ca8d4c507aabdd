//! Loop subflow bookkeeping.
//!
//! The scheduler owns one [`LoopRuntime`] per entered loop. Members run
//! under the main layer loop; when an iteration quiesces the runtime
//! collects the iteration result, resets the member scope, and re-arms the
//! entry members — or completes the loop and opens its `loop-end` boundary.

use std::collections::{BTreeSet, HashMap, HashSet};

use serde_json::Value;
use weft_block::handlers::LoopPlan;
use weft_core::{BlockId, LoopId, ParallelId};
use weft_execution::ExecutionContext;
use weft_workflow::{BlockKind, HandleKind, WorkflowGraph};

/// Runtime state of one entered loop.
#[derive(Debug)]
pub struct LoopRuntime {
    /// The resolved iteration plan.
    pub plan: LoopPlan,
    /// Per-iteration results collected so far.
    pub results: Vec<Value>,
}

impl LoopRuntime {
    /// Start tracking a loop from its resolved plan.
    #[must_use]
    pub fn new(plan: LoopPlan) -> Self {
        Self {
            plan,
            results: Vec::new(),
        }
    }

    /// The item exposed to iteration `k` (`forEach` element, or the index
    /// itself for `for` loops).
    #[must_use]
    pub fn item_for(&self, k: u32) -> Value {
        match &self.plan.items {
            Some(items) => items.get(k as usize).cloned().unwrap_or(Value::Null),
            None => Value::from(k),
        }
    }

    /// The container's aggregate output after completion.
    #[must_use]
    pub fn aggregate_output(&self) -> Value {
        let total = self.plan.total;
        let last_index = total.saturating_sub(1);
        serde_json::json!({
            "results": self.results,
            "currentIndex": last_index,
            "currentItem": self.item_for(last_index),
            "totalIterations": total,
        })
    }
}

/// The members activated by the container's `loop-start-source` edges.
#[must_use]
pub fn entry_members(graph: &WorkflowGraph<'_>, container: &BlockId) -> HashSet<BlockId> {
    graph
        .outgoing(container)
        .iter()
        .filter(|conn| conn.handle_kind() == HandleKind::LoopStart)
        .map(|conn| conn.target.clone())
        .collect()
}

/// Entry members of every loop, for back-edge detection in the ready set.
#[must_use]
pub fn all_entry_members(
    graph: &WorkflowGraph<'_>,
) -> HashSet<BlockId> {
    graph
        .workflow()
        .loops
        .keys()
        .flat_map(|lid| entry_members(graph, &lid.as_block_id()))
        .collect()
}

/// The members whose outputs form an iteration's result: members with no
/// intra-loop outgoing edge, ignoring back edges into entry members.
#[must_use]
pub fn exit_members(
    graph: &WorkflowGraph<'_>,
    nodes: &BTreeSet<BlockId>,
    entries: &HashSet<BlockId>,
) -> Vec<BlockId> {
    nodes
        .iter()
        .filter(|member| {
            !graph
                .outgoing(member)
                .iter()
                .any(|conn| nodes.contains(&conn.target) && !entries.contains(&conn.target))
        })
        .cloned()
        .collect()
}

/// Collect one iteration's result from the exit members' outputs.
///
/// A single exit member contributes its output verbatim; several contribute
/// an object keyed by block name.
#[must_use]
pub fn iteration_result(
    ctx: &ExecutionContext,
    graph: &WorkflowGraph<'_>,
    nodes: &BTreeSet<BlockId>,
    entries: &HashSet<BlockId>,
) -> Value {
    let exits = exit_members(graph, nodes, entries);
    let mut collected: Vec<(&BlockId, Value)> = exits
        .iter()
        .filter_map(|id| ctx.output_of(id).map(|v| (id, v.clone())))
        .collect();

    match collected.len() {
        0 => Value::Null,
        1 => collected.remove(0).1,
        _ => {
            let mut map = serde_json::Map::new();
            for (id, value) in collected {
                let name = ctx
                    .workflow
                    .block(id)
                    .map_or_else(|| id.to_string(), |b| b.name.clone());
                map.insert(name, value);
            }
            Value::Object(map)
        }
    }
}

/// Has the current iteration of `spec` quiesced?
///
/// True when no member can still execute: each member is either done or
/// unreachable in this iteration.
#[must_use]
pub fn iteration_quiesced(
    ctx: &ExecutionContext,
    graph: &WorkflowGraph<'_>,
    nodes: &BTreeSet<BlockId>,
    entries: &HashSet<BlockId>,
) -> bool {
    nodes
        .iter()
        .all(|member| ctx.is_executed(member) || !member_pending(ctx, graph, member, entries))
}

/// A member is pending if it is unexecuted but could still run this
/// iteration (ready now, or waiting on another live member).
fn member_pending(
    ctx: &ExecutionContext,
    graph: &WorkflowGraph<'_>,
    member: &BlockId,
    entries: &HashSet<BlockId>,
) -> bool {
    // An entered nested loop keeps the enclosing scope open until it
    // finishes all of its own iterations.
    if ctx.workflow.block(member).is_some_and(|b| b.kind == BlockKind::Loop)
        && ctx.is_executed(member)
    {
        return !ctx.completed_loops.contains(&LoopId::new(member.as_str()));
    }
    if ctx.is_executed(member) {
        return false;
    }
    if crate::path::is_ready(ctx, graph, member, entries) {
        return true;
    }
    // Not ready: it still counts as pending when an unexecuted live member
    // upstream of it exists in the same scope.
    if !ctx.active_execution_path.contains(member)
        && !crate::path::is_in_active_path(ctx, graph, member)
    {
        return false;
    }
    graph.incoming(member).iter().any(|conn| {
        matches!(
            crate::path::edge_status(ctx, graph, conn),
            crate::path::EdgeStatus::Pending
        )
    })
}

/// Reset iteration-scoped state for a loop's members, including nested
/// container bookkeeping so inner subflows re-run on the next pass.
pub fn reset_members(ctx: &mut ExecutionContext, members: &BTreeSet<BlockId>) {
    ctx.reset_scope(members.iter());
    for member in members {
        let kind = ctx.workflow.block(member).map(|b| b.kind);
        match kind {
            Some(BlockKind::Loop) => {
                let lid = LoopId::new(member.as_str());
                ctx.completed_loops.remove(&lid);
                ctx.loop_iterations.remove(&lid);
                ctx.loop_items.remove(&lid);
                // The nested loop's own members restart with it.
                let nested = ctx.workflow.loops.get(&lid).map(|spec| spec.nodes.clone());
                if let Some(nested) = nested {
                    reset_members(ctx, &nested);
                }
            }
            Some(BlockKind::Parallel) => {
                let pid = ParallelId::new(member.as_str());
                ctx.completed_parallels.remove(&pid);
            }
            _ => {}
        }
    }
}

/// Iteration variables for a member of `loop_id` at iteration `k`.
#[must_use]
pub fn iteration_vars(k: u32, item: &Value) -> HashMap<String, Value> {
    HashMap::from([
        ("index".to_owned(), Value::from(k)),
        ("currentIndex".to_owned(), Value::from(k)),
        ("item".to_owned(), item.clone()),
        ("currentItem".to_owned(), item.clone()),
    ])
}
