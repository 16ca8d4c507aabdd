//! The path tracker.
//!
//! After any block finishes, [`update_active_path`] decides which outgoing
//! edges activate their targets — routers and conditions activate only what
//! they selected, loop and parallel boundaries wait for their container
//! logic, everything else activates unconditionally. The ready-set side
//! ([`is_ready`]) is the dual: a block runs once it is active, unexecuted,
//! at least one incoming edge has fired, and no incoming edge can still
//! fire.

use std::collections::HashSet;

use serde_json::Value;
use tracing::debug;
use weft_core::{BlockId, LoopId, ParallelId};
use weft_execution::ExecutionContext;
use weft_workflow::{BlockKind, Connection, HandleKind, WorkflowGraph};

/// What one incoming edge can still contribute to its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeStatus {
    /// The edge has fired; it justifies executing the target.
    Satisfied,
    /// The edge has not fired but still can; the target must wait.
    Pending,
    /// The edge can never fire (decision went elsewhere, source pruned).
    Dead,
}

/// Apply the activation rules for every block that just finished.
///
/// Decision outputs must carry their selection fields by the time they get
/// here — the executor validates that before folding (a decision block
/// without a selection is a fatal handler bug).
pub fn update_active_path(
    ctx: &mut ExecutionContext,
    graph: &WorkflowGraph<'_>,
    finished: &[BlockId],
) {
    for block_id in finished {
        let Some(block) = ctx.workflow.block(block_id) else {
            continue;
        };
        match block.kind {
            BlockKind::Router => activate_router_selection(ctx, block_id),
            BlockKind::Condition => activate_condition_branch(ctx, graph, block_id),
            BlockKind::Loop => activate_loop_entry(ctx, graph, block_id),
            // Parallel fan-out and fan-in are owned by the branch
            // orchestration; the container's completion activates nothing
            // here.
            BlockKind::Parallel => {}
            _ => activate_default_edges(ctx, graph, block_id),
        }
    }
}

fn activate_router_selection(ctx: &mut ExecutionContext, router: &BlockId) {
    let target = ctx
        .output_of(router)
        .and_then(|out| out.pointer("/selectedPath/blockId"))
        .and_then(Value::as_str)
        .map(BlockId::new);
    if let Some(target) = target {
        debug!(%router, %target, "router decision gates the path");
        ctx.decisions.router.insert(router.clone(), target.clone());
        ctx.activate(target);
    }
}

fn activate_condition_branch(
    ctx: &mut ExecutionContext,
    graph: &WorkflowGraph<'_>,
    condition: &BlockId,
) {
    let selected = ctx
        .output_of(condition)
        .and_then(|out| out.get("selectedConditionId"))
        .and_then(Value::as_str)
        .map(str::to_owned);
    let Some(selected) = selected else {
        return;
    };
    ctx.decisions
        .condition
        .insert(condition.clone(), selected.clone());

    let targets: Vec<BlockId> = graph
        .outgoing(condition)
        .iter()
        .filter(|conn| {
            conn.source_handle
                .as_ref()
                .is_some_and(|h| h.matches_condition(condition, &selected))
        })
        .map(|conn| conn.target.clone())
        .collect();
    for target in targets {
        debug!(%condition, branch = %selected, %target, "condition branch activates");
        ctx.activate(target);
    }
}

/// A loop container's completion activates its first-iteration members. The
/// `loop-end-source` successors are activated by the loop completion logic
/// instead.
fn activate_loop_entry(ctx: &mut ExecutionContext, graph: &WorkflowGraph<'_>, container: &BlockId) {
    let targets: Vec<BlockId> = graph
        .outgoing(container)
        .iter()
        .filter(|conn| conn.handle_kind() == HandleKind::LoopStart)
        .map(|conn| conn.target.clone())
        .collect();
    for target in targets {
        ctx.activate(target);
    }
}

fn activate_default_edges(
    ctx: &mut ExecutionContext,
    graph: &WorkflowGraph<'_>,
    block_id: &BlockId,
) {
    let targets: Vec<BlockId> = graph
        .outgoing(block_id)
        .iter()
        .filter(|conn| {
            matches!(conn.handle_kind(), HandleKind::Default | HandleKind::Custom)
        })
        .map(|conn| conn.target.clone())
        .collect();
    for target in targets {
        ctx.activate(target);
    }
}

/// Activate the targets of a container's `loop-end-source` or
/// `parallel-end-source` edges once the subflow completed.
pub fn activate_boundary_exit(
    ctx: &mut ExecutionContext,
    graph: &WorkflowGraph<'_>,
    container: &BlockId,
    kind: HandleKind,
) {
    let targets: Vec<BlockId> = graph
        .outgoing(container)
        .iter()
        .filter(|conn| conn.handle_kind() == kind)
        .map(|conn| conn.target.clone())
        .collect();
    for target in targets {
        ctx.activate(target);
    }
}

/// Activate the targets of a container's start-boundary edges (used when a
/// loop re-arms for its next iteration, and to seed parallel branches).
pub fn activate_boundary_entry(
    ctx: &mut ExecutionContext,
    graph: &WorkflowGraph<'_>,
    container: &BlockId,
    kind: HandleKind,
) {
    activate_boundary_exit(ctx, graph, container, kind);
}

/// Transitive decision-gated membership in the active path.
///
/// A block is in the active path if the tracker activated it, or if some
/// incoming edge comes from a block in the active path and no decision
/// along that edge went elsewhere.
#[must_use]
pub fn is_in_active_path(
    ctx: &ExecutionContext,
    graph: &WorkflowGraph<'_>,
    block_id: &BlockId,
) -> bool {
    fn walk(
        ctx: &ExecutionContext,
        graph: &WorkflowGraph<'_>,
        block_id: &BlockId,
        visited: &mut HashSet<BlockId>,
    ) -> bool {
        if ctx.active_execution_path.contains(block_id) {
            return true;
        }
        if !visited.insert(block_id.clone()) {
            return false;
        }
        for conn in graph.incoming(block_id) {
            let source_kind = ctx.workflow.block(&conn.source).map(|b| b.kind);
            let gate_open = match source_kind {
                Some(BlockKind::Router) => ctx
                    .decisions
                    .router
                    .get(&conn.source)
                    .is_none_or(|sel| sel == block_id),
                Some(BlockKind::Condition) => match ctx.decisions.condition.get(&conn.source) {
                    Some(selected) => conn
                        .source_handle
                        .as_ref()
                        .is_some_and(|h| h.matches_condition(&conn.source, selected)),
                    None => true,
                },
                _ => true,
            };
            if gate_open && walk(ctx, graph, &conn.source, visited) {
                return true;
            }
        }
        false
    }

    let mut visited = HashSet::new();
    walk(ctx, graph, block_id, &mut visited)
}

/// Could `block_id` still execute in the current iteration scope?
///
/// Used to distinguish `Pending` edges (wait for them) from `Dead` ones
/// (ignore them). A block can still execute while it is unexecuted and
/// either already active or downstream of something that is.
fn could_execute(
    ctx: &ExecutionContext,
    graph: &WorkflowGraph<'_>,
    block_id: &BlockId,
    visited: &mut HashSet<BlockId>,
) -> bool {
    if ctx.is_executed(block_id) {
        return false;
    }
    let Some(block) = ctx.workflow.block(block_id) else {
        return false;
    };
    if !block.enabled {
        return false;
    }
    if ctx.active_execution_path.contains(block_id) {
        return true;
    }
    if !visited.insert(block_id.clone()) {
        return false;
    }

    for conn in graph.incoming(block_id) {
        let source = &conn.source;
        // A decision that already went elsewhere kills this edge.
        match ctx.workflow.block(source).map(|b| b.kind) {
            Some(BlockKind::Router) => {
                if ctx
                    .decisions
                    .router
                    .get(source)
                    .is_some_and(|sel| sel != block_id)
                {
                    continue;
                }
            }
            Some(BlockKind::Condition) => {
                if let Some(selected) = ctx.decisions.condition.get(source) {
                    let matches = conn
                        .source_handle
                        .as_ref()
                        .is_some_and(|h| h.matches_condition(source, selected));
                    if !matches {
                        continue;
                    }
                }
            }
            _ => {}
        }

        // Boundary exits fire when the container completes, which can still
        // happen while the container is executed-but-incomplete.
        let source_live = match conn.handle_kind() {
            HandleKind::LoopEnd => {
                let lid = LoopId::new(source.as_str());
                !ctx.completed_loops.contains(&lid)
                    && (ctx.is_executed(source)
                        || could_execute(ctx, graph, source, visited))
            }
            HandleKind::ParallelEnd => {
                let pid = ParallelId::new(source.as_str());
                !ctx.completed_parallels.contains(&pid)
                    && (ctx.is_executed(source)
                        || could_execute(ctx, graph, source, visited))
            }
            _ => could_execute(ctx, graph, source, visited),
        };
        if source_live {
            return true;
        }
    }
    false
}

/// Status of one incoming edge with respect to its target.
#[must_use]
pub fn edge_status(
    ctx: &ExecutionContext,
    graph: &WorkflowGraph<'_>,
    conn: &Connection,
) -> EdgeStatus {
    let source = &conn.source;
    let source_kind = ctx.workflow.block(source).map(|b| b.kind);

    match conn.handle_kind() {
        HandleKind::LoopEnd => {
            let lid = LoopId::new(source.as_str());
            if ctx.completed_loops.contains(&lid) {
                return EdgeStatus::Satisfied;
            }
            return pending_or_dead(ctx, graph, source, true);
        }
        HandleKind::ParallelEnd => {
            let pid = ParallelId::new(source.as_str());
            if ctx.completed_parallels.contains(&pid) {
                return EdgeStatus::Satisfied;
            }
            return pending_or_dead(ctx, graph, source, true);
        }
        HandleKind::LoopStart | HandleKind::ParallelStart => {
            if ctx.is_executed(source) {
                return EdgeStatus::Satisfied;
            }
            return pending_or_dead(ctx, graph, source, false);
        }
        HandleKind::ConditionBranch => {
            if let Some(selected) = ctx.decisions.condition.get(source) {
                let matches = conn
                    .source_handle
                    .as_ref()
                    .is_some_and(|h| h.matches_condition(source, selected));
                return if matches {
                    EdgeStatus::Satisfied
                } else {
                    EdgeStatus::Dead
                };
            }
            return pending_or_dead(ctx, graph, source, false);
        }
        HandleKind::Default | HandleKind::Custom => {}
    }

    if source_kind == Some(BlockKind::Router) {
        if let Some(selected) = ctx.decisions.router.get(source) {
            return if selected == &conn.target {
                EdgeStatus::Satisfied
            } else {
                EdgeStatus::Dead
            };
        }
        return pending_or_dead(ctx, graph, source, false);
    }

    if ctx.is_executed(source) {
        EdgeStatus::Satisfied
    } else {
        pending_or_dead(ctx, graph, source, false)
    }
}

fn pending_or_dead(
    ctx: &ExecutionContext,
    graph: &WorkflowGraph<'_>,
    source: &BlockId,
    executed_counts_as_live: bool,
) -> EdgeStatus {
    let mut visited = HashSet::new();
    let live = (executed_counts_as_live && ctx.is_executed(source))
        || could_execute(ctx, graph, source, &mut visited);
    if live {
        EdgeStatus::Pending
    } else {
        EdgeStatus::Dead
    }
}

/// Is this block in the next ready layer?
///
/// Back-edges inside a loop (an intra-loop edge pointing at an entry member)
/// are excluded from the wait set — they encode the next iteration, not an
/// intra-iteration dependency.
#[must_use]
pub fn is_ready(
    ctx: &ExecutionContext,
    graph: &WorkflowGraph<'_>,
    block_id: &BlockId,
    loop_entry_members: &HashSet<BlockId>,
) -> bool {
    if ctx.is_executed(block_id) {
        return false;
    }
    let Some(block) = ctx.workflow.block(block_id) else {
        return false;
    };
    if !block.enabled {
        return false;
    }
    if !ctx.active_execution_path.contains(block_id) {
        return false;
    }
    if !is_in_active_path(ctx, graph, block_id) {
        return false;
    }

    let incoming = graph.incoming(block_id);
    if incoming.is_empty() {
        return true;
    }

    let mut satisfied = false;
    for conn in incoming {
        // Back edge: both endpoints in the same loop and the target is an
        // entry member.
        let same_loop = ctx
            .workflow
            .loop_containing(block_id)
            .is_some_and(|(_, spec)| spec.nodes.contains(&conn.source));
        if same_loop && loop_entry_members.contains(block_id) {
            continue;
        }

        match edge_status(ctx, graph, conn) {
            EdgeStatus::Satisfied => satisfied = true,
            EdgeStatus::Pending => return false,
            EdgeStatus::Dead => {}
        }
    }
    satisfied
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, HashMap};
    use std::sync::Arc;
    use weft_core::ExecutionId;
    use weft_workflow::{Block, SourceHandle, Workflow};

    fn block(id: &str, kind: BlockKind) -> Block {
        Block::new(id, kind, id.to_uppercase())
    }

    fn make_ctx(workflow: Workflow) -> ExecutionContext {
        ExecutionContext::new(ExecutionId::v4(), Arc::new(workflow), HashMap::new())
    }

    fn condition_workflow() -> Workflow {
        // start -> cond -(cond1)-> f2
        //               -(else1)-> p1 -> merge <- f2
        let cond = BlockId::new("cond");
        Workflow {
            version: "1".into(),
            blocks: [
                block("start", BlockKind::Starter),
                block("cond", BlockKind::Condition),
                block("f2", BlockKind::Function),
                block("p1", BlockKind::Function),
                block("merge", BlockKind::Function),
            ]
            .into_iter()
            .map(|b| (b.id.clone(), b))
            .collect(),
            connections: vec![
                Connection::new("start", "cond"),
                Connection::new("cond", "f2")
                    .with_handle(SourceHandle::condition_branch(&cond, "cond1")),
                Connection::new("cond", "p1")
                    .with_handle(SourceHandle::condition_branch(&cond, "else1")),
                Connection::new("f2", "merge"),
                Connection::new("p1", "merge"),
            ],
            loops: BTreeMap::new(),
            parallels: BTreeMap::new(),
        }
    }

    #[test]
    fn condition_activates_only_selected_branch() {
        let workflow = condition_workflow();
        let mut ctx = make_ctx(workflow);
        let workflow = Arc::clone(&ctx.workflow);
        let graph = WorkflowGraph::new(&workflow);

        ctx.activate(BlockId::new("cond"));
        ctx.record_output(
            BlockId::new("cond"),
            serde_json::json!({
                "conditionResult": true,
                "selectedPath": {"blockId": "f2"},
                "selectedConditionId": "cond1",
            }),
            1,
        );
        update_active_path(&mut ctx, &graph, &[BlockId::new("cond")]);

        assert!(ctx.active_execution_path.contains(&BlockId::new("f2")));
        assert!(!ctx.active_execution_path.contains(&BlockId::new("p1")));
        assert_eq!(
            ctx.decisions.condition.get(&BlockId::new("cond")),
            Some(&"cond1".to_owned())
        );
    }

    #[test]
    fn router_decision_gates_path() {
        let workflow = Workflow {
            version: "1".into(),
            blocks: [
                block("router", BlockKind::Router),
                block("t1", BlockKind::Function),
                block("t2", BlockKind::Function),
            ]
            .into_iter()
            .map(|b| (b.id.clone(), b))
            .collect(),
            connections: vec![
                Connection::new("router", "t1"),
                Connection::new("router", "t2"),
            ],
            loops: BTreeMap::new(),
            parallels: BTreeMap::new(),
        };
        let mut ctx = make_ctx(workflow);
        let workflow = Arc::clone(&ctx.workflow);
        let graph = WorkflowGraph::new(&workflow);

        ctx.activate(BlockId::new("router"));
        ctx.record_output(
            BlockId::new("router"),
            serde_json::json!({"selectedPath": {"blockId": "t1"}}),
            1,
        );
        update_active_path(&mut ctx, &graph, &[BlockId::new("router")]);

        assert!(ctx.active_execution_path.contains(&BlockId::new("t1")));
        assert!(!ctx.active_execution_path.contains(&BlockId::new("t2")));
        assert_eq!(
            ctx.decisions.router.get(&BlockId::new("router")),
            Some(&BlockId::new("t1"))
        );

        // The unselected target is not in the active path, transitively.
        assert!(is_in_active_path(&ctx, &graph, &BlockId::new("t1")));
        assert!(!is_in_active_path(&ctx, &graph, &BlockId::new("t2")));
    }

    #[test]
    fn merge_after_condition_ignores_dead_branch() {
        let workflow = condition_workflow();
        let mut ctx = make_ctx(workflow);
        let workflow = Arc::clone(&ctx.workflow);
        let graph = WorkflowGraph::new(&workflow);
        let no_loops = HashSet::new();

        // start and cond executed; cond chose cond1 (f2).
        for id in ["start", "cond"] {
            ctx.activate(BlockId::new(id));
            ctx.record_output(BlockId::new(id), serde_json::Value::Null, 0);
        }
        ctx.record_output(
            BlockId::new("cond"),
            serde_json::json!({
                "selectedPath": {"blockId": "f2"},
                "selectedConditionId": "cond1",
            }),
            0,
        );
        update_active_path(&mut ctx, &graph, &[BlockId::new("cond")]);

        // f2 is ready; merge waits for f2, not for the dead p1.
        assert!(is_ready(&ctx, &graph, &BlockId::new("f2"), &no_loops));
        ctx.record_output(BlockId::new("f2"), serde_json::Value::Null, 0);
        update_active_path(&mut ctx, &graph, &[BlockId::new("f2")]);

        assert!(is_ready(&ctx, &graph, &BlockId::new("merge"), &no_loops));
    }

    #[test]
    fn merge_waits_for_pending_branch() {
        // start fans out to a and b, both feed merge; only a is done.
        let workflow = Workflow {
            version: "1".into(),
            blocks: [
                block("start", BlockKind::Starter),
                block("a", BlockKind::Function),
                block("b", BlockKind::Function),
                block("merge", BlockKind::Function),
            ]
            .into_iter()
            .map(|b| (b.id.clone(), b))
            .collect(),
            connections: vec![
                Connection::new("start", "a"),
                Connection::new("start", "b"),
                Connection::new("a", "merge"),
                Connection::new("b", "merge"),
            ],
            loops: BTreeMap::new(),
            parallels: BTreeMap::new(),
        };
        let mut ctx = make_ctx(workflow);
        let workflow = Arc::clone(&ctx.workflow);
        let graph = WorkflowGraph::new(&workflow);
        let no_loops = HashSet::new();

        ctx.activate(BlockId::new("start"));
        ctx.record_output(BlockId::new("start"), serde_json::Value::Null, 0);
        update_active_path(&mut ctx, &graph, &[BlockId::new("start")]);

        ctx.record_output(BlockId::new("a"), serde_json::Value::Null, 0);
        update_active_path(&mut ctx, &graph, &[BlockId::new("a")]);

        // b is still pending, so merge must wait.
        assert!(!is_ready(&ctx, &graph, &BlockId::new("merge"), &no_loops));

        ctx.record_output(BlockId::new("b"), serde_json::Value::Null, 0);
        update_active_path(&mut ctx, &graph, &[BlockId::new("b")]);
        assert!(is_ready(&ctx, &graph, &BlockId::new("merge"), &no_loops));
    }

    #[test]
    fn loop_end_edge_waits_for_completion() {
        let workflow = Workflow {
            version: "1".into(),
            blocks: [
                block("start", BlockKind::Starter),
                block("loop-1", BlockKind::Loop),
                block("body", BlockKind::Function),
                block("after", BlockKind::Function),
            ]
            .into_iter()
            .map(|b| (b.id.clone(), b))
            .collect(),
            connections: vec![
                Connection::new("start", "loop-1"),
                Connection::new("loop-1", "body").with_handle(SourceHandle::loop_start()),
                Connection::new("loop-1", "after").with_handle(SourceHandle::loop_end()),
            ],
            loops: [(
                LoopId::new("loop-1"),
                weft_workflow::LoopSpec {
                    nodes: [BlockId::new("body")].into(),
                    loop_type: weft_workflow::LoopKind::For,
                    iterations: Some(2),
                    for_each_items: None,
                },
            )]
            .into(),
            parallels: BTreeMap::new(),
        };
        let mut ctx = make_ctx(workflow);
        let workflow = Arc::clone(&ctx.workflow);
        let graph = WorkflowGraph::new(&workflow);
        let no_loops = HashSet::new();

        ctx.activate(BlockId::new("start"));
        ctx.record_output(BlockId::new("start"), serde_json::Value::Null, 0);
        update_active_path(&mut ctx, &graph, &[BlockId::new("start")]);

        // Container executes, members activate, successor stays held back.
        ctx.record_output(BlockId::new("loop-1"), serde_json::Value::Null, 0);
        update_active_path(&mut ctx, &graph, &[BlockId::new("loop-1")]);
        ctx.activate(BlockId::new("after"));

        assert!(ctx.active_execution_path.contains(&BlockId::new("body")));
        assert!(is_ready(&ctx, &graph, &BlockId::new("body"), &no_loops));
        assert!(!is_ready(&ctx, &graph, &BlockId::new("after"), &no_loops));

        // Completion opens the loop-end edge.
        ctx.completed_loops.insert(LoopId::new("loop-1"));
        assert!(is_ready(&ctx, &graph, &BlockId::new("after"), &no_loops));
    }

    #[test]
    fn back_edge_to_entry_member_is_ignored() {
        let workflow = Workflow {
            version: "1".into(),
            blocks: [
                block("loop-1", BlockKind::Loop),
                block("a", BlockKind::Function),
                block("b", BlockKind::Function),
            ]
            .into_iter()
            .map(|b| (b.id.clone(), b))
            .collect(),
            connections: vec![
                Connection::new("loop-1", "a").with_handle(SourceHandle::loop_start()),
                Connection::new("a", "b"),
                Connection::new("b", "a"),
            ],
            loops: [(
                LoopId::new("loop-1"),
                weft_workflow::LoopSpec {
                    nodes: [BlockId::new("a"), BlockId::new("b")].into(),
                    loop_type: weft_workflow::LoopKind::For,
                    iterations: Some(2),
                    for_each_items: None,
                },
            )]
            .into(),
            parallels: BTreeMap::new(),
        };
        let mut ctx = make_ctx(workflow);
        let workflow = Arc::clone(&ctx.workflow);
        let graph = WorkflowGraph::new(&workflow);
        let entries: HashSet<BlockId> = [BlockId::new("a")].into();

        ctx.record_output(BlockId::new("loop-1"), serde_json::Value::Null, 0);
        update_active_path(&mut ctx, &graph, &[BlockId::new("loop-1")]);

        // a must not wait for the back edge from b.
        assert!(is_ready(&ctx, &graph, &BlockId::new("a"), &entries));
        assert!(!is_ready(&ctx, &graph, &BlockId::new("b"), &entries));
    }
}
