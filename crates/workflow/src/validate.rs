//! Structural validation of serialized workflows.
//!
//! Everything here runs before the engine creates any execution state. Fatal
//! problems abort with [`WorkflowError`]; advisory oddities are returned as
//! [`ValidationWarning`]s for the caller to surface.

use std::collections::HashMap;

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use weft_core::BlockId;

use crate::connection::HandleKind;
use crate::error::{ValidationWarning, WorkflowError};
use crate::model::{BlockKind, LoopKind, ParallelKind, Workflow};

/// Run the full structural rule set.
pub fn validate(workflow: &Workflow) -> Result<Vec<ValidationWarning>, WorkflowError> {
    check_starter(workflow)?;
    check_endpoints(workflow)?;
    check_subflows(workflow)?;
    check_handles(workflow)?;
    check_cycles(workflow)?;
    Ok(collect_warnings(workflow))
}

fn check_starter(workflow: &Workflow) -> Result<(), WorkflowError> {
    let count = workflow
        .blocks
        .values()
        .filter(|b| b.kind == BlockKind::Starter && b.enabled)
        .count();
    match count {
        0 => Err(WorkflowError::MissingStarter),
        1 => Ok(()),
        n => Err(WorkflowError::MultipleStarters(n)),
    }
}

fn check_endpoints(workflow: &Workflow) -> Result<(), WorkflowError> {
    for conn in &workflow.connections {
        for endpoint in [&conn.source, &conn.target] {
            if !workflow.blocks.contains_key(endpoint) {
                return Err(WorkflowError::DanglingEndpoint {
                    edge_source: conn.source.clone(),
                    target: conn.target.clone(),
                    missing: endpoint.clone(),
                });
            }
        }
    }
    Ok(())
}

fn check_subflows(workflow: &Workflow) -> Result<(), WorkflowError> {
    for (lid, spec) in &workflow.loops {
        let container = lid.as_block_id();
        let block = workflow
            .blocks
            .get(&container)
            .ok_or_else(|| WorkflowError::MissingContainer(container.clone()))?;
        if block.kind != BlockKind::Loop {
            return Err(WorkflowError::ContainerKindMismatch {
                container,
                found: block.kind.to_string(),
                expected: BlockKind::Loop.to_string(),
            });
        }
        for member in &spec.nodes {
            if !workflow.blocks.contains_key(member) {
                return Err(WorkflowError::UnknownSubflowMember {
                    container: container.clone(),
                    member: member.clone(),
                });
            }
        }
        if spec.loop_type == LoopKind::For && spec.iterations.is_none_or(|n| n == 0) {
            return Err(WorkflowError::InvalidIterations(container));
        }
    }

    for (pid, spec) in &workflow.parallels {
        let container = pid.as_block_id();
        let block = workflow
            .blocks
            .get(&container)
            .ok_or_else(|| WorkflowError::MissingContainer(container.clone()))?;
        if block.kind != BlockKind::Parallel {
            return Err(WorkflowError::ContainerKindMismatch {
                container,
                found: block.kind.to_string(),
                expected: BlockKind::Parallel.to_string(),
            });
        }
        for member in &spec.nodes {
            if !workflow.blocks.contains_key(member) {
                return Err(WorkflowError::UnknownSubflowMember {
                    container: container.clone(),
                    member: member.clone(),
                });
            }
        }
        if spec.parallel_type == ParallelKind::Count && spec.count.is_none_or(|n| n == 0) {
            return Err(WorkflowError::InvalidCount(container));
        }
    }

    Ok(())
}

/// Loop/parallel boundary handles may only tag edges leaving the matching
/// container block.
fn check_handles(workflow: &Workflow) -> Result<(), WorkflowError> {
    for conn in &workflow.connections {
        let valid = match conn.handle_kind() {
            HandleKind::LoopStart | HandleKind::LoopEnd => workflow
                .blocks
                .get(&conn.source)
                .is_some_and(|b| b.kind == BlockKind::Loop),
            HandleKind::ParallelStart | HandleKind::ParallelEnd => workflow
                .blocks
                .get(&conn.source)
                .is_some_and(|b| b.kind == BlockKind::Parallel),
            HandleKind::ConditionBranch => workflow
                .blocks
                .get(&conn.source)
                .is_some_and(|b| b.kind == BlockKind::Condition),
            HandleKind::Default | HandleKind::Custom => true,
        };
        if !valid {
            return Err(WorkflowError::MisplacedHandle {
                handle: conn
                    .source_handle
                    .as_ref()
                    .map(|h| h.as_str().to_owned())
                    .unwrap_or_default(),
                edge_source: conn.source.clone(),
                target: conn.target.clone(),
            });
        }
    }
    Ok(())
}

/// Back-edges are legal only among the members of a single loop. Drop edges
/// whose endpoints share a loop, then any remaining strongly-connected
/// component larger than one node is a fatal cycle.
fn check_cycles(workflow: &Workflow) -> Result<(), WorkflowError> {
    let mut graph: DiGraph<&BlockId, ()> = DiGraph::new();
    let mut nodes: HashMap<&BlockId, NodeIndex> = HashMap::new();
    for id in workflow.blocks.keys() {
        nodes.insert(id, graph.add_node(id));
    }

    for conn in &workflow.connections {
        let same_loop = workflow.loops.values().any(|spec| {
            spec.nodes.contains(&conn.source) && spec.nodes.contains(&conn.target)
        });
        if same_loop {
            continue;
        }
        graph.add_edge(nodes[&conn.source], nodes[&conn.target], ());
    }

    for component in tarjan_scc(&graph) {
        if component.len() > 1 {
            return Err(WorkflowError::CycleOutsideLoop((*graph[component[0]]).clone()));
        }
        // A single node may still carry a self-edge.
        let idx = component[0];
        if graph.find_edge(idx, idx).is_some() {
            return Err(WorkflowError::CycleOutsideLoop((*graph[idx]).clone()));
        }
    }

    Ok(())
}

fn collect_warnings(workflow: &Workflow) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();
    let mut incoming_counts: HashMap<&BlockId, usize> = HashMap::new();
    for conn in &workflow.connections {
        *incoming_counts.entry(&conn.target).or_default() += 1;
    }

    for block in workflow.blocks.values() {
        if block.kind == BlockKind::Condition {
            let incoming = incoming_counts.get(&block.id).copied().unwrap_or(0);
            if incoming > 1 {
                warnings.push(ValidationWarning::AmbiguousConditionInput {
                    block: block.id.clone(),
                    incoming,
                });
            }
        }
    }

    warnings
}
