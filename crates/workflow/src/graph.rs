//! Adjacency indexes over a workflow's connections.

use std::collections::HashMap;

use weft_core::BlockId;

use crate::connection::Connection;
use crate::model::Workflow;

/// Pre-computed adjacency for a workflow.
///
/// Holds edge indexes by source and by target plus a name → id index for the
/// resolver. Borrows the workflow; build once per run.
#[derive(Debug)]
pub struct WorkflowGraph<'a> {
    workflow: &'a Workflow,
    outgoing: HashMap<&'a BlockId, Vec<&'a Connection>>,
    incoming: HashMap<&'a BlockId, Vec<&'a Connection>>,
    by_name: HashMap<&'a str, &'a BlockId>,
}

impl<'a> WorkflowGraph<'a> {
    /// Index the workflow's connections and block names.
    #[must_use]
    pub fn new(workflow: &'a Workflow) -> Self {
        let mut outgoing: HashMap<&BlockId, Vec<&Connection>> = HashMap::new();
        let mut incoming: HashMap<&BlockId, Vec<&Connection>> = HashMap::new();
        for conn in &workflow.connections {
            outgoing.entry(&conn.source).or_default().push(conn);
            incoming.entry(&conn.target).or_default().push(conn);
        }

        let mut by_name = HashMap::new();
        for block in workflow.blocks.values() {
            by_name.insert(block.name.as_str(), &block.id);
        }

        Self {
            workflow,
            outgoing,
            incoming,
            by_name,
        }
    }

    /// The workflow this graph indexes.
    #[must_use]
    pub fn workflow(&self) -> &'a Workflow {
        self.workflow
    }

    /// Edges leaving `block`, in document order.
    #[must_use]
    pub fn outgoing(&self, block: &BlockId) -> &[&'a Connection] {
        self.outgoing.get(block).map_or(&[], Vec::as_slice)
    }

    /// Edges entering `block`, in document order.
    #[must_use]
    pub fn incoming(&self, block: &BlockId) -> &[&'a Connection] {
        self.incoming.get(block).map_or(&[], Vec::as_slice)
    }

    /// Direct successor ids of `block` (duplicates preserved).
    pub fn successors(&self, block: &BlockId) -> impl Iterator<Item = &'a BlockId> + '_ {
        self.outgoing(block).iter().map(|c| &c.target)
    }

    /// Returns `true` if an edge `source -> target` exists.
    #[must_use]
    pub fn has_edge(&self, source: &BlockId, target: &BlockId) -> bool {
        self.outgoing(source).iter().any(|c| &c.target == target)
    }

    /// Resolve a reference token to a block id — by id first, then by name.
    #[must_use]
    pub fn block_by_ref(&self, name_or_id: &str) -> Option<&'a BlockId> {
        if let Some((id, _)) = self.workflow.blocks.get_key_value(name_or_id) {
            return Some(id);
        }
        self.by_name.get(name_or_id).copied()
    }
}
