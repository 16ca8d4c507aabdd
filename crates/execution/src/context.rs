//! The mutable per-run execution context.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::Value;
use weft_core::{BlockId, ExecutionId, LoopId, ParallelId};
use weft_workflow::Workflow;

use crate::error::StateError;
use crate::status::RunStatus;
use crate::transition::validate_transition;
use crate::log::BlockLog;

/// What one block produced this iteration scope.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockState {
    /// The block's output value.
    pub output: Value,
    /// Whether the block completed in the current iteration scope.
    pub executed: bool,
    /// How long the handler ran, in milliseconds.
    pub duration_ms: u64,
}

/// Recorded selections by router and condition blocks.
///
/// Decisions gate downstream activation: a target not selected here is
/// ineligible even if an edge points at it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Decisions {
    /// Router block → the one successor it selected.
    pub router: HashMap<BlockId, BlockId>,
    /// Condition block → the branch id it selected.
    pub condition: HashMap<BlockId, String>,
}

/// Mutable state for one run, exclusively owned by the executor.
///
/// Handlers never touch this type — they receive a read-only snapshot and
/// return a value; the executor folds the value back in. That ownership
/// discipline is what lets the whole aggregate go lock-free.
#[derive(Debug)]
pub struct ExecutionContext {
    /// Unique identifier for this run.
    pub execution_id: ExecutionId,
    /// The workflow being executed.
    pub workflow: Arc<Workflow>,
    /// Per-block outputs for the current iteration scope.
    pub block_states: HashMap<BlockId, BlockState>,
    /// Activation records in completion order.
    pub block_logs: Vec<BlockLog>,
    /// Router and condition selections.
    pub decisions: Decisions,
    /// Blocks completed at least once in the current iteration scope.
    pub executed_blocks: HashSet<BlockId>,
    /// Blocks currently eligible to run.
    pub active_execution_path: HashSet<BlockId>,
    /// Loop → current 0-based iteration index.
    pub loop_iterations: HashMap<LoopId, u32>,
    /// Loop → the item (or index) the current iteration sees.
    pub loop_items: HashMap<LoopId, Value>,
    /// Loops that have finished all iterations.
    pub completed_loops: HashSet<LoopId>,
    /// Parallels whose branches have all finished.
    pub completed_parallels: HashSet<ParallelId>,
    /// Environment variables, provided once per run.
    pub environment: HashMap<String, String>,
    /// Run-level status.
    pub status: RunStatus,
}

impl ExecutionContext {
    /// Create the context for a fresh run.
    #[must_use]
    pub fn new(
        execution_id: ExecutionId,
        workflow: Arc<Workflow>,
        environment: HashMap<String, String>,
    ) -> Self {
        Self {
            execution_id,
            workflow,
            block_states: HashMap::new(),
            block_logs: Vec::new(),
            decisions: Decisions::default(),
            executed_blocks: HashSet::new(),
            active_execution_path: HashSet::new(),
            loop_iterations: HashMap::new(),
            loop_items: HashMap::new(),
            completed_loops: HashSet::new(),
            completed_parallels: HashSet::new(),
            environment,
            status: RunStatus::Created,
        }
    }

    /// Transition the run status, validating the edge.
    pub fn transition(&mut self, to: RunStatus) -> Result<(), StateError> {
        validate_transition(self.status, to)?;
        self.status = to;
        Ok(())
    }

    /// Record a completed block: store its output, mark it executed.
    pub fn record_output(&mut self, block_id: BlockId, output: Value, duration_ms: u64) {
        self.block_states.insert(
            block_id.clone(),
            BlockState {
                output,
                executed: true,
                duration_ms,
            },
        );
        self.executed_blocks.insert(block_id);
    }

    /// A block's output from the current iteration scope.
    #[must_use]
    pub fn output_of(&self, block_id: &BlockId) -> Option<&Value> {
        self.block_states
            .get(block_id)
            .filter(|s| s.executed)
            .map(|s| &s.output)
    }

    /// Whether a block completed in the current iteration scope.
    #[must_use]
    pub fn is_executed(&self, block_id: &BlockId) -> bool {
        self.executed_blocks.contains(block_id)
    }

    /// Make a block eligible to run.
    pub fn activate(&mut self, block_id: BlockId) {
        self.active_execution_path.insert(block_id);
    }

    /// Remove blocks from the active path.
    pub fn deactivate<'a>(&mut self, blocks: impl IntoIterator<Item = &'a BlockId>) {
        for block in blocks {
            self.active_execution_path.remove(block);
        }
    }

    /// Reset an iteration scope: clear executed flags and block states for
    /// exactly the member set, leaving everything outside untouched.
    pub fn reset_scope<'a>(&mut self, members: impl IntoIterator<Item = &'a BlockId>) {
        for member in members {
            self.executed_blocks.remove(member);
            self.block_states.remove(member);
        }
    }

    /// Append an activation record.
    pub fn push_log(&mut self, log: BlockLog) {
        self.block_logs.push(log);
    }

    /// Output of the most recently completed block, by log order.
    #[must_use]
    pub fn last_output(&self) -> Option<&Value> {
        self.block_logs
            .iter()
            .rev()
            .filter(|l| l.success)
            .find_map(|l| self.output_of(&l.block_id))
    }
}
