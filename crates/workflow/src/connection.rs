//! Connections and the source-handle grammar.

use std::fmt;

use serde::{Deserialize, Serialize};
use weft_core::BlockId;

/// Handle marking the exit of a loop body back into the first-iteration set.
pub const LOOP_START_SOURCE: &str = "loop-start-source";
/// Handle activating a loop container's successors after the loop completes.
pub const LOOP_END_SOURCE: &str = "loop-end-source";
/// Handle fanning a parallel container out into its branch bodies.
pub const PARALLEL_START_SOURCE: &str = "parallel-start-source";
/// Handle activating a parallel container's successors after all branches finish.
pub const PARALLEL_END_SOURCE: &str = "parallel-end-source";
/// Prefix of condition branch handles (`condition-<blockId>-<branchId>`).
pub const CONDITION_PREFIX: &str = "condition-";

/// Classification of a source handle under the closed grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleKind {
    /// No handle, or an empty one — a plain edge.
    Default,
    /// `condition-<blockId>-<branchId>` — a condition branch selector.
    ConditionBranch,
    /// `loop-start-source`.
    LoopStart,
    /// `loop-end-source`.
    LoopEnd,
    /// `parallel-start-source`.
    ParallelStart,
    /// `parallel-end-source`.
    ParallelEnd,
    /// Free text outside the closed grammar; treated as a plain edge.
    Custom,
}

/// A source-side edge tag.
///
/// Condition branch handles embed two ids that may themselves contain dashes,
/// so they are never parsed apart — matching is by reconstruction:
/// [`SourceHandle::condition_branch`] builds the canonical string and
/// [`SourceHandle::matches_condition`] compares against it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceHandle(String);

impl SourceHandle {
    /// Wrap a raw handle string.
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    /// Build the canonical handle for one branch of a condition block.
    #[must_use]
    pub fn condition_branch(block: &BlockId, branch_id: &str) -> Self {
        Self(format!("{CONDITION_PREFIX}{block}-{branch_id}"))
    }

    /// The `loop-start-source` handle.
    #[must_use]
    pub fn loop_start() -> Self {
        Self(LOOP_START_SOURCE.to_owned())
    }

    /// The `loop-end-source` handle.
    #[must_use]
    pub fn loop_end() -> Self {
        Self(LOOP_END_SOURCE.to_owned())
    }

    /// The `parallel-start-source` handle.
    #[must_use]
    pub fn parallel_start() -> Self {
        Self(PARALLEL_START_SOURCE.to_owned())
    }

    /// The `parallel-end-source` handle.
    #[must_use]
    pub fn parallel_end() -> Self {
        Self(PARALLEL_END_SOURCE.to_owned())
    }

    /// The raw handle string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Classify this handle under the closed grammar.
    #[must_use]
    pub fn kind(&self) -> HandleKind {
        match self.0.as_str() {
            "" => HandleKind::Default,
            LOOP_START_SOURCE => HandleKind::LoopStart,
            LOOP_END_SOURCE => HandleKind::LoopEnd,
            PARALLEL_START_SOURCE => HandleKind::ParallelStart,
            PARALLEL_END_SOURCE => HandleKind::ParallelEnd,
            s if s.starts_with(CONDITION_PREFIX) => HandleKind::ConditionBranch,
            _ => HandleKind::Custom,
        }
    }

    /// Returns `true` if this handle selects `branch_id` of condition `block`.
    #[must_use]
    pub fn matches_condition(&self, block: &BlockId, branch_id: &str) -> bool {
        self.0 == format!("{CONDITION_PREFIX}{block}-{branch_id}")
    }
}

impl fmt::Display for SourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SourceHandle {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// One directed edge of the workflow graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    /// The block this edge leaves.
    pub source: BlockId,
    /// The block this edge enters.
    pub target: BlockId,
    /// Optional source-side handle selecting a branch or subflow boundary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<SourceHandle>,
}

impl Connection {
    /// A plain edge with no handle.
    pub fn new(source: impl Into<BlockId>, target: impl Into<BlockId>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            source_handle: None,
        }
    }

    /// Attach a source handle.
    #[must_use]
    pub fn with_handle(mut self, handle: SourceHandle) -> Self {
        self.source_handle = Some(handle);
        self
    }

    /// The handle classification, `Default` when no handle is present.
    #[must_use]
    pub fn handle_kind(&self) -> HandleKind {
        self.source_handle
            .as_ref()
            .map_or(HandleKind::Default, SourceHandle::kind)
    }
}
