//! Workflow model errors and validation warnings.

use thiserror::Error;
use weft_core::BlockId;

/// Fatal structural problems found before execution starts.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// No enabled starter block exists.
    #[error("workflow has no enabled starter block")]
    MissingStarter,

    /// More than one enabled starter block exists.
    #[error("workflow has {0} enabled starter blocks, expected exactly one")]
    MultipleStarters(usize),

    /// A connection endpoint does not exist in `blocks`.
    #[error("connection {edge_source} -> {target} references unknown block {missing}")]
    DanglingEndpoint {
        /// Edge source.
        edge_source: BlockId,
        /// Edge target.
        target: BlockId,
        /// The endpoint that is missing from `blocks`.
        missing: BlockId,
    },

    /// A loop or parallel member id does not exist in `blocks`.
    #[error("subflow {container} lists unknown member block {member}")]
    UnknownSubflowMember {
        /// The loop/parallel container id.
        container: BlockId,
        /// The missing member.
        member: BlockId,
    },

    /// A loop/parallel id has no matching container block.
    #[error("subflow container {0} is not a block")]
    MissingContainer(BlockId),

    /// The container block exists but has the wrong kind.
    #[error("subflow container {container} is a {found} block, expected {expected}")]
    ContainerKindMismatch {
        /// The container id.
        container: BlockId,
        /// The kind found in `blocks`.
        found: String,
        /// The kind the subflow table implies.
        expected: String,
    },

    /// A loop/parallel boundary handle appears on an edge that does not leave
    /// the corresponding container.
    #[error("handle {handle:?} on edge {edge_source} -> {target} does not leave a matching container")]
    MisplacedHandle {
        /// The offending handle text.
        handle: String,
        /// Edge source.
        edge_source: BlockId,
        /// Edge target.
        target: BlockId,
    },

    /// A cycle exists outside any loop subflow.
    #[error("cycle outside a loop involving block {0}")]
    CycleOutsideLoop(BlockId),

    /// A `for` loop with a missing or zero iteration count.
    #[error("loop {0}: `for` loops require iterations >= 1")]
    InvalidIterations(BlockId),

    /// A `count` parallel with a missing or zero branch count.
    #[error("parallel {0}: `count` parallels require count >= 1")]
    InvalidCount(BlockId),
}

/// Advisory oddities that do not block execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationWarning {
    /// A condition block has more than one incoming edge, so the implicit
    /// upstream scope its expressions read from is ambiguous.
    AmbiguousConditionInput {
        /// The condition block.
        block: BlockId,
        /// How many incoming edges it has.
        incoming: usize,
    },
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AmbiguousConditionInput { block, incoming } => write!(
                f,
                "condition block {block} has {incoming} incoming edges; its implicit upstream scope is ambiguous"
            ),
        }
    }
}
