//! Execution-state errors.

use thiserror::Error;
use weft_core::BlockId;

/// Errors raised by the execution-state types themselves.
#[derive(Debug, Error)]
pub enum StateError {
    /// A run status transition is not allowed.
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition {
        /// Current status.
        from: String,
        /// Attempted target status.
        to: String,
    },

    /// A block id was not found in the workflow.
    #[error("unknown block: {0}")]
    UnknownBlock(BlockId),
}
