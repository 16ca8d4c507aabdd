//! Error classification at the engine boundary.

use weft_block::HandlerError;
use weft_core::BlockId;
use weft_execution::{RunError, RunErrorKind};

/// Map a handler failure onto the result error taxonomy.
#[must_use]
pub fn classify(err: &HandlerError) -> RunErrorKind {
    match err {
        HandlerError::Resolution(_) => RunErrorKind::ReferenceResolution,
        HandlerError::InvalidConditionsFormat(_) => RunErrorKind::InvalidConditionsFormat,
        HandlerError::Evaluation(_) => RunErrorKind::Evaluation,
        HandlerError::NoMatchingBranch => RunErrorKind::NoMatchingBranch,
        HandlerError::RouterSelection(_) => RunErrorKind::RouterSelection,
        HandlerError::Cancelled => RunErrorKind::Cancelled,
        HandlerError::Provider(_)
        | HandlerError::Timeout(_)
        | HandlerError::Failed { .. } => RunErrorKind::Handler,
        _ => RunErrorKind::Handler,
    }
}

/// Turn a handler failure into a block-attributed run error.
#[must_use]
pub fn block_failure(block_id: &BlockId, err: &HandlerError) -> RunError {
    RunError::new(classify(err), err.to_string()).with_block(block_id.clone())
}
