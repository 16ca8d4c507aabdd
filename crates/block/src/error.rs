//! Handler error taxonomy.

use std::time::Duration;

use thiserror::Error;
use weft_expression::ExpressionError;

/// Error type for all block handler operations.
///
/// Distinguishes retryable from fatal failures so the engine can apply its
/// retry policy without handlers knowing about resilience configuration.
/// Condition- and router-specific variants exist because the engine maps
/// them to distinct result error kinds.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum HandlerError {
    /// A reference in the block's inputs or expressions did not resolve.
    #[error("reference resolution failed: {0}")]
    Resolution(ExpressionError),

    /// A condition block's `conditions` param was not a valid JSON sequence.
    #[error("invalid conditions format: {0}")]
    InvalidConditionsFormat(String),

    /// A condition expression failed to parse or evaluate.
    #[error("condition evaluation failed: {0}")]
    Evaluation(String),

    /// Every condition was false and no else branch exists.
    #[error("no condition branch matched and there is no else branch")]
    NoMatchingBranch,

    /// A router selected nothing, or something that is not a direct successor.
    #[error("router selection failed: {0}")]
    RouterSelection(String),

    /// The model provider failed.
    #[error("provider error: {0}")]
    Provider(String),

    /// The handler exceeded its time budget.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The handler was cancelled cooperatively.
    #[error("cancelled")]
    Cancelled,

    /// Generic block failure.
    #[error("{message}")]
    Failed {
        /// Human-readable error message.
        message: String,
        /// Whether the engine may retry this block.
        retryable: bool,
    },
}

impl HandlerError {
    /// A permanent failure — never retried.
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
            retryable: false,
        }
    }

    /// A transient failure — the engine may retry within its budget.
    pub fn retryable(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
            retryable: true,
        }
    }

    /// Returns `true` if the engine should consider retrying this block.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Failed { retryable, .. } => *retryable,
            Self::Timeout(_) => false,
            _ => false,
        }
    }
}

impl From<ExpressionError> for HandlerError {
    fn from(err: ExpressionError) -> Self {
        match err {
            ExpressionError::UnresolvedReference { .. } | ExpressionError::TemplateParse(_) => {
                Self::Resolution(err)
            }
            ExpressionError::Parse(_) | ExpressionError::Eval(_) => {
                Self::Evaluation(err.to_string())
            }
        }
    }
}
