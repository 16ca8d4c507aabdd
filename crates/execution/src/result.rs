//! The structured result envelope returned across the engine boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use weft_core::BlockId;

use crate::log::BlockLog;

/// Semantic classification of a run failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunErrorKind {
    /// Structural problem found before execution started.
    InvalidWorkflow,
    /// The resolver could not satisfy a reference.
    ReferenceResolution,
    /// A condition block's `conditions` param was not a valid sequence.
    InvalidConditionsFormat,
    /// A condition expression failed to parse or evaluate.
    Evaluation,
    /// No condition matched and there was no else branch.
    NoMatchingBranch,
    /// A router produced no valid target.
    RouterSelection,
    /// Generic block failure.
    Handler,
    /// The layer cap or deadline was hit.
    LimitExceeded,
    /// The run was cancelled cooperatively.
    Cancelled,
}

/// A run failure, surfaced in [`ExecutionResult::error`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunError {
    /// What went wrong.
    pub kind: RunErrorKind,
    /// Human-readable detail.
    pub message: String,
    /// The offending block, when the failure is block-local.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_id: Option<BlockId>,
}

impl RunError {
    /// A failure not tied to any one block.
    pub fn new(kind: RunErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            block_id: None,
        }
    }

    /// Attach the offending block.
    #[must_use]
    pub fn with_block(mut self, block_id: BlockId) -> Self {
        self.block_id = Some(block_id);
        self
    }
}

impl std::fmt::Display for RunError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.block_id {
            Some(id) => write!(f, "{} (block {id})", self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Timing metadata for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunMetadata {
    /// When the run started.
    pub start_time: DateTime<Utc>,
    /// When the run ended.
    pub end_time: DateTime<Utc>,
    /// Total wall-clock duration in milliseconds.
    pub duration_ms: u64,
}

impl RunMetadata {
    /// Build metadata from start/end instants.
    #[must_use]
    pub fn between(start_time: DateTime<Utc>, end_time: DateTime<Utc>) -> Self {
        Self {
            start_time,
            end_time,
            duration_ms: (end_time - start_time).num_milliseconds().max(0) as u64,
        }
    }
}

/// What one engine run produced.
///
/// No exceptions cross the engine boundary: failures land in `error` with
/// `success == false`, and the logs collected up to the failure are kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    /// Whether the run completed.
    pub success: bool,
    /// The response block's output, or the last completed block's output.
    pub output: Value,
    /// Activation records in completion order.
    pub logs: Vec<BlockLog>,
    /// Timing metadata.
    pub metadata: RunMetadata,
    /// The failure, when `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RunError>,
}

impl ExecutionResult {
    /// A successful result.
    #[must_use]
    pub fn completed(output: Value, logs: Vec<BlockLog>, metadata: RunMetadata) -> Self {
        Self {
            success: true,
            output,
            logs,
            metadata,
            error: None,
        }
    }

    /// A failed result.
    #[must_use]
    pub fn failed(error: RunError, logs: Vec<BlockLog>, metadata: RunMetadata) -> Self {
        Self {
            success: false,
            output: Value::Null,
            logs,
            metadata,
            error: Some(error),
        }
    }
}
