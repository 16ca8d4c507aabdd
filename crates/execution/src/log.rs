//! The ordered activation log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use weft_core::BlockId;
use weft_workflow::BlockKind;

/// How much of a string output survives into the log summary.
const SUMMARY_STRING_CAP: usize = 200;
/// How many array elements survive into the log summary.
const SUMMARY_ARRAY_CAP: usize = 10;

/// One activation record, appended in completion order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockLog {
    /// The activated block.
    pub block_id: BlockId,
    /// Its display name at activation time.
    pub block_name: String,
    /// Its kind.
    #[serde(rename = "blockType")]
    pub block_kind: BlockKind,
    /// When the handler started.
    pub started_at: DateTime<Utc>,
    /// When the handler finished.
    pub ended_at: DateTime<Utc>,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
    /// Whether the activation succeeded.
    pub success: bool,
    /// Error message on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Truncated view of the output (full outputs live in block states).
    pub output_summary: Value,
}

impl BlockLog {
    /// Record a successful activation.
    pub fn success(
        block_id: BlockId,
        block_name: impl Into<String>,
        block_kind: BlockKind,
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
        output: &Value,
    ) -> Self {
        Self {
            block_id,
            block_name: block_name.into(),
            block_kind,
            started_at,
            ended_at,
            duration_ms: duration_ms(started_at, ended_at),
            success: true,
            error: None,
            output_summary: summarize(output),
        }
    }

    /// Record a failed activation.
    pub fn failure(
        block_id: BlockId,
        block_name: impl Into<String>,
        block_kind: BlockKind,
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            block_id,
            block_name: block_name.into(),
            block_kind,
            started_at,
            ended_at,
            duration_ms: duration_ms(started_at, ended_at),
            success: false,
            error: Some(error.into()),
            output_summary: Value::Null,
        }
    }
}

fn duration_ms(started_at: DateTime<Utc>, ended_at: DateTime<Utc>) -> u64 {
    (ended_at - started_at).num_milliseconds().max(0) as u64
}

/// Truncate an output for logging: long strings are cut, long arrays keep
/// their head, objects summarize field-wise.
#[must_use]
pub fn summarize(value: &Value) -> Value {
    match value {
        Value::String(s) if s.len() > SUMMARY_STRING_CAP => {
            let cut: String = s.chars().take(SUMMARY_STRING_CAP).collect();
            Value::String(format!("{cut}…"))
        }
        Value::Array(items) if items.len() > SUMMARY_ARRAY_CAP => Value::Array(
            items
                .iter()
                .take(SUMMARY_ARRAY_CAP)
                .map(summarize)
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(summarize).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), summarize(v)))
                .collect(),
        ),
        other => other.clone(),
    }
}
