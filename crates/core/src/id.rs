//! Unique identifiers for Weft entities.
//!
//! Block, loop, and parallel ids come straight out of the serialized workflow
//! document — the author picks them, so they are opaque strings wrapped in
//! distinct newtypes for compile-time safety. [`ExecutionId`] is minted by the
//! engine per run and is UUID-backed (`v4()`, `nil()`, `parse()`).

use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! define_str_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap a raw id string.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// The raw id string.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_str_id!(
    /// Identifier of one block in the workflow graph.
    BlockId
);

define_str_id!(
    /// Identifier of a loop subflow. The loop container block shares this id.
    LoopId
);

define_str_id!(
    /// Identifier of a parallel subflow. The container block shares this id.
    ParallelId
);

impl LoopId {
    /// The loop container is itself a block under the same id.
    #[must_use]
    pub fn as_block_id(&self) -> BlockId {
        BlockId::new(self.as_str())
    }
}

impl ParallelId {
    /// The parallel container is itself a block under the same id.
    #[must_use]
    pub fn as_block_id(&self) -> BlockId {
        BlockId::new(self.as_str())
    }
}

/// Error returned when an [`ExecutionId`] cannot be parsed from a string.
#[derive(Debug, thiserror::Error)]
#[error("invalid execution id: {0}")]
pub struct ExecutionIdParseError(#[from] uuid::Error);

/// Identifier of a single workflow run, minted by the engine.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ExecutionId(Uuid);

impl ExecutionId {
    /// Generate a fresh random id.
    #[must_use]
    pub fn v4() -> Self {
        Self(Uuid::new_v4())
    }

    /// The zero-valued id.
    #[must_use]
    pub fn nil() -> Self {
        Self(Uuid::nil())
    }

    /// Returns `true` if this is the zero-valued id.
    #[must_use]
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }

    /// Parse an id from its canonical string form.
    pub fn parse(s: &str) -> Result<Self, ExecutionIdParseError> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for ExecutionId {
    type Err = ExecutionIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn block_id_display_roundtrips() {
        let id = BlockId::new("function-1");
        assert_eq!(id.to_string(), "function-1");
        assert_eq!(id.as_str(), "function-1");
    }

    #[test]
    fn block_id_serde_is_transparent() {
        let id = BlockId::new("starter");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"starter\"");
        let back: BlockId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn block_id_borrow_allows_str_lookup() {
        use std::collections::HashMap;
        let mut map = HashMap::new();
        map.insert(BlockId::new("a"), 1);
        assert_eq!(map.get("a"), Some(&1));
    }

    #[test]
    fn loop_id_doubles_as_block_id() {
        let lid = LoopId::new("loop-1");
        assert_eq!(lid.as_block_id(), BlockId::new("loop-1"));
    }

    #[test]
    fn parallel_id_doubles_as_block_id() {
        let pid = ParallelId::new("parallel-1");
        assert_eq!(pid.as_block_id(), BlockId::new("parallel-1"));
    }

    #[test]
    fn execution_id_v4_is_not_nil() {
        assert!(!ExecutionId::v4().is_nil());
    }

    #[test]
    fn execution_id_nil_is_nil() {
        let id = ExecutionId::nil();
        assert!(id.is_nil());
        assert_eq!(id.to_string(), "00000000-0000-0000-0000-000000000000");
    }

    #[test]
    fn execution_id_parse_valid() {
        let id = ExecutionId::parse("550e8400-e29b-41d4-a716-446655440000").unwrap();
        assert_eq!(id.to_string(), "550e8400-e29b-41d4-a716-446655440000");
    }

    #[test]
    fn execution_id_parse_invalid() {
        assert!(ExecutionId::parse("not-a-uuid").is_err());
    }

    #[test]
    fn execution_id_serde_roundtrip() {
        let id = ExecutionId::v4();
        let json = serde_json::to_string(&id).unwrap();
        let back: ExecutionId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn different_id_types_are_incompatible() {
        // BlockId and LoopId are distinct types — passing one where the
        // other is expected would be a compile error.
        fn accepts_block(_id: &BlockId) {}
        fn accepts_loop(_id: &LoopId) {}

        let block = BlockId::new("b");
        let lp = LoopId::new("l");
        accepts_block(&block);
        accepts_loop(&lp);
    }
}
