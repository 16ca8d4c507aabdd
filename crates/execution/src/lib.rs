#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Weft Execution
//!
//! Per-run execution state for the Weft workflow engine.
//!
//! This crate models execution-time concepts — it does NOT contain the
//! scheduler. It defines:
//!
//! - [`RunStatus`] — the run-level state machine, with transitions validated
//!   by the [`transition`] module
//! - [`ExecutionContext`] — the mutable per-run aggregate the scheduler owns
//!   exclusively: block states, decisions, the active path, loop state
//! - [`BlockLog`] — the ordered activation log
//! - [`ExecutionOptions`] and [`ResponseScope`] — per-run knobs
//! - [`ExecutionResult`] — the structured envelope returned across the
//!   engine boundary (no panics, no raw errors cross it)

pub mod context;
pub mod error;
pub mod log;
pub mod options;
pub mod result;
pub mod status;
pub mod transition;

pub use context::{BlockState, Decisions, ExecutionContext};
pub use error::StateError;
pub use log::BlockLog;
pub use options::{ExecutionOptions, ResponseScope};
pub use result::{ExecutionResult, RunError, RunErrorKind, RunMetadata};
pub use status::RunStatus;
