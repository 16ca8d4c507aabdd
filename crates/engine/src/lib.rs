#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Weft Engine
//!
//! The scheduler that drives a workflow run to completion.
//!
//! One run is one exclusively-owned [`ExecutionContext`]. The layer loop
//! computes the set of ready blocks (active, unexecuted, all live
//! predecessors done, decision gates open), executes the whole layer
//! concurrently against read-only snapshots, folds results back one at a
//! time, and lets the path tracker decide what becomes active next. Loop
//! subflows re-arm their members per iteration; parallel subflows fan out
//! into isolated branch contexts driven by nested mini-schedulers.
//!
//! The entry point is [`Executor::run`]; nothing panics across it and no
//! error type escapes it — every outcome is an
//! [`ExecutionResult`](weft_execution::ExecutionResult).

pub mod error;
pub mod executor;
pub mod loops;
pub mod parallel;
pub mod path;

pub use executor::Executor;
pub use weft_execution::{
    ExecutionOptions, ExecutionResult, ResponseScope, RunError, RunErrorKind,
};
