#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Weft Workflow
//!
//! The serialized workflow model consumed by the execution engine.
//!
//! A workflow is an immutable directed graph: blocks (units of work),
//! connections (control/data edges, optionally tagged with a source handle
//! that encodes branch selection or subflow boundaries), plus loop and
//! parallel subflow declarations. This crate defines:
//!
//! - [`Workflow`], [`Block`], [`Connection`], [`LoopSpec`], [`ParallelSpec`] —
//!   the document model
//! - [`SourceHandle`] and [`HandleKind`] — the closed handle grammar
//! - [`Workflow::validate`] — structural validation (fatal errors and
//!   advisory warnings)
//! - [`WorkflowGraph`] — adjacency indexes used by the scheduler and the
//!   path tracker

pub mod connection;
pub mod error;
pub mod graph;
pub mod model;
pub mod validate;

pub use connection::{Connection, HandleKind, SourceHandle};
pub use error::{ValidationWarning, WorkflowError};
pub use graph::WorkflowGraph;
pub use model::{Block, BlockKind, LoopKind, LoopSpec, ParallelKind, ParallelSpec, Workflow};
