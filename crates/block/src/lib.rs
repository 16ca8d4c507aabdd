#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Weft Block
//!
//! The handler layer of the Weft engine: one handler per block kind, behind
//! the object-safe [`BlockHandler`] trait.
//!
//! Handlers are deliberately thin. They receive their already-resolved
//! inputs plus a read-only [`HandlerScope`] snapshot, do their one job, and
//! return a value — the engine owns all mutable state and folds results back
//! in. External collaborators (model providers, user-code runtimes) sit
//! behind the [`AgentProvider`] and [`CodeRuntime`] seams so the engine never
//! learns a wire format.

pub mod error;
pub mod handler;
pub mod handlers;
pub mod provider;
pub mod registry;
pub mod runtime;
pub mod scope;

pub use error::HandlerError;
pub use handler::{BlockHandler, HandlerOutput};
pub use provider::{
    AgentProvider, AgentRequest, AgentResponse, StreamingExecution, TokenUsage, ToolCall,
    UnconfiguredProvider,
};
pub use registry::{BuiltinConfig, HandlerRegistry};
pub use runtime::{CodeRuntime, TemplateRuntime};
pub use scope::HandlerScope;
