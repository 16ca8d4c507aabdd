//! Handler discovery.

use std::sync::Arc;

use weft_workflow::Block;

use crate::handler::BlockHandler;
use crate::handlers::{
    AgentHandler, ApiHandler, ConditionHandler, EvaluatorHandler, FunctionHandler, LoopHandler,
    ParallelHandler, ResponseHandler, RouterHandler, StarterHandler,
};
use crate::provider::{AgentProvider, UnconfiguredProvider};
use crate::runtime::{CodeRuntime, TemplateRuntime};

/// External collaborators the built-in handlers need.
#[derive(Clone)]
pub struct BuiltinConfig {
    /// The model provider behind agent, router, and evaluator blocks.
    pub provider: Arc<dyn AgentProvider>,
    /// The runtime behind function blocks.
    pub code_runtime: Arc<dyn CodeRuntime>,
    /// The HTTP client behind api blocks.
    pub http_client: reqwest::Client,
}

impl Default for BuiltinConfig {
    fn default() -> Self {
        Self {
            provider: Arc::new(UnconfiguredProvider),
            code_runtime: Arc::new(TemplateRuntime),
            http_client: reqwest::Client::new(),
        }
    }
}

impl std::fmt::Debug for BuiltinConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuiltinConfig").finish_non_exhaustive()
    }
}

/// Ordered handler list; the first handler whose `can_handle` matches wins.
///
/// Plug-in handlers registered after construction take precedence over the
/// built-ins, so embedders can override any block kind.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: Vec<Arc<dyn BlockHandler>>,
}

impl HandlerRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry with all built-in handlers installed.
    ///
    /// The webhook kind is deliberately absent: webhook blocks exist only at
    /// the system boundary and the dispatcher seeds the starter instead.
    #[must_use]
    pub fn builtin(config: BuiltinConfig) -> Self {
        let mut registry = Self::new();
        registry.handlers = vec![
            Arc::new(StarterHandler),
            Arc::new(FunctionHandler::new(config.code_runtime)),
            Arc::new(ApiHandler::new(config.http_client)),
            Arc::new(AgentHandler::new(Arc::clone(&config.provider))),
            Arc::new(ConditionHandler),
            Arc::new(RouterHandler::new(Arc::clone(&config.provider))),
            Arc::new(LoopHandler),
            Arc::new(ParallelHandler),
            Arc::new(ResponseHandler),
            Arc::new(EvaluatorHandler::new(config.provider)),
        ];
        registry
    }

    /// Register a plug-in handler; it takes precedence over existing ones.
    pub fn register(&mut self, handler: Arc<dyn BlockHandler>) {
        self.handlers.insert(0, handler);
    }

    /// Find the handler for `block`.
    #[must_use]
    pub fn resolve(&self, block: &Block) -> Option<Arc<dyn BlockHandler>> {
        self.handlers
            .iter()
            .find(|h| h.can_handle(block))
            .cloned()
    }

    /// Number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Returns `true` if no handlers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("count", &self.handlers.len())
            .finish()
    }
}
