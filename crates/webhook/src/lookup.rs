//! Trigger resolution.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use weft_workflow::Workflow;

use crate::provider::{Provider, ProviderConfig};

/// A deployed webhook binding: the workflow to run and how to treat the
/// provider.
#[derive(Debug, Clone)]
pub struct TriggerBinding {
    /// The workflow this path triggers.
    pub workflow: Arc<Workflow>,
    /// The provider semantics to apply.
    pub provider: Provider,
    /// Provider settings, forwarded into the envelope.
    pub config: ProviderConfig,
}

/// Resolves a request path to an active, deployed binding.
///
/// The persistence behind this (database, config file, control plane) is an
/// external collaborator; the dispatcher only needs the lookup.
#[async_trait]
pub trait TriggerLookup: Send + Sync + 'static {
    /// The binding for `path`, if one is active and deployed.
    async fn resolve(&self, path: &str) -> Option<TriggerBinding>;
}

/// A fixed in-memory lookup, for embeddings and tests.
#[derive(Debug, Default, Clone)]
pub struct StaticLookup {
    bindings: HashMap<String, TriggerBinding>,
}

impl StaticLookup {
    /// An empty lookup.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a binding under `path`.
    #[must_use]
    pub fn with_binding(mut self, path: impl Into<String>, binding: TriggerBinding) -> Self {
        self.bindings.insert(path.into(), binding);
        self
    }
}

#[async_trait]
impl TriggerLookup for StaticLookup {
    async fn resolve(&self, path: &str) -> Option<TriggerBinding> {
        self.bindings.get(path).cloned()
    }
}
