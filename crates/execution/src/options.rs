//! Per-run execution options.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Hard cap on scheduler layers before a run is aborted.
pub const DEFAULT_MAX_LAYERS: u32 = 10_000;

/// What a response block fired inside a loop terminates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseScope {
    /// Short-circuit only the current iteration; the loop continues.
    Iteration,
    /// Finish the enclosing loop; the run continues after it.
    Loop,
    /// Terminate the whole run.
    #[default]
    Run,
}

/// Knobs for one engine run.
#[derive(Debug, Clone)]
pub struct ExecutionOptions {
    /// Abort with `LimitExceeded` after this many layers.
    pub max_layers: u32,
    /// Optional wall-clock budget for the whole run.
    pub deadline: Option<Duration>,
    /// Abort sibling parallel branches on the first branch failure.
    pub fail_fast: bool,
    /// Cap on concurrently executing blocks within a layer (and branches
    /// within a parallel). `None` means as wide as the layer.
    pub concurrency: Option<usize>,
    /// What a response block inside a loop terminates.
    pub response_scope: ResponseScope,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            max_layers: DEFAULT_MAX_LAYERS,
            deadline: None,
            fail_fast: false,
            concurrency: None,
            response_scope: ResponseScope::default(),
        }
    }
}

impl ExecutionOptions {
    /// Set the layer cap.
    #[must_use]
    pub fn with_max_layers(mut self, max_layers: u32) -> Self {
        self.max_layers = max_layers;
        self
    }

    /// Set the wall-clock budget.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Enable fail-fast parallel branches.
    #[must_use]
    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    /// Cap per-layer concurrency.
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = Some(concurrency);
        self
    }

    /// Choose the response scope.
    #[must_use]
    pub fn with_response_scope(mut self, scope: ResponseScope) -> Self {
        self.response_scope = scope;
        self
    }
}
