//! The read-only snapshot handlers execute against.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use weft_core::{BlockId, ExecutionId};
use weft_expression::ReferenceSource;
use weft_workflow::{Block, Workflow};

/// A frozen view of execution state for one handler invocation.
///
/// The executor builds one of these immediately before dispatch and never
/// updates it afterwards — handlers within a layer cannot observe each
/// other's partial state. The scope implements [`ReferenceSource`], so the
/// resolver and the condition evaluator read straight from it.
#[derive(Debug, Clone)]
pub struct HandlerScope {
    /// The run this invocation belongs to.
    pub execution_id: ExecutionId,
    /// The workflow being executed.
    pub workflow: Arc<Workflow>,
    outputs: HashMap<BlockId, Value>,
    names: HashMap<String, BlockId>,
    env: HashMap<String, String>,
    iteration: HashMap<String, Value>,
    locals: HashMap<String, Value>,
}

impl HandlerScope {
    /// Create a scope with no recorded outputs.
    #[must_use]
    pub fn new(
        execution_id: ExecutionId,
        workflow: Arc<Workflow>,
        env: HashMap<String, String>,
    ) -> Self {
        let names = workflow
            .blocks
            .values()
            .map(|b| (b.name.clone(), b.id.clone()))
            .collect();
        Self {
            execution_id,
            workflow,
            outputs: HashMap::new(),
            names,
            env,
            iteration: HashMap::new(),
            locals: HashMap::new(),
        }
    }

    /// Snapshot the outputs of completed blocks.
    #[must_use]
    pub fn with_outputs(mut self, outputs: HashMap<BlockId, Value>) -> Self {
        self.outputs = outputs;
        self
    }

    /// Expose iteration variables of the innermost enclosing subflow.
    #[must_use]
    pub fn with_iteration(mut self, iteration: HashMap<String, Value>) -> Self {
        self.iteration = iteration;
        self
    }

    /// Expose bare-identifier locals (the implicit upstream scope of a
    /// condition block).
    #[must_use]
    pub fn with_locals(mut self, locals: HashMap<String, Value>) -> Self {
        self.locals = locals;
        self
    }

    /// A completed block's output, by id.
    #[must_use]
    pub fn output_of(&self, block_id: &BlockId) -> Option<&Value> {
        self.outputs.get(block_id)
    }

    /// Direct successors of `block`, with the connecting edge's handle.
    #[must_use]
    pub fn successors(&self, block: &BlockId) -> Vec<&Block> {
        self.workflow
            .connections
            .iter()
            .filter(|c| &c.source == block)
            .filter_map(|c| self.workflow.block(&c.target))
            .collect()
    }

    /// The iteration variables as a map (used by container handlers).
    #[must_use]
    pub fn iteration_vars(&self) -> &HashMap<String, Value> {
        &self.iteration
    }
}

impl ReferenceSource for HandlerScope {
    fn iteration_var(&self, name: &str) -> Option<Value> {
        self.iteration.get(name).cloned()
    }

    fn block_output(&self, name_or_id: &str) -> Option<Value> {
        if let Some(value) = self.outputs.get(name_or_id) {
            return Some(value.clone());
        }
        let id = self.names.get(name_or_id)?;
        self.outputs.get(id).cloned()
    }

    fn env_var(&self, name: &str) -> Option<String> {
        self.env.get(name).cloned()
    }

    fn local_var(&self, name: &str) -> Option<Value> {
        self.locals.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;
    use weft_workflow::{BlockKind, Connection};

    fn workflow() -> Arc<Workflow> {
        let blocks = vec![
            Block::new("start", BlockKind::Starter, "Start"),
            Block::new("f1", BlockKind::Function, "Fetch"),
            Block::new("f2", BlockKind::Function, "Transform"),
        ];
        Arc::new(Workflow {
            version: "1".into(),
            blocks: blocks.into_iter().map(|b| (b.id.clone(), b)).collect(),
            connections: vec![
                Connection::new("start", "f1"),
                Connection::new("f1", "f2"),
            ],
            loops: BTreeMap::new(),
            parallels: BTreeMap::new(),
        })
    }

    fn scope() -> HandlerScope {
        HandlerScope::new(ExecutionId::v4(), workflow(), HashMap::new()).with_outputs(
            [(BlockId::new("f1"), serde_json::json!({"result": 7}))].into(),
        )
    }

    #[test]
    fn output_lookup_by_id_and_name() {
        let scope = scope();
        assert_eq!(
            scope.block_output("f1"),
            Some(serde_json::json!({"result": 7}))
        );
        assert_eq!(
            scope.block_output("Fetch"),
            Some(serde_json::json!({"result": 7}))
        );
        assert_eq!(scope.block_output("ghost"), None);
    }

    #[test]
    fn successors_follow_connections() {
        let scope = scope();
        let succ = scope.successors(&BlockId::new("f1"));
        assert_eq!(succ.len(), 1);
        assert_eq!(succ[0].id, BlockId::new("f2"));
        assert!(scope.successors(&BlockId::new("f2")).is_empty());
    }

    #[test]
    fn iteration_and_locals() {
        let scope = scope()
            .with_iteration([("index".into(), Value::from(3))].into())
            .with_locals([("result".into(), Value::from("one"))].into());
        assert_eq!(scope.iteration_var("index"), Some(Value::from(3)));
        assert_eq!(scope.local_var("result"), Some(Value::from("one")));
        assert_eq!(scope.env_var("HOME"), None);
    }
}
