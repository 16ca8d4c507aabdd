//! The seam between the resolver and whoever owns execution state.

use serde_json::Value;

/// Supplies the values references resolve against.
///
/// The engine implements this over its execution context; handlers see it
/// through their read-only scope. Resolution priority is fixed: iteration
/// variables shadow block outputs, which shadow environment variables.
pub trait ReferenceSource {
    /// An iteration variable of the innermost enclosing loop or parallel
    /// (`index`, `item`, `currentItem`, ...).
    fn iteration_var(&self, name: &str) -> Option<Value>;

    /// A completed block's output, addressed by block name or id.
    fn block_output(&self, name_or_id: &str) -> Option<Value>;

    /// An environment variable, addressed as `env.NAME`.
    fn env_var(&self, name: &str) -> Option<String>;

    /// A bare identifier in condition text (the implicit upstream scope).
    ///
    /// Defaults to nothing; the condition handler exposes its upstream
    /// block's output fields here.
    fn local_var(&self, _name: &str) -> Option<Value> {
        None
    }
}

/// A plain map-backed source, used in tests and simple embeddings.
#[derive(Debug, Default, Clone)]
pub struct MapSource {
    /// Iteration variables.
    pub iteration: std::collections::HashMap<String, Value>,
    /// Block outputs by name or id.
    pub blocks: std::collections::HashMap<String, Value>,
    /// Environment variables.
    pub env: std::collections::HashMap<String, String>,
    /// Bare-identifier locals.
    pub locals: std::collections::HashMap<String, Value>,
}

impl ReferenceSource for MapSource {
    fn iteration_var(&self, name: &str) -> Option<Value> {
        self.iteration.get(name).cloned()
    }

    fn block_output(&self, name_or_id: &str) -> Option<Value> {
        self.blocks.get(name_or_id).cloned()
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

    #[test]
    fn map_source_lookups() {
        let mut source = MapSource::default();
        source.iteration.insert("index".into(), Value::from(2));
        source.blocks.insert("start".into(), serde_json::json!({"a": 1}));
        source.env.insert("HOME".into(), "/root".into());

        assert_eq!(source.iteration_var("index"), Some(Value::from(2)));
        assert_eq!(source.block_output("start"), Some(serde_json::json!({"a": 1})));
        assert_eq!(source.env_var("HOME"), Some("/root".into()));
        assert_eq!(source.local_var("anything"), None);
    }
}
