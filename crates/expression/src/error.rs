//! Expression and resolution errors.

use thiserror::Error;

/// Errors raised while resolving references or evaluating condition text.
#[derive(Debug, Clone, Error)]
pub enum ExpressionError {
    /// A reference named a block, variable, or env entry that does not exist.
    #[error("unresolved reference: {token}")]
    UnresolvedReference {
        /// The offending reference token, without its delimiters.
        token: String,
    },

    /// A template was syntactically malformed (e.g. an unclosed `{{`).
    #[error("template parse error: {0}")]
    TemplateParse(String),

    /// Condition text failed to parse under the fixed grammar.
    #[error("expression parse error: {0}")]
    Parse(String),

    /// Condition text parsed but could not be evaluated.
    #[error("expression evaluation error: {0}")]
    Eval(String),
}

impl ExpressionError {
    /// Build an [`ExpressionError::UnresolvedReference`].
    pub fn unresolved(token: impl Into<String>) -> Self {
        Self::UnresolvedReference {
            token: token.into(),
        }
    }
}
