#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Weft Expression
//!
//! The reference grammar that wires earlier block outputs into later block
//! inputs, and the small fixed expression language condition blocks evaluate.
//!
//! Two reference syntaxes are recognized:
//!
//! - `{{ref}}` — inline interpolation inside any string input; when the whole
//!   trimmed field is a single reference the typed value replaces the field.
//! - `<ref>` — the same references embedded in code and condition text.
//!
//! A `ref` is a dotted path whose head resolves, in priority order, against
//! enclosing loop/parallel iteration variables, earlier block outputs (by
//! name or id), and environment variables (`env.NAME`). This is deliberately
//! NOT a general expression language; condition expressions get comparisons
//! and boolean connectives over those references and nothing else, with no
//! host access.

pub mod error;
pub mod eval;
pub mod path;
pub mod source;
pub mod template;
pub mod value;

pub use error::ExpressionError;
pub use eval::{evaluate, evaluate_condition};
pub use source::ReferenceSource;
pub use template::{Resolver, Template, TemplatePart};
