//! Template parsing and reference resolution.
//!
//! A template is any string input a block declares. `{{ref}}` spans are
//! substituted against a [`ReferenceSource`]; everything else passes through
//! verbatim. When the entire trimmed field is one reference, the typed value
//! replaces the field instead of being stringified.

use serde_json::Value;
use tracing::trace;

use crate::error::ExpressionError;
use crate::path;
use crate::source::ReferenceSource;

/// One parsed segment of a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplatePart {
    /// Literal text, passed through untouched.
    Text(String),
    /// A reference token, without its `{{ }}` delimiters.
    Reference(String),
}

/// A parsed template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    parts: Vec<TemplatePart>,
}

impl Template {
    /// Parse `{{ref}}` spans out of `source`.
    ///
    /// An opening `{{` without a matching `}}` is a parse error.
    pub fn parse(source: &str) -> Result<Self, ExpressionError> {
        let mut parts = Vec::new();
        let mut rest = source;

        while let Some(open) = rest.find("{{") {
            if !rest[..open].is_empty() {
                parts.push(TemplatePart::Text(rest[..open].to_owned()));
            }
            let after_open = &rest[open + 2..];
            let close = after_open.find("}}").ok_or_else(|| {
                ExpressionError::TemplateParse(format!(
                    "unclosed '{{{{' in template: {source:?}"
                ))
            })?;
            parts.push(TemplatePart::Reference(
                after_open[..close].trim().to_owned(),
            ));
            rest = &after_open[close + 2..];
        }
        if !rest.is_empty() {
            parts.push(TemplatePart::Text(rest.to_owned()));
        }

        Ok(Self { parts })
    }

    /// The parsed segments.
    #[must_use]
    pub fn parts(&self) -> &[TemplatePart] {
        &self.parts
    }

    /// Returns `true` if the template contains at least one reference.
    #[must_use]
    pub fn has_references(&self) -> bool {
        self.parts
            .iter()
            .any(|p| matches!(p, TemplatePart::Reference(_)))
    }

    /// The single reference token, if the template is nothing but one
    /// reference surrounded by (at most) whitespace.
    #[must_use]
    pub fn as_single_reference(&self) -> Option<&str> {
        let mut token = None;
        for part in &self.parts {
            match part {
                TemplatePart::Text(text) if text.trim().is_empty() => {}
                TemplatePart::Text(_) => return None,
                TemplatePart::Reference(t) => {
                    if token.is_some() {
                        return None;
                    }
                    token = Some(t.as_str());
                }
            }
        }
        token
    }
}

/// Resolves templates and references against a [`ReferenceSource`].
pub struct Resolver<'a> {
    source: &'a dyn ReferenceSource,
}

impl<'a> Resolver<'a> {
    /// Create a resolver over `source`.
    pub fn new(source: &'a dyn ReferenceSource) -> Self {
        Self { source }
    }

    /// Resolve one reference token (`head.path…`).
    ///
    /// `Ok(None)` means the head resolved but the path is missing — the
    /// caller renders that as `undefined` text or JSON null. An unknown head
    /// is an [`ExpressionError::UnresolvedReference`].
    pub fn lookup(&self, token: &str) -> Result<Option<Value>, ExpressionError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(ExpressionError::unresolved("<empty>"));
        }

        let (head, rest) = token
            .split_once('.')
            .map_or((token, ""), |(h, r)| (h, r));

        // `env.NAME` — environment variables.
        if head == "env" {
            if rest.is_empty() {
                return Err(ExpressionError::unresolved(token));
            }
            return match self.source.env_var(rest) {
                Some(v) => Ok(Some(Value::String(v))),
                None => Err(ExpressionError::unresolved(token)),
            };
        }

        // `loop.index`, `parallel.currentItem`, ... — explicit iteration vars.
        if head == "loop" || head == "parallel" {
            let (var, path_rest) = rest
                .split_once('.')
                .map_or((rest, ""), |(v, r)| (v, r));
            return match self.source.iteration_var(var) {
                Some(v) => Ok(path::walk(&v, path_rest).cloned()),
                None => Err(ExpressionError::unresolved(token)),
            };
        }

        // Bare iteration vars shadow block outputs.
        if let Some(v) = self.source.iteration_var(head) {
            return Ok(path::walk(&v, rest).cloned());
        }

        // Block outputs by name or id; missing paths are `undefined`.
        if let Some(output) = self.source.block_output(head) {
            return Ok(path::walk(&output, rest).cloned());
        }

        Err(ExpressionError::unresolved(token))
    }

    /// Resolve a string input.
    ///
    /// A whole-value reference yields the typed value (arrays and objects
    /// preserved); anything else interpolates into a string, with missing
    /// paths rendered as `undefined`.
    pub fn resolve_str(&self, input: &str) -> Result<Value, ExpressionError> {
        let template = Template::parse(input)?;
        if !template.has_references() {
            return Ok(Value::String(input.to_owned()));
        }

        if let Some(token) = template.as_single_reference() {
            trace!(token, "resolving whole-value reference");
            return Ok(self.lookup(token)?.unwrap_or(Value::Null));
        }

        let mut out = String::with_capacity(input.len());
        for part in template.parts() {
            match part {
                TemplatePart::Text(text) => out.push_str(text),
                TemplatePart::Reference(token) => match self.lookup(token)? {
                    Some(value) => out.push_str(&path::to_inline_string(&value)),
                    None => out.push_str("undefined"),
                },
            }
        }
        Ok(Value::String(out))
    }

    /// Resolve a JSON value recursively: strings are templates, arrays and
    /// objects resolve element-wise, everything else passes through.
    pub fn resolve_value(&self, input: &Value) -> Result<Value, ExpressionError> {
        match input {
            Value::String(s) => self.resolve_str(s),
            Value::Array(items) => items
                .iter()
                .map(|v| self.resolve_value(v))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Value::Object(map) => {
                let mut out = serde_json::Map::with_capacity(map.len());
                for (k, v) in map {
                    out.insert(k.clone(), self.resolve_value(v)?);
                }
                Ok(Value::Object(out))
            }
            other => Ok(other.clone()),
        }
    }

    /// Resolve a block's whole param record.
    pub fn resolve_inputs(
        &self,
        params: &serde_json::Map<String, Value>,
    ) -> Result<serde_json::Map<String, Value>, ExpressionError> {
        let mut out = serde_json::Map::with_capacity(params.len());
        for (k, v) in params {
            out.insert(k.clone(), self.resolve_value(v)?);
        }
        Ok(out)
    }

    /// Substitute `<ref>` spans inside code or condition text.
    ///
    /// A span counts as a reference only when it has no whitespace, starts
    /// with a letter or underscore, and contains a dot — `a < b && c > d`
    /// passes through untouched.
    pub fn resolve_angle_refs(&self, text: &str) -> Result<String, ExpressionError> {
        let mut out = String::with_capacity(text.len());
        let mut rest = text;

        while let Some(open) = rest.find('<') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            match angle_token(after) {
                Some(token) => {
                    match self.lookup(token)? {
                        Some(value) => out.push_str(&path::to_inline_string(&value)),
                        None => out.push_str("undefined"),
                    }
                    rest = &after[token.len() + 1..];
                }
                None => {
                    out.push('<');
                    rest = after;
                }
            }
        }
        out.push_str(rest);
        Ok(out)
    }
}

/// The token between `<` and `>`, if it matches the reference shape.
pub(crate) fn angle_token(after_open: &str) -> Option<&str> {
    let close = after_open.find('>')?;
    let token = &after_open[..close];
    let mut chars = token.chars();
    let first = chars.next()?;
    if !(first.is_ascii_alphabetic() || first == '_') {
        return None;
    }
    if !token.contains('.') {
        return None;
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')) {
        return None;
    }
    Some(token)
}
