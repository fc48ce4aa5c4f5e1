//! Text template engine.
//!
//! Templates use `{{ }}` actions in the style of Go text templates:
//!
//! ```text
//! # Attribute: filename={{ .name }}.yaml
//! proxy: {{ .url | decodeUrl | encodeBase64 }}
//! {{- if .debug }}
//! log-level: debug
//! {{- end }}
//! ```
//!
//! Rendering is split into parse and execute. A parse failure means the
//! template itself is unacceptable; an execution failure means it broke
//! while substituting this request's variables. Callers map the two to
//! different responses, so they are kept as distinct [`TemplateError`]
//! variants.
//!
//! Output is raw bytes. Text produced by decoders is copied unchanged, even
//! when it is not valid UTF-8.
//!
//! Nothing is cached: every render lexes, parses and executes from scratch.
//! The [`Engine`] only holds the immutable function table and can be shared
//! across tasks freely.

mod builtins;
mod exec;
mod format;
mod lexer;
mod parser;
mod value;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use thiserror::Error;

use crate::functions::LIBRARY;

use builtins::BUILTINS;
use exec::Function;
use parser::Tree;

pub use value::Value;

/// Deepest nesting of control blocks, parenthesized pipelines and template
/// calls, checked both when parsing and when executing.
pub(crate) const MAX_DEPTH: usize = 100;

/// Per-request template variables, one value per key.
pub type Variables = BTreeMap<String, String>;

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("template:{line}: {message}")]
    Parse { line: usize, message: String },

    #[error("template:{line}: executing: {message}")]
    Execute { line: usize, message: String },
}

/// Result type for template operations
pub type TemplateResult<T> = Result<T, TemplateError>;

/// Function table shared by every render.
pub struct Engine {
    funcs: HashMap<&'static str, Function>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    /// Create an engine with the built-in operators and the helper library.
    pub fn new() -> Self {
        let mut funcs = HashMap::new();

        for (name, builtin) in BUILTINS {
            funcs.insert(*name, Function::Builtin(*builtin));
        }
        for (name, f) in LIBRARY {
            funcs.insert(*name, Function::Text(*f));
        }

        Self { funcs }
    }

    pub fn parse(&self, text: &str) -> TemplateResult<Template> {
        let tokens = lexer::lex(text)?;
        let tree = parser::parse(tokens, &self.funcs)?;
        Ok(Template { tree })
    }

    /// Parse and execute `text` in one step.
    pub fn render(&self, text: &str, variables: &Variables) -> TemplateResult<Vec<u8>> {
        self.parse(text)?.execute(variables)
    }
}

/// A parsed template, ready to execute.
#[derive(Debug)]
pub struct Template {
    tree: Tree,
}

impl Template {
    pub fn execute(&self, variables: &Variables) -> TemplateResult<Vec<u8>> {
        exec::execute(&self.tree, Arc::new(variables.clone()))
    }
}
