//! Runtime values produced while executing a template.

use std::fmt;
use std::sync::Arc;

use super::Variables;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// A variable lookup that found nothing. Renders as the empty string.
    Missing,
    Nil,
    Bool(bool),
    Int(i64),
    /// Raw bytes. Decoders may produce text that is not valid UTF-8.
    Str(Vec<u8>),
    Map(Arc<Variables>),
}

impl Value {
    pub fn string(text: impl Into<Vec<u8>>) -> Self {
        Value::Str(text.into())
    }

    /// Truthiness used by `if`, `with`, `and`, `or` and `not`.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Missing | Value::Nil => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Str(s) => !s.is_empty(),
            Value::Map(m) => !m.is_empty(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Missing => "missing value",
            Value::Nil => "nil",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Str(_) => "string",
            Value::Map(_) => "map[string]string",
        }
    }

    /// A missing value counts as a string for `print` spacing.
    pub fn is_string(&self) -> bool {
        matches!(self, Value::Str(_) | Value::Missing)
    }

    /// String contents, with a missing value reading as empty.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Str(s) => Some(s),
            Value::Missing => Some(b""),
            _ => None,
        }
    }

    /// Append the value as an action would print it.
    pub fn write_to(&self, out: &mut Vec<u8>) {
        match self {
            Value::Nil => out.extend_from_slice(b"<no value>"),
            other => other.print_to(out),
        }
    }

    /// Append the value as `print` would format it. String bytes are copied
    /// unchanged.
    pub fn print_to(&self, out: &mut Vec<u8>) {
        match self {
            Value::Missing => {}
            Value::Str(s) => out.extend_from_slice(s),
            other => out.extend_from_slice(other.to_string().as_bytes()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Missing => Ok(()),
            Value::Nil => f.write_str("<nil>"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Str(s) => f.write_str(&String::from_utf8_lossy(s)),
            Value::Map(m) => {
                f.write_str("map[")?;
                for (i, (key, value)) in m.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{}:{}", key, value)?;
                }
                f.write_str("]")
            }
        }
    }
}
