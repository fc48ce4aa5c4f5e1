//! Functions every template can call besides the helper library.

use std::cmp::Ordering;

use crate::functions::query_escape;

use super::format::sprintf;
use super::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Builtin {
    And,
    Or,
    Not,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Len,
    Index,
    Slice,
    Print,
    Printf,
    Println,
    Urlquery,
    Html,
    Js,
    Call,
}

pub(crate) const BUILTINS: &[(&str, Builtin)] = &[
    ("and", Builtin::And),
    ("or", Builtin::Or),
    ("not", Builtin::Not),
    ("eq", Builtin::Eq),
    ("ne", Builtin::Ne),
    ("lt", Builtin::Lt),
    ("le", Builtin::Le),
    ("gt", Builtin::Gt),
    ("ge", Builtin::Ge),
    ("len", Builtin::Len),
    ("index", Builtin::Index),
    ("slice", Builtin::Slice),
    ("print", Builtin::Print),
    ("printf", Builtin::Printf),
    ("println", Builtin::Println),
    ("urlquery", Builtin::Urlquery),
    ("html", Builtin::Html),
    ("js", Builtin::Js),
    ("call", Builtin::Call),
];

impl Builtin {
    /// `and` and `or` land here only when called eagerly, e.g. as the tail
    /// of a pipeline; direct calls short-circuit in the executor.
    pub(crate) fn call(self, args: Vec<Value>) -> Result<Value, String> {
        match self {
            Builtin::And | Builtin::Or => {
                at_least(1, &args)?;
                let stop_on = self == Builtin::Or;
                let mut last = Value::Missing;
                for arg in args {
                    if arg.is_truthy() == stop_on {
                        return Ok(arg);
                    }
                    last = arg;
                }
                Ok(last)
            }
            Builtin::Not => {
                let [arg] = exact::<1>(args)?;
                Ok(Value::Bool(!arg.is_truthy()))
            }
            Builtin::Eq => {
                at_least(2, &args)?;
                let mut iter = args.into_iter();
                let first = iter.next().unwrap_or(Value::Missing);
                for other in iter {
                    if equal(&first, &other)? {
                        return Ok(Value::Bool(true));
                    }
                }
                Ok(Value::Bool(false))
            }
            Builtin::Ne => {
                let [a, b] = exact::<2>(args)?;
                Ok(Value::Bool(!equal(&a, &b)?))
            }
            Builtin::Lt => compare(args, |o| o == Ordering::Less),
            Builtin::Le => compare(args, |o| o != Ordering::Greater),
            Builtin::Gt => compare(args, |o| o == Ordering::Greater),
            Builtin::Ge => compare(args, |o| o != Ordering::Less),
            Builtin::Len => {
                let [arg] = exact::<1>(args)?;
                match arg {
                    Value::Str(s) => Ok(Value::Int(s.len() as i64)),
                    Value::Map(m) => Ok(Value::Int(m.len() as i64)),
                    Value::Missing => Ok(Value::Int(0)),
                    other => Err(format!("len of type {}", other.type_name())),
                }
            }
            Builtin::Index => index(args),
            Builtin::Slice => slice(args),
            Builtin::Print => Ok(Value::Str(sprint(&args))),
            Builtin::Println => Ok(Value::Str(sprintln(&args))),
            Builtin::Printf => {
                at_least(1, &args)?;
                let (head, rest) = args.split_at(1);
                let layout = head[0].as_bytes().ok_or_else(|| {
                    format!("wrong type for value; expected string; got {}", head[0].type_name())
                })?;
                Ok(Value::Str(sprintf(layout, rest)))
            }
            Builtin::Urlquery => Ok(Value::string(query_escape(&joined(&args)))),
            Builtin::Html => Ok(Value::Str(html_escape(&joined(&args)))),
            Builtin::Js => Ok(Value::Str(js_escape(&joined(&args)))),
            Builtin::Call => {
                at_least(1, &args)?;
                match &args[0] {
                    Value::Nil | Value::Missing => Err("call of nil".to_string()),
                    other => Err(format!("non-function of type {}", other.type_name())),
                }
            }
        }
    }
}

pub(crate) fn exact<const N: usize>(args: Vec<Value>) -> Result<[Value; N], String> {
    <[Value; N]>::try_from(args)
        .map_err(|args| format!("wrong number of args: want {} got {}", N, args.len()))
}

fn at_least(n: usize, args: &[Value]) -> Result<(), String> {
    if args.len() < n {
        return Err(format!("wrong number of args: want at least {} got {}", n, args.len()));
    }
    Ok(())
}

/// A missing value compares and indexes as the empty string.
fn or_empty(value: Value) -> Value {
    match value {
        Value::Missing => Value::Str(Vec::new()),
        other => other,
    }
}

fn equal(a: &Value, b: &Value) -> Result<bool, String> {
    match (or_empty(a.clone()), or_empty(b.clone())) {
        (Value::Str(x), Value::Str(y)) => Ok(x == y),
        (Value::Int(x), Value::Int(y)) => Ok(x == y),
        (Value::Bool(x), Value::Bool(y)) => Ok(x == y),
        (Value::Nil, Value::Nil) => Ok(true),
        (a, b) => Err(format!(
            "incompatible types for comparison: {} and {}",
            a.type_name(),
            b.type_name()
        )),
    }
}

fn compare(args: Vec<Value>, accept: fn(Ordering) -> bool) -> Result<Value, String> {
    let [a, b] = exact::<2>(args)?;
    let ordering = match (or_empty(a), or_empty(b)) {
        (Value::Int(x), Value::Int(y)) => x.cmp(&y),
        (Value::Str(x), Value::Str(y)) => x.cmp(&y),
        (Value::Int(_) | Value::Str(_), Value::Int(_) | Value::Str(_)) => {
            return Err("incompatible types for comparison".to_string())
        }
        _ => return Err("invalid type for comparison".to_string()),
    };
    Ok(Value::Bool(accept(ordering)))
}

fn index(args: Vec<Value>) -> Result<Value, String> {
    let mut iter = args.into_iter();
    let Some(mut item) = iter.next() else {
        return Err("wrong number of args: want at least 1 got 0".to_string());
    };

    for key in iter {
        item = match (or_empty(item), key) {
            (Value::Map(map), key) => {
                let Some(name) = key.as_bytes() else {
                    return Err(format!("value has type {}; should be string", key.type_name()));
                };
                std::str::from_utf8(name)
                    .ok()
                    .and_then(|name| map.get(name))
                    .map(|v| Value::string(v.as_str()))
                    .unwrap_or(Value::Missing)
            }
            (Value::Str(s), Value::Int(i)) => usize::try_from(i)
                .ok()
                .and_then(|at| s.get(at))
                .map(|b| Value::Int(i64::from(*b)))
                .ok_or_else(|| format!("index out of range: {}", i))?,
            (Value::Str(_), other) => {
                return Err(format!("cannot index slice/array with type {}", other.type_name()))
            }
            (Value::Nil, _) => return Err("index of untyped nil".to_string()),
            (other, _) => return Err(format!("can't index item of type {}", other.type_name())),
        };
    }
    Ok(item)
}

fn slice(args: Vec<Value>) -> Result<Value, String> {
    let Some((item, indexes)) = args.split_first() else {
        return Err("wrong number of args: want at least 1 got 0".to_string());
    };
    let bytes: &[u8] = match item {
        Value::Str(s) => s,
        Value::Missing => &[],
        Value::Nil => return Err("slice of untyped nil".to_string()),
        other => return Err(format!("can't slice item of type {}", other.type_name())),
    };
    if indexes.len() > 2 {
        return Err("cannot 3-index slice a string".to_string());
    }

    let mut bounds = [0, bytes.len()];
    for (slot, index) in bounds.iter_mut().zip(indexes) {
        let Value::Int(i) = index else {
            return Err(format!("cannot index slice/array with type {}", index.type_name()));
        };
        *slot = usize::try_from(*i)
            .ok()
            .filter(|at| *at <= bytes.len())
            .ok_or_else(|| format!("index out of range: {}", i))?;
    }
    if bounds[0] > bounds[1] {
        return Err(format!("invalid slice index: {} > {}", bounds[0], bounds[1]));
    }

    Ok(Value::Str(bytes[bounds[0]..bounds[1]].to_vec()))
}

/// Operands are separated by a space unless either side is a string.
pub(crate) fn sprint(args: &[Value]) -> Vec<u8> {
    let mut out = Vec::new();
    for (i, arg) in args.iter().enumerate() {
        if i > 0 && !arg.is_string() && !args[i - 1].is_string() {
            out.push(b' ');
        }
        arg.print_to(&mut out);
    }
    out
}

fn sprintln(args: &[Value]) -> Vec<u8> {
    let mut out = Vec::new();
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            out.push(b' ');
        }
        arg.print_to(&mut out);
    }
    out.push(b'\n');
    out
}

/// Escaper input: a lone string argument as-is, anything else printed.
fn joined(args: &[Value]) -> Vec<u8> {
    match args {
        [Value::Str(s)] => s.clone(),
        _ => sprint(args),
    }
}

fn html_escape(text: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    for &b in text {
        match b {
            b'"' => out.extend_from_slice(b"&#34;"),
            b'\'' => out.extend_from_slice(b"&#39;"),
            b'&' => out.extend_from_slice(b"&amp;"),
            b'<' => out.extend_from_slice(b"&lt;"),
            b'>' => out.extend_from_slice(b"&gt;"),
            0 => out.extend_from_slice("\u{FFFD}".as_bytes()),
            _ => out.push(b),
        }
    }
    out
}

/// Invalid UTF-8 passes through untouched.
fn js_escape(text: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    for chunk in text.utf8_chunks() {
        for c in chunk.valid().chars() {
            match c {
                '\\' => out.extend_from_slice(b"\\\\"),
                '\'' => out.extend_from_slice(b"\\'"),
                '"' => out.extend_from_slice(b"\\\""),
                '<' | '>' | '&' | '=' => push_unicode_escape(&mut out, c),
                c if c.is_control() => push_unicode_escape(&mut out, c),
                c => {
                    let mut buf = [0; 4];
                    out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
                }
            }
        }
        out.extend_from_slice(chunk.invalid());
    }
    out
}

fn push_unicode_escape(out: &mut Vec<u8>, c: char) {
    out.extend_from_slice(format!("\\u{:04X}", c as u32).as_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(text: &str) -> Value {
        Value::string(text)
    }

    fn call(builtin: Builtin, args: Vec<Value>) -> Result<Value, String> {
        builtin.call(args)
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(call(Builtin::Lt, vec![Value::Int(1), Value::Int(2)]), Ok(Value::Bool(true)));
        assert_eq!(call(Builtin::Ge, vec![s("b"), s("a")]), Ok(Value::Bool(true)));
        assert_eq!(call(Builtin::Le, vec![Value::Missing, s("")]), Ok(Value::Bool(true)));
        assert_eq!(
            call(Builtin::Gt, vec![Value::Int(1), s("1")]),
            Err("incompatible types for comparison".to_string())
        );
        assert_eq!(
            call(Builtin::Lt, vec![Value::Bool(true), Value::Bool(false)]),
            Err("invalid type for comparison".to_string())
        );
    }

    #[test]
    fn test_index() {
        assert_eq!(call(Builtin::Index, vec![s("abc"), Value::Int(1)]), Ok(Value::Int(98)));
        assert_eq!(
            call(Builtin::Index, vec![s("abc"), Value::Int(3)]),
            Err("index out of range: 3".to_string())
        );
        assert_eq!(
            call(Builtin::Index, vec![Value::Nil, Value::Int(0)]),
            Err("index of untyped nil".to_string())
        );
        assert_eq!(call(Builtin::Index, vec![s("x")]), Ok(s("x")));
    }

    #[test]
    fn test_slice() {
        assert_eq!(
            call(Builtin::Slice, vec![s("hello"), Value::Int(1), Value::Int(3)]),
            Ok(s("el"))
        );
        assert_eq!(call(Builtin::Slice, vec![s("hello"), Value::Int(3)]), Ok(s("lo")));
        assert!(call(Builtin::Slice, vec![s("hello"), Value::Int(3), Value::Int(1)]).is_err());
        assert!(call(Builtin::Slice, vec![s("hi"), Value::Int(0), Value::Int(1), Value::Int(2)])
            .is_err());
    }

    #[test]
    fn test_print_family() {
        assert_eq!(
            sprint(&[Value::Int(1), Value::Int(2), s("x"), Value::Nil]),
            b"1 2x<nil>".to_vec()
        );
        assert_eq!(call(Builtin::Println, vec![s("a"), s("b")]), Ok(s("a b\n")));
    }

    #[test]
    fn test_escapers() {
        assert_eq!(
            html_escape(b"<a href='x'>&\"\0"),
            "&lt;a href=&#39;x&#39;&gt;&amp;&#34;\u{FFFD}".as_bytes()
        );
        assert_eq!(
            js_escape(b"a'b\"<=>&\\\n"),
            br#"a\'b\"\u003C\u003D\u003E\u0026\\\u000A"#.to_vec()
        );
        assert_eq!(js_escape(&[b'a', 0xFF]), vec![b'a', 0xFF]);
        assert_eq!(call(Builtin::Urlquery, vec![s("a b&c")]), Ok(s("a+b%26c")));
        assert_eq!(call(Builtin::Html, vec![Value::Int(1), Value::Int(2)]), Ok(s("1 2")));
    }

    #[test]
    fn test_call_reports_non_function() {
        assert_eq!(call(Builtin::Call, vec![Value::Nil]), Err("call of nil".to_string()));
        assert_eq!(
            call(Builtin::Call, vec![s("f")]),
            Err("non-function of type string".to_string())
        );
    }
}
