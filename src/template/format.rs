//! `printf` formatting for template values.
//!
//! Supports `%v %s %q %d %x %X %o %b %c %U %t %%` with the `-`, `+`, `#`,
//! `0` and space flags, width, precision and `*`. Argument mismatches are
//! reported inline, e.g. `%!d(string=abc)` or `%!s(MISSING)`.

use std::io::Write;

use super::value::Value;

#[derive(Debug, Default, Clone, Copy)]
struct Flags {
    minus: bool,
    plus: bool,
    sharp: bool,
    zero: bool,
    space: bool,
    width: Option<usize>,
    precision: Option<usize>,
}

pub(crate) fn sprintf(layout: &[u8], args: &[Value]) -> Vec<u8> {
    let mut out = Vec::with_capacity(layout.len());
    let mut next = 0;
    let mut i = 0;

    while i < layout.len() {
        if layout[i] != b'%' {
            out.push(layout[i]);
            i += 1;
            continue;
        }
        i += 1;

        let mut flags = Flags::default();
        while let Some(flag) = layout.get(i) {
            match flag {
                b'-' => flags.minus = true,
                b'+' => flags.plus = true,
                b'#' => flags.sharp = true,
                b'0' => flags.zero = true,
                b' ' => flags.space = true,
                _ => break,
            }
            i += 1;
        }

        if layout.get(i) == Some(&b'*') {
            i += 1;
            match args.get(next) {
                Some(Value::Int(n)) => {
                    flags.minus |= *n < 0;
                    flags.width = usize::try_from(n.unsigned_abs()).ok();
                }
                _ => out.extend_from_slice(b"%!(BADWIDTH)"),
            }
            next += 1;
        } else {
            flags.width = digits(layout, &mut i);
        }

        if layout.get(i) == Some(&b'.') {
            i += 1;
            if layout.get(i) == Some(&b'*') {
                i += 1;
                match args.get(next) {
                    Some(Value::Int(n)) if *n >= 0 => flags.precision = usize::try_from(*n).ok(),
                    _ => out.extend_from_slice(b"%!(BADPREC)"),
                }
                next += 1;
            } else {
                flags.precision = Some(digits(layout, &mut i).unwrap_or(0));
            }
        }

        let Some((verb, len)) = next_char(&layout[i..]) else {
            out.extend_from_slice(b"%!(NOVERB)");
            break;
        };
        i += len;

        if verb == '%' {
            out.push(b'%');
            continue;
        }
        match args.get(next) {
            Some(arg) => format_arg(&mut out, &flags, verb, arg),
            None => {
                let _ = write!(out, "%!{}(MISSING)", verb);
            }
        }
        next += 1;
    }

    if next < args.len() {
        out.extend_from_slice(b"%!(EXTRA ");
        for (n, arg) in args[next..].iter().enumerate() {
            if n > 0 {
                out.extend_from_slice(b", ");
            }
            match normalize(arg) {
                Value::Nil => out.extend_from_slice(b"<nil>"),
                arg => {
                    let _ = write!(out, "{}=", arg.type_name());
                    arg.print_to(&mut out);
                }
            }
        }
        out.push(b')');
    }

    out
}

fn format_arg(out: &mut Vec<u8>, flags: &Flags, verb: char, arg: &Value) {
    match (verb, normalize(arg)) {
        ('v' | 's', Value::Str(s)) => pad(out, flags, truncate(&s, flags.precision)),
        ('q', Value::Str(s)) => {
            let text = truncate(&s, flags.precision);
            if flags.sharp && can_backquote(text) {
                let mut quoted = Vec::with_capacity(text.len() + 2);
                quoted.push(b'`');
                quoted.extend_from_slice(text);
                quoted.push(b'`');
                pad(out, flags, &quoted);
            } else {
                pad(out, flags, &quote(text, '"', flags.plus));
            }
        }
        ('x' | 'X', Value::Str(s)) => hex_bytes(out, flags, &s, verb == 'X'),
        ('v' | 'd', Value::Int(n)) => integer(out, flags, n, 10, false),
        ('x', Value::Int(n)) => integer(out, flags, n, 16, false),
        ('X', Value::Int(n)) => integer(out, flags, n, 16, true),
        ('o', Value::Int(n)) => integer(out, flags, n, 8, false),
        ('b', Value::Int(n)) => integer(out, flags, n, 2, false),
        ('c', Value::Int(n)) => {
            let mut buf = [0; 4];
            pad(out, flags, rune(n).encode_utf8(&mut buf).as_bytes());
        }
        ('q', Value::Int(n)) => {
            let mut buf = [0; 4];
            let c = rune(n).encode_utf8(&mut buf);
            pad(out, flags, &quote(c.as_bytes(), '\'', flags.plus));
        }
        ('U', Value::Int(n)) => pad(out, flags, format!("U+{:04X}", n).as_bytes()),
        ('v' | 't', Value::Bool(b)) => pad(out, flags, if b { &b"true"[..] } else { b"false" }),
        ('v', Value::Nil) => pad(out, flags, b"<nil>"),
        (_, Value::Nil) => {
            let _ = write!(out, "%!{}(<nil>)", verb);
        }
        (_, Value::Map(map)) => {
            out.extend_from_slice(b"map[");
            for (n, (key, value)) in map.iter().enumerate() {
                if n > 0 {
                    out.push(b' ');
                }
                format_arg(out, flags, verb, &Value::string(key.as_str()));
                out.push(b':');
                format_arg(out, flags, verb, &Value::string(value.as_str()));
            }
            out.push(b']');
        }
        (_, arg) => {
            let _ = write!(out, "%!{}({}=", verb, arg.type_name());
            arg.print_to(out);
            out.push(b')');
        }
    }
}

/// A missing value formats as the empty string.
fn normalize(arg: &Value) -> Value {
    match arg {
        Value::Missing => Value::Str(Vec::new()),
        other => other.clone(),
    }
}

fn digits(layout: &[u8], i: &mut usize) -> Option<usize> {
    let start = *i;
    while layout.get(*i).is_some_and(u8::is_ascii_digit) {
        *i += 1;
    }
    std::str::from_utf8(&layout[start..*i]).ok()?.parse().ok()
}

/// The character at the start of `bytes` and its encoded length. A byte
/// that does not begin valid UTF-8 reads as U+FFFD.
fn next_char(bytes: &[u8]) -> Option<(char, usize)> {
    if bytes.is_empty() {
        return None;
    }
    for len in 1..=bytes.len().min(4) {
        if let Some(c) = std::str::from_utf8(&bytes[..len]).ok().and_then(|s| s.chars().next()) {
            return Some((c, len));
        }
    }
    Some((char::REPLACEMENT_CHARACTER, 1))
}

fn rune(n: i64) -> char {
    u32::try_from(n)
        .ok()
        .and_then(char::from_u32)
        .unwrap_or(char::REPLACEMENT_CHARACTER)
}

/// Width counts characters, with each invalid byte counting as one.
fn char_count(bytes: &[u8]) -> usize {
    bytes
        .utf8_chunks()
        .map(|chunk| chunk.valid().chars().count() + chunk.invalid().len())
        .sum()
}

/// Precision limits strings to that many characters.
fn truncate(bytes: &[u8], precision: Option<usize>) -> &[u8] {
    let Some(limit) = precision else {
        return bytes;
    };
    let mut end = 0;
    let mut count = 0;
    for chunk in bytes.utf8_chunks() {
        let lengths = chunk
            .valid()
            .chars()
            .map(char::len_utf8)
            .chain(chunk.invalid().iter().map(|_| 1));
        for len in lengths {
            if count == limit {
                return &bytes[..end];
            }
            end += len;
            count += 1;
        }
    }
    bytes
}

fn pad(out: &mut Vec<u8>, flags: &Flags, body: &[u8]) {
    let fill = if flags.zero && !flags.minus { b'0' } else { b' ' };
    pad_with(out, flags, fill, body);
}

fn pad_with(out: &mut Vec<u8>, flags: &Flags, fill: u8, body: &[u8]) {
    let missing = flags.width.unwrap_or(0).saturating_sub(char_count(body));
    if flags.minus {
        out.extend_from_slice(body);
        out.extend(std::iter::repeat(b' ').take(missing));
    } else {
        out.extend(std::iter::repeat(fill).take(missing));
        out.extend_from_slice(body);
    }
}

fn integer(out: &mut Vec<u8>, flags: &Flags, n: i64, radix: u32, upper: bool) {
    let magnitude = n.unsigned_abs();
    let mut digits = match radix {
        16 if upper => format!("{:X}", magnitude),
        16 => format!("{:x}", magnitude),
        8 => format!("{:o}", magnitude),
        2 => format!("{:b}", magnitude),
        _ => magnitude.to_string(),
    };
    if let Some(precision) = flags.precision {
        if precision == 0 && n == 0 {
            digits.clear();
        } else if digits.len() < precision {
            digits.insert_str(0, &"0".repeat(precision - digits.len()));
        }
    }

    let prefix = match (flags.sharp, radix) {
        (true, 16) if upper => "0X",
        (true, 16) => "0x",
        (true, 8) if !digits.starts_with('0') => "0",
        (true, 2) => "0b",
        _ => "",
    };
    let sign = if n < 0 {
        "-"
    } else if flags.plus {
        "+"
    } else if flags.space {
        " "
    } else {
        ""
    };
    let head = format!("{}{}", sign, prefix);

    let width = flags.width.unwrap_or(0);
    let used = head.len() + digits.len();
    if flags.zero && !flags.minus && flags.precision.is_none() && width > used {
        out.extend_from_slice(head.as_bytes());
        out.extend(std::iter::repeat(b'0').take(width - used));
        out.extend_from_slice(digits.as_bytes());
    } else {
        pad_with(out, flags, b' ', format!("{}{}", head, digits).as_bytes());
    }
}

fn hex_bytes(out: &mut Vec<u8>, flags: &Flags, bytes: &[u8], upper: bool) {
    let limit = flags.precision.map_or(bytes.len(), |p| p.min(bytes.len()));
    let mut body = Vec::with_capacity(limit * 2);
    for (n, b) in bytes[..limit].iter().enumerate() {
        if flags.space && n > 0 {
            body.push(b' ');
        }
        if flags.sharp && (flags.space || n == 0) {
            body.extend_from_slice(if upper { b"0X" } else { b"0x" });
        }
        let _ = if upper {
            write!(body, "{:02X}", b)
        } else {
            write!(body, "{:02x}", b)
        };
    }
    pad(out, flags, &body);
}

fn can_backquote(bytes: &[u8]) -> bool {
    match std::str::from_utf8(bytes) {
        Ok(text) => text
            .chars()
            .all(|c| c != '`' && c != '\u{FEFF}' && (c == '\t' || !c.is_control())),
        Err(_) => false,
    }
}

/// Double- or single-quoted literal with backslash escapes. `ascii_only`
/// also escapes every non-ASCII character.
fn quote(bytes: &[u8], delimiter: char, ascii_only: bool) -> Vec<u8> {
    let mut out = String::with_capacity(bytes.len() + 2);
    out.push(delimiter);
    for chunk in bytes.utf8_chunks() {
        for c in chunk.valid().chars() {
            match c {
                '\\' => out.push_str("\\\\"),
                c if c == delimiter => {
                    out.push('\\');
                    out.push(c);
                }
                '\u{07}' => out.push_str("\\a"),
                '\u{08}' => out.push_str("\\b"),
                '\u{0C}' => out.push_str("\\f"),
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                '\t' => out.push_str("\\t"),
                '\u{0B}' => out.push_str("\\v"),
                c if (c as u32) < 0x20 || c == '\u{7F}' => {
                    out.push_str(&format!("\\x{:02x}", c as u32));
                }
                c if c.is_control() || (ascii_only && !c.is_ascii()) => {
                    if (c as u32) < 0x10000 {
                        out.push_str(&format!("\\u{:04x}", c as u32));
                    } else {
                        out.push_str(&format!("\\U{:08x}", c as u32));
                    }
                }
                c => out.push(c),
            }
        }
        for b in chunk.invalid() {
            out.push_str(&format!("\\x{:02x}", b));
        }
    }
    out.push(delimiter);
    out.into_bytes()
}
