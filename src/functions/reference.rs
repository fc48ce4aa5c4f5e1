//! Splits a URL reference into components without resolving it.
//!
//! Relative references such as `/a/b?x=1`, `?q=1` or `//cdn/p` are accepted,
//! and the authority is returned as written, so an explicit default port
//! survives.

use super::unescape;

pub(super) struct Reference<'a> {
    pub scheme: &'a [u8],
    /// `host[:port]` without any userinfo.
    pub host: &'a [u8],
    /// Percent-decoded path.
    pub path: Vec<u8>,
    pub raw_query: &'a [u8],
}

impl<'a> Reference<'a> {
    pub fn parse(raw: &'a [u8]) -> Option<Self> {
        if raw.iter().any(|b| *b < 0x20 || *b == 0x7f) {
            return None;
        }

        let (raw, fragment) = cut(raw, b'#');
        if let Some(fragment) = fragment {
            unescape(fragment, false)?;
        }

        let (scheme, rest) = split_scheme(raw)?;
        let (rest, query) = cut(rest, b'?');
        let raw_query = query.unwrap_or_default();

        if !rest.starts_with(b"/") {
            if !scheme.is_empty() {
                // Opaque form such as `mailto:a@b`.
                return Some(Self {
                    scheme,
                    host: b"",
                    path: Vec::new(),
                    raw_query,
                });
            }
            if cut(rest, b'/').0.contains(&b':') {
                return None;
            }
        }

        let (host, path) =
            if rest.starts_with(b"//") && (!scheme.is_empty() || !rest.starts_with(b"///")) {
                let authority = &rest[2..];
                let end = authority
                    .iter()
                    .position(|b| *b == b'/')
                    .unwrap_or(authority.len());
                (parse_host(&authority[..end])?, &authority[end..])
            } else {
                (&b""[..], rest)
            };

        Some(Self {
            scheme,
            host,
            path: unescape(path, false)?,
            raw_query,
        })
    }
}

fn cut(s: &[u8], sep: u8) -> (&[u8], Option<&[u8]>) {
    match s.iter().position(|b| *b == sep) {
        Some(i) => (&s[..i], Some(&s[i + 1..])),
        None => (s, None),
    }
}

/// `(scheme, rest)`. A leading `:` is an error; anything else that is not a
/// valid scheme means the reference has none.
fn split_scheme(raw: &[u8]) -> Option<(&[u8], &[u8])> {
    for (i, b) in raw.iter().enumerate() {
        match b {
            b'a'..=b'z' | b'A'..=b'Z' => {}
            b'0'..=b'9' | b'+' | b'-' | b'.' if i > 0 => {}
            b':' if i == 0 => return None,
            b':' => return Some((&raw[..i], &raw[i + 1..])),
            _ => break,
        }
    }
    Some((b"", raw))
}

fn parse_host(authority: &[u8]) -> Option<&[u8]> {
    let host = match authority.iter().rposition(|b| *b == b'@') {
        Some(at) => &authority[at + 1..],
        None => authority,
    };

    let port_start = if host.starts_with(b"[") {
        host.iter().rposition(|b| *b == b']')? + 1
    } else {
        host.iter().rposition(|b| *b == b':').unwrap_or(host.len())
    };

    let (name, port) = host.split_at(port_start);
    if let Some((colon, digits)) = port.split_first() {
        if *colon != b':' || !digits.iter().all(u8::is_ascii_digit) {
            return None;
        }
    }
    if !name.iter().all(|b| !b.is_ascii() || is_host_byte(*b)) {
        return None;
    }

    Some(host)
}

fn is_host_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"-_.~!$&'()*+,;=:[]<>\"%".contains(&b)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parts(raw: &str) -> Option<(String, String, String, String)> {
        Reference::parse(raw.as_bytes()).map(|r| {
            (
                String::from_utf8(r.scheme.to_vec()).unwrap(),
                String::from_utf8(r.host.to_vec()).unwrap(),
                String::from_utf8(r.path).unwrap(),
                String::from_utf8(r.raw_query.to_vec()).unwrap(),
            )
        })
    }

    fn owned(s: [&str; 4]) -> Option<(String, String, String, String)> {
        Some((s[0].into(), s[1].into(), s[2].into(), s[3].into()))
    }

    #[test]
    fn test_absolute() {
        assert_eq!(
            parts("https://user:pw@Example.com:443/a%2Fb?x=1&y#top"),
            owned(["https", "Example.com:443", "/a/b", "x=1&y"])
        );
        assert_eq!(parts("http://[::1]:8080/"), owned(["http", "[::1]:8080", "/", ""]));
    }

    #[test]
    fn test_relative() {
        assert_eq!(parts("/a/b?x=1"), owned(["", "", "/a/b", "x=1"]));
        assert_eq!(parts("?a=1"), owned(["", "", "", "a=1"]));
        assert_eq!(parts("//cdn.example/p"), owned(["", "cdn.example", "/p", ""]));
        assert_eq!(parts("a b/c"), owned(["", "", "a b/c", ""]));
        assert_eq!(parts(""), owned(["", "", "", ""]));
    }

    #[test]
    fn test_opaque() {
        assert_eq!(parts("mailto:a@b.example?subject=x"), owned(["mailto", "", "", "subject=x"]));
    }

    #[test]
    fn test_rejected() {
        for raw in [
            ":nothing",
            "a b:c",
            "http://host:port/",
            "http://a b/",
            "http://[::1/",
            "/bad%zz",
            "/ok#bad%",
            "http://x/\n",
        ] {
            assert!(Reference::parse(raw.as_bytes()).is_none(), "{:?}", raw);
        }
    }
}
