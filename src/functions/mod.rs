//! Encoding and URL inspection helpers exposed to templates.
//!
//! Every helper takes one byte string and returns one byte string. Decoders
//! and URL accessors return an empty string on malformed input instead of
//! failing, so a single bad argument never aborts a render. Decoded bytes are
//! passed through as-is, even when they are not valid UTF-8.

mod reference;

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, PAD};
use base64::Engine;
use percent_encoding::{percent_decode, percent_encode, AsciiSet, NON_ALPHANUMERIC};

use reference::Reference;

/// Signature shared by all library helpers.
pub type TextFn = fn(&[u8]) -> Vec<u8>;

/// Name and implementation of every helper, in registration order.
pub const LIBRARY: &[(&str, TextFn)] = &[
    ("encodeUrl", encode_url),
    ("decodeUrl", decode_url),
    ("encodeBase64", encode_base64),
    ("decodeBase64", decode_base64),
    ("encodeBase64Url", encode_base64_url),
    ("decodeBase64Url", decode_base64_url),
    ("schemeOf", scheme_of),
    ("hostOf", host_of),
    ("pathOf", path_of),
    ("queriesOf", queries_of),
];

/// Bytes left as-is in a query component; everything else is escaped.
const QUERY_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

// Padded alphabets that tolerate non-zero trailing bits.
const STANDARD: GeneralPurpose =
    GeneralPurpose::new(&alphabet::STANDARD, PAD.with_decode_allow_trailing_bits(true));
const URL_SAFE: GeneralPurpose =
    GeneralPurpose::new(&alphabet::URL_SAFE, PAD.with_decode_allow_trailing_bits(true));

/// Escape `text` for use inside a query string. Space becomes `+`.
pub fn query_escape(text: &[u8]) -> String {
    let mut out = String::with_capacity(text.len());
    for (i, part) in text.split(|b| *b == b' ').enumerate() {
        if i > 0 {
            out.push('+');
        }
        out.extend(percent_encode(part, QUERY_COMPONENT));
    }
    out
}

pub fn encode_url(text: &[u8]) -> Vec<u8> {
    query_escape(text).into_bytes()
}

/// Reverse of [`encode_url`]. Returns an empty string on a malformed escape.
pub fn decode_url(text: &[u8]) -> Vec<u8> {
    unescape(text, true).unwrap_or_default()
}

pub fn encode_base64(text: &[u8]) -> Vec<u8> {
    STANDARD.encode(text).into_bytes()
}

pub fn decode_base64(text: &[u8]) -> Vec<u8> {
    decode_wrapped(&STANDARD, text)
}

pub fn encode_base64_url(text: &[u8]) -> Vec<u8> {
    URL_SAFE.encode(text).into_bytes()
}

pub fn decode_base64_url(text: &[u8]) -> Vec<u8> {
    decode_wrapped(&URL_SAFE, text)
}

/// Lower-cased scheme, empty for a relative reference.
pub fn scheme_of(text: &[u8]) -> Vec<u8> {
    Reference::parse(text)
        .map(|r| r.scheme.to_ascii_lowercase())
        .unwrap_or_default()
}

/// Host as written, including an explicit port.
pub fn host_of(text: &[u8]) -> Vec<u8> {
    Reference::parse(text)
        .map(|r| r.host.to_vec())
        .unwrap_or_default()
}

/// Decoded path.
pub fn path_of(text: &[u8]) -> Vec<u8> {
    Reference::parse(text).map(|r| r.path).unwrap_or_default()
}

/// Raw (still encoded) query string, without the leading `?`.
pub fn queries_of(text: &[u8]) -> Vec<u8> {
    Reference::parse(text)
        .map(|r| r.raw_query.to_vec())
        .unwrap_or_default()
}

/// Line breaks inside the payload are ignored, as in wrapped base64.
fn decode_wrapped(engine: &GeneralPurpose, text: &[u8]) -> Vec<u8> {
    let compact: Vec<u8> = text
        .iter()
        .copied()
        .filter(|b| !matches!(b, b'\r' | b'\n'))
        .collect();
    engine.decode(compact).unwrap_or_default()
}

/// Percent-decode `text`, rejecting truncated or non-hex escapes.
///
/// With `plus_as_space` set, `+` decodes to a space as in form-encoded
/// query strings.
fn unescape(text: &[u8], plus_as_space: bool) -> Option<Vec<u8>> {
    let well_formed = text.iter().enumerate().all(|(i, b)| {
        *b != b'%'
            || (text.get(i + 1).is_some_and(u8::is_ascii_hexdigit)
                && text.get(i + 2).is_some_and(u8::is_ascii_hexdigit))
    });
    if !well_formed {
        return None;
    }

    if plus_as_space {
        let spaced: Vec<u8> = text
            .iter()
            .map(|b| if *b == b'+' { b' ' } else { *b })
            .collect();
        Some(percent_decode(&spaced).collect())
    } else {
        Some(percent_decode(text).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(f: TextFn, input: &str) -> String {
        String::from_utf8(f(input.as_bytes())).unwrap()
    }

    #[test]
    fn test_encode_url_uses_query_escaping() {
        assert_eq!(s(encode_url, "a b&c=d/é"), "a+b%26c%3Dd%2F%C3%A9");
        assert_eq!(s(encode_url, "-_.~*'"), "-_.~%2A%27");
    }

    #[test]
    fn test_decode_url() {
        assert_eq!(s(decode_url, "a+b%26c%3Dd"), "a b&c=d");
        assert_eq!(s(decode_url, "%C3%A9%2B"), "é+");
    }

    #[test]
    fn test_decode_url_malformed_is_empty() {
        assert_eq!(s(decode_url, "%zz"), "");
        assert_eq!(s(decode_url, "abc%4"), "");
        assert_eq!(s(decode_url, "%"), "");
    }

    #[test]
    fn test_decode_url_keeps_raw_bytes() {
        assert_eq!(decode_url(b"%FF%FE"), vec![0xFF, 0xFE]);
    }

    #[test]
    fn test_base64_standard() {
        assert_eq!(s(encode_base64, "hi"), "aGk=");
        assert_eq!(s(decode_base64, "aGk="), "hi");
        assert_eq!(s(decode_base64, "not base64!"), "");
        assert_eq!(s(decode_base64, "aGk"), "");
    }

    #[test]
    fn test_base64_url_safe() {
        assert_eq!(s(encode_base64, "???"), "Pz8/");
        assert_eq!(s(encode_base64_url, "???"), "Pz8_");
        assert_eq!(s(decode_base64_url, "Pz8_"), "???");
        assert_eq!(s(decode_base64_url, "Pz8/"), "");
    }

    #[test]
    fn test_base64_decode_skips_line_breaks() {
        assert_eq!(s(decode_base64, "aGVs\nbG8="), "hello");
        assert_eq!(s(decode_base64, "aGVs\r\nbG8=\r\n"), "hello");
        assert_eq!(s(decode_base64_url, "Pz\n8_"), "???");
    }

    #[test]
    fn test_base64_decode_allows_trailing_bits() {
        assert_eq!(s(decode_base64, "aGl="), "hi");
    }

    #[test]
    fn test_base64_round_trips_binary() {
        let raw = decode_base64(b"/w==");
        assert_eq!(raw, vec![0xFF]);
        assert_eq!(encode_base64(&raw), b"/w==".to_vec());
    }

    #[test]
    fn test_url_accessors() {
        let url = "https://example.com:8443/a%20b/c?x=1&y=two#frag";
        assert_eq!(s(scheme_of, url), "https");
        assert_eq!(s(host_of, url), "example.com:8443");
        assert_eq!(s(path_of, url), "/a b/c");
        assert_eq!(s(queries_of, url), "x=1&y=two");
    }

    #[test]
    fn test_url_accessors_on_relative_references() {
        assert_eq!(s(path_of, "/a/b?x=1"), "/a/b");
        assert_eq!(s(queries_of, "/a/b?x=1"), "x=1");
        assert_eq!(s(queries_of, "?a=1"), "a=1");
        assert_eq!(s(scheme_of, "/a/b"), "");
        assert_eq!(s(host_of, "//cdn.example:8080/x"), "cdn.example:8080");
    }

    #[test]
    fn test_explicit_port_is_kept() {
        assert_eq!(s(host_of, "https://example.com:443/"), "example.com:443");
        assert_eq!(s(host_of, "HTTPS://Example.com/"), "Example.com");
        assert_eq!(s(scheme_of, "HTTPS://Example.com/"), "https");
    }

    #[test]
    fn test_url_accessors_on_garbage_are_empty() {
        for f in [scheme_of, host_of, path_of, queries_of] {
            assert_eq!(s(f, "http://host:port/?q=1"), "");
            assert_eq!(s(f, ":no-scheme?q=1"), "");
        }
    }

    #[test]
    fn test_library_names_are_unique() {
        let mut names: Vec<_> = LIBRARY.iter().map(|(name, _)| *name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), LIBRARY.len());
    }
}
