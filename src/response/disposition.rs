//! `Content-Disposition` formatting with MIME parameter encoding.
//!
//! A filename made only of token characters is written bare, other
//! printable ASCII is written as a quoted string, and anything else uses
//! the RFC 2231 `filename*=utf-8''...` extended form.

const TSPECIALS: &[u8] = b"()<>@,;:\\\"/[]?=";

fn is_tspecial(b: u8) -> bool {
    TSPECIALS.contains(&b)
}

fn is_token_char(b: u8) -> bool {
    b > 0x20 && b < 0x7f && !is_tspecial(b)
}

fn is_token(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(is_token_char)
}

fn needs_encoding(s: &str) -> bool {
    s.bytes().any(|b| (b < b' ' || b > b'~') && b != b'\t')
}

/// `attachment; filename=...` for the given filename.
pub fn attachment(filename: &str) -> String {
    let mut out = String::from("attachment; filename");

    if needs_encoding(filename) {
        out.push_str("*=utf-8''");
        for b in filename.bytes() {
            if b <= b' ' || b >= 0x7f || is_tspecial(b) || matches!(b, b'*' | b'\'' | b'%') {
                out.push_str(&format!("%{:02X}", b));
            } else {
                out.push(b as char);
            }
        }
    } else if is_token(filename) {
        out.push('=');
        out.push_str(filename);
    } else {
        out.push_str("=\"");
        for c in filename.chars() {
            if c == '"' || c == '\\' {
                out.push('\\');
            }
            out.push(c);
        }
        out.push('"');
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_filename() {
        assert_eq!(attachment("a.txt"), "attachment; filename=a.txt");
        assert_eq!(attachment("clash-config_v2.yaml"), "attachment; filename=clash-config_v2.yaml");
    }

    #[test]
    fn test_quoted_filename() {
        assert_eq!(attachment("my file.txt"), "attachment; filename=\"my file.txt\"");
        assert_eq!(attachment("a\"b\\c"), "attachment; filename=\"a\\\"b\\\\c\"");
        assert_eq!(attachment(""), "attachment; filename=\"\"");
    }

    #[test]
    fn test_non_ascii_filename_is_extended() {
        assert_eq!(
            attachment("配置 1.yaml"),
            "attachment; filename*=utf-8''%E9%85%8D%E7%BD%AE%201.yaml"
        );
        assert_eq!(attachment("a\nb"), "attachment; filename*=utf-8''a%0Ab");
    }
}
