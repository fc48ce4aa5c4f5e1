//! Leading-line attribute directives.
//!
//! Rendered output may open with a block of lines such as
//!
//! ```text
//! # Attribute: filename=clash.yaml
//! # Attribute: userinfo-url=https://example.com/sub
//! ```
//!
//! Scanning starts at the first line and stops at the first line without the
//! marker, so ordinary content further down is never read as configuration.
//! A marked line without `=` is skipped and does not stop the scan.

use std::collections::HashMap;

/// Prefix that marks a directive line.
pub const ATTRIBUTE_MARKER: &str = "# Attribute: ";

/// Directive key/value pairs. Later lines overwrite earlier ones.
pub type Attributes = HashMap<String, String>;

/// Scan `rendered` for the leading directive block. The body itself may hold
/// arbitrary bytes; directive keys and values are decoded lossily.
pub fn extract_attributes(rendered: &[u8]) -> Attributes {
    let mut attributes = Attributes::new();

    for line in rendered.split(|b| *b == b'\n') {
        let Some(directive) = line.strip_prefix(ATTRIBUTE_MARKER.as_bytes()) else {
            break;
        };

        let Some(eq) = directive.iter().position(|b| *b == b'=') else {
            tracing::debug!(
                line = %String::from_utf8_lossy(line),
                "Skipping malformed attribute directive"
            );
            continue;
        };

        let key = String::from_utf8_lossy(&directive[..eq]);
        let value = String::from_utf8_lossy(&directive[eq + 1..]);
        attributes.insert(key.trim().to_string(), value.trim().to_string());
    }

    attributes
}
