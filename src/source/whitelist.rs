use std::collections::HashSet;

use url::Url;

/// Hosts templates may be fetched from. Fixed at startup.
#[derive(Debug, Clone, Default)]
pub struct Whitelist {
    hosts: HashSet<String>,
}

impl Whitelist {
    pub fn new<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            hosts: hosts
                .into_iter()
                .map(|h| h.as_ref().trim().to_ascii_lowercase())
                .filter(|h| !h.is_empty())
                .collect(),
        }
    }

    /// Whether the URL's `host[:port]` is listed. An explicit non-default
    /// port must be listed along with the host.
    pub fn allows(&self, url: &Url) -> bool {
        self.hosts.contains(&authority(url))
    }
}

/// Lower-cased `host[:port]`. `Url` has already dropped a default port.
fn authority(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
    match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_allows_listed_host() {
        let whitelist = Whitelist::new(["raw.githubusercontent.com", "gist.githubusercontent.com"]);

        assert!(whitelist.allows(&url("https://raw.githubusercontent.com/u/r/main/t.tmpl")));
        assert!(whitelist.allows(&url("http://gist.githubusercontent.com/x")));
        assert!(!whitelist.allows(&url("https://githubusercontent.com/x")));
        assert!(!whitelist.allows(&url("https://evil.test/raw.githubusercontent.com")));
    }

    #[test]
    fn test_host_comparison_ignores_case() {
        let whitelist = Whitelist::new([" Raw.GitHubUserContent.com "]);
        assert!(whitelist.allows(&url("https://RAW.githubusercontent.com/x")));
    }

    #[test]
    fn test_ports() {
        let whitelist = Whitelist::new(["example.com", "internal.test:8080"]);

        assert!(whitelist.allows(&url("https://example.com:443/x")));
        assert!(!whitelist.allows(&url("https://example.com:8443/x")));
        assert!(whitelist.allows(&url("http://internal.test:8080/x")));
        assert!(!whitelist.allows(&url("http://internal.test/x")));
    }

    #[test]
    fn test_blank_entries_never_match() {
        let whitelist = Whitelist::new(["", "  "]);
        assert!(!whitelist.allows(&url("file:///etc/passwd")));
        assert!(!whitelist.allows(&url("http://example.com/")));
    }
}
