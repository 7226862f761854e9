//! HTTP header storage with case-insensitive lookup.

/// An ordered list of `(name, value)` header pairs, preserving the order in
/// which they appeared on the wire while allowing case-insensitive lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub(crate) fn push(&mut self, name: String, value: String) {
        self.0.push((name, value));
    }

    /// Looks up a header by name, ignoring case, returning the first match.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns true if a header with this name has this value, compared
    /// case-insensitively on both sides.
    pub fn matches(&self, name: &str, value: &str) -> bool {
        matches!(self.get(name), Some(v) if v.eq_ignore_ascii_case(value))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

pub const HOST: &str = "Host";
pub const CONNECTION: &str = "Connection";
pub const CONTENT_LENGTH: &str = "Content-Length";
pub const CONTENT_TYPE: &str = "Content-Type";
pub const UPGRADE: &str = "Upgrade";
pub const SEC_WEBSOCKET_KEY: &str = "Sec-WebSocket-Key";
pub const SEC_WEBSOCKET_ACCEPT: &str = "Sec-WebSocket-Accept";
pub const SEC_WEBSOCKET_VERSION: &str = "Sec-WebSocket-Version";
pub const SEC_WEBSOCKET_PROTOCOL: &str = "Sec-WebSocket-Protocol";

pub const WEBSOCKET: &str = "websocket";
pub const KEEP_ALIVE: &str = "keep-alive";
pub const CLOSE: &str = "close";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_looks_up_headers_case_insensitively() {
        let mut headers = Headers::new();
        headers.push("Content-Type".into(), "text/plain".into());
        headers.push("Host".into(), "example.com".into());

        assert_eq!(headers.get("content-type"), Some("text/plain"));
        assert_eq!(headers.get("HOST"), Some("example.com"));
        assert_eq!(headers.get("missing"), None);
    }

    #[test]
    fn it_matches_header_values_case_insensitively() {
        let mut headers = Headers::new();
        headers.push("Upgrade".into(), "WebSocket".into());

        assert!(headers.matches("upgrade", "websocket"));
        assert!(!headers.matches("upgrade", "h2c"));
    }

    #[test]
    fn it_preserves_insertion_order() {
        let mut headers = Headers::new();
        headers.push("A".into(), "1".into());
        headers.push("B".into(), "2".into());

        let collected: Vec<_> = headers.iter().collect();
        assert_eq!(collected, vec![("A", "1"), ("B", "2")]);
    }
}
