//! The immutable, fully-parsed HTTP request handed to handlers.

use bytes::Bytes;

use crate::headers::Headers;

/// A complete HTTP/1.1 request: method, URI, version, headers, and an
/// optional body collected per `Content-Length` framing (this crate does
/// not support chunked transfer encoding on ingress).
///
/// Immutable once parsed.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    method: String,
    uri: String,
    version: String,
    headers: Headers,
    body: Bytes,
}

impl HttpRequest {
    pub(crate) fn new(method: String, uri: String, version: String, headers: Headers, body: Bytes) -> Self {
        Self { method, uri, version, headers, body }
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// True if the request (given its HTTP version and explicit header)
    /// wants the connection kept alive after this response.
    pub fn wants_keep_alive(&self) -> bool {
        match self.headers.get(crate::headers::CONNECTION) {
            Some(v) if v.eq_ignore_ascii_case(crate::headers::CLOSE) => false,
            Some(_) => true,
            None => self.version == "HTTP/1.1",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(version: &str, connection: Option<&str>) -> HttpRequest {
        let mut headers = Headers::new();
        if let Some(c) = connection {
            headers.push("Connection".into(), c.into());
        }
        HttpRequest::new("GET".into(), "/".into(), version.into(), headers, Bytes::new())
    }

    #[test]
    fn http11_defaults_to_keep_alive() {
        assert!(req("HTTP/1.1", None).wants_keep_alive());
    }

    #[test]
    fn http10_defaults_to_close() {
        assert!(!req("HTTP/1.0", None).wants_keep_alive());
    }

    #[test]
    fn explicit_connection_close_overrides_version() {
        assert!(!req("HTTP/1.1", Some("close")).wants_keep_alive());
    }

    #[test]
    fn explicit_connection_keep_alive_overrides_version() {
        assert!(req("HTTP/1.0", Some("keep-alive")).wants_keep_alive());
    }
}
