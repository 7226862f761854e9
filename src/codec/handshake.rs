//! WebSocket upgrade handshake validation and `Sec-WebSocket-Accept`
//! computation (RFC 6455 §1.3).

use base64::{engine::general_purpose::STANDARD, Engine as _};
use sha1::{Digest, Sha1};

use crate::error::{Error, Result};
use crate::headers::{self, Headers};

const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Validates that `headers` carries a well-formed WebSocket upgrade request
/// and returns the `Sec-WebSocket-Key` value to accept.
pub fn validate_upgrade(headers: &Headers) -> Result<&str> {
    if !headers.matches(headers::UPGRADE, headers::WEBSOCKET) {
        return Err(Error::handshake("missing or invalid Upgrade header"));
    }
    if !headers.matches(headers::CONNECTION, headers::UPGRADE) {
        return Err(Error::handshake("missing or invalid Connection header"));
    }
    headers
        .get(headers::SEC_WEBSOCKET_KEY)
        .ok_or_else(|| Error::handshake("missing Sec-WebSocket-Key header"))
}

/// Computes `base64(SHA1(key + GUID))`, the value of `Sec-WebSocket-Accept`.
pub fn accept_key(client_key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(client_key.as_bytes());
    hasher.update(WEBSOCKET_GUID.as_bytes());
    STANDARD.encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_computes_the_rfc6455_example_accept_key() {
        assert_eq!(
            accept_key("dGhlIHNhbXBsZSBub25jZQ=="),
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }

    #[test]
    fn it_validates_a_well_formed_upgrade_request() {
        let mut headers = Headers::new();
        headers.push("Upgrade".into(), "websocket".into());
        headers.push("Connection".into(), "Upgrade".into());
        headers.push("Sec-WebSocket-Key".into(), "dGhlIHNhbXBsZSBub25jZQ==".into());

        assert_eq!(validate_upgrade(&headers).unwrap(), "dGhlIHNhbXBsZSBub25jZQ==");
    }

    #[test]
    fn it_rejects_missing_upgrade_header() {
        let mut headers = Headers::new();
        headers.push("Connection".into(), "Upgrade".into());
        headers.push("Sec-WebSocket-Key".into(), "x".into());
        assert!(validate_upgrade(&headers).is_err());
    }

    #[test]
    fn it_rejects_missing_connection_header() {
        let mut headers = Headers::new();
        headers.push("Upgrade".into(), "websocket".into());
        headers.push("Sec-WebSocket-Key".into(), "x".into());
        assert!(validate_upgrade(&headers).is_err());
    }

    #[test]
    fn it_rejects_missing_key_header() {
        let mut headers = Headers::new();
        headers.push("Upgrade".into(), "websocket".into());
        headers.push("Connection".into(), "Upgrade".into());
        assert!(validate_upgrade(&headers).is_err());
    }
}
