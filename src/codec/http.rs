//! Pure functions translating bytes into HTTP start-lines and header lists.
//!
//! Nothing in this module touches I/O; it only knows how to interpret a
//! slice of already-buffered bytes, mirroring the codec-is-pure-functions
//! design called for by the read state machine.

use crate::error::{Error, Result};
use crate::headers::Headers;

/// A parsed HTTP/1.1 request line plus headers, produced by `ReadingHeaders`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLine {
    pub method: String,
    pub uri: String,
    pub version: String,
}

/// Scans `buf` for a CRLF-terminated line starting at offset 0.
/// Returns `Some((line, consumed))` where `consumed` includes the CRLF.
pub fn scan_line(buf: &[u8]) -> Option<(&[u8], usize)> {
    let pos = buf.windows(2).position(|w| w == b"\r\n")?;
    Some((&buf[..pos], pos + 2))
}

/// Parses one HTTP request line: `METHOD SP request-uri SP HTTP-version`.
pub fn parse_request_line(line: &[u8]) -> Result<RequestLine> {
    let line = std::str::from_utf8(line)
        .map_err(|_| Error::protocol("request line is not valid UTF-8"))?;
    let mut parts = line.splitn(3, ' ');
    let method = parts.next().filter(|s| !s.is_empty());
    let uri = parts.next().filter(|s| !s.is_empty());
    let version = parts.next().filter(|s| !s.is_empty());
    match (method, uri, version) {
        (Some(method), Some(uri), Some(version)) => Ok(RequestLine {
            method: method.to_owned(),
            uri: uri.to_owned(),
            version: version.to_owned(),
        }),
        _ => Err(Error::protocol("malformed request line")),
    }
}

/// Parses one `Name: value` header line. Folding (obsolete in RFC 7230) is
/// not supported, matching the Non-goal of this crate (no chunked/obsolete
/// transfer features).
pub fn parse_header_line(line: &[u8]) -> Result<(String, String)> {
    let line = std::str::from_utf8(line)
        .map_err(|_| Error::protocol("header line is not valid UTF-8"))?;
    let (name, value) = line
        .split_once(':')
        .ok_or_else(|| Error::protocol("header line missing ':'"))?;
    Ok((name.trim().to_owned(), value.trim().to_owned()))
}

/// Consumes `buf` from the start, parsing CRLF-terminated header lines until
/// a blank line is reached. Returns `Some((headers, consumed))` on a
/// complete header block, or `None` if more bytes are needed.
pub fn scan_headers(buf: &[u8]) -> Result<Option<(Headers, usize)>> {
    let mut headers = Headers::new();
    let mut offset = 0;
    loop {
        let Some((line, consumed)) = scan_line(&buf[offset..]) else {
            return Ok(None);
        };
        offset += consumed;
        if line.is_empty() {
            return Ok(Some((headers, offset)));
        }
        let (name, value) = parse_header_line(line)?;
        headers.push(name, value);
    }
}

/// Reads the `Content-Length` header, if present and valid.
pub fn content_length(headers: &Headers) -> Result<Option<u64>> {
    match headers.get(crate::headers::CONTENT_LENGTH) {
        None => Ok(None),
        Some(v) => v
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| Error::protocol("invalid Content-Length")),
    }
}
