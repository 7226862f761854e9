//! The per-connection read state machine: a growable buffer plus a current
//! state, consuming bytes into parsed HTTP and WebSocket events.
//!
//! `ReadDriver` owns the buffer and the state; `feed` is the only entry
//! point, matching the `feed(bytes) -> events, new state` contract. Nothing
//! here touches the socket — bytes come in as a slice already drained from
//! it by the reactor glue.

use bytes::Bytes;

use crate::codec::frame::{self, OpCode, WsFrameHeader};
use crate::codec::handshake;
use crate::codec::http::{self as http_codec, RequestLine};
use crate::error::{Error, Result};
use crate::headers::{self, Headers};
use crate::http::request::HttpRequest;

/// Cap on how large the buffer is allowed to grow while waiting on a single
/// request line or header block; guards against an unbounded line turning
/// into an unbounded allocation.
pub const MAX_BUFFER_CAPACITY: usize = 16 * 1024 * 1024;

enum State {
    ReadingRequestLine,
    ReadingHeaders { request: RequestLine },
    ReadingHttpBody { request: RequestLine, headers: Headers, remaining: u64, body: Vec<u8> },
    ReadingWsHeader,
    ReadingWsPayload { header: WsFrameHeader, received: Vec<u8> },
    Closed,
}

/// One completed unit of work produced by the state machine.
#[derive(Debug)]
pub enum Event {
    /// A fully parsed HTTP request, ready for routing.
    HttpRequest(HttpRequest),
    /// A validated WebSocket upgrade request. The caller writes the
    /// `101 Switching Protocols` response using `accept_key` (see
    /// `http::response::switching_protocols`); the driver has
    /// already moved on to `ReadingWsHeader`.
    WsUpgrade { request: HttpRequest, accept_key: String },
    /// An upgrade request that failed handshake validation. The caller
    /// responds `400 Bad Request` and closes the connection.
    WsUpgradeRejected { reason: String },
    WsText(String),
    WsBinary(Bytes),
    WsPing(Bytes),
    WsPong(Bytes),
    /// A CLOSE frame was received; the driver has moved to `Closed`.
    WsClose,
}

enum StepResult {
    NeedMoreBytes,
    Progressed(Option<Event>),
}

/// The stateful driver itself: a growable buffer with a read cursor and the
/// current parse state. One instance per connection, owned exclusively by
/// that connection's task.
pub struct ReadDriver {
    buf: Vec<u8>,
    pos: usize,
    state: State,
    max_read_loops: usize,
    fragment: Option<(OpCode, Vec<u8>)>,
}

impl ReadDriver {
    pub fn new(initial_capacity: usize, max_read_loops: usize) -> Self {
        Self {
            buf: Vec::with_capacity(initial_capacity),
            pos: 0,
            state: State::ReadingRequestLine,
            max_read_loops,
            fragment: None,
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.state, State::Closed)
    }

    /// Appends `bytes` to the buffer and runs the state machine for at most
    /// `max_read_loops` iterations (fairness bound across connections
    /// sharing a reactor), returning whatever events completed along the
    /// way. A protocol error aborts the remaining iterations and closes the
    /// driver; any events already produced during this call are discarded
    /// since the connection is going away regardless.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Vec<Event>> {
        self.buf.extend_from_slice(bytes);
        let mut events = Vec::new();

        for _ in 0..self.max_read_loops {
            if matches!(self.state, State::Closed) {
                break;
            }
            match self.step() {
                Ok(StepResult::NeedMoreBytes) => break,
                Ok(StepResult::Progressed(event)) => {
                    if let Some(event) = event {
                        events.push(event);
                    }
                }
                Err(err) => {
                    self.state = State::Closed;
                    self.compact();
                    return Err(err);
                }
            }
        }

        self.compact();
        Ok(events)
    }

    fn remaining(&self) -> &[u8] {
        &self.buf[self.pos..]
    }

    /// Drops already-consumed bytes once they make up at least half the
    /// buffer, so a long-lived connection doesn't retain its high-water
    /// mark forever.
    fn compact(&mut self) {
        if self.pos == 0 {
            return;
        }
        if self.pos == self.buf.len() {
            self.buf.clear();
        } else if self.pos * 2 >= self.buf.len() {
            self.buf.drain(..self.pos);
        } else {
            return;
        }
        self.pos = 0;
    }

    fn step(&mut self) -> Result<StepResult> {
        match std::mem::replace(&mut self.state, State::Closed) {
            State::ReadingRequestLine => self.step_request_line(),
            State::ReadingHeaders { request } => self.step_headers(request),
            State::ReadingHttpBody { request, headers, remaining, body } => {
                self.step_http_body(request, headers, remaining, body)
            }
            State::ReadingWsHeader => self.step_ws_header(),
            State::ReadingWsPayload { header, received } => self.step_ws_payload(header, received),
            State::Closed => Ok(StepResult::Progressed(None)),
        }
    }

    fn step_request_line(&mut self) -> Result<StepResult> {
        if self.remaining().len() > MAX_BUFFER_CAPACITY {
            return Err(Error::protocol("request line exceeds the maximum buffer size"));
        }
        let Some((line, consumed)) = http_codec::scan_line(self.remaining()) else {
            self.state = State::ReadingRequestLine;
            return Ok(StepResult::NeedMoreBytes);
        };
        let request = http_codec::parse_request_line(line)?;
        self.pos += consumed;
        self.state = State::ReadingHeaders { request };
        Ok(StepResult::Progressed(None))
    }

    fn step_headers(&mut self, request: RequestLine) -> Result<StepResult> {
        if self.remaining().len() > MAX_BUFFER_CAPACITY {
            return Err(Error::protocol("header block exceeds the maximum buffer size"));
        }
        let Some((parsed_headers, consumed)) = http_codec::scan_headers(self.remaining())? else {
            self.state = State::ReadingHeaders { request };
            return Ok(StepResult::NeedMoreBytes);
        };
        self.pos += consumed;

        if parsed_headers.matches(headers::UPGRADE, headers::WEBSOCKET) {
            return match handshake::validate_upgrade(&parsed_headers) {
                Ok(client_key) => {
                    let accept_key = handshake::accept_key(client_key);
                    let http_request = HttpRequest::new(request.method, request.uri, request.version, parsed_headers, Bytes::new());
                    self.state = State::ReadingWsHeader;
                    Ok(StepResult::Progressed(Some(Event::WsUpgrade { request: http_request, accept_key })))
                }
                Err(err) => {
                    self.state = State::Closed;
                    Ok(StepResult::Progressed(Some(Event::WsUpgradeRejected { reason: err.to_string() })))
                }
            };
        }

        let content_length = http_codec::content_length(&parsed_headers)?.unwrap_or(0);
        if content_length == 0 {
            let http_request = HttpRequest::new(request.method, request.uri, request.version, parsed_headers, Bytes::new());
            self.state = State::ReadingRequestLine;
            Ok(StepResult::Progressed(Some(Event::HttpRequest(http_request))))
        } else {
            self.state = State::ReadingHttpBody { request, headers: parsed_headers, remaining: content_length, body: Vec::new() };
            Ok(StepResult::Progressed(None))
        }
    }

    fn step_http_body(&mut self, request: RequestLine, headers: Headers, remaining: u64, mut body: Vec<u8>) -> Result<StepResult> {
        let available = (self.remaining().len() as u64).min(remaining) as usize;
        if available > 0 {
            body.extend_from_slice(&self.remaining()[..available]);
            self.pos += available;
        }
        let left = remaining - available as u64;
        if left == 0 {
            let http_request = HttpRequest::new(request.method, request.uri, request.version, headers, Bytes::from(body));
            self.state = State::ReadingRequestLine;
            Ok(StepResult::Progressed(Some(Event::HttpRequest(http_request))))
        } else {
            self.state = State::ReadingHttpBody { request, headers, remaining: left, body };
            Ok(StepResult::NeedMoreBytes)
        }
    }

    fn step_ws_header(&mut self) -> Result<StepResult> {
        let available = self.remaining();
        if available.len() < frame::MIN_HEADER_BYTES {
            self.state = State::ReadingWsHeader;
            return Ok(StepResult::NeedMoreBytes);
        }
        let tail = frame::header_tail_len([available[0], available[1]]);
        let total = frame::MIN_HEADER_BYTES + tail;
        if available.len() < total {
            self.state = State::ReadingWsHeader;
            return Ok(StepResult::NeedMoreBytes);
        }
        let header = frame::decode_header(&available[..total])?;
        self.pos += total;
        let capacity = (header.payload_len as usize).min(MAX_BUFFER_CAPACITY);
        self.state = State::ReadingWsPayload { header, received: Vec::with_capacity(capacity) };
        Ok(StepResult::Progressed(None))
    }

    fn step_ws_payload(&mut self, header: WsFrameHeader, mut received: Vec<u8>) -> Result<StepResult> {
        let need = header.payload_len as usize - received.len();
        let available = self.remaining().len().min(need);
        if available > 0 {
            received.extend_from_slice(&self.remaining()[..available]);
            self.pos += available;
        }
        if received.len() < header.payload_len as usize {
            self.state = State::ReadingWsPayload { header, received };
            return Ok(StepResult::NeedMoreBytes);
        }

        if let Some(key) = header.mask_key {
            frame::apply_mask(&mut received, key);
        }
        self.state = State::ReadingWsHeader;
        self.complete_frame(header, received)
    }

    fn complete_frame(&mut self, header: WsFrameHeader, payload: Vec<u8>) -> Result<StepResult> {
        match header.opcode {
            OpCode::Ping => Ok(StepResult::Progressed(Some(Event::WsPing(Bytes::from(payload))))),
            OpCode::Pong => Ok(StepResult::Progressed(Some(Event::WsPong(Bytes::from(payload))))),
            OpCode::Close => {
                self.state = State::Closed;
                Ok(StepResult::Progressed(Some(Event::WsClose)))
            }
            OpCode::Continuation => {
                let Some((opcode, mut buf)) = self.fragment.take() else {
                    return Err(Error::protocol("continuation frame without a preceding fragment"));
                };
                buf.extend_from_slice(&payload);
                if header.fin {
                    self.finish_message(opcode, buf)
                } else {
                    self.fragment = Some((opcode, buf));
                    Ok(StepResult::Progressed(None))
                }
            }
            OpCode::Text | OpCode::Binary if header.fin => self.finish_message(header.opcode, payload),
            OpCode::Text | OpCode::Binary => {
                self.fragment = Some((header.opcode, payload));
                Ok(StepResult::Progressed(None))
            }
        }
    }

    fn finish_message(&mut self, opcode: OpCode, payload: Vec<u8>) -> Result<StepResult> {
        match opcode {
            OpCode::Text => {
                let text = String::from_utf8(payload).map_err(|_| Error::protocol("text frame payload is not valid UTF-8"))?;
                Ok(StepResult::Progressed(Some(Event::WsText(text))))
            }
            OpCode::Binary => Ok(StepResult::Progressed(Some(Event::WsBinary(Bytes::from(payload))))),
            _ => unreachable!("only TEXT/BINARY messages are ever buffered as a fragment"),
        }
    }
}
