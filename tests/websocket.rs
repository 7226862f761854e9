use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use fibercore::codec::frame::{self, OpCode};
use fibercore::http::HttpRequest;
use fibercore::http::handler::BoxFuture;
use fibercore::test_support::TestServer;
use fibercore::ws::{WebSocketConnection, WebSocketHandler};
use fibercore::ServerBuilder;

struct EchoHandler;

impl WebSocketHandler<()> for EchoHandler {
    type State = ();

    fn on_open<'a>(&'a self, _conn: &'a WebSocketConnection, _request: &'a HttpRequest, _session: &'a ()) -> BoxFuture<'a, ()> {
        Box::pin(async {})
    }

    fn on_message<'a>(&'a self, conn: &'a WebSocketConnection, _state: &'a mut (), text: String) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            conn.send_text(&text).await;
        })
    }

    fn on_binary_message<'a>(&'a self, conn: &'a WebSocketConnection, _state: &'a mut (), data: Bytes) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            conn.send_binary(&data).await;
        })
    }
}

async fn upgrade(stream: &mut TcpStream) {
    let handshake =
        b"GET /ws HTTP/1.1\r\nHost: x\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\r\n";
    stream.write_all(handshake).await.unwrap();

    let mut buf = vec![0u8; 1024];
    let n = stream.read(&mut buf).await.unwrap();
    let response = String::from_utf8_lossy(&buf[..n]);
    assert!(response.starts_with("HTTP/1.1 101 Switching Protocols\r\n"));
    assert!(response.contains("Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n"));
}

#[tokio::test]
async fn handshake_computes_the_rfc6455_accept_key() {
    let server = ServerBuilder::new(|| ()).add_websocket("/ws", EchoHandler).build();
    let test_server = TestServer::spawn(server).await;
    let mut stream = test_server.connect().await;
    upgrade(&mut stream).await;
}

#[tokio::test]
async fn echoes_a_masked_text_frame_back_unmasked() {
    let server = ServerBuilder::new(|| ()).add_websocket("/ws", EchoHandler).build();
    let test_server = TestServer::spawn(server).await;
    let mut stream = test_server.connect().await;
    upgrade(&mut stream).await;

    let mut frame = Vec::new();
    frame::encode_frame(&mut frame, OpCode::Text, b"hello", Some([9, 8, 7, 6]));
    stream.write_all(&frame).await.unwrap();

    let mut buf = vec![0u8; 1024];
    let n = stream.read(&mut buf).await.unwrap();
    assert_eq!(buf[0], 0x80 | OpCode::Text.to_byte());
    assert_eq!(buf[1] & 0x80, 0, "server frames are never masked");
    let payload_len = (buf[1] & 0x7F) as usize;
    assert_eq!(&buf[2..2 + payload_len], b"hello");
}

#[tokio::test]
async fn a_large_binary_message_round_trips_using_the_large_size_class() {
    let server = ServerBuilder::new(|| ()).add_websocket("/ws", EchoHandler).build();
    let test_server = TestServer::spawn(server).await;
    let mut stream = test_server.connect().await;
    upgrade(&mut stream).await;

    let payload = vec![7u8; 100_000];
    let mut frame = Vec::new();
    frame::encode_frame(&mut frame, OpCode::Binary, &payload, Some([1, 2, 3, 4]));
    stream.write_all(&frame).await.unwrap();

    let mut received = Vec::new();
    while received.len() < 10 + payload.len() {
        let mut chunk = vec![0u8; 65536];
        let n = stream.read(&mut chunk).await.unwrap();
        assert!(n > 0, "connection closed before the full message arrived");
        received.extend_from_slice(&chunk[..n]);
    }

    assert_eq!(received[0], 0x80 | OpCode::Binary.to_byte());
    assert_eq!(received[1] & 0x7F, 127, "100000-byte payload must select the Large size class");
    let length_bytes: [u8; 8] = received[2..10].try_into().unwrap();
    assert_eq!(u64::from_be_bytes(length_bytes), payload.len() as u64);
    assert_eq!(&received[10..10 + payload.len()], &payload[..]);
}

#[tokio::test]
async fn server_auto_replies_pong_to_a_ping() {
    let server = ServerBuilder::new(|| ()).add_websocket("/ws", EchoHandler).build();
    let test_server = TestServer::spawn(server).await;
    let mut stream = test_server.connect().await;
    upgrade(&mut stream).await;

    let mut frame = Vec::new();
    frame::encode_frame(&mut frame, OpCode::Ping, b"ABCD", Some([1, 1, 1, 1]));
    stream.write_all(&frame).await.unwrap();

    let mut buf = vec![0u8; 64];
    let n = stream.read(&mut buf).await.unwrap();
    assert_eq!(buf[0], 0x80 | OpCode::Pong.to_byte());
    let payload_len = (buf[1] & 0x7F) as usize;
    assert_eq!(&buf[2..2 + payload_len], b"ABCD");
}

struct SelfClosingHandler;

impl WebSocketHandler<()> for SelfClosingHandler {
    type State = ();

    fn on_open<'a>(&'a self, _conn: &'a WebSocketConnection, _request: &'a HttpRequest, _session: &'a ()) -> BoxFuture<'a, ()> {
        Box::pin(async {})
    }

    fn on_message<'a>(&'a self, conn: &'a WebSocketConnection, _state: &'a mut (), _text: String) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            conn.close().await;
        })
    }

    fn on_binary_message<'a>(&'a self, _conn: &'a WebSocketConnection, _state: &'a mut (), _data: Bytes) -> BoxFuture<'a, ()> {
        Box::pin(async {})
    }
}

#[tokio::test]
async fn a_handler_initiated_close_tears_down_the_connection_without_peer_action() {
    let server = ServerBuilder::new(|| ()).add_websocket("/ws", SelfClosingHandler).build();
    let test_server = TestServer::spawn(server).await;
    let mut stream = test_server.connect().await;
    upgrade(&mut stream).await;

    let mut frame = Vec::new();
    frame::encode_frame(&mut frame, OpCode::Text, b"bye", Some([4, 3, 2, 1]));
    stream.write_all(&frame).await.unwrap();

    // The handler closes the connection itself; the peer never sends a
    // close frame or drops the socket, so the only way this resolves is the
    // connection driver noticing the writer closed and tearing itself down.
    let mut buf = vec![0u8; 64];
    let n = tokio::time::timeout(std::time::Duration::from_secs(2), stream.read(&mut buf))
        .await
        .expect("connection driver did not react to conn.close() in time")
        .unwrap();
    assert_eq!(n, 0, "expected EOF once the server tears the connection down");
}

#[tokio::test]
async fn a_malformed_upgrade_request_gets_400_and_closes() {
    let server = ServerBuilder::new(|| ()).add_websocket("/ws", EchoHandler).build();
    let test_server = TestServer::spawn(server).await;
    let mut stream = test_server.connect().await;

    let bad_handshake = b"GET /ws HTTP/1.1\r\nHost: x\r\nUpgrade: websocket\r\nConnection: Upgrade\r\n\r\n";
    stream.write_all(bad_handshake).await.unwrap();

    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await.unwrap();
    assert!(String::from_utf8_lossy(&buf).starts_with("HTTP/1.1 400 Bad Request\r\n"));
}
