use std::sync::Arc;

use fibercore::http::{HttpRequest, HttpResponse};
use fibercore::ServerBuilder;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use fibercore::test_support::TestServer;

fn init_tracing() {
    use tracing_subscriber::util::SubscriberInitExt;
    let _ = tracing_subscriber::fmt::Subscriber::builder().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).finish().try_init();
}

#[tokio::test]
async fn returns_404_for_an_unregistered_path_and_keeps_the_connection_open() {
    init_tracing();
    let server = ServerBuilder::new(|| ()).build();
    let test_server = TestServer::spawn(server).await;

    let mut stream = test_server.connect().await;
    stream.write_all(b"GET /missing HTTP/1.1\r\nHost: x\r\n\r\n").await.unwrap();

    let mut buf = vec![0u8; 1024];
    let n = stream.read(&mut buf).await.unwrap();
    let response = String::from_utf8_lossy(&buf[..n]).into_owned();

    assert!(response.starts_with("HTTP/1.1 404 Not Found\r\n"));
    assert!(response.contains("/missing Not Found"));
    assert!(response.contains("Connection: keep-alive\r\n"));

    // the connection is reusable for a second request, per scenario 1
    stream.write_all(b"GET /missing HTTP/1.1\r\nHost: x\r\n\r\n").await.unwrap();
    let n = stream.read(&mut buf).await.unwrap();
    assert!(String::from_utf8_lossy(&buf[..n]).starts_with("HTTP/1.1 404 Not Found\r\n"));
}

#[tokio::test]
async fn routes_an_exact_match_path_to_its_registered_handler() {
    let server = ServerBuilder::new(|| ())
        .add_http(
            "/hello",
            Arc::new(|_req: &HttpRequest, _session: &mut ()| async { HttpResponse::text(200, "OK", "hi there") }),
        )
        .build();
    let test_server = TestServer::spawn(server).await;

    let mut stream = test_server.connect().await;
    stream.write_all(b"GET /hello HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n").await.unwrap();

    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await.unwrap();
    let response = String::from_utf8_lossy(&buf);

    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(response.contains("Connection: close\r\n"));
    assert!(response.ends_with("hi there"));
}

#[tokio::test]
async fn a_request_body_is_collected_per_content_length() {
    let server = ServerBuilder::new(|| ())
        .add_http(
            "/echo",
            Arc::new(|req: &HttpRequest, _session: &mut ()| {
                let body = req.body().clone();
                async move { HttpResponse::new(200, "OK", "application/octet-stream", body) }
            }),
        )
        .build();
    let test_server = TestServer::spawn(server).await;

    let mut stream = test_server.connect().await;
    let request = b"POST /echo HTTP/1.1\r\nHost: x\r\nContent-Length: 5\r\nConnection: close\r\n\r\nhello";
    stream.write_all(request).await.unwrap();

    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await.unwrap();
    assert!(String::from_utf8_lossy(&buf).ends_with("hello"));
}

#[tokio::test]
async fn a_decorator_can_short_circuit_before_the_matched_handler_runs() {
    let server = ServerBuilder::new(|| ())
        .add_http(
            "/secret",
            Arc::new(|_req: &HttpRequest, _session: &mut ()| async { HttpResponse::text(200, "OK", "should not run") }),
        )
        .decorator(Arc::new(|_req: &HttpRequest| async { Some(HttpResponse::text(401, "Unauthorized", "no")) }))
        .build();
    let test_server = TestServer::spawn(server).await;

    let mut stream = test_server.connect().await;
    stream.write_all(b"GET /secret HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n").await.unwrap();

    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await.unwrap();
    assert!(String::from_utf8_lossy(&buf).starts_with("HTTP/1.1 401 Unauthorized\r\n"));
}
