//! The per-connection driver: the single task that owns one connection's
//! read buffer, read state, and write path, and is consequently the only
//! thing ever allowed to mutate them.

use std::any::Any;
use std::io;
use std::sync::Arc;

use bytes::BytesMut;
use tokio::net::TcpStream;

use crate::app::router::ErasedWebSocketRoute;
use crate::http::response::switching_protocols;
use crate::dispatch::{BoxFuture, DispatchOutcome, SessionDispatcher};
use crate::error::{Error, Result};
use crate::http::handler::{BoxFuture as HandlerBoxFuture, SharedHttpHandler};
use crate::http::request::HttpRequest;
use crate::http::response::HttpResponse;
use crate::read_state::{Event, ReadDriver};
use crate::write::{SendResult, Writer};
use crate::ws::connection::WebSocketConnection;

use super::Server;

struct WsSession<S> {
    conn: WebSocketConnection,
    route: Arc<dyn ErasedWebSocketRoute<S>>,
    dispatcher: SessionDispatcher,
    state: Box<dyn Any + Send>,
}

impl<S> WsSession<S> {
    async fn on_close(&mut self) {
        self.route.on_close(&self.conn, self.state.as_mut()).await;
        self.conn.close_from_peer().await;
    }

    /// Runs one WebSocket callback on whichever execution target this
    /// session's dispatcher selects. `call` takes
    /// ownership of the route, connection, and session state and must hand
    /// the state back once its callback completes — a fiber-dispatched task
    /// may still be running it after this function returns, so the state
    /// travels to and from the task rather than staying borrowed here.
    async fn dispatch<F>(&mut self, call: F)
    where
        F: FnOnce(Arc<dyn ErasedWebSocketRoute<S>>, WebSocketConnection, Box<dyn Any + Send>) -> HandlerBoxFuture<'static, Box<dyn Any + Send>>
            + Send
            + 'static,
    {
        let state = std::mem::replace(&mut self.state, Box::new(()));
        let route = Arc::clone(&self.route);
        let conn = self.conn.clone();

        let (tx, rx) = tokio::sync::oneshot::channel();
        let task: BoxFuture = Box::pin(async move {
            let state = call(route, conn, state).await;
            let _ = tx.send(state);
        });

        match self.dispatcher.dispatch_websocket(task) {
            DispatchOutcome::Inline(fut) => fut.await,
            DispatchOutcome::Submitted => {}
        }

        self.state = rx.await.expect("the dispatcher dropped the websocket state channel");
    }
}

fn make_dispatcher<S>(server: &Server<S>) -> SessionDispatcher {
    match server.dispatcher_kind.fiber_flags() {
        Some(flags) => SessionDispatcher::fiber_session(flags),
        None => SessionDispatcher::on_read_thread(),
    }
}

pub(crate) async fn drive<S>(server: &Server<S>, stream: TcpStream) -> Result<()>
where
    S: Send + Sync + 'static,
{
    let _ = stream.set_nodelay(true);
    let (read_half, write_half) = stream.into_split();
    let writer = Writer::new(write_half);
    let mut driver = ReadDriver::new(server.read_buffer_size, server.max_read_loops);
    let mut session = Some(server.session_factory.create());
    let mut ws_session: Option<WsSession<S>> = None;
    let mut read_buf = vec![0u8; server.read_buffer_size.max(512)];

    loop {
        // A handler calling `conn.close()` (or a write failure) shuts the
        // writer down without any new bytes arriving from the peer; without
        // racing that signal here, `readable()` could block indefinitely
        // and leak the task, the socket, and the websocket session.
        let readable = tokio::select! {
            readable = read_half.readable() => readable,
            _ = writer.wait_until_closed() => {
                return finish(&mut ws_session).await;
            }
        };

        if readable.is_err() {
            writer.shutdown().await;
            return finish(&mut ws_session).await;
        }

        let n = match read_half.try_read(&mut read_buf) {
            Ok(0) => {
                writer.shutdown().await;
                return finish(&mut ws_session).await;
            }
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
            Err(e) => {
                writer.shutdown().await;
                return Err(Error::Io(e));
            }
        };

        let events = match driver.feed(&read_buf[..n]) {
            Ok(events) => events,
            Err(err) => {
                report_protocol_error(&err, &mut ws_session).await;
                writer.shutdown().await;
                return Err(err);
            }
        };

        for event in events {
            match event {
                Event::HttpRequest(request) => {
                    let Some(current_session) = session.take() else {
                        break;
                    };
                    let (returned_session, keep_alive) =
                        handle_http_request(server, &writer, current_session, request, &mut ws_session).await;
                    session = Some(returned_session);
                    if !keep_alive {
                        writer.shutdown().await;
                        return finish(&mut ws_session).await;
                    }
                }
                Event::WsUpgrade { request, accept_key } => {
                    let response = switching_protocols(&accept_key);
                    let mut buf = BytesMut::new();
                    let result = writer.send(&encode(&response, true, &mut buf)).await;
                    report_send_failure(result, &mut ws_session).await;

                    if let Some(route) = server.router.lookup_websocket(request.uri()) {
                        let dispatcher = make_dispatcher(server);
                        let conn = WebSocketConnection::new(Arc::clone(&writer), dispatcher.clone());
                        install_failure_handler(&writer, Arc::clone(&route));
                        let current_session = session.as_ref().expect("session exists for the lifetime of the connection");
                        let state = route.on_open(&conn, &request, current_session).await;
                        ws_session = Some(WsSession { conn, route, dispatcher, state });
                    }
                }
                Event::WsUpgradeRejected { reason } => {
                    tracing::warn!(%reason, "rejecting malformed websocket upgrade");
                    let response = HttpResponse::text(400, "Bad Request", reason);
                    let mut buf = BytesMut::new();
                    let result = writer.send(&encode(&response, false, &mut buf)).await;
                    report_send_failure(result, &mut ws_session).await;
                    writer.shutdown().await;
                    return Ok(());
                }
                Event::WsText(text) => {
                    if let Some(active) = ws_session.as_mut() {
                        active
                            .dispatch(move |route, conn, mut state| {
                                Box::pin(async move {
                                    route.on_message(&conn, state.as_mut(), text).await;
                                    state
                                })
                            })
                            .await;
                    }
                }
                Event::WsBinary(data) => {
                    if let Some(active) = ws_session.as_mut() {
                        active
                            .dispatch(move |route, conn, mut state| {
                                Box::pin(async move {
                                    route.on_binary_message(&conn, state.as_mut(), data).await;
                                    state
                                })
                            })
                            .await;
                    }
                }
                Event::WsPing(payload) => {
                    if let Some(mut active) = ws_session.take() {
                        let result = active.conn.send_pong(&payload).await;
                        ws_session = Some(active);
                        report_send_failure(result, &mut ws_session).await;
                        if let Some(active) = ws_session.as_mut() {
                            active
                                .dispatch(move |route, conn, mut state| {
                                    Box::pin(async move {
                                        route.on_ping(&conn, state.as_mut(), payload).await;
                                        state
                                    })
                                })
                                .await;
                        }
                    }
                }
                Event::WsPong(payload) => {
                    if let Some(active) = ws_session.as_mut() {
                        active
                            .dispatch(move |route, conn, mut state| {
                                Box::pin(async move {
                                    route.on_pong(&conn, state.as_mut(), payload).await;
                                    state
                                })
                            })
                            .await;
                    }
                }
                Event::WsClose => {
                    if let Some(mut active) = ws_session.take() {
                        active.on_close().await;
                    } else {
                        writer.shutdown().await;
                    }
                    return Ok(());
                }
            }
        }

        if driver.is_closed() && ws_session.is_none() {
            break;
        }
    }

    Ok(())
}

fn encode(response: &HttpResponse, keep_alive: bool, buf: &mut BytesMut) -> bytes::Bytes {
    response.encode(buf, keep_alive);
    buf.split().freeze()
}

async fn handle_http_request<S>(
    server: &Server<S>,
    writer: &Arc<Writer>,
    session: S,
    request: HttpRequest,
    ws_session: &mut Option<WsSession<S>>,
) -> (S, bool)
where
    S: Send + Sync + 'static,
{
    let keep_alive = request.wants_keep_alive();
    let decorated = server.router.decorator().decorate(&request).await;

    let (session, response) = match decorated {
        Some(response) => (session, response),
        None => {
            let handler = server.router.lookup_http(request.uri());
            let dispatcher = make_dispatcher(server);
            let (session, response) = run_http_handler(&dispatcher, handler, request, session).await;
            if server.dispatcher_kind.fiber_flags().is_some() {
                dispatcher.dispose();
            }
            (session, response)
        }
    };

    let mut buf = BytesMut::new();
    let result = writer.send(&encode(&response, keep_alive, &mut buf)).await;
    report_send_failure(result, ws_session).await;
    (session, keep_alive)
}

async fn run_http_handler<S>(dispatcher: &SessionDispatcher, handler: SharedHttpHandler<S>, request: HttpRequest, mut session: S) -> (S, HttpResponse)
where
    S: Send + 'static,
{
    let (tx, rx) = tokio::sync::oneshot::channel();
    let task: BoxFuture = Box::pin(async move {
        let response = handler.handle(&request, &mut session).await;
        let _ = tx.send((session, response));
    });
    match dispatcher.dispatch_http(task) {
        DispatchOutcome::Inline(fut) => fut.await,
        DispatchOutcome::Submitted => {}
    }
    rx.await.expect("the dispatcher dropped the http response channel")
}

async fn report_send_failure<S>(result: SendResult, ws_session: &mut Option<WsSession<S>>) {
    if let SendResult::FailedOnError { cause } = result {
        let err = Error::Io(cause);
        if let Some(active) = ws_session.as_mut() {
            active.route.on_exception(&active.conn, active.state.as_mut(), &err).await;
        } else {
            tracing::warn!(error = %err, "write failed");
        }
    }
}

async fn report_protocol_error<S>(err: &Error, ws_session: &mut Option<WsSession<S>>) {
    if let Some(active) = ws_session.as_mut() {
        active.route.on_exception(&active.conn, active.state.as_mut(), err).await;
    } else {
        tracing::warn!(error = %err, "closing connection after protocol error");
    }
}

/// Wires write failures observed later by the drain task (no connection
/// task frame on the stack to hand a `&mut` session state to) onto
/// `on_unknown_exception` rather than dropping them silently.
fn install_failure_handler<S>(writer: &Arc<Writer>, route: Arc<dyn ErasedWebSocketRoute<S>>)
where
    S: Send + Sync + 'static,
{
    writer.set_failure_handler(Arc::new(move |cause: io::Error| {
        let route = Arc::clone(&route);
        tokio::spawn(async move {
            let err = Error::Io(cause);
            route.on_unknown_exception(&err).await;
        });
    }));
}

async fn finish<S>(ws_session: &mut Option<WsSession<S>>) -> Result<()> {
    if let Some(mut active) = ws_session.take() {
        active.on_close().await;
    }
    Ok(())
}
