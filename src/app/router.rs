//! The exact-match handler map: one table for HTTP paths, one for
//! WebSocket upgrade paths, built once at startup and read-only thereafter.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;

use crate::error::Error;
use crate::http::handler::{default_not_found, identity_decorator, BoxFuture, Decorator, SharedHttpHandler};
use crate::http::request::HttpRequest;
use crate::ws::connection::WebSocketConnection;
use crate::ws::handler::WebSocketHandler;

/// Type-erased WebSocket route: lets the router hold handlers whose
/// `WebSocketHandler::State` types differ from one path to the next behind
/// one `Arc<dyn ErasedWebSocketRoute<S>>` map entry.
pub trait ErasedWebSocketRoute<S>: Send + Sync {
    fn on_open<'a>(&'a self, conn: &'a WebSocketConnection, request: &'a HttpRequest, session: &'a S) -> BoxFuture<'a, Box<dyn Any + Send>>;
    fn on_message<'a>(&'a self, conn: &'a WebSocketConnection, state: &'a mut (dyn Any + Send), text: String) -> BoxFuture<'a, ()>;
    fn on_binary_message<'a>(&'a self, conn: &'a WebSocketConnection, state: &'a mut (dyn Any + Send), data: Bytes) -> BoxFuture<'a, ()>;
    fn on_ping<'a>(&'a self, conn: &'a WebSocketConnection, state: &'a mut (dyn Any + Send), payload: Bytes) -> BoxFuture<'a, ()>;
    fn on_pong<'a>(&'a self, conn: &'a WebSocketConnection, state: &'a mut (dyn Any + Send), payload: Bytes) -> BoxFuture<'a, ()>;
    fn on_close<'a>(&'a self, conn: &'a WebSocketConnection, state: &'a mut (dyn Any + Send)) -> BoxFuture<'a, ()>;
    fn on_exception<'a>(&'a self, conn: &'a WebSocketConnection, state: &'a mut (dyn Any + Send), cause: &'a Error) -> BoxFuture<'a, ()>;
    fn on_unknown_exception<'a>(&'a self, cause: &'a Error) -> BoxFuture<'a, ()>;
}

impl<S, H> ErasedWebSocketRoute<S> for H
where
    S: Send + Sync + 'static,
    H: WebSocketHandler<S> + 'static,
{
    fn on_open<'a>(&'a self, conn: &'a WebSocketConnection, request: &'a HttpRequest, session: &'a S) -> BoxFuture<'a, Box<dyn Any + Send>> {
        Box::pin(async move {
            let state = WebSocketHandler::on_open(self, conn, request, session).await;
            Box::new(state) as Box<dyn Any + Send>
        })
    }

    fn on_message<'a>(&'a self, conn: &'a WebSocketConnection, state: &'a mut (dyn Any + Send), text: String) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let state = state.downcast_mut::<H::State>().expect("websocket session state type mismatch");
            WebSocketHandler::on_message(self, conn, state, text).await
        })
    }

    fn on_binary_message<'a>(&'a self, conn: &'a WebSocketConnection, state: &'a mut (dyn Any + Send), data: Bytes) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let state = state.downcast_mut::<H::State>().expect("websocket session state type mismatch");
            WebSocketHandler::on_binary_message(self, conn, state, data).await
        })
    }

    fn on_ping<'a>(&'a self, conn: &'a WebSocketConnection, state: &'a mut (dyn Any + Send), payload: Bytes) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let state = state.downcast_mut::<H::State>().expect("websocket session state type mismatch");
            WebSocketHandler::on_ping(self, conn, state, payload).await
        })
    }

    fn on_pong<'a>(&'a self, conn: &'a WebSocketConnection, state: &'a mut (dyn Any + Send), payload: Bytes) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let state = state.downcast_mut::<H::State>().expect("websocket session state type mismatch");
            WebSocketHandler::on_pong(self, conn, state, payload).await
        })
    }

    fn on_close<'a>(&'a self, conn: &'a WebSocketConnection, state: &'a mut (dyn Any + Send)) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let state = state.downcast_mut::<H::State>().expect("websocket session state type mismatch");
            WebSocketHandler::on_close(self, conn, state).await
        })
    }

    fn on_exception<'a>(&'a self, conn: &'a WebSocketConnection, state: &'a mut (dyn Any + Send), cause: &'a Error) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            let state = state.downcast_mut::<H::State>().expect("websocket session state type mismatch");
            WebSocketHandler::on_exception(self, conn, state, cause).await
        })
    }

    fn on_unknown_exception<'a>(&'a self, cause: &'a Error) -> BoxFuture<'a, ()> {
        WebSocketHandler::on_unknown_exception(self, cause)
    }
}

/// The startup-immutable handler map. Built by `ServerBuilder`, shared
/// read-only by every connection task thereafter.
pub struct Router<S> {
    http_routes: HashMap<String, SharedHttpHandler<S>>,
    ws_routes: HashMap<String, Arc<dyn ErasedWebSocketRoute<S>>>,
    default_handler: SharedHttpHandler<S>,
    decorator: Arc<dyn Decorator<S>>,
}

impl<S> Router<S>
where
    S: Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            http_routes: HashMap::new(),
            ws_routes: HashMap::new(),
            default_handler: default_not_found(),
            decorator: identity_decorator(),
        }
    }

    pub fn add_http(&mut self, path: impl Into<String>, handler: SharedHttpHandler<S>) {
        self.http_routes.insert(path.into(), handler);
    }

    pub fn add_websocket(&mut self, path: impl Into<String>, handler: impl WebSocketHandler<S> + 'static) {
        self.ws_routes.insert(path.into(), Arc::new(handler));
    }

    pub fn set_default_handler(&mut self, handler: SharedHttpHandler<S>) {
        self.default_handler = handler;
    }

    pub fn set_decorator(&mut self, decorator: Arc<dyn Decorator<S>>) {
        self.decorator = decorator;
    }

    pub fn lookup_http(&self, uri: &str) -> SharedHttpHandler<S> {
        self.http_routes.get(uri).cloned().unwrap_or_else(|| self.default_handler.clone())
    }

    pub fn lookup_websocket(&self, uri: &str) -> Option<Arc<dyn ErasedWebSocketRoute<S>>> {
        self.ws_routes.get(uri).cloned()
    }

    pub fn is_websocket_route(&self, uri: &str) -> bool {
        self.ws_routes.contains_key(uri)
    }

    pub fn decorator(&self) -> &Arc<dyn Decorator<S>> {
        &self.decorator
    }
}

impl<S> Default for Router<S>
where
    S: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::response::HttpResponse;
    use bytes::Bytes as ByteBuf;

    fn req(uri: &str) -> HttpRequest {
        HttpRequest::new("GET".into(), uri.into(), "HTTP/1.1".into(), crate::headers::Headers::new(), ByteBuf::new())
    }

    #[tokio::test]
    async fn exact_match_routes_to_the_registered_handler() {
        let mut router: Router<()> = Router::new();
        router.add_http("/hello", Arc::new(|_r: &HttpRequest, _s: &mut ()| async { HttpResponse::text(200, "OK", "hi") }));

        let handler = router.lookup_http("/hello");
        let mut session = ();
        let resp = handler.handle(&req("/hello"), &mut session).await;
        assert_eq!(resp.status(), 200);
    }

    #[tokio::test]
    async fn unmatched_uri_falls_back_to_the_default_handler() {
        let router: Router<()> = Router::new();
        let handler = router.lookup_http("/nope");
        let mut session = ();
        let resp = handler.handle(&req("/nope"), &mut session).await;
        assert_eq!(resp.status(), 404);
    }

    #[test]
    fn websocket_routes_are_reported_distinctly_from_http_routes() {
        struct NoopWs;
        impl WebSocketHandler<()> for NoopWs {
            type State = ();
            fn on_open<'a>(
                &'a self,
                _conn: &'a WebSocketConnection,
                _request: &'a HttpRequest,
                _session: &'a (),
            ) -> crate::http::handler::BoxFuture<'a, ()> {
                Box::pin(async {})
            }
            fn on_message<'a>(
                &'a self,
                _conn: &'a WebSocketConnection,
                _state: &'a mut (),
                _text: String,
            ) -> crate::http::handler::BoxFuture<'a, ()> {
                Box::pin(async {})
            }
            fn on_binary_message<'a>(
                &'a self,
                _conn: &'a WebSocketConnection,
                _state: &'a mut (),
                _data: ByteBuf,
            ) -> crate::http::handler::BoxFuture<'a, ()> {
                Box::pin(async {})
            }
        }

        let mut router: Router<()> = Router::new();
        router.add_websocket("/ws", NoopWs);
        assert!(router.is_websocket_route("/ws"));
        assert!(!router.is_websocket_route("/http-only"));
    }
}
