//! The `HttpHandler` contract and the built-in 404 default handler.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use super::request::HttpRequest;
use super::response::HttpResponse;

/// A boxed, `Send` future, the shape every handler callback returns.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Handles one completed HTTP request.
///
/// The handler runs on whichever execution target the session's
/// [`SessionDispatcher`](crate::dispatch::SessionDispatcher) selected: either
/// inline on the connection's own task (`OnReadThread`) or on that session's
/// dedicated fiber task (`FiberSession`). Either way, the handler sees
/// itself as running on "the" sequential context for this session — it
/// never races another callback for the same session.
pub trait HttpHandler<S>: Send + Sync {
    fn handle<'a>(&'a self, request: &'a HttpRequest, session: &'a mut S) -> BoxFuture<'a, HttpResponse>;
}

impl<S, F, Fut> HttpHandler<S> for F
where
    F: Fn(&HttpRequest, &mut S) -> Fut + Send + Sync,
    Fut: Future<Output = HttpResponse> + Send + 'static,
{
    fn handle<'a>(&'a self, request: &'a HttpRequest, session: &'a mut S) -> BoxFuture<'a, HttpResponse> {
        Box::pin(self(request, session))
    }
}

pub type SharedHttpHandler<S> = Arc<dyn HttpHandler<S>>;

/// The built-in 404 handler: `Not Found`, with the request URI echoed back
/// in the body as plain text.
pub fn default_not_found<S>() -> SharedHttpHandler<S>
where
    S: Send + 'static,
{
    Arc::new(|request: &HttpRequest, _session: &mut S| {
        let uri = request.uri().to_owned();
        Box::pin(async move { HttpResponse::text(404, "Not Found", format!("{uri} Not Found")) })
            as BoxFuture<'static, HttpResponse>
    })
}

/// A decorator wraps the router lookup and may short-circuit the request
/// (e.g. to enforce authentication) before a matched handler ever runs.
pub trait Decorator<S>: Send + Sync {
    /// Returning `Some(response)` short-circuits routing; `None` lets the
    /// request continue to the matched (or default) handler.
    fn decorate<'a>(&'a self, request: &'a HttpRequest) -> BoxFuture<'a, Option<HttpResponse>>;
}

impl<S, F, Fut> Decorator<S> for F
where
    F: Fn(&HttpRequest) -> Fut + Send + Sync,
    Fut: Future<Output = Option<HttpResponse>> + Send + 'static,
{
    fn decorate<'a>(&'a self, request: &'a HttpRequest) -> BoxFuture<'a, Option<HttpResponse>> {
        Box::pin(self(request))
    }
}

/// The identity decorator: never short-circuits.
pub fn identity_decorator<S>() -> Arc<dyn Decorator<S>>
where
    S: Send + 'static,
{
    Arc::new(|_request: &HttpRequest| {
        Box::pin(async { None }) as BoxFuture<'static, Option<HttpResponse>>
    })
}
