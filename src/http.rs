//! HTTP request/response types and the handler contract.

pub mod handler;
pub mod request;
pub mod response;

pub use handler::{default_not_found, identity_decorator, BoxFuture, Decorator, HttpHandler, SharedHttpHandler};
pub use request::HttpRequest;
pub use response::HttpResponse;
