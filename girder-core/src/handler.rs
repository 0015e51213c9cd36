// Handler type erasure and response conversion
//
// Handlers are plain closures or functions taking the request context. Their
// return type only has to implement `IntoResponse`; the conversion is
// monomorphized per handler and erased once, at registration time.

use crate::context::RequestContext;
use crate::error::Result;
use crate::http::{HttpResponse, Json};
use crate::status::HttpStatus;
use serde::Serialize;
use std::sync::Arc;

/// A registered, type-erased handler.
pub type HandlerFn = Arc<dyn Fn(&mut RequestContext<'_>) -> Result<HttpResponse> + Send + Sync>;

/// Maps a handler error to a response.
pub type ErrorHandlerFn = Arc<dyn Fn(&crate::Error) -> HttpResponse + Send + Sync>;

/// Conversion from a handler's return value into a response.
pub trait IntoResponse {
    fn into_response(self) -> Result<HttpResponse>;
}

impl IntoResponse for HttpResponse {
    #[inline]
    fn into_response(self) -> Result<HttpResponse> {
        Ok(self)
    }
}

impl<R: IntoResponse> IntoResponse for Result<R> {
    #[inline]
    fn into_response(self) -> Result<HttpResponse> {
        self.and_then(IntoResponse::into_response)
    }
}

impl IntoResponse for &'static str {
    fn into_response(self) -> Result<HttpResponse> {
        Ok(HttpResponse::ok().with_text(self))
    }
}

impl IntoResponse for String {
    fn into_response(self) -> Result<HttpResponse> {
        Ok(HttpResponse::ok().with_text(self))
    }
}

impl IntoResponse for HttpStatus {
    fn into_response(self) -> Result<HttpResponse> {
        Ok(HttpResponse::new(self.code()).with_text(self.reason()))
    }
}

impl<T: Serialize> IntoResponse for Json<T> {
    fn into_response(self) -> Result<HttpResponse> {
        HttpResponse::ok().with_json(&self.0)
    }
}

/// Erase a handler into a [`HandlerFn`].
pub fn into_handler<F, R>(handler: F) -> HandlerFn
where
    F: Fn(&mut RequestContext<'_>) -> R + Send + Sync + 'static,
    R: IntoResponse,
{
    erase(move |ctx| handler(ctx).into_response())
}

// Passing the closure through a bound keeps its signature higher-ranked.
fn erase<F>(f: F) -> HandlerFn
where
    F: Fn(&mut RequestContext<'_>) -> Result<HttpResponse> + Send + Sync + 'static,
{
    Arc::new(f)
}
