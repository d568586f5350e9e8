//! Handler trait and type erasure.
//!
//! # How async handlers are stored
//!
//! A route table holds handlers of *different* closure types in one `Vec`,
//! so every handler is hidden behind a trait object (`dyn ErasedHandler`)
//! and stored uniformly:
//!
//! ```text
//! async fn show(req: Request, res: Response) -> Response { … }  ← user writes this
//!        ↓ router.get("/users/:id", show)
//! show.into_boxed_handler()                                    ← Handler blanket impl
//!        ↓
//! Arc::new(FnHandler(show))                                    ← stored as BoxedHandler
//!        ↓
//! handler.call(req, res) at request time                       ← one vtable dispatch
//!        ↓
//! Box::pin(async { finish(show(req, res).await) })              ← BoxFuture
//! ```
//!
//! Middleware and error middleware use the same scheme; see
//! [`middleware`](crate::middleware).

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::Result;
use crate::request::Request;
use crate::response::{self, IntoResponse, Response};

/// A heap-allocated, type-erased future resolving to a handler outcome.
///
/// `Send + 'static` let tokio move it across worker threads.
pub type BoxFuture<T = Result<Response>> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// Internal dispatch interface for route handlers.
///
/// `#[doc(hidden)] pub` because it appears in the return type of the public
/// `Handler` trait's `into_boxed_handler` method.
#[doc(hidden)]
pub trait ErasedHandler {
    fn call(&self, req: Request, res: Response) -> BoxFuture;
}

/// A type-erased handler shared by every in-flight request on its route.
#[doc(hidden)]
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

/// Implemented for every valid route handler.
///
/// You never implement this yourself. It is satisfied by any `async fn` (or
/// closure returning a future) with the shape:
///
/// ```text
/// async fn name(req: Request, res: Response) -> impl IntoResponse
/// ```
///
/// `res` is the response the middleware chain has prepared so far (headers a
/// CORS layer set, for instance). Mutate it and return it to keep that work.
///
/// The trait is sealed: only the blanket impl below satisfies it.
pub trait Handler: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

mod private {
    pub trait Sealed {}
}

impl<F, Fut, R> private::Sealed for F
where
    F: Fn(Request, Response) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
}

impl<F, Fut, R> Handler for F
where
    F: Fn(Request, Response) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(FnHandler(self))
    }
}

/// Holds a concrete handler `F` and bridges it to [`ErasedHandler`].
struct FnHandler<F>(F);

impl<F, Fut, R> ErasedHandler for FnHandler<F>
where
    F: Fn(Request, Response) -> Fut + Send + Sync,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn call(&self, req: Request, res: Response) -> BoxFuture {
        let base = R::PARTIAL.then(|| res.shell());
        let fut = (self.0)(req, res);
        Box::pin(async move { response::finish(fut.await, base) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Status;

    async fn echo_path(req: Request, mut res: Response) -> Response {
        res.text(req.path().to_owned());
        res
    }

    async fn teapot(_req: Request, _res: Response) -> Status {
        Status::IM_A_TEAPOT
    }

    #[tokio::test]
    async fn boxed_handlers_keep_their_behaviour() {
        let h = echo_path.into_boxed_handler();
        let res = h.call(Request::get("/a/b"), Response::new()).await.unwrap();
        assert_eq!(res.body(), b"/a/b");

        let h = teapot.into_boxed_handler();
        let res = h.call(Request::get("/"), Response::new()).await.unwrap();
        assert_eq!(res.status_code(), Status::IM_A_TEAPOT);
    }

    #[tokio::test]
    async fn status_returns_keep_prepared_headers() {
        let mut prepared = Response::new();
        prepared.set_header("access-control-allow-origin", "*");
        let res = teapot.into_boxed_handler().call(Request::get("/"), prepared).await.unwrap();
        assert_eq!(res.status_code(), Status::IM_A_TEAPOT);
        assert_eq!(res.header("access-control-allow-origin"), Some("*"));
    }
}
