//! Middleware: the layers a request passes through on its way to a handler.
//!
//! # Order
//!
//! For one request the chain is composed as
//!
//! ```text
//! global (registration order)
//!   → path-scoped whose prefix matches (registration order)
//!     → route-local of the matched route (registration order)
//!       → handler
//! ```
//!
//! Each layer gets the request, the response built so far, and a [`Next`].
//! It can:
//!
//! - call `next.run(req, res).await` and post-process what comes back
//!   (timing, logging, header rewriting);
//! - return a response without calling `next` (short-circuit: nothing
//!   further in the chain runs);
//! - return `Err`, which abandons the rest of the chain and hands the
//!   failure to the error-handler chain.
//!
//! `Next::run` takes `self`, so a layer can call it at most once.
//!
//! # Error handlers
//!
//! Error handlers ([`ErrorMiddleware`]) never run on the happy path. When the
//! chain fails they are tried nearest-first: route-local, then path-scoped,
//! then global. Each receives the failure, the routed request and a fresh
//! response, and either produces a response or passes the failure on with
//! [`ErrorNext::run`]. If every error handler passes, the dispatcher answers
//! with a 500.
//!
//! # Writing middleware
//!
//! Any async function with the right shape is middleware:
//!
//! ```rust
//! use brisk::{Next, Request, Response, Result};
//!
//! async fn powered_by(req: Request, res: Response, next: Next) -> Result<Response> {
//!     let mut res = next.run(req, res).await?;
//!     res.set_header("x-powered-by", "brisk");
//!     Ok(res)
//! }
//! ```
//!
//! Types with configuration implement [`Middleware`] directly; see
//! [`Cors`], [`Trace`], [`RequireHeader`], [`RateLimit`] and [`SecurityHeaders`].

mod cors;
mod guard;
mod rate_limit;
mod security;
mod trace;

pub use cors::Cors;
pub use guard::RequireHeader;
pub use rate_limit::RateLimit;
pub use security::SecurityHeaders;
pub use trace::Trace;

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{Error, Result};
use crate::handler::{BoxFuture, BoxedHandler};
use crate::path;
use crate::request::Request;
use crate::response::{self, IntoResponse, Response};

// ── Traits ────────────────────────────────────────────────────────────────────

/// A layer around the handler. Implemented for every
/// `async fn(Request, Response, Next) -> impl IntoResponse`.
pub trait Middleware: Send + Sync + 'static {
    fn call(&self, req: Request, res: Response, next: Next) -> BoxFuture;
}

impl<F, Fut, R> Middleware for F
where
    F: Fn(Request, Response, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn call(&self, req: Request, res: Response, next: Next) -> BoxFuture {
        let base = R::PARTIAL.then(|| res.shell());
        let fut = self(req, res, next);
        Box::pin(async move { response::finish(fut.await, base) })
    }
}

/// A recovery layer for failures. Implemented for every
/// `async fn(Error, Request, Response, ErrorNext) -> impl IntoResponse`.
pub trait ErrorMiddleware: Send + Sync + 'static {
    fn call(&self, err: Error, req: Request, res: Response, next: ErrorNext) -> BoxFuture;
}

impl<F, Fut, R> ErrorMiddleware for F
where
    F: Fn(Error, Request, Response, ErrorNext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn call(&self, err: Error, req: Request, res: Response, next: ErrorNext) -> BoxFuture {
        let base = R::PARTIAL.then(|| res.shell());
        let fut = self(err, req, res, next);
        Box::pin(async move { response::finish(fut.await, base) })
    }
}

pub type BoxedMiddleware = Arc<dyn Middleware>;
pub type BoxedErrorMiddleware = Arc<dyn ErrorMiddleware>;

// ── Entries ───────────────────────────────────────────────────────────────────

/// Where a middleware entry applies.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Scope {
    /// Every request reaching the router it was registered on.
    Global,
    /// Requests whose path starts with the prefix, compared segment-wise.
    PathPrefix(String),
    /// Only the route it is attached to.
    RouteLocal,
}

impl Scope {
    /// Whether an entry with this scope covers `path` (relative to its router).
    pub fn covers(&self, path: &str) -> bool {
        match self {
            Self::Global | Self::RouteLocal => true,
            Self::PathPrefix(prefix) => path::strip_prefix(prefix, path).is_some(),
        }
    }
}

/// A normal layer or an error handler.
#[derive(Clone)]
pub enum Unit {
    Normal(BoxedMiddleware),
    Error(BoxedErrorMiddleware),
}

impl Unit {
    pub fn normal(mw: impl Middleware) -> Self {
        Self::Normal(Arc::new(mw))
    }

    pub fn error(handler: impl ErrorMiddleware) -> Self {
        Self::Error(Arc::new(handler))
    }
}

/// One registered piece of middleware.
#[derive(Clone)]
pub struct MiddlewareEntry {
    pub scope: Scope,
    pub unit: Unit,
}

impl MiddlewareEntry {
    pub fn new(scope: Scope, unit: Unit) -> Self {
        Self { scope, unit }
    }

    pub fn is_error_handler(&self) -> bool {
        matches!(self.unit, Unit::Error(_))
    }
}

impl std::fmt::Debug for MiddlewareEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MiddlewareEntry")
            .field("scope", &self.scope)
            .field("is_error_handler", &self.is_error_handler())
            .finish()
    }
}

// ── Pipeline ──────────────────────────────────────────────────────────────────

/// Which terminal state a pipeline run ended in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The endpoint ran and the chain returned normally.
    HandlerReturned,
    /// A layer answered without letting the request reach the endpoint.
    ShortCircuited,
    /// The chain failed and an error handler produced the response.
    ErrorHandled,
    /// The chain failed and no error handler recovered.
    UnhandledError,
    /// The request never entered the chain (unsupported method).
    Rejected,
}

struct Chain {
    units: Vec<BoxedMiddleware>,
    endpoint: BoxedHandler,
    error_units: Vec<BoxedErrorMiddleware>,
    reached_endpoint: AtomicBool,
}

/// The composed chain for one request.
pub(crate) struct Pipeline {
    chain: Arc<Chain>,
}

impl Pipeline {
    /// Composes normal layers global → scoped → local, and error handlers
    /// local → scoped → global.
    pub(crate) fn build<'a>(
        global: impl IntoIterator<Item = &'a MiddlewareEntry>,
        scoped: impl IntoIterator<Item = &'a MiddlewareEntry>,
        local: impl IntoIterator<Item = &'a MiddlewareEntry>,
        endpoint: BoxedHandler,
    ) -> Self {
        let mut units = Vec::new();
        let mut tiers: [Vec<BoxedErrorMiddleware>; 3] = Default::default();

        let layers = [global.into_iter().collect::<Vec<_>>(), scoped.into_iter().collect(), local.into_iter().collect()];
        for (tier, entries) in layers.into_iter().enumerate() {
            for entry in entries {
                match &entry.unit {
                    Unit::Normal(mw) => units.push(Arc::clone(mw)),
                    Unit::Error(eh) => tiers[tier].push(Arc::clone(eh)),
                }
            }
        }

        let [global_eh, scoped_eh, local_eh] = tiers;
        let error_units = local_eh.into_iter().chain(scoped_eh).chain(global_eh).collect();

        Self {
            chain: Arc::new(Chain {
                units,
                endpoint,
                error_units,
                reached_endpoint: AtomicBool::new(false),
            }),
        }
    }

    /// Runs the chain. `fresh` is the response error handlers start from.
    ///
    /// The chain consumes the request, so error handlers get a copy taken up
    /// front. That copy (query, cookie and param maps) is only made when an
    /// error handler is registered.
    pub(crate) async fn run(self, req: Request, res: Response, fresh: Response) -> (Result<Response>, Outcome) {
        let snapshot = (!self.chain.error_units.is_empty()).then(|| req.clone());
        let first = Next { chain: Arc::clone(&self.chain), cursor: 0 };

        let err = match first.run(req, res).await {
            Ok(res) if self.chain.reached_endpoint.load(Ordering::Acquire) => {
                return (Ok(res), Outcome::HandlerReturned);
            }
            Ok(res) => return (Ok(res), Outcome::ShortCircuited),
            Err(err) => err,
        };
        let Some(snapshot) = snapshot else {
            return (Err(err), Outcome::UnhandledError);
        };

        let recovery = ErrorNext { chain: Arc::clone(&self.chain), cursor: 0 };
        match recovery.run(err, snapshot, fresh).await {
            Ok(res) => (Ok(res), Outcome::ErrorHandled),
            Err(err) => (Err(err), Outcome::UnhandledError),
        }
    }
}

/// The rest of the chain after the current layer.
///
/// Consumed by [`run`](Next::run): a layer cannot invoke its continuation twice.
pub struct Next {
    chain: Arc<Chain>,
    cursor: usize,
}

impl Next {
    /// Runs the next layer, or the endpoint when no layers are left.
    pub async fn run(self, req: Request, res: Response) -> Result<Response> {
        let fut = match self.chain.units.get(self.cursor) {
            Some(mw) => {
                let next = Next { chain: Arc::clone(&self.chain), cursor: self.cursor + 1 };
                mw.call(req, res, next)
            }
            None => {
                self.chain.reached_endpoint.store(true, Ordering::Release);
                self.chain.endpoint.call(req, res)
            }
        };
        fut.await
    }

    /// Layers still ahead, not counting the endpoint.
    pub fn remaining(&self) -> usize {
        self.chain.units.len().saturating_sub(self.cursor)
    }
}

/// The rest of the error-handler chain.
pub struct ErrorNext {
    chain: Arc<Chain>,
    cursor: usize,
}

impl ErrorNext {
    /// Passes the failure to the next error handler. With none left, the
    /// failure comes straight back as `Err` and stays unhandled.
    pub async fn run(self, err: Error, req: Request, res: Response) -> Result<Response> {
        let fut = match self.chain.error_units.get(self.cursor) {
            Some(handler) => {
                let next = ErrorNext { chain: Arc::clone(&self.chain), cursor: self.cursor + 1 };
                handler.call(err, req, res, next)
            }
            None => return Err(err),
        };
        fut.await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::handler::Handler;
    use crate::Status;

    type Log = Arc<Mutex<Vec<String>>>;

    /// Middleware that records "before"/"after" around `next`.
    struct Recorder {
        name: &'static str,
        log: Log,
    }

    impl Middleware for Recorder {
        fn call(&self, req: Request, res: Response, next: Next) -> BoxFuture {
            let (name, log) = (self.name, Arc::clone(&self.log));
            Box::pin(async move {
                log.lock().unwrap().push(format!("{name}>"));
                let res = next.run(req, res).await;
                log.lock().unwrap().push(format!("<{name}"));
                res
            })
        }
    }

    fn entry(scope: Scope, name: &'static str, log: &Log) -> MiddlewareEntry {
        MiddlewareEntry::new(scope, Unit::normal(Recorder { name, log: Arc::clone(log) }))
    }

    fn recording_handler(log: &Log) -> BoxedHandler {
        let log = Arc::clone(log);
        (move |_req: Request, mut res: Response| {
            let log = Arc::clone(&log);
            async move {
                log.lock().unwrap().push("H".into());
                res.text("handled");
                res
            }
        })
        .into_boxed_handler()
    }

    async fn run(p: Pipeline) -> (Result<Response>, Outcome) {
        p.run(Request::get("/x"), Response::new(), Response::new()).await
    }

    #[tokio::test]
    async fn layers_wrap_in_scope_order() {
        let log = Log::default();
        let a = [entry(Scope::Global, "A", &log)];
        let b = [entry(Scope::PathPrefix("/".into()), "B", &log)];
        let c = [entry(Scope::RouteLocal, "C", &log)];

        let (res, outcome) = run(Pipeline::build(&a, &b, &c, recording_handler(&log))).await;
        assert_eq!(res.unwrap().body_text(), Some("handled"));
        assert_eq!(outcome, Outcome::HandlerReturned);
        assert_eq!(*log.lock().unwrap(), ["A>", "B>", "C>", "H", "<C", "<B", "<A"]);
    }

    #[tokio::test]
    async fn short_circuit_skips_the_rest() {
        let log = Log::default();
        let a = [entry(Scope::Global, "A", &log)];
        let gate = |_req: Request, _res: Response, _next: Next| async { Status::FORBIDDEN };
        let b = [MiddlewareEntry::new(Scope::Global, Unit::normal(gate))];
        let c = [entry(Scope::RouteLocal, "C", &log)];

        let (res, outcome) = run(Pipeline::build(&a, &b, &c, recording_handler(&log))).await;
        assert_eq!(res.unwrap().status_code(), Status::FORBIDDEN);
        assert_eq!(outcome, Outcome::ShortCircuited);
        assert_eq!(*log.lock().unwrap(), ["A>", "<A"]);
    }

    #[tokio::test]
    async fn outer_layers_see_the_short_circuit_response() {
        let seen = Arc::new(Mutex::new(None));
        let seen2 = Arc::clone(&seen);
        let outer = move |req: Request, res: Response, next: Next| {
            let seen = Arc::clone(&seen2);
            async move {
                let res = next.run(req, res).await?;
                *seen.lock().unwrap() = Some(res.status_code());
                Ok::<_, Error>(res)
            }
        };
        let gate = |_req: Request, _res: Response, _next: Next| async { Status::UNAUTHORIZED };
        let global = [MiddlewareEntry::new(Scope::Global, Unit::normal(outer))];
        let scoped = [MiddlewareEntry::new(Scope::PathPrefix("/".into()), Unit::normal(gate))];

        let handler = (|_req: Request, _res: Response| async { "unreachable" }).into_boxed_handler();
        let (res, _) = run(Pipeline::build(&global, &scoped, [], handler)).await;
        assert_eq!(res.unwrap().status_code(), Status::UNAUTHORIZED);
        assert_eq!(*seen.lock().unwrap(), Some(Status::UNAUTHORIZED));
    }

    #[tokio::test]
    async fn failures_go_to_error_handlers_nearest_first() {
        let log = Log::default();
        let failing = (|_req: Request, _res: Response| async { Err::<Response, _>(Error::msg("db down")) })
            .into_boxed_handler();

        let global_log = Arc::clone(&log);
        let global_eh = move |err: Error, _req: Request, mut res: Response, _next: ErrorNext| {
            let log = Arc::clone(&global_log);
            async move {
                log.lock().unwrap().push(format!("global:{err}"));
                res.status(Status::SERVICE_UNAVAILABLE).text("try later");
                res
            }
        };
        let local_log = Arc::clone(&log);
        let local_eh = move |err: Error, req: Request, res: Response, next: ErrorNext| {
            let log = Arc::clone(&local_log);
            async move {
                log.lock().unwrap().push(format!("local:{err}"));
                next.run(err, req, res).await
            }
        };

        let global = [
            MiddlewareEntry::new(Scope::Global, Unit::error(global_eh)),
            entry(Scope::Global, "A", &log),
        ];
        let local = [MiddlewareEntry::new(Scope::RouteLocal, Unit::error(local_eh))];

        let (res, outcome) = run(Pipeline::build(&global, [], &local, failing)).await;
        let res = res.unwrap();
        assert_eq!(outcome, Outcome::ErrorHandled);
        assert_eq!(res.status_code(), Status::SERVICE_UNAVAILABLE);
        assert_eq!(res.body_text(), Some("try later"));
        assert_eq!(*log.lock().unwrap(), ["A>", "<A", "local:db down", "global:db down"]);
    }

    #[tokio::test]
    async fn exhausted_error_chain_is_unhandled() {
        let failing = (|_req: Request, _res: Response| async { Err::<Response, _>(Error::msg("boom")) })
            .into_boxed_handler();
        let (res, outcome) = run(Pipeline::build([], [], [], Arc::clone(&failing))).await;
        assert_eq!(outcome, Outcome::UnhandledError);
        assert_eq!(res.unwrap_err().to_string(), "boom");

        let pass = |err: Error, req: Request, res: Response, next: ErrorNext| next.run(err, req, res);
        let global = [MiddlewareEntry::new(Scope::Global, Unit::error(pass))];
        let (res, outcome) = run(Pipeline::build(&global, [], [], failing)).await;
        assert_eq!(outcome, Outcome::UnhandledError);
        assert!(res.is_err());
    }

    #[tokio::test]
    async fn error_handlers_get_the_routed_request() {
        let echo_path = |_err: Error, req: Request, mut res: Response, _next: ErrorNext| async move {
            res.text(req.path().to_owned());
            res
        };
        let global = [MiddlewareEntry::new(Scope::Global, Unit::error(echo_path))];
        let failing = (|_req: Request, mut res: Response| async move {
            res.set_header("x-partial", "1");
            Err::<Response, _>(Error::msg("late failure"))
        })
        .into_boxed_handler();

        let (res, _) = run(Pipeline::build(&global, [], [], failing)).await;
        let res = res.unwrap();
        assert_eq!(res.body_text(), Some("/x"));
        assert_eq!(res.header("x-partial"), None);
    }

    /// Request extension counting how often the request is copied.
    struct CloneCount(Arc<std::sync::atomic::AtomicUsize>);

    impl Clone for CloneCount {
        fn clone(&self) -> Self {
            self.0.fetch_add(1, Ordering::SeqCst);
            Self(Arc::clone(&self.0))
        }
    }

    #[tokio::test]
    async fn request_is_copied_only_for_error_handlers() {
        let copies = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counted = || {
            let mut req = Request::get("/x");
            req.extensions_mut().insert(CloneCount(Arc::clone(&copies)));
            req
        };
        let failing = (|_req: Request, _res: Response| async { Err::<Response, _>(Error::msg("boom")) })
            .into_boxed_handler();

        let (res, outcome) = Pipeline::build([], [], [], Arc::clone(&failing))
            .run(counted(), Response::new(), Response::new())
            .await;
        assert!(res.is_err());
        assert_eq!(outcome, Outcome::UnhandledError);
        assert_eq!(copies.load(Ordering::SeqCst), 0);

        let recover = |_err: Error, _req: Request, _res: Response, _next: ErrorNext| async { "recovered" };
        let global = [MiddlewareEntry::new(Scope::Global, Unit::error(recover))];
        let (res, outcome) = Pipeline::build(&global, [], [], failing)
            .run(counted(), Response::new(), Response::new())
            .await;
        assert_eq!(res.unwrap().body_text(), Some("recovered"));
        assert_eq!(outcome, Outcome::ErrorHandled);
        assert_eq!(copies.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn prefix_scope_is_segment_aware() {
        assert!(Scope::PathPrefix("/api".into()).covers("/api/users"));
        assert!(Scope::PathPrefix("/api".into()).covers("/api"));
        assert!(!Scope::PathPrefix("/api".into()).covers("/apix"));
        assert!(Scope::Global.covers("/anything"));
    }
}
