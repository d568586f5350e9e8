//! Route table: an ordered list of routes, scanned first-to-last.
//!
//! Precedence is registration order. Given
//!
//! ```text
//! GET /users/:id
//! GET /users/me
//! ```
//!
//! a request for `/users/me` hits the first route with `id = "me"`. Register
//! specific routes before parameterised ones, and catch-alls (`*`) last.

use std::sync::Arc;

use tracing::warn;

use crate::error::PatternError;
use crate::handler::{BoxedHandler, Handler};
use crate::method::{Method, MethodFilter};
use crate::middleware::{ErrorMiddleware, Middleware, MiddlewareEntry, Scope, Unit};
use crate::path::{Params, Pattern};

/// A registered route. Immutable once the table owns it.
pub struct Route {
    method: MethodFilter,
    pattern: Pattern,
    pub(crate) handler: BoxedHandler,
    pub(crate) middleware: Vec<MiddlewareEntry>,
    name: Option<String>,
}

impl Route {
    pub fn method(&self) -> MethodFilter {
        self.method
    }

    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Route-local middleware and error handlers, in registration order.
    pub fn middleware(&self) -> &[MiddlewareEntry] {
        &self.middleware
    }
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("pattern", &self.pattern.as_str())
            .field("middleware", &self.middleware.len())
            .field("name", &self.name)
            .finish()
    }
}

/// Outcome of looking a request up.
#[derive(Debug)]
pub enum MatchResult {
    /// A route matched; `params` are the raw captures.
    Matched { route: Arc<Route>, params: Params },
    /// Some pattern matched the path but none accepted the method.
    MethodNotAllowed { allowed: Vec<Method> },
    NotFound,
}

impl MatchResult {
    pub fn is_matched(&self) -> bool {
        matches!(self, Self::Matched { .. })
    }
}

/// A route waiting to be registered, with optional route-local middleware.
///
/// ```rust
/// use brisk::{Endpoint, Request, Response, Router, Next, Status};
///
/// async fn validate_id(req: Request, res: Response, next: Next) -> brisk::Result<Response> {
///     match req.param("id").and_then(|id| id.parse::<u64>().ok()) {
///         Some(id) if id > 0 => next.run(req, res).await,
///         _ => Ok(Response::with_status(Status::BAD_REQUEST)),
///     }
/// }
///
/// async fn get_user(req: Request, mut res: Response) -> Response {
///     res.text(format!("user {}", req.param("id").unwrap_or_default()));
///     res
/// }
///
/// let app = Router::new().route(Endpoint::get("/user/:id", get_user).with(validate_id));
/// ```
pub struct Endpoint {
    method: MethodFilter,
    pattern: String,
    handler: BoxedHandler,
    middleware: Vec<MiddlewareEntry>,
    name: Option<String>,
}

impl Endpoint {
    pub fn new(method: impl Into<MethodFilter>, pattern: &str, handler: impl Handler) -> Self {
        Self {
            method: method.into(),
            pattern: pattern.to_owned(),
            handler: handler.into_boxed_handler(),
            middleware: Vec::new(),
            name: None,
        }
    }

    pub fn get(pattern: &str, handler: impl Handler) -> Self { Self::new(Method::Get, pattern, handler) }
    pub fn post(pattern: &str, handler: impl Handler) -> Self { Self::new(Method::Post, pattern, handler) }
    pub fn put(pattern: &str, handler: impl Handler) -> Self { Self::new(Method::Put, pattern, handler) }
    pub fn delete(pattern: &str, handler: impl Handler) -> Self { Self::new(Method::Delete, pattern, handler) }
    pub fn patch(pattern: &str, handler: impl Handler) -> Self { Self::new(Method::Patch, pattern, handler) }
    pub fn all(pattern: &str, handler: impl Handler) -> Self { Self::new(MethodFilter::All, pattern, handler) }

    /// Appends route-local middleware. Runs after global and path-scoped layers.
    #[must_use]
    pub fn with(mut self, mw: impl Middleware) -> Self {
        self.middleware.push(MiddlewareEntry::new(Scope::RouteLocal, Unit::normal(mw)));
        self
    }

    /// Appends a route-local error handler. It sees failures before any
    /// path-scoped or global error handler does.
    #[must_use]
    pub fn on_error(mut self, handler: impl ErrorMiddleware) -> Self {
        self.middleware.push(MiddlewareEntry::new(Scope::RouteLocal, Unit::error(handler)));
        self
    }

    /// Names the route for [`Router::url_for`](crate::Router::url_for).
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Registration-ordered route storage.
#[derive(Default)]
pub struct RouteTable {
    routes: Vec<Arc<Route>>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compiles and appends a route.
    ///
    /// An exact duplicate of an earlier `(method, pattern)` is accepted but
    /// logged: the earlier route keeps winning every lookup.
    pub fn register(
        &mut self,
        method: impl Into<MethodFilter>,
        pattern: &str,
        handler: impl Handler,
        local_middleware: Vec<MiddlewareEntry>,
    ) -> Result<Arc<Route>, PatternError> {
        let mut endpoint = Endpoint::new(method, pattern, handler);
        endpoint.middleware = local_middleware;
        self.insert(endpoint)
    }

    pub(crate) fn insert(&mut self, endpoint: Endpoint) -> Result<Arc<Route>, PatternError> {
        let pattern = Pattern::compile(&endpoint.pattern)?;

        let shadowed = self
            .routes
            .iter()
            .any(|r| r.method == endpoint.method && r.pattern.same_shape(&pattern));
        if shadowed {
            warn!(method = %endpoint.method, pattern = %endpoint.pattern, "duplicate route; the earlier registration wins");
        }

        let route = Arc::new(Route {
            method: endpoint.method,
            pattern,
            handler: endpoint.handler,
            middleware: endpoint.middleware,
            name: endpoint.name,
        });
        self.routes.push(Arc::clone(&route));
        Ok(route)
    }

    /// First route (in registration order) accepting both method and path.
    ///
    /// `HEAD` falls back to the first matching `GET` route when no route
    /// accepts `HEAD` itself.
    pub fn lookup(&self, method: Method, path: &str) -> MatchResult {
        let mut allowed = Vec::new();
        let mut head_fallback = None;

        for route in &self.routes {
            let Some(params) = route.pattern.matches(path) else { continue };
            if route.method.accepts(method) {
                return MatchResult::Matched { route: Arc::clone(route), params };
            }
            if let MethodFilter::One(m) = route.method {
                if method == Method::Head && m == Method::Get && head_fallback.is_none() {
                    head_fallback = Some((Arc::clone(route), params));
                }
                if !allowed.contains(&m) {
                    allowed.push(m);
                }
            }
        }

        match head_fallback {
            Some((route, params)) => MatchResult::Matched { route, params },
            None if allowed.is_empty() => MatchResult::NotFound,
            None => MatchResult::MethodNotAllowed { allowed },
        }
    }

    pub fn routes(&self) -> &[Arc<Route>] {
        &self.routes
    }

    pub(crate) fn named(&self, name: &str) -> Option<&Arc<Route>> {
        self.routes.iter().find(|r| r.name.as_deref() == Some(name))
    }
}
