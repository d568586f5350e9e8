//! Application router.
//!
//! A `Router` is a by-value builder: every registration method takes `self`
//! and returns it, so an application is one expression. Once built, the
//! router is handed to [`Server::serve`](crate::Server::serve) (or
//! [`Dispatcher::new`](crate::Dispatcher::new)) and never changes again.
//!
//! Routers nest. [`Router::mount`] attaches a child under a path prefix; the
//! child's routes answer at `prefix + pattern`, and everything registered on
//! the child (middleware and error handlers alike) applies to requests under
//! that prefix only.

use std::sync::Arc;

use tracing::debug;

use crate::error::PatternError;
use crate::handler::{BoxedHandler, Handler};
use crate::method::{Method, MethodFilter};
use crate::middleware::{ErrorMiddleware, Middleware, MiddlewareEntry, Scope, Unit};
use crate::path::{self, Params};
use crate::render::Renderer;
use crate::route::{Endpoint, MatchResult, RouteTable};
use crate::settings::Settings;

/// The application router.
///
/// ```rust
/// use brisk::{Request, Response, Router};
///
/// async fn list(_req: Request, mut res: Response) -> Response {
///     res.json(&["alice", "bob"]);
///     res
/// }
///
/// async fn show(req: Request, mut res: Response) -> Response {
///     res.text(format!("user {}", req.param("id").unwrap_or_default()));
///     res
/// }
///
/// let users = Router::new().get("/", list).get("/:id", show);
/// let app = Router::new().mount("/users", users);
/// ```
pub struct Router {
    table: RouteTable,
    middleware: Vec<MiddlewareEntry>,
    mounts: Vec<Mount>,
    fallback: Option<BoxedHandler>,
    settings: Settings,
}

struct Mount {
    prefix: String,
    router: Router,
}

impl Router {
    /// An empty router. `debug` starts from the `BRISK_DEBUG` environment variable.
    pub fn new() -> Self {
        Self {
            table: RouteTable::new(),
            middleware: Vec::new(),
            mounts: Vec::new(),
            fallback: None,
            settings: Settings::from_env(),
        }
    }

    /// Registers a handler for a method (or [`MethodFilter::All`]) and pattern.
    ///
    /// # Panics
    ///
    /// Panics if the pattern is malformed. Routes are registered at startup,
    /// so a bad pattern is a programming error; use [`try_route`](Router::try_route)
    /// to handle it instead.
    pub fn on(self, method: impl Into<MethodFilter>, pattern: &str, handler: impl Handler) -> Self {
        self.route(Endpoint::new(method, pattern, handler))
    }

    pub fn get(self, pattern: &str, handler: impl Handler) -> Self { self.on(Method::Get, pattern, handler) }
    pub fn post(self, pattern: &str, handler: impl Handler) -> Self { self.on(Method::Post, pattern, handler) }
    pub fn put(self, pattern: &str, handler: impl Handler) -> Self { self.on(Method::Put, pattern, handler) }
    pub fn delete(self, pattern: &str, handler: impl Handler) -> Self { self.on(Method::Delete, pattern, handler) }
    pub fn patch(self, pattern: &str, handler: impl Handler) -> Self { self.on(Method::Patch, pattern, handler) }
    pub fn head(self, pattern: &str, handler: impl Handler) -> Self { self.on(Method::Head, pattern, handler) }
    pub fn options(self, pattern: &str, handler: impl Handler) -> Self { self.on(Method::Options, pattern, handler) }
    pub fn all(self, pattern: &str, handler: impl Handler) -> Self { self.on(MethodFilter::All, pattern, handler) }

    /// Registers a prepared [`Endpoint`], with its route-local middleware.
    ///
    /// # Panics
    ///
    /// Panics if the pattern is malformed.
    pub fn route(self, endpoint: Endpoint) -> Self {
        self.try_route(endpoint).unwrap_or_else(|e| panic!("invalid route: {e}"))
    }

    /// Like [`route`](Router::route), but returns malformed patterns as errors.
    pub fn try_route(mut self, endpoint: Endpoint) -> Result<Self, PatternError> {
        self.table.insert(endpoint)?;
        Ok(self)
    }

    /// Adds middleware that runs for every request reaching this router,
    /// unmatched ones included.
    pub fn middleware(mut self, mw: impl Middleware) -> Self {
        self.middleware.push(MiddlewareEntry::new(Scope::Global, Unit::normal(mw)));
        self
    }

    /// Adds middleware for paths under `prefix` (segment-wise: `/api` covers
    /// `/api` and `/api/users`, not `/apix`).
    pub fn middleware_at(mut self, prefix: &str, mw: impl Middleware) -> Self {
        self.middleware.push(MiddlewareEntry::new(Scope::PathPrefix(normalize(prefix)), Unit::normal(mw)));
        self
    }

    /// Adds an error handler for every request reaching this router.
    pub fn error_handler(mut self, handler: impl ErrorMiddleware) -> Self {
        self.middleware.push(MiddlewareEntry::new(Scope::Global, Unit::error(handler)));
        self
    }

    /// Adds an error handler for paths under `prefix`.
    pub fn error_handler_at(mut self, prefix: &str, handler: impl ErrorMiddleware) -> Self {
        self.middleware.push(MiddlewareEntry::new(Scope::PathPrefix(normalize(prefix)), Unit::error(handler)));
        self
    }

    /// Attaches `router` under `prefix`.
    ///
    /// Local routes are tried before mounted ones, and mounts in the order
    /// they were attached. Only the root router's fallback and settings are
    /// used; a child's are ignored.
    pub fn mount(mut self, prefix: &str, router: Router) -> Self {
        self.mounts.push(Mount { prefix: normalize(prefix), router });
        self
    }

    /// The handler for requests no route matches. It runs inside the
    /// global and path-scoped middleware like any route would.
    pub fn fallback(mut self, handler: impl Handler) -> Self {
        self.fallback = Some(handler.into_boxed_handler());
        self
    }

    /// Stores an application setting, readable through
    /// [`Request::setting`](crate::Request::setting).
    pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.settings.set(key, value);
        self
    }

    /// Exposes failure details in 500 response bodies.
    pub fn debug(mut self, on: bool) -> Self {
        self.settings.debug = on;
        self
    }

    /// Installs the template renderer used by [`Response::render`](crate::Response::render).
    pub fn renderer(mut self, renderer: impl Renderer) -> Self {
        self.settings.renderer = Some(Arc::new(renderer));
        self
    }

    /// Builds the path of the route registered under `name`, searching
    /// mounted routers too. `None` if no such route exists or a parameter
    /// is missing.
    pub fn url_for<'a>(&self, name: &str, params: impl IntoIterator<Item = (&'a str, &'a str)>) -> Option<String> {
        let params: Params = params.into_iter().map(|(k, v)| (k.to_owned(), v.to_owned())).collect();
        self.reverse(name, &params)
    }

    fn reverse(&self, name: &str, params: &Params) -> Option<String> {
        if let Some(route) = self.table.named(name) {
            return route.pattern().reverse(params);
        }
        self.mounts.iter().find_map(|m| {
            let tail = m.router.reverse(name, params)?;
            Some(match (m.prefix.as_str(), tail.as_str()) {
                ("/", tail) => tail.to_owned(),
                (prefix, "/") => prefix.to_owned(),
                (prefix, tail) => format!("{prefix}{tail}"),
            })
        })
    }

    /// Finds the route for `method` and `path`: local routes first, then
    /// mounted routers in mount order.
    pub fn resolve(&self, method: Method, path: &str) -> MatchResult {
        let mut allowed = Vec::new();

        match self.table.lookup(method, path) {
            MatchResult::NotFound => {}
            MatchResult::MethodNotAllowed { allowed: found } => merge(&mut allowed, found),
            matched => return matched,
        }

        for mount in &self.mounts {
            let Some(rest) = path::strip_prefix(&mount.prefix, path) else { continue };
            match mount.router.resolve(method, rest) {
                MatchResult::NotFound => {}
                MatchResult::MethodNotAllowed { allowed: found } => merge(&mut allowed, found),
                matched => {
                    debug!(prefix = %mount.prefix, path, "matched in mounted router");
                    return matched;
                }
            }
        }

        if allowed.is_empty() {
            MatchResult::NotFound
        } else {
            MatchResult::MethodNotAllowed { allowed }
        }
    }

    /// Global entries of this router.
    pub(crate) fn global_layers(&self) -> impl Iterator<Item = &MiddlewareEntry> {
        self.middleware.iter().filter(|e| e.scope == Scope::Global)
    }

    /// Path-scoped entries covering `path`: this router's own prefixed
    /// entries, then every entry of each mount the path falls under.
    pub(crate) fn scoped_layers<'a>(&'a self, path: &str, out: &mut Vec<&'a MiddlewareEntry>) {
        out.extend(
            self.middleware
                .iter()
                .filter(|e| matches!(e.scope, Scope::PathPrefix(_)) && e.scope.covers(path)),
        );
        for mount in &self.mounts {
            if let Some(rest) = path::strip_prefix(&mount.prefix, path) {
                out.extend(mount.router.global_layers());
                mount.router.scoped_layers(rest, out);
            }
        }
    }

    /// Moves the settings out for the dispatcher to share.
    pub(crate) fn take_settings(&mut self) -> Settings {
        std::mem::take(&mut self.settings)
    }

    pub(crate) fn fallback_handler(&self) -> Option<&BoxedHandler> {
        self.fallback.as_ref()
    }

    pub fn routes(&self) -> &RouteTable {
        &self.table
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

/// `api/`, `/api` and `/api/` all become `/api`; the root stays `/`.
fn normalize(prefix: &str) -> String {
    let mut out = String::from("/");
    out.push_str(&path::segments(prefix).collect::<Vec<_>>().join("/"));
    out
}

fn merge(into: &mut Vec<Method>, found: Vec<Method>) {
    for m in found {
        if !into.contains(&m) {
            into.push(m);
        }
    }
}
