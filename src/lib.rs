//! # brisk
//!
//! A small HTTP framework: method + path routing, an ordered middleware
//! chain, and a hyper server underneath. Nothing more.
//!
//! ## The moving parts
//!
//! - **Routes** are `(method, pattern, handler)` triples, tried in the order
//!   they were registered. Patterns are `/literal`, `/:param` and a final `/*`.
//! - **Middleware** wraps handlers. Global layers run first, then layers
//!   scoped to a path prefix, then layers attached to one route. Any of them
//!   can answer early, post-process the response, or fail.
//! - **Error handlers** catch failures from anywhere in the chain, nearest
//!   scope first. Whatever nobody handles becomes a 500.
//! - **Routers nest**: [`Router::mount`] attaches a sub-application under a
//!   prefix, with its own middleware.
//!
//! What the reverse proxy in front of you already owns (TLS, body-size
//! limits, slow clients) brisk leaves alone.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use brisk::{Endpoint, Error, Next, Request, Response, Result, Router, Server, Status};
//! use brisk::middleware::Trace;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let app = Router::new()
//!         .middleware(Trace)
//!         .get("/users/:id", get_user)
//!         .route(Endpoint::post("/users", create_user).with(require_json))
//!         .error_handler(on_error);
//!
//!     Server::bind("0.0.0.0:3000").serve(app).await
//! }
//!
//! async fn get_user(req: Request, mut res: Response) -> Response {
//!     let id = req.param("id").unwrap_or("unknown");
//!     res.json(&serde_json::json!({ "id": id, "name": "alice" }));
//!     res
//! }
//!
//! async fn create_user(req: Request, mut res: Response) -> Result<Response> {
//!     let body: serde_json::Value = req.json()?;
//!     res.status(Status::CREATED).set_header("location", "/users/99").json(&body);
//!     Ok(res)
//! }
//!
//! async fn require_json(req: Request, res: Response, next: Next) -> Result<Response> {
//!     if !req.is("application/json") {
//!         return Ok(Response::with_status(Status::UNSUPPORTED_MEDIA_TYPE));
//!     }
//!     next.run(req, res).await
//! }
//!
//! async fn on_error(err: Error, _req: Request, mut res: Response, _next: brisk::ErrorNext) -> Response {
//!     res.status(err.status()).json(&serde_json::json!({ "error": err.to_string() }));
//!     res
//! }
//! ```

mod dispatcher;
mod error;
mod handler;
mod method;
mod path;
mod render;
mod request;
mod response;
mod route;
mod router;
mod server;
mod settings;

pub mod middleware;

pub use dispatcher::Dispatcher;
pub use error::{BoxError, Error, PatternError, Result};
pub use handler::{BoxFuture, Handler};
pub use method::{Method, MethodFilter};
pub use middleware::{ErrorMiddleware, ErrorNext, Middleware, Next, Outcome};
pub use path::{Params, Pattern, Segment, WILDCARD};
pub use render::Renderer;
pub use request::Request;
pub use response::{ContentType, CookieOptions, IntoResponse, Response, SameSite};
pub use route::{Endpoint, MatchResult, Route, RouteTable};
pub use router::Router;
pub use server::{RemoteAddr, Server};
pub use settings::{DEBUG_ENV, Settings};

/// HTTP status codes.
pub use http::StatusCode as Status;
