//! Request dispatch: one transport request in, one transport response out.
//!
//! ```text
//! http::Request<Bytes>
//!   → Request + default Response
//!   → Router::resolve            (Matched / MethodNotAllowed / NotFound)
//!   → Pipeline: global → path-scoped → route-local → endpoint
//!   → unhandled failure?         (→ status from the error, logged)
//!   → http::Response<Bytes>
//! ```
//!
//! Unmatched requests still run through the global and path-scoped layers;
//! only the endpoint differs (the fallback, or a default 404 / 405).

use std::sync::Arc;

use bytes::Bytes;
use http::StatusCode;
use http::header::ALLOW;
use tracing::{debug, error};

use crate::error::Error;
use crate::handler::{BoxedHandler, Handler};
use crate::method::Method;
use crate::middleware::{Outcome, Pipeline};
use crate::path::{Params, WILDCARD};
use crate::request::Request;
use crate::response::Response;
use crate::route::MatchResult;
use crate::router::Router;
use crate::settings::Settings;

/// A sealed router, ready to serve concurrent requests.
///
/// Cheap to share behind an `Arc`; dispatching never mutates it.
pub struct Dispatcher {
    router: Router,
    settings: Arc<Settings>,
}

impl Dispatcher {
    /// Seals `router`. No routes or middleware can be added afterwards.
    pub fn new(mut router: Router) -> Self {
        let settings = Arc::new(router.take_settings());
        Self { router, settings }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Routes one request and produces its response. Never fails: every
    /// failure becomes an error status.
    pub async fn dispatch(&self, req: http::Request<Bytes>) -> http::Response<Bytes> {
        self.handle(req).await.0
    }

    /// Like [`dispatch`](Dispatcher::dispatch), also reporting how the chain ended.
    pub async fn handle(&self, req: http::Request<Bytes>) -> (http::Response<Bytes>, Outcome) {
        let mut req = match Request::from_http(req, Arc::clone(&self.settings)) {
            Ok(req) => req,
            Err(method) => {
                debug!(%method, "unsupported method");
                let mut res = Response::with_status(StatusCode::METHOD_NOT_ALLOWED);
                res.text("Method Not Allowed");
                return (res.into_http(), Outcome::Rejected);
            }
        };

        let method = req.method();
        let path = req.path().to_owned();

        let (endpoint, route) = match self.router.resolve(method, &path) {
            MatchResult::Matched { route, params } => {
                debug!(%method, path = %path, pattern = route.pattern().as_str(), "matched");
                req.params = decode(params);
                (Arc::clone(&route.handler), Some(route))
            }
            MatchResult::MethodNotAllowed { allowed } => {
                debug!(%method, path = %path, ?allowed, "method not allowed");
                (method_not_allowed(&allowed), None)
            }
            MatchResult::NotFound => {
                debug!(%method, path = %path, "no route");
                let fallback = self.router.fallback_handler().cloned();
                (fallback.unwrap_or_else(|| not_found.into_boxed_handler()), None)
            }
        };

        let mut scoped = Vec::new();
        self.router.scoped_layers(&path, &mut scoped);
        let local = route.as_ref().map(|r| r.middleware()).unwrap_or_default();
        let pipeline = Pipeline::build(self.router.global_layers(), scoped, local, endpoint);

        let (result, outcome) = pipeline.run(req, self.fresh_response(), self.fresh_response()).await;
        let res = result.unwrap_or_else(|err| self.unhandled(err, method, &path));
        (res.into_http(), outcome)
    }

    fn fresh_response(&self) -> Response {
        Response::with_renderer(self.settings.renderer.clone())
    }

    /// Turns a failure nothing recovered from into a response.
    fn unhandled(&self, err: Error, method: Method, path: &str) -> Response {
        error!(%method, path, error = %err, "unhandled failure");
        let status = err.status();
        let body = match &err {
            Error::Http { message, .. } => message.clone(),
            _ if self.settings.debug => err.to_string(),
            _ => status.canonical_reason().unwrap_or("Internal Server Error").to_owned(),
        };
        let mut res = Response::with_status(status);
        res.text(body);
        res
    }
}

/// Percent-decodes captured values once. Only the wildcard may span `/`, so
/// an encoded slash inside a named parameter stays encoded. Values that do
/// not decode to UTF-8 are kept as captured.
fn decode(params: Params) -> Params {
    params
        .into_iter()
        .map(|(name, raw)| {
            let value = if name == WILDCARD { decode_all(&raw) } else { decode_segment(&raw) };
            (name, value.unwrap_or(raw))
        })
        .collect()
}

fn decode_all(raw: &str) -> Option<String> {
    urlencoding::decode(raw).ok().map(|v| v.into_owned())
}

fn decode_segment(raw: &str) -> Option<String> {
    let pieces = raw
        .split("%2F")
        .flat_map(|piece| piece.split("%2f"))
        .map(decode_all)
        .collect::<Option<Vec<_>>>()?;
    Some(pieces.join("%2F"))
}

async fn not_found(_req: Request, mut res: Response) -> Response {
    res.status(StatusCode::NOT_FOUND).text("Not Found");
    res
}

fn method_not_allowed(allowed: &[Method]) -> BoxedHandler {
    let allow: Arc<str> = allowed.iter().map(|m| m.as_str()).collect::<Vec<_>>().join(", ").into();
    (move |_req: Request, mut res: Response| {
        let allow = Arc::clone(&allow);
        async move {
            res.status(StatusCode::METHOD_NOT_ALLOWED)
                .set_header(ALLOW.as_str(), &allow)
                .text("Method Not Allowed");
            res
        }
    })
    .into_boxed_handler()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Next;

    fn request(method: &str, uri: &str) -> http::Request<Bytes> {
        http::Request::builder().method(method).uri(uri).body(Bytes::new()).unwrap()
    }

    async fn hello(_req: Request, _res: Response) -> &'static str {
        "hello"
    }

    async fn echo_name(req: Request, mut res: Response) -> Response {
        res.text(req.param("name").unwrap_or_default().to_owned());
        res
    }

    async fn deny(_req: Request, _res: Response, _next: Next) -> StatusCode {
        StatusCode::FORBIDDEN
    }

    #[tokio::test]
    async fn reports_how_the_chain_ended() {
        let app = Dispatcher::new(
            Router::new()
                .get("/", hello)
                .route(crate::Endpoint::get("/private", hello).with(deny))
                .get("/boom", |_req: Request, _res: Response| async { Err::<Response, _>(Error::msg("x")) }),
        );

        let (res, outcome) = app.handle(request("GET", "/")).await;
        assert_eq!((res.status(), outcome), (StatusCode::OK, Outcome::HandlerReturned));

        let (res, outcome) = app.handle(request("GET", "/private")).await;
        assert_eq!((res.status(), outcome), (StatusCode::FORBIDDEN, Outcome::ShortCircuited));

        let (res, outcome) = app.handle(request("GET", "/boom")).await;
        assert_eq!((res.status(), outcome), (StatusCode::INTERNAL_SERVER_ERROR, Outcome::UnhandledError));

        let (res, outcome) = app.handle(request("PURGE", "/")).await;
        assert_eq!((res.status(), outcome), (StatusCode::METHOD_NOT_ALLOWED, Outcome::Rejected));
    }

    #[tokio::test]
    async fn params_are_decoded_once() {
        let app = Dispatcher::new(Router::new().get("/greet/:name", echo_name));
        let res = app.dispatch(request("GET", "/greet/J%C3%BCrgen%2520")).await;
        assert_eq!(res.body().as_ref(), "Jürgen%20".as_bytes());
    }

    #[tokio::test]
    async fn encoded_slashes_stay_inside_one_param() {
        let app = Dispatcher::new(
            Router::new()
                .get("/greet/:name", echo_name)
                .get("/files/*", |req: Request, _res: Response| async move {
                    req.wildcard().unwrap_or_default().to_owned()
                }),
        );
        let res = app.dispatch(request("GET", "/greet/a%2Fb%2fc%20d")).await;
        assert_eq!(res.body().as_ref(), b"a%2Fb%2Fc d");

        let res = app.dispatch(request("GET", "/files/a%2Fb/c")).await;
        assert_eq!(res.body().as_ref(), b"a/b/c");
    }

    #[tokio::test]
    async fn method_not_allowed_lists_methods() {
        let app = Dispatcher::new(Router::new().get("/items", hello).post("/items", hello));
        let res = app.dispatch(request("DELETE", "/items")).await;
        assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(res.headers()["allow"], "GET, POST");
    }

    #[tokio::test]
    async fn http_errors_keep_status_and_message() {
        let app = Dispatcher::new(Router::new().post("/users", |_req: Request, _res: Response| async {
            Err::<Response, _>(Error::http(StatusCode::UNPROCESSABLE_ENTITY, "name is required"))
        }));
        let res = app.dispatch(request("POST", "/users")).await;
        assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(res.body().as_ref(), b"name is required");
    }
}
