//! Cross-origin resource sharing headers.

use std::sync::Arc;

use crate::handler::BoxFuture;
use crate::method::Method;
use crate::request::Request;
use crate::response::Response;
use crate::Status;

use super::{Middleware, Next};

/// Adds `Access-Control-Allow-*` headers and answers preflight requests.
///
/// An `OPTIONS` request is answered with `204 No Content` plus the allow
/// headers and never reaches the route. Every other response gets
/// `Access-Control-Allow-Origin` added on the way out.
///
/// ```rust
/// use brisk::{Router, middleware::Cors};
///
/// let app = Router::new().middleware(Cors::new(&["https://app.example.com"]));
/// ```
#[derive(Clone, Debug)]
pub struct Cors {
    inner: Arc<CorsConfig>,
}

#[derive(Clone, Debug)]
struct CorsConfig {
    origins: String,
    methods: String,
    headers: String,
    max_age: u32,
    credentials: bool,
}

impl Cors {
    /// Any origin, any header, the common methods.
    pub fn permissive() -> Self {
        Self::build(&["*"], &["GET", "POST", "PUT", "DELETE", "PATCH", "OPTIONS"], &["*"])
    }

    /// Only the listed origins.
    pub fn new(origins: &[&str]) -> Self {
        Self::build(origins, &["GET", "POST", "PUT", "DELETE"], &["Content-Type", "Authorization"])
    }

    fn build(origins: &[&str], methods: &[&str], headers: &[&str]) -> Self {
        Self {
            inner: Arc::new(CorsConfig {
                origins: origins.join(", "),
                methods: methods.join(", "),
                headers: headers.join(", "),
                max_age: 86_400,
                credentials: false,
            }),
        }
    }

    /// Overrides the preflight cache lifetime, in seconds.
    #[must_use]
    pub fn max_age(mut self, seconds: u32) -> Self {
        Arc::make_mut(&mut self.inner).max_age = seconds;
        self
    }

    /// Sends `Access-Control-Allow-Credentials: true` so browsers expose
    /// responses to credentialed requests. Browsers refuse this together
    /// with a `*` origin.
    #[must_use]
    pub fn credentials(mut self, allow: bool) -> Self {
        Arc::make_mut(&mut self.inner).credentials = allow;
        self
    }
}

impl Middleware for Cors {
    fn call(&self, req: Request, res: Response, next: Next) -> BoxFuture {
        let cfg = Arc::clone(&self.inner);
        Box::pin(async move {
            if req.method() == Method::Options {
                let mut res = res;
                res.status(Status::NO_CONTENT)
                    .set_header("access-control-allow-origin", &cfg.origins)
                    .set_header("access-control-allow-methods", &cfg.methods)
                    .set_header("access-control-allow-headers", &cfg.headers)
                    .set_header("access-control-max-age", &cfg.max_age.to_string());
                allow_credentials(&cfg, &mut res);
                return Ok(res);
            }

            let mut res = next.run(req, res).await?;
            res.set_header("access-control-allow-origin", &cfg.origins);
            allow_credentials(&cfg, &mut res);
            Ok(res)
        })
    }
}

fn allow_credentials(cfg: &CorsConfig, res: &mut Response) {
    if cfg.credentials {
        res.set_header("access-control-allow-credentials", "true");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::Handler;
    use crate::middleware::{MiddlewareEntry, Pipeline, Scope, Unit};

    async fn run(cors: Cors, req: Request) -> Response {
        let global = [MiddlewareEntry::new(Scope::Global, Unit::normal(cors))];
        let handler = (|_req: Request, _res: Response| async { "payload" }).into_boxed_handler();
        let (res, _) = Pipeline::build(&global, [], [], handler)
            .run(req, Response::new(), Response::new())
            .await;
        res.unwrap()
    }

    #[tokio::test]
    async fn preflight_short_circuits() {
        let res = run(Cors::permissive().max_age(600), Request::new(Method::Options, "/api/items")).await;
        assert_eq!(res.status_code(), Status::NO_CONTENT);
        assert_eq!(res.header("access-control-allow-origin"), Some("*"));
        assert_eq!(res.header("access-control-max-age"), Some("600"));
        assert!(res.body().is_empty());
    }

    #[tokio::test]
    async fn regular_responses_get_the_origin_header() {
        let res = run(Cors::new(&["https://a.example", "https://b.example"]), Request::get("/api/items")).await;
        assert_eq!(res.body_text(), Some("payload"));
        assert_eq!(res.header("access-control-allow-origin"), Some("https://a.example, https://b.example"));
        assert_eq!(res.header("access-control-allow-methods"), None);
        assert_eq!(res.header("access-control-allow-credentials"), None);
    }

    #[tokio::test]
    async fn credentials_are_announced_when_enabled() {
        let cors = Cors::new(&["https://app.example"]).credentials(true);
        let res = run(cors.clone(), Request::get("/api/items")).await;
        assert_eq!(res.header("access-control-allow-credentials"), Some("true"));

        let res = run(cors, Request::new(Method::Options, "/api/items")).await;
        assert_eq!(res.status_code(), Status::NO_CONTENT);
        assert_eq!(res.header("access-control-allow-credentials"), Some("true"));
    }
}
