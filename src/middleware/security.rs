//! Hardening headers for browser clients.

use crate::handler::BoxFuture;
use crate::request::Request;
use crate::response::Response;

use super::{Middleware, Next};

const DEFAULTS: [(&str, &str); 6] = [
    ("x-content-type-options", "nosniff"),
    ("x-frame-options", "DENY"),
    ("x-xss-protection", "1; mode=block"),
    ("strict-transport-security", "max-age=31536000; includeSubDomains"),
    ("content-security-policy", "default-src 'self'"),
    ("referrer-policy", "strict-origin-when-cross-origin"),
];

/// Sets the usual security headers before the rest of the chain runs.
///
/// Later layers and the handler may overwrite any of them, e.g. a page that
/// must be framed can set its own `X-Frame-Options`.
#[derive(Clone, Copy, Debug, Default)]
pub struct SecurityHeaders;

impl Middleware for SecurityHeaders {
    fn call(&self, req: Request, mut res: Response, next: Next) -> BoxFuture {
        for (name, value) in DEFAULTS {
            res.set_header(name, value);
        }
        Box::pin(next.run(req, res))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::Handler;
    use crate::middleware::{MiddlewareEntry, Pipeline, Scope, Unit};

    #[tokio::test]
    async fn headers_reach_the_response_and_can_be_overridden() {
        let global = [MiddlewareEntry::new(Scope::Global, Unit::normal(SecurityHeaders))];
        let handler = (|_req: Request, mut res: Response| async move {
            res.set_header("X-Frame-Options", "SAMEORIGIN").text("page");
            res
        })
        .into_boxed_handler();

        let (res, _) = Pipeline::build(&global, [], [], handler)
            .run(Request::get("/"), Response::new(), Response::new())
            .await;
        let res = res.unwrap();
        assert_eq!(res.header("x-content-type-options"), Some("nosniff"));
        assert_eq!(res.header("strict-transport-security"), Some("max-age=31536000; includeSubDomains"));
        assert_eq!(res.header("x-frame-options"), Some("SAMEORIGIN"));
        assert_eq!(res.body_text(), Some("page"));
    }
}
