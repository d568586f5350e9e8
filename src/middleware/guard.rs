//! Header-based request guard.

use std::sync::Arc;

use crate::handler::BoxFuture;
use crate::request::Request;
use crate::response::Response;
use crate::Status;

use super::{Middleware, Next};

/// Lets a request through only when a header carries an exact value.
///
/// A missing header gets `401 Unauthorized`; a wrong value gets
/// `403 Forbidden`. Either way the chain stops here.
///
/// ```rust
/// use brisk::{Router, middleware::RequireHeader};
///
/// let admin = Router::new().middleware(RequireHeader::new("x-api-key", "secret123"));
/// let app = Router::new().mount("/admin", admin);
/// ```
#[derive(Clone, Debug)]
pub struct RequireHeader {
    name: Arc<str>,
    value: Arc<str>,
}

impl RequireHeader {
    pub fn new(name: &str, value: &str) -> Self {
        Self { name: name.into(), value: value.into() }
    }
}

impl Middleware for RequireHeader {
    fn call(&self, req: Request, mut res: Response, next: Next) -> BoxFuture {
        let (name, value) = (Arc::clone(&self.name), Arc::clone(&self.value));
        Box::pin(async move {
            let rejection = match req.header(&name) {
                None => Some((Status::UNAUTHORIZED, "Unauthorized")),
                Some(got) if got != &*value => Some((Status::FORBIDDEN, "Forbidden")),
                Some(_) => None,
            };
            match rejection {
                Some((status, body)) => {
                    res.status(status).text(body);
                    Ok(res)
                }
                None => next.run(req, res).await,
            }
        })
    }
}
