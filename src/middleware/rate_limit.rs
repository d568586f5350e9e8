//! Per-client request rate limiting.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tracing::debug;

use crate::handler::BoxFuture;
use crate::request::Request;
use crate::response::Response;
use crate::server::RemoteAddr;
use crate::Status;

use super::{Middleware, Next};

/// Client logs kept before idle ones are swept.
const SWEEP_AT: usize = 10_000;

/// Allows each client at most `max_requests` in any sliding `window`.
///
/// Clients are told apart by `X-Forwarded-For`, then by peer address. Allowed
/// responses carry `X-RateLimit-Limit`, `X-RateLimit-Remaining` and
/// `X-RateLimit-Reset`; refused ones get `429 Too Many Requests` with a
/// `Retry-After` header and never reach the route.
///
/// Clones share one set of counters.
///
/// ```rust
/// use std::time::Duration;
/// use brisk::{Router, middleware::RateLimit};
///
/// let api = Router::new().middleware(RateLimit::new(100, Duration::from_secs(60)));
/// ```
#[derive(Clone, Debug)]
pub struct RateLimit {
    max_requests: usize,
    window: Duration,
    clients: Arc<Mutex<HashMap<String, VecDeque<Instant>>>>,
}

enum Decision {
    Allow { remaining: usize },
    Deny { retry_after: Duration },
}

impl RateLimit {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self { max_requests, window, clients: Arc::default() }
    }

    fn check(&self, client: &str, now: Instant) -> Decision {
        let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);
        if clients.len() >= SWEEP_AT {
            let window = self.window;
            clients.retain(|_, hits| hits.back().is_some_and(|t| now.duration_since(*t) < window));
        }

        let hits = clients.entry(client.to_owned()).or_default();
        while hits.front().is_some_and(|t| now.duration_since(*t) >= self.window) {
            hits.pop_front();
        }

        if hits.len() >= self.max_requests {
            let oldest = hits.front().copied().unwrap_or(now);
            let retry_after = self.window.saturating_sub(now.duration_since(oldest));
            return Decision::Deny { retry_after };
        }
        hits.push_back(now);
        Decision::Allow { remaining: self.max_requests - hits.len() }
    }
}

fn client_key(req: &Request) -> String {
    if let Some(forwarded) = req.header("x-forwarded-for") {
        let first = forwarded.split(',').next().unwrap_or_default().trim();
        if !first.is_empty() {
            return first.to_owned();
        }
    }
    req.extensions()
        .get::<RemoteAddr>()
        .map_or_else(|| "unknown".to_owned(), |addr| addr.0.ip().to_string())
}

impl Middleware for RateLimit {
    fn call(&self, req: Request, mut res: Response, next: Next) -> BoxFuture {
        let client = client_key(&req);
        let decision = self.check(&client, Instant::now());
        let (limit, window) = (self.max_requests, self.window);

        Box::pin(async move {
            match decision {
                Decision::Deny { retry_after } => {
                    debug!(client = %client, "rate limit exceeded");
                    let retry = retry_after.as_secs().max(1);
                    res.status(Status::TOO_MANY_REQUESTS)
                        .set_header("retry-after", &retry.to_string())
                        .json(&serde_json::json!({
                            "error": "Too Many Requests",
                            "message": format!(
                                "Rate limit of {limit} requests per {} seconds exceeded",
                                window.as_secs()
                            ),
                        }));
                    Ok(res)
                }
                Decision::Allow { remaining } => {
                    let reset = SystemTime::now()
                        .checked_add(window)
                        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                        .map_or(0, |d| d.as_secs());
                    res.set_header("x-ratelimit-limit", &limit.to_string())
                        .set_header("x-ratelimit-remaining", &remaining.to_string())
                        .set_header("x-ratelimit-reset", &reset.to_string());
                    next.run(req, res).await
                }
            }
        })
    }
}
