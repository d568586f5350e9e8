//! Per-request logging.

use std::time::Instant;

use tracing::{info, info_span, warn, Instrument};

use crate::handler::BoxFuture;
use crate::request::Request;
use crate::response::Response;

use super::{Middleware, Next};

/// Logs one event per request with method, path, status and latency.
///
/// Register it first so its timing covers every other layer. Failures are
/// logged at `warn` and passed on untouched for the error handlers.
#[derive(Clone, Copy, Debug, Default)]
pub struct Trace;

impl Middleware for Trace {
    fn call(&self, req: Request, res: Response, next: Next) -> BoxFuture {
        let span = info_span!("request", method = %req.method(), path = %req.path());
        Box::pin(
            async move {
                let start = Instant::now();
                let result = next.run(req, res).await;
                let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
                match &result {
                    Ok(res) => info!(status = res.status_code().as_u16(), latency_ms, "finished"),
                    Err(err) => warn!(error = %err, latency_ms, "failed"),
                }
                result
            }
            .instrument(span),
        )
    }
}
