//! Template rendering seam.
//!
//! brisk does not ship a template engine. Plug one in by implementing
//! [`Renderer`] (or passing a closure) and registering it with
//! [`Router::renderer`](crate::Router::renderer); handlers then call
//! [`Response::render`](crate::Response::render).

use crate::error::BoxError;

/// Turns a template name plus a JSON context into a body string.
pub trait Renderer: Send + Sync + 'static {
    fn render(&self, template: &str, context: &serde_json::Value) -> Result<String, BoxError>;
}

impl<F> Renderer for F
where
    F: Fn(&str, &serde_json::Value) -> Result<String, BoxError> + Send + Sync + 'static,
{
    fn render(&self, template: &str, context: &serde_json::Value) -> Result<String, BoxError> {
        self(template, context)
    }
}
