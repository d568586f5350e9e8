//! Unified error type.
//!
//! Routing misses (404, 405) are not errors: they are [`MatchResult`]
//! variants and flow through the middleware chain like any other request.
//! `Error` covers what can actually fail: a malformed route pattern at
//! startup, a handler or middleware giving up mid-request, and the transport.
//!
//! [`MatchResult`]: crate::MatchResult

use http::StatusCode;
use thiserror::Error;

/// A boxed, thread-safe error from user code.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result alias used by handlers, middleware and the server.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A route pattern that cannot be compiled.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    /// `*` appeared somewhere other than the last segment.
    #[error("wildcard must be the final segment in `{pattern}`")]
    WildcardNotFinal { pattern: String },

    /// The same `:name` appears twice.
    #[error("duplicate parameter `{name}` in `{pattern}`")]
    DuplicateParam { pattern: String, name: String },

    /// A bare `:` with no name after it.
    #[error("empty parameter name in `{pattern}`")]
    EmptyParam { pattern: String },
}

/// The error type threaded through handlers, middleware and the server.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid route pattern. Fatal at registration time.
    #[error("invalid route pattern: {0}")]
    Pattern(#[from] PatternError),

    /// Failure raised by a handler or middleware.
    #[error("{0}")]
    Handler(BoxError),

    /// A failure that already knows its HTTP status (e.g. a 400 from a
    /// validation step). Its message is meant for the client.
    #[error("{status}: {message}")]
    Http { status: StatusCode, message: String },

    /// Body (de)serialization failed.
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    /// `Response::render` was called but the application has no renderer.
    #[error("no template renderer configured")]
    NoRenderer,

    /// The template collaborator failed.
    #[error("render `{template}`: {message}")]
    Render { template: String, message: String },

    /// Binding a port or accepting a connection failed.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Wraps any error raised by user code.
    pub fn handler(err: impl Into<BoxError>) -> Self {
        Self::Handler(err.into())
    }

    /// A handler failure carrying only a message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Handler(message.into().into())
    }

    /// A failure with an explicit HTTP status and client-facing message.
    pub fn http(status: StatusCode, message: impl Into<String>) -> Self {
        Self::Http { status, message: message.into() }
    }

    /// The status an unhandled instance of this error turns into.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Http { status, .. } => *status,
            Self::Json(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
