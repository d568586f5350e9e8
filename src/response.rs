//! Outgoing HTTP response type and the [`IntoResponse`] conversion trait.
//!
//! Every dispatch starts with one default `Response` (200, no body) that is
//! handed down the middleware chain to the handler. Mutators take `&mut self`
//! and return `&mut Self`, so calls chain without moving the response:
//!
//! ```rust
//! use brisk::{Response, Status};
//!
//! let mut res = Response::new();
//! res.status(Status::CREATED)
//!     .set_header("location", "/users/42")
//!     .json(&serde_json::json!({ "id": 42 }));
//! assert_eq!(res.status_code(), Status::CREATED);
//! ```

use std::sync::Arc;

use bytes::Bytes;
use cookie::time::Duration;
use cookie::Cookie;
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::StatusCode;
use serde::Serialize;
use tracing::{error, warn};

use crate::error::{Error, Result};
use crate::render::Renderer;

pub use cookie::SameSite;

// ── ContentType ───────────────────────────────────────────────────────────────

/// Common content-type values, accepted anywhere a content type string is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContentType {
    Css,          // text/css
    Csv,          // text/csv
    EventStream,  // text/event-stream  (SSE)
    FormData,     // application/x-www-form-urlencoded
    Html,         // text/html; charset=utf-8
    JavaScript,   // application/javascript
    Json,         // application/json
    OctetStream,  // application/octet-stream  (binary / file download)
    Text,         // text/plain; charset=utf-8
    Xml,          // application/xml
}

impl ContentType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Css         => "text/css",
            Self::Csv         => "text/csv",
            Self::EventStream => "text/event-stream",
            Self::FormData    => "application/x-www-form-urlencoded",
            Self::Html        => "text/html; charset=utf-8",
            Self::JavaScript  => "application/javascript",
            Self::Json        => "application/json",
            Self::OctetStream => "application/octet-stream",
            Self::Text        => "text/plain; charset=utf-8",
            Self::Xml         => "application/xml",
        }
    }

    /// Expands the short names handlers like to write (`"html"`, `"json"`).
    pub fn from_shorthand(s: &str) -> Option<Self> {
        Some(match s {
            "css"               => Self::Css,
            "csv"               => Self::Csv,
            "html"              => Self::Html,
            "js" | "javascript" => Self::JavaScript,
            "json"              => Self::Json,
            "bin" | "binary"    => Self::OctetStream,
            "text" | "txt"      => Self::Text,
            "xml"               => Self::Xml,
            _                   => return None,
        })
    }
}

impl AsRef<str> for ContentType {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

// ── Cookies ───────────────────────────────────────────────────────────────────

/// Attributes for [`Response::set_cookie`].
#[derive(Clone, Debug, Default)]
pub struct CookieOptions {
    pub path: Option<String>,
    pub domain: Option<String>,
    /// Lifetime in seconds; `0` expires the cookie immediately.
    pub max_age: Option<i64>,
    pub http_only: bool,
    pub secure: bool,
    pub same_site: Option<SameSite>,
}

impl CookieOptions {
    /// Builds the `Set-Cookie` value. Name and value are percent-encoded, so
    /// neither can smuggle in attributes of its own.
    fn to_header(&self, name: &str, value: &str) -> String {
        let mut cookie = Cookie::build((name, value)).http_only(self.http_only).secure(self.secure);
        if let Some(path) = self.path.as_deref().and_then(attribute) {
            cookie = cookie.path(path);
        }
        if let Some(domain) = self.domain.as_deref().and_then(attribute) {
            cookie = cookie.domain(domain);
        }
        if let Some(age) = self.max_age {
            cookie = cookie.max_age(Duration::seconds(age));
        }
        if let Some(same_site) = self.same_site {
            cookie = cookie.same_site(same_site);
        }
        cookie.build().encoded().to_string()
    }
}

/// Attribute values go out verbatim; one with a `;` would start a new attribute.
fn attribute(value: &str) -> Option<&str> {
    if value.contains(';') || value.chars().any(char::is_control) {
        warn!(value, "ignoring invalid cookie attribute");
        return None;
    }
    Some(value)
}

// ── Response ─────────────────────────────────────────────────────────────────

/// An outgoing HTTP response, fully buffered until the dispatcher finalizes it.
#[derive(Default)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
    renderer: Option<Arc<dyn Renderer>>,
}

impl Response {
    /// `200 OK`, no headers, empty body.
    pub fn new() -> Self {
        Self::default()
    }

    /// A bare response with the given status.
    pub fn with_status(code: StatusCode) -> Self {
        let mut res = Self::new();
        res.status(code);
        res
    }

    pub(crate) fn with_renderer(renderer: Option<Arc<dyn Renderer>>) -> Self {
        Self { renderer, ..Self::default() }
    }

    // ── mutators ─────────────────────────────────────────────────────────────

    pub fn status(&mut self, code: StatusCode) -> &mut Self {
        self.status = code;
        self
    }

    /// Sets a header, replacing any previous value (names are case-insensitive).
    ///
    /// An invalid name or value is logged and ignored.
    pub fn set_header(&mut self, name: &str, value: &str) -> &mut Self {
        if let Some((name, value)) = parse_header(name, value) {
            self.headers.insert(name, value);
        }
        self
    }

    /// Adds a header value without replacing existing ones (e.g. `set-cookie`).
    pub fn append_header(&mut self, name: &str, value: &str) -> &mut Self {
        if let Some((name, value)) = parse_header(name, value) {
            self.headers.append(name, value);
        }
        self
    }

    pub fn remove_header(&mut self, name: &str) -> &mut Self {
        self.headers.remove(name);
        self
    }

    /// Sets `content-type`. Accepts a full media type, a [`ContentType`], or a
    /// shorthand such as `"html"` or `"json"`.
    pub fn content_type(&mut self, value: impl AsRef<str>) -> &mut Self {
        let value = value.as_ref();
        let value = ContentType::from_shorthand(value).map_or(value, |ct| ct.as_str());
        self.set_header(header::CONTENT_TYPE.as_str(), value)
    }

    /// Sets the body. If no content type was chosen yet, UTF-8 bodies are
    /// sent as HTML and anything else as `application/octet-stream`.
    pub fn send(&mut self, body: impl Into<Bytes>) -> &mut Self {
        let body = body.into();
        if !self.headers.contains_key(header::CONTENT_TYPE) {
            let ct = match std::str::from_utf8(&body) {
                Ok(_) => ContentType::Html,
                Err(_) => ContentType::OctetStream,
            };
            self.content_type(ct);
        }
        self.body = body;
        self
    }

    /// `text/plain; charset=utf-8` body.
    pub fn text(&mut self, body: impl Into<String>) -> &mut Self {
        self.bytes(ContentType::Text, body.into())
    }

    /// `text/html; charset=utf-8` body.
    pub fn html(&mut self, body: impl Into<String>) -> &mut Self {
        self.bytes(ContentType::Html, body.into())
    }

    /// Body with an explicit content type.
    pub fn bytes(&mut self, content_type: ContentType, body: impl Into<Bytes>) -> &mut Self {
        self.content_type(content_type);
        self.body = body.into();
        self
    }

    /// Serializes `value` as an `application/json` body.
    ///
    /// Serialization failures turn the response into an empty `500`.
    pub fn json<T: Serialize + ?Sized>(&mut self, value: &T) -> &mut Self {
        match serde_json::to_vec(value) {
            Ok(body) => self.bytes(ContentType::Json, body),
            Err(e) => {
                error!("response json serialization failed: {e}");
                self.body = Bytes::new();
                self.headers.remove(header::CONTENT_TYPE);
                self.status(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }

    /// `302 Found` to `location`.
    pub fn redirect(&mut self, location: &str) -> &mut Self {
        self.redirect_with(StatusCode::FOUND, location)
    }

    /// Redirect with an explicit 3xx status.
    pub fn redirect_with(&mut self, code: StatusCode, location: &str) -> &mut Self {
        self.status(code).set_header(header::LOCATION.as_str(), location)
    }

    /// Appends a `Set-Cookie` header; earlier cookies are kept.
    pub fn set_cookie(&mut self, name: &str, value: &str, options: &CookieOptions) -> &mut Self {
        let cookie = options.to_header(name, value);
        self.append_header(header::SET_COOKIE.as_str(), &cookie)
    }

    /// Tells the client to drop a cookie set with the default path `/`.
    pub fn clear_cookie(&mut self, name: &str) -> &mut Self {
        let options = CookieOptions { path: Some("/".into()), max_age: Some(0), ..Default::default() };
        self.set_cookie(name, "", &options)
    }

    /// Renders `template` through the application's [`Renderer`] and sends
    /// the result as HTML.
    pub fn render<T: Serialize + ?Sized>(&mut self, template: &str, context: &T) -> Result<&mut Self> {
        let renderer = self.renderer.clone().ok_or(Error::NoRenderer)?;
        let context = serde_json::to_value(context)?;
        let body = renderer.render(template, &context).map_err(|e| Error::Render {
            template: template.to_owned(),
            message: e.to_string(),
        })?;
        Ok(self.html(body))
    }

    // ── accessors ────────────────────────────────────────────────────────────

    pub fn status_code(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// The body as UTF-8, if it is.
    pub fn body_text(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }

    /// Status, headers and renderer of this response, without the body.
    pub(crate) fn shell(&self) -> Self {
        Self {
            status: self.status,
            headers: self.headers.clone(),
            body: Bytes::new(),
            renderer: self.renderer.clone(),
        }
    }

    pub(crate) fn into_http(self) -> http::Response<Bytes> {
        let mut res = http::Response::new(self.body);
        *res.status_mut() = self.status;
        *res.headers_mut() = self.headers;
        res
    }
}

impl std::fmt::Debug for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("body_len", &self.body.len())
            .finish_non_exhaustive()
    }
}

fn parse_header(name: &str, value: &str) -> Option<(HeaderName, HeaderValue)> {
    match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
        (Ok(n), Ok(v)) => Some((n, v)),
        _ => {
            warn!(header = name, "ignoring invalid response header");
            None
        }
    }
}

// ── IntoResponse ──────────────────────────────────────────────────────────────

/// Conversion of a handler or middleware return value into the chain's
/// outcome: a [`Response`], or an [`Error`] for the error-handler chain.
///
/// Implemented for `Response`, `&'static str`, `String`, [`Status`](crate::Status)
/// and `Result<T, E>` where `T: IntoResponse` and `E: Into<Error>`.
///
/// Strings and statuses only describe part of a response. Returned from a
/// handler or middleware they are applied to the response that unit was
/// given, so headers set further up the chain survive.
///
/// # Example — a typed JSON wrapper
///
/// ```rust
/// use brisk::{IntoResponse, Response, Result};
/// use serde::Serialize;
///
/// struct Json<T: Serialize>(T);
///
/// impl<T: Serialize> IntoResponse for Json<T> {
///     fn into_response(self) -> Result<Response> {
///         let mut res = Response::new();
///         res.json(&self.0);
///         Ok(res)
///     }
/// }
/// ```
pub trait IntoResponse: Sized {
    /// Set for values that are applied on top of the chain's response.
    #[doc(hidden)]
    const PARTIAL: bool = false;

    fn into_response(self) -> Result<Response>;

    /// Converts onto `base`. Only called when [`PARTIAL`](IntoResponse::PARTIAL) is set.
    #[doc(hidden)]
    fn into_response_with(self, base: Response) -> Result<Response> {
        drop(base);
        self.into_response()
    }
}

/// Finishes a unit's return value. `base` is the shell of the response the
/// unit received, taken only when `R` is partial.
pub(crate) fn finish<R: IntoResponse>(value: R, base: Option<Response>) -> Result<Response> {
    match base {
        Some(base) => value.into_response_with(base),
        None => value.into_response(),
    }
}

impl IntoResponse for Response {
    fn into_response(self) -> Result<Response> {
        Ok(self)
    }
}

impl IntoResponse for &'static str {
    const PARTIAL: bool = true;

    fn into_response(self) -> Result<Response> {
        self.into_response_with(Response::new())
    }

    fn into_response_with(self, mut base: Response) -> Result<Response> {
        base.text(self);
        Ok(base)
    }
}

impl IntoResponse for String {
    const PARTIAL: bool = true;

    fn into_response(self) -> Result<Response> {
        self.into_response_with(Response::new())
    }

    fn into_response_with(self, mut base: Response) -> Result<Response> {
        base.text(self);
        Ok(base)
    }
}

/// Return a status directly from a handler: `return Status::NO_CONTENT`
impl IntoResponse for StatusCode {
    const PARTIAL: bool = true;

    fn into_response(self) -> Result<Response> {
        self.into_response_with(Response::new())
    }

    fn into_response_with(self, mut base: Response) -> Result<Response> {
        base.status(self);
        Ok(base)
    }
}

impl<T, E> IntoResponse for std::result::Result<T, E>
where
    T: IntoResponse,
    E: Into<Error>,
{
    const PARTIAL: bool = T::PARTIAL;

    fn into_response(self) -> Result<Response> {
        match self {
            Ok(value) => value.into_response(),
            Err(e) => Err(e.into()),
        }
    }

    fn into_response_with(self, base: Response) -> Result<Response> {
        match self {
            Ok(value) => value.into_response_with(base),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_200_and_empty() {
        let res = Response::new();
        assert_eq!(res.status_code(), StatusCode::OK);
        assert!(res.body().is_empty());
        assert!(res.headers().is_empty());
    }

    #[test]
    fn mutators_chain_on_the_same_value() {
        let mut res = Response::new();
        res.status(StatusCode::CREATED).set_header("X-Custom", "a").set_header("x-custom", "b");
        assert_eq!(res.status_code(), StatusCode::CREATED);
        assert_eq!(res.header("X-CUSTOM"), Some("b"));
        assert_eq!(res.headers().get_all("x-custom").iter().count(), 1);
    }

    #[test]
    fn json_sets_content_type() {
        let mut res = Response::new();
        res.json(&serde_json::json!({ "name": "test" }));
        assert_eq!(res.header("content-type"), Some("application/json"));
        assert_eq!(res.body_text(), Some(r#"{"name":"test"}"#));
    }

    #[test]
    fn send_infers_a_content_type_only_when_unset() {
        let mut res = Response::new();
        res.send("<h1>hi</h1>");
        assert_eq!(res.header("content-type"), Some("text/html; charset=utf-8"));

        let mut res = Response::new();
        res.content_type("xml").send("<ok/>");
        assert_eq!(res.header("content-type"), Some("application/xml"));

        let mut res = Response::new();
        res.send(vec![0xff, 0xfe]);
        assert_eq!(res.header("content-type"), Some("application/octet-stream"));
    }

    #[test]
    fn content_type_passes_full_media_types_through() {
        let mut res = Response::new();
        res.content_type("application/x-custom-type");
        assert_eq!(res.header("content-type"), Some("application/x-custom-type"));
    }

    #[test]
    fn redirect_defaults_to_found() {
        let mut res = Response::new();
        res.redirect("/login");
        assert_eq!(res.status_code(), StatusCode::FOUND);
        assert_eq!(res.header("location"), Some("/login"));

        res.redirect_with(StatusCode::MOVED_PERMANENTLY, "/new");
        assert_eq!(res.status_code(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(res.header("location"), Some("/new"));
    }

    fn set_cookies(res: &Response) -> Vec<String> {
        res.headers()
            .get_all("set-cookie")
            .iter()
            .map(|v| v.to_str().unwrap().to_owned())
            .collect()
    }

    #[test]
    fn cookies_append() {
        let mut res = Response::new();
        let opts = CookieOptions {
            path: Some("/".into()),
            http_only: true,
            same_site: Some(SameSite::Lax),
            ..Default::default()
        };
        res.set_cookie("session_id", "abc", &opts).clear_cookie("theme");
        let cookies = set_cookies(&res);
        assert_eq!(cookies.len(), 2);

        let session: Vec<_> = cookies[0].split("; ").collect();
        assert_eq!(session[0], "session_id=abc");
        for attr in ["HttpOnly", "SameSite=Lax", "Path=/"] {
            assert!(session.contains(&attr), "{attr} missing from {}", cookies[0]);
        }

        let theme: Vec<_> = cookies[1].split("; ").collect();
        assert_eq!(theme[0], "theme=");
        assert!(theme.contains(&"Max-Age=0"));
        assert!(theme.contains(&"Path=/"));
    }

    #[test]
    fn cookie_values_cannot_add_attributes() {
        let mut res = Response::new();
        res.set_cookie("sid", "x; Domain=evil.example", &CookieOptions::default());
        let cookies = set_cookies(&res);
        assert_eq!(cookies, ["sid=x%3B%20Domain%3Devil.example"]);

        let mut res = Response::new();
        let opts = CookieOptions { path: Some("/; Secure=no".into()), ..Default::default() };
        res.set_cookie("sid", "x", &opts);
        assert_eq!(set_cookies(&res), ["sid=x"]);
    }

    #[test]
    fn invalid_headers_are_ignored() {
        let mut res = Response::new();
        res.set_header("bad header", "x").set_header("x-ok", "line\nbreak");
        assert!(res.headers().is_empty());
    }

    #[test]
    fn render_without_renderer_fails() {
        let mut res = Response::new();
        assert!(matches!(res.render("index.html", &()), Err(Error::NoRenderer)));
    }

    #[test]
    fn render_uses_the_collaborator() {
        let renderer: Arc<dyn Renderer> = Arc::new(
            |name: &str, ctx: &serde_json::Value| -> Result<String, crate::BoxError> {
                Ok(format!("<p>{name}:{}</p>", ctx["user"].as_str().unwrap_or_default()))
            },
        );
        let mut res = Response::with_renderer(Some(renderer));
        res.render("profile.html", &serde_json::json!({ "user": "ada" })).unwrap();
        assert_eq!(res.body_text(), Some("<p>profile.html:ada</p>"));
        assert_eq!(res.header("content-type"), Some("text/html; charset=utf-8"));
    }

    #[test]
    fn results_convert_errors() {
        let ok: std::result::Result<&'static str, Error> = Ok("fine");
        assert_eq!(ok.into_response().unwrap().body_text(), Some("fine"));

        let err: std::result::Result<Response, Error> = Err(Error::msg("nope"));
        assert!(err.into_response().is_err());
    }

    #[test]
    fn shorthand_values_keep_the_base_headers() {
        let mut base = Response::new();
        base.set_header("x-request-id", "abc").text("stale");

        let res = finish("hi", Some(base.shell())).unwrap();
        assert_eq!(res.header("x-request-id"), Some("abc"));
        assert_eq!(res.body_text(), Some("hi"));

        let ok: std::result::Result<StatusCode, Error> = Ok(StatusCode::ACCEPTED);
        let res = finish(ok, Some(base.shell())).unwrap();
        assert_eq!(res.status_code(), StatusCode::ACCEPTED);
        assert_eq!(res.header("x-request-id"), Some("abc"));
        assert!(res.body().is_empty());

        assert!(!<Response as IntoResponse>::PARTIAL);
        assert!(<std::result::Result<String, Error> as IntoResponse>::PARTIAL);
    }
}
