//! Incoming HTTP request type.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::Extensions;
use serde::de::DeserializeOwned;

use crate::error::Result;
use crate::method::Method;
use crate::path::{Params, WILDCARD};
use crate::settings::Settings;

/// An incoming request, owned by one dispatch and handed down the chain.
///
/// Middleware can stash typed values for later units in the attribute bag
/// ([`extensions_mut`](Request::extensions_mut)).
#[derive(Clone, Debug)]
pub struct Request {
    method: Method,
    path: String,
    query_string: Option<String>,
    query: HashMap<String, String>,
    headers: HeaderMap,
    cookies: HashMap<String, String>,
    pub(crate) params: Params,
    body: Bytes,
    extensions: Extensions,
    settings: Arc<Settings>,
}

impl Request {
    /// Builds a request by hand, mostly for tests and tooling.
    pub fn new(method: Method, target: &str) -> Self {
        let (path, query_string) = match target.split_once('?') {
            Some((p, q)) => (p, Some(q.to_owned())),
            None => (target, None),
        };
        Self {
            method,
            path: path.to_owned(),
            query: query_string.as_deref().map(parse_query).unwrap_or_default(),
            query_string,
            headers: HeaderMap::new(),
            cookies: HashMap::new(),
            params: Params::new(),
            body: Bytes::new(),
            extensions: Extensions::new(),
            settings: Arc::default(),
        }
    }

    pub fn get(target: &str) -> Self {
        Self::new(Method::Get, target)
    }

    pub fn post(target: &str) -> Self {
        Self::new(Method::Post, target)
    }

    /// Adds a header. Invalid names or values are skipped.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(n), Ok(v)) = (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
            self.headers.append(n, v);
        }
        self.cookies = parse_cookies(&self.headers);
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Converts a transport-level request. Fails with the original method
    /// when it is not one brisk routes on.
    pub(crate) fn from_http(
        req: http::Request<Bytes>,
        settings: Arc<Settings>,
    ) -> std::result::Result<Self, http::Method> {
        let (parts, body) = req.into_parts();
        let method = Method::try_from(&parts.method).map_err(|()| parts.method.clone())?;
        let query_string = parts.uri.query().map(str::to_owned);
        Ok(Self {
            method,
            path: parts.uri.path().to_owned(),
            query: query_string.as_deref().map(parse_query).unwrap_or_default(),
            query_string,
            cookies: parse_cookies(&parts.headers),
            headers: parts.headers,
            params: Params::new(),
            body,
            extensions: parts.extensions,
            settings,
        })
    }

    pub fn method(&self) -> Method { self.method }
    pub fn path(&self) -> &str { &self.path }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns a named path parameter, percent-decoded.
    ///
    /// For a route `/users/:id`, `req.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    /// What a trailing `*` in the route captured.
    pub fn wildcard(&self) -> Option<&str> {
        self.param(WILDCARD)
    }

    /// A query-string value. With repeated keys the last one wins.
    pub fn query(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    /// Every value for a repeated query key, in order.
    pub fn query_all(&self, name: &str) -> Vec<String> {
        self.query_string
            .as_deref()
            .map(|q| {
                url::form_urlencoded::parse(q.as_bytes())
                    .filter(|(k, _)| k == name)
                    .map(|(_, v)| v.into_owned())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn query_map(&self) -> &HashMap<String, String> {
        &self.query
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    pub fn cookies(&self) -> &HashMap<String, String> {
        &self.cookies
    }

    /// The body as UTF-8, if it is.
    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }

    /// Deserializes a JSON body.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Parses an `application/x-www-form-urlencoded` body (last key wins).
    pub fn form(&self) -> HashMap<String, String> {
        url::form_urlencoded::parse(&self.body).into_owned().collect()
    }

    /// Whether the `content-type` header names `media_type` (ignoring parameters).
    pub fn is(&self, media_type: &str) -> bool {
        self.header(header::CONTENT_TYPE.as_str())
            .and_then(|ct| ct.split(';').next())
            .is_some_and(|ct| ct.trim().eq_ignore_ascii_case(media_type))
    }

    /// The typed attribute bag shared by every unit of this dispatch.
    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }

    /// An application setting registered with [`Router::set`](crate::Router::set).
    pub fn setting(&self, key: &str) -> Option<&str> {
        self.settings.get(key)
    }
}

fn parse_query(query: &str) -> HashMap<String, String> {
    url::form_urlencoded::parse(query.as_bytes()).into_owned().collect()
}

fn parse_cookies(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| {
            let (k, v) = pair.trim().split_once('=')?;
            let v = v.trim().trim_matches('"');
            let v = urlencoding::decode(v).map_or_else(|_| v.to_owned(), |d| d.into_owned());
            Some((k.trim().to_owned(), v))
        })
        .collect()
}
