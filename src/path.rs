//! Route patterns: compile once at registration, match per request.
//!
//! Pattern syntax is segment-based:
//!
//! | Segment | Matches |
//! |---|---|
//! | `users` | exactly `users` (case-sensitive) |
//! | `:id` | any one segment, captured as `id` |
//! | `*` | every remaining segment, captured as `*` (last segment only) |
//!
//! Leading and trailing slashes are not significant on either side, so
//! `/users/` matches the pattern `/users`.

use std::collections::HashMap;

use crate::error::PatternError;

/// The parameter name the wildcard capture is stored under.
pub const WILDCARD: &str = "*";

/// Captured path parameters, keyed by name.
pub type Params = HashMap<String, String>;

/// One `/`-separated piece of a pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Param(String),
    Wildcard,
}

/// A compiled route pattern.
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    segments: Vec<Segment>,
}

/// Splits a path into its non-empty segments.
pub(crate) fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

/// Strips `prefix` from `path` on segment boundaries.
///
/// `/api` strips `/api/users` to `/users` and `/api` to `/`, but does not
/// strip `/apix`. A root prefix strips nothing.
pub(crate) fn strip_prefix<'a>(prefix: &str, path: &'a str) -> Option<&'a str> {
    let mut rest = path.trim_start_matches('/');
    for seg in segments(prefix) {
        let tail = rest.strip_prefix(seg)?;
        if !(tail.is_empty() || tail.starts_with('/')) {
            return None;
        }
        rest = tail.trim_start_matches('/');
    }
    if rest.is_empty() {
        return Some("/");
    }
    // Back up one byte to keep the slash in front of what is left.
    let consumed = path.len() - rest.len();
    Some(if consumed == 0 { path } else { &path[consumed - 1..] })
}

impl Pattern {
    /// Compiles a pattern string.
    ///
    /// Fails if `*` is not the last segment, if a `:name` repeats, or if a
    /// parameter has no name.
    pub fn compile(pattern: &str) -> Result<Self, PatternError> {
        let mut compiled = Vec::new();
        let mut parts = segments(pattern).peekable();

        while let Some(part) = parts.next() {
            let seg = if part == WILDCARD {
                if parts.peek().is_some() {
                    return Err(PatternError::WildcardNotFinal { pattern: pattern.to_owned() });
                }
                Segment::Wildcard
            } else if let Some(name) = part.strip_prefix(':') {
                if name.is_empty() {
                    return Err(PatternError::EmptyParam { pattern: pattern.to_owned() });
                }
                let taken = compiled.iter().any(|s| matches!(s, Segment::Param(n) if n == name));
                if taken {
                    return Err(PatternError::DuplicateParam {
                        pattern: pattern.to_owned(),
                        name: name.to_owned(),
                    });
                }
                Segment::Param(name.to_owned())
            } else {
                Segment::Literal(part.to_owned())
            };
            compiled.push(seg);
        }

        Ok(Self { source: pattern.to_owned(), segments: compiled })
    }

    /// Matches `path` against this pattern, returning raw (undecoded) captures.
    pub fn matches(&self, path: &str) -> Option<Params> {
        let mut params = Params::new();
        let mut rest = path.trim_start_matches('/');

        for seg in &self.segments {
            if let Segment::Wildcard = seg {
                params.insert(WILDCARD.to_owned(), rest.trim_end_matches('/').to_owned());
                return Some(params);
            }

            let (head, tail) = rest.split_once('/').unwrap_or((rest, ""));
            if head.is_empty() {
                return None;
            }
            match seg {
                Segment::Literal(lit) if lit != head => return None,
                Segment::Param(name) => {
                    params.insert(name.clone(), head.to_owned());
                }
                _ => {}
            }
            rest = tail.trim_start_matches('/');
        }

        rest.is_empty().then_some(params)
    }

    /// Builds a concrete path by substituting `params` into the pattern.
    ///
    /// Returns `None` when a parameter is missing.
    pub fn reverse(&self, params: &Params) -> Option<String> {
        let mut path = String::new();
        for seg in &self.segments {
            path.push('/');
            match seg {
                Segment::Literal(s) => path.push_str(s),
                Segment::Param(name) => path.push_str(params.get(name)?),
                Segment::Wildcard => path.push_str(params.get(WILDCARD)?),
            }
        }
        if path.is_empty() {
            path.push('/');
        }
        Some(path)
    }

    /// The pattern as registered.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Parameter names in pattern order (the wildcard reports as `*`).
    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Param(n) => Some(n.as_str()),
            Segment::Wildcard => Some(WILDCARD),
            Segment::Literal(_) => None,
        })
    }

    /// Segment-wise equality of the compiled forms (`/a/:x` and `a/:x/` are
    /// the same route).
    pub(crate) fn same_shape(&self, other: &Self) -> bool {
        self.segments == other.segments
    }
}
