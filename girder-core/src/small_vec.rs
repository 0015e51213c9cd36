//! Small Vector Optimizations
//!
//! Stack-allocated collections for the per-request key/value lists. Each
//! type keeps a typical request inline and spills to the heap beyond its
//! inline capacity. Entries are never dropped.
//!
//! | Use Case | Typical Size | Inline Capacity |
//! |----------|--------------|-----------------|
//! | Query params | 2-5 | 8 |
//! | Path params | 1-3 | 8 |
//! | Headers | 6-12 | 16 |
//! | Route segments | 2-5 | 8 |
//!
//! ## Usage
//!
//! ```rust
//! use girder_core::small_vec::QueryParams;
//!
//! let params = QueryParams::parse("page=1&limit=10");
//! assert_eq!(params.get("page"), Some("1"));
//! assert!(params.is_inline());
//! ```

use smallvec::SmallVec;
use std::borrow::Cow;
use std::fmt;

// ============================================================================
// Inline Capacities (tuned for HTTP workloads)
// ============================================================================

/// Query parameters: most requests have 0-5 params
pub const QUERY_PARAM_INLINE: usize = 8;

/// Path parameters: most routes have 0-3 params
pub const PATH_PARAM_INLINE: usize = 8;

/// Request and response headers
pub const HEADER_INLINE: usize = 16;

/// Route segments: typical paths have 2-5 segments
pub const ROUTE_SEGMENT_INLINE: usize = 8;

/// Small vector for route segments.
pub type SmallSegments<'a> = SmallVec<[&'a str; ROUTE_SEGMENT_INLINE]>;

fn decode(raw: &str) -> Cow<'_, str> {
    urlencoding::decode(raw).unwrap_or(Cow::Borrowed(raw))
}

/// Decode a query component: `+` means space, then percent-decoding.
fn decode_form(raw: &str) -> String {
    if raw.contains('+') {
        decode(&raw.replace('+', " ")).into_owned()
    } else {
        decode(raw).into_owned()
    }
}

// ============================================================================
// Query Parameters
// ============================================================================

/// Ordered query parameter storage. Repeated keys are kept.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    inner: SmallVec<[(String, String); QUERY_PARAM_INLINE]>,
}

impl QueryParams {
    /// Create empty params.
    #[inline]
    pub fn new() -> Self {
        Self {
            inner: SmallVec::new(),
        }
    }

    /// Check if storage is inline (no heap allocation).
    #[inline]
    pub fn is_inline(&self) -> bool {
        !self.inner.spilled()
    }

    /// Get number of parameters.
    #[inline]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Check if empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Add a parameter.
    #[inline]
    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.inner.push((key.into(), value.into()));
    }

    /// Get first value for a key.
    #[inline]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.inner
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Get all values for a key (for multi-value params like `?tag=a&tag=b`).
    #[inline]
    pub fn get_all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.inner
            .iter()
            .filter(move |(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Check if key exists.
    #[inline]
    pub fn contains(&self, key: &str) -> bool {
        self.inner.iter().any(|(k, _)| k == key)
    }

    /// Iterate over all params.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Parse from query string (e.g., "a=1&b=2").
    pub fn parse(query: &str) -> Self {
        let mut params = Self::new();

        for part in query.split('&') {
            if part.is_empty() {
                continue;
            }

            match part.split_once('=') {
                Some((key, value)) => params.push(decode_form(key), decode_form(value)),
                // Key without value
                None => params.push(decode_form(part), String::new()),
            }
        }

        params
    }
}

impl fmt::Debug for QueryParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.inner.iter().map(|(k, v)| (k, v)))
            .finish()
    }
}

// ============================================================================
// Path Parameters
// ============================================================================

/// Ordered path parameter storage, in pattern order.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct PathParams {
    inner: SmallVec<[(String, String); PATH_PARAM_INLINE]>,
}

impl PathParams {
    /// Create empty params.
    #[inline]
    pub fn new() -> Self {
        Self {
            inner: SmallVec::new(),
        }
    }

    /// Check if storage is inline.
    #[inline]
    pub fn is_inline(&self) -> bool {
        !self.inner.spilled()
    }

    /// Get number of parameters.
    #[inline]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Check if empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Add a parameter.
    #[inline]
    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.inner.push((key.into(), value.into()));
    }

    /// Add a raw path segment, percent-decoding its value.
    pub fn push_decoded(&mut self, key: &str, raw: &str) {
        self.inner.push((key.to_string(), decode(raw).into_owned()));
    }

    /// Get value by name.
    #[inline]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.inner
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Get value by index (for positional params).
    #[inline]
    pub fn get_index(&self, index: usize) -> Option<&str> {
        self.inner.get(index).map(|(_, v)| v.as_str())
    }

    /// Iterate over params.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Debug for PathParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.inner.iter().map(|(k, v)| (k, v)))
            .finish()
    }
}

// ============================================================================
// Headers
// ============================================================================

/// Header list with case-insensitive lookup. Names keep their original case.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct HeaderList {
    inner: SmallVec<[(String, String); HEADER_INLINE]>,
}

impl HeaderList {
    /// Create an empty list.
    #[inline]
    pub fn new() -> Self {
        Self {
            inner: SmallVec::new(),
        }
    }

    /// Check if storage is inline.
    #[inline]
    pub fn is_inline(&self) -> bool {
        !self.inner.spilled()
    }

    /// Number of headers.
    #[inline]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Check if empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Append a header, keeping any existing one with the same name.
    #[inline]
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.inner.push((name.into(), value.into()));
    }

    /// Replace every header named `name` with a single value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.inner.retain(|(k, _)| !k.eq_ignore_ascii_case(&name));
        self.inner.push((name, value.into()));
    }

    /// First value for `name`, ignoring case.
    #[inline]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.inner
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Check if a header exists, ignoring case.
    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.inner.iter().any(|(k, _)| k.eq_ignore_ascii_case(name))
    }

    /// Remove every header named `name`.
    pub fn remove(&mut self, name: &str) {
        self.inner.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
    }

    /// Iterate over headers in insertion order.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Debug for HeaderList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.inner.iter().map(|(k, v)| (k, v)))
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
