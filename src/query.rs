//! # Query Module
//!
//! Turns the request-target of a beacon hit into the data we record.
//!
//! ## Overview
//!
//! Processing happens in two strictly separated steps:
//!
//! 1. [`extract_query`] isolates the raw query string from the URI. It never decodes anything and
//!    never fails, so malformed percent-escapes survive untouched until step 2.
//! 2. [`decode`] splits the raw query string into an ordered [`ParameterMap`], applying
//!    `+`-as-space and percent-decoding to every key and value. Decoding is best effort: a
//!    component whose escapes do not form valid UTF-8 is kept verbatim.
//!
//! [`count_param`] then classifies the `count` parameter into a [`CountParam`], which is what
//! decides whether the counter store is touched at all.
//!
//! ## Example
//!
//! ```rust
//! use beacon::query::{count_param, decode, extract_query, CountParam};
//!
//! let raw = extract_query("/track?foo=k%C5%AF%C5%88&count=7#ignored");
//! assert_eq!(raw, "foo=k%C5%AF%C5%88&count=7");
//!
//! let params = decode(raw);
//! assert_eq!(params.get("foo"), Some("kůň"));
//! assert_eq!(count_param(&params), CountParam::Value(7));
//! ```

use indexmap::IndexMap;
use serde::Serialize;
use std::borrow::Cow;
use tracing::debug;

/// Name of the parameter (and of the store key) that drives the running counter.
pub const COUNT_KEY: &str = "count";

/// Return the query component of a request URI.
///
/// The query is the text strictly between the first `?` and the first following `#` (or the end
/// of the string). A `?` that only appears inside the fragment does not start a query, so
/// `/#?a=1` has no query. URIs without a query yield `""`.
///
/// This is a pure function over its input and never fails.
pub fn extract_query(uri: &str) -> &str {
    let before_fragment = uri.split_once('#').map_or(uri, |(head, _)| head);
    before_fragment
        .split_once('?')
        .map_or("", |(_, query)| query)
}

/// Ordered parameter name → decoded value mapping.
///
/// A key keeps the position of its first occurrence; inserting it again replaces the value
/// (last value wins). Serializes as a flat JSON object of strings in that order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ParameterMap(IndexMap<String, String>);

impl ParameterMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `value` under `key`, replacing any earlier value but not moving the key.
    pub fn insert(&mut self, key: String, value: String) {
        self.0.insert(key, value);
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate `(key, value)` pairs in first-occurrence order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Serialize to a single-line JSON object followed by `\n`.
    pub fn to_json_line(&self) -> serde_json::Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

/// Decode a raw query string into a [`ParameterMap`].
///
/// Segments are separated by `&`; each segment is split on its first `=`. A segment without `=`
/// is a key with an empty value. Empty segments (`a=1&&b=2`) are skipped.
pub fn decode(query: &str) -> ParameterMap {
    let mut params = ParameterMap::new();
    for segment in query.split('&').filter(|s| !s.is_empty()) {
        let (raw_key, raw_value) = segment.split_once('=').unwrap_or((segment, ""));
        params.insert(
            decode_component(raw_key).into_owned(),
            decode_component(raw_value).into_owned(),
        );
    }
    params
}

/// `+` → space, then `%XX` escapes. Invalid escapes (`%zz`) pass through unchanged; if the
/// decoded bytes are not UTF-8 the raw component is returned as-is.
fn decode_component(raw: &str) -> Cow<'_, str> {
    if !raw.contains(['+', '%']) {
        return Cow::Borrowed(raw);
    }
    let spaced = raw.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => Cow::Owned(decoded.into_owned()),
        Err(err) => {
            debug!(component = %raw, error = %err, "Percent-decoding failed, keeping raw text");
            Cow::Borrowed(raw)
        }
    }
}

/// Classification of the `count` parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CountParam {
    /// No `count` key in the query.
    Absent,
    /// A base-10 integer amount (empty value counts as `0`).
    Value(i64),
    /// Present but not an integer; carries the offending value.
    Invalid(String),
}

/// Look up `count` (key compared case-insensitively) and parse it.
///
/// When several keys fold to `count` (`count=1&COUNT=2`) the last one wins, matching the map's
/// own replacement rule.
pub fn count_param(params: &ParameterMap) -> CountParam {
    params
        .iter()
        .filter(|(key, _)| key.to_lowercase() == COUNT_KEY)
        .last()
        .map_or(CountParam::Absent, |(_, value)| parse_count(value))
}

/// Parse a `count` value. Surrounding whitespace is ignored, so `count=+5` (decoded `" 5"`) is 5.
pub fn parse_count(value: &str) -> CountParam {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return CountParam::Value(0);
    }
    match trimmed.parse::<i64>() {
        Ok(amount) => CountParam::Value(amount),
        Err(_) => CountParam::Invalid(value.to_string()),
    }
}
