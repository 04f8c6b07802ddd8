//! Request URL composition.
//!
//! A [`Location`] accumulates the pieces of a request URL (base address, path
//! prefix and suffix, an optional absolute override, query parameters and the
//! reserved `timeout` parameter) and renders them into one [`Url`].
//!
//! # Example
//!
//! ```
//! use volley_core::Location;
//!
//! let mut location = Location::parse("api.example.com").expect("valid address");
//! location.prefix(["/api", "/v1"]);
//! location.suffix(["items", ""]);
//! location.param("page", "1");
//!
//! assert_eq!(location.url().as_str(), "http://api.example.com/api/v1/items?page=1");
//! ```

use std::collections::BTreeMap;
use std::time::Duration;

use url::Url;

use crate::{Error, Result};

/// Name of the query parameter that carries the configured timeout.
pub const TIMEOUT_PARAM: &str = "timeout";

/// Accumulated URL state for one request.
#[derive(Debug, Clone)]
pub struct Location {
    base: Url,
    path_prefix: String,
    subpath: String,
    path_override: Option<String>,
    params: BTreeMap<String, Vec<String>>,
    timeout: Option<Duration>,
}

impl Location {
    /// Parse a base address.
    ///
    /// The address may be a full URL or a bare host (`example.com:8080/api`).
    /// Bare hosts get `https://` when the address mentions `https`, `http://`
    /// otherwise. The base path seeds the path prefix.
    pub fn parse(address: &str) -> Result<Self> {
        let base = parse_base(address)?;
        let path_prefix = join_path(["/", base.path()]);
        Ok(Self {
            base,
            path_prefix,
            subpath: String::new(),
            path_override: None,
            params: BTreeMap::new(),
            timeout: None,
        })
    }

    /// The parsed base address.
    #[must_use]
    pub const fn base(&self) -> &Url {
        &self.base
    }

    /// Append segments to the path prefix.
    pub fn prefix<I, S>(&mut self, segments: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let joined = join_path(segments);
        self.path_prefix = join_path([self.path_prefix.as_str(), joined.as_str()]);
    }

    /// Append segments to the path suffix.
    pub fn suffix<I, S>(&mut self, segments: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let joined = join_path(segments);
        self.subpath = join_path([self.subpath.as_str(), joined.as_str()]);
    }

    /// Replace the whole path with segments joined under the base path.
    ///
    /// A single segment ending in `/` keeps its trailing slash when either the
    /// base path or the segment is longer than one character.
    pub fn abs_path<I, S>(&mut self, segments: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let segments: Vec<S> = segments.into_iter().collect();
        let joined = join_path(segments.iter().map(|s| s.as_ref()));
        let mut path = join_path([self.base.path(), joined.as_str()]);

        if let [only] = segments.as_slice() {
            let only = only.as_ref();
            if (self.base.path().len() > 1 || only.len() > 1) && only.ends_with('/') {
                path.push('/');
            }
        }
        self.path_override = Some(path);
    }

    /// Take the path and query from a request URI.
    ///
    /// The URI path becomes the effective path. Each query key carried by the
    /// URI replaces the values already set for that key; other keys are kept.
    pub fn request_uri(&mut self, uri: &str) -> Result<()> {
        let locator = parse_uri(uri)?;
        self.path_override = Some(locator.path().to_string());

        let mut from_uri: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (name, value) in locator.query_pairs() {
            from_uri
                .entry(name.into_owned())
                .or_default()
                .push(value.into_owned());
        }
        self.params.extend(from_uri);
        Ok(())
    }

    /// Append a query parameter value.
    pub fn param(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.params
            .entry(name.into())
            .or_default()
            .push(value.into());
    }

    /// Values set for a query parameter, in insertion order.
    #[must_use]
    pub fn param_values(&self, name: &str) -> &[String] {
        self.params.get(name).map_or(&[], Vec::as_slice)
    }

    /// Set the timeout rendered into the reserved `timeout` parameter.
    ///
    /// The value is written in the `Debug` form of [`Duration`], always in
    /// seconds or a smaller unit (`90s`, `1.5s`, `250ms`). Servers parsing
    /// duration strings accept it as is; it is never split into minutes.
    pub const fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = Some(timeout);
    }

    /// The configured timeout.
    #[must_use]
    pub const fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// The effective request path.
    #[must_use]
    pub fn path(&self) -> String {
        match &self.path_override {
            Some(path) => path.clone(),
            None => join_path([self.path_prefix.as_str(), self.subpath.as_str()]),
        }
    }

    /// Render the final request URL.
    ///
    /// Parameters are encoded sorted by name, values in insertion order. A
    /// non-zero timeout always wins over a caller-set `timeout` parameter.
    #[must_use]
    pub fn url(&self) -> Url {
        let mut url = self.base.clone();
        url.set_path(&self.path());

        let mut params = self.params.clone();
        if let Some(timeout) = self.timeout.filter(|t| !t.is_zero()) {
            params.insert(TIMEOUT_PARAM.to_string(), vec![format!("{timeout:?}")]);
        }

        url.set_query(None);
        if !params.is_empty() {
            let mut query = url.query_pairs_mut();
            for (name, values) in &params {
                for value in values {
                    query.append_pair(name, value);
                }
            }
        }
        url
    }
}

fn parse_base(address: &str) -> Result<Url> {
    match Url::parse(address) {
        Ok(url) if url.has_host() && !url.scheme().is_empty() => Ok(url),
        _ => {
            let scheme = if address.contains("https") {
                "https://"
            } else {
                "http://"
            };
            Url::parse(&format!("{scheme}{address}"))
                .map_err(|e| Error::InvalidUrl(format!("{address}: {e}")))
        }
    }
}

fn parse_uri(uri: &str) -> Result<Url> {
    let parsed = match Url::parse(uri) {
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            Url::parse("http://localhost/").and_then(|root| root.join(uri))
        }
        other => other,
    };
    parsed.map_err(|e| Error::InvalidUrl(format!("{uri}: {e}")))
}

/// Join path segments and clean the result.
///
/// Empty segments are ignored, redundant separators collapse, `.` and `..`
/// are resolved lexically and any trailing slash is dropped. Joining nothing
/// but empty segments yields an empty string.
///
/// ```
/// use volley_core::join_path;
///
/// assert_eq!(join_path(["/api/", "/v1//", "users"]), "/api/v1/users");
/// assert_eq!(join_path(["a", "../b"]), "b");
/// assert_eq!(join_path(["", ""]), "");
/// ```
pub fn join_path<I, S>(segments: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let joined = segments
        .into_iter()
        .filter(|s| !s.as_ref().is_empty())
        .map(|s| s.as_ref().to_string())
        .collect::<Vec<_>>()
        .join("/");

    if joined.is_empty() {
        joined
    } else {
        clean_path(&joined)
    }
}

fn clean_path(path: &str) -> String {
    let rooted = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();

    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                if parts.last().is_some_and(|last| *last != "..") {
                    parts.pop();
                } else if !rooted {
                    parts.push("..");
                }
            }
            other => parts.push(other),
        }
    }

    let body = parts.join("/");
    if rooted {
        format!("/{body}")
    } else if body.is_empty() {
        ".".to_string()
    } else {
        body
    }
}

#[cfg(test)]
mod tests {
    use assert2::{check, let_assert};

    use super::*;

    fn location(address: &str) -> Location {
        Location::parse(address).expect("valid address")
    }

    #[test]
    fn prefix_and_suffix_compose() {
        let mut loc = location("http://example.com");
        loc.prefix(["/api", "/v1"]);
        loc.suffix(["items", ""]);

        check!(loc.path() == "/api/v1/items");
        check!(loc.url().as_str() == "http://example.com/api/v1/items");
    }

    #[test]
    fn base_path_seeds_the_prefix() {
        let mut loc = location("https://example.com/base/");
        loc.prefix(["users"]);
        check!(loc.path() == "/base/users");
    }

    #[test]
    fn repeated_prefix_and_suffix_accumulate() {
        let mut loc = location("http://example.com");
        loc.prefix(["a"]);
        loc.prefix(["b"]);
        loc.suffix(["c"]);
        loc.suffix(["d/"]);
        check!(loc.path() == "/a/b/c/d");
    }

    #[test]
    fn abs_path_keeps_trailing_slash_with_long_base_path() {
        let mut loc = location("http://example.com/base");
        loc.abs_path(["foo/"]);
        check!(loc.path() == "/base/foo/");
    }

    #[test]
    fn abs_path_keeps_trailing_slash_with_long_segment() {
        let mut loc = location("http://example.com");
        loc.abs_path(["foo/"]);
        check!(loc.path() == "/foo/");
    }

    #[test]
    fn abs_path_drops_trailing_slash_for_multiple_segments() {
        let mut loc = location("http://example.com");
        loc.abs_path(["foo/", "bar/"]);
        check!(loc.path() == "/foo/bar");
    }

    #[test]
    fn abs_path_on_root_with_single_slash() {
        let mut loc = location("http://example.com");
        loc.abs_path(["/"]);
        check!(loc.path() == "/");
    }

    #[test]
    fn abs_path_replaces_prefix_and_suffix() {
        let mut loc = location("http://example.com/base");
        loc.prefix(["ignored"]);
        loc.suffix(["also-ignored"]);
        loc.abs_path(["x", "y"]);
        check!(loc.path() == "/base/x/y");
    }

    #[test]
    fn params_append_rather_than_replace() {
        let mut loc = location("http://example.com");
        loc.param("a", "1");
        loc.param("a", "2");

        check!(loc.param_values("a") == ["1", "2"]);
        check!(loc.url().query() == Some("a=1&a=2"));
    }

    #[test]
    fn params_are_encoded_sorted_by_name() {
        let mut loc = location("http://example.com");
        loc.param("zeta", "last");
        loc.param("alpha", "first value");
        check!(loc.url().query() == Some("alpha=first+value&zeta=last"));
    }

    #[test]
    fn timeout_wins_over_timeout_param() {
        let mut loc = location("http://example.com");
        loc.param("timeout", "99");
        loc.set_timeout(Duration::from_secs(2));

        check!(loc.url().query() == Some("timeout=2s"));
    }

    #[test]
    fn timeout_uses_the_duration_string_form() {
        let mut loc = location("http://example.com");
        loc.set_timeout(Duration::from_millis(1500));
        check!(loc.url().query() == Some("timeout=1.5s"));
    }

    #[test]
    fn long_timeouts_stay_in_seconds() {
        let mut loc = location("http://example.com");
        loc.set_timeout(Duration::from_secs(90));
        check!(loc.url().query() == Some("timeout=90s"));

        loc.set_timeout(Duration::from_secs(3600));
        check!(loc.url().query() == Some("timeout=3600s"));
    }

    #[test]
    fn zero_timeout_is_not_rendered() {
        let mut loc = location("http://example.com");
        loc.set_timeout(Duration::ZERO);
        check!(loc.url().query().is_none());
    }

    #[test]
    fn base_query_is_not_carried_over() {
        let loc = location("http://example.com/x?stale=1");
        check!(loc.url().as_str() == "http://example.com/x");
    }

    #[test]
    fn request_uri_sets_path_and_merges_query() {
        let mut loc = location("http://example.com/base");
        loc.param("keep", "yes");
        loc.param("b", "old");
        loc.request_uri("/other/path?b=2&b=3&c=4").expect("valid uri");

        check!(loc.path() == "/other/path");
        check!(loc.url().query() == Some("b=2&b=3&c=4&keep=yes"));
    }

    #[test]
    fn request_uri_accepts_absolute_uris() {
        let mut loc = location("http://example.com");
        loc.request_uri("https://elsewhere.org/a/b?q=1").expect("valid uri");
        check!(loc.url().as_str() == "http://example.com/a/b?q=1");
    }

    #[test]
    fn bare_host_defaults_to_http() {
        let loc = location("example.com:8080");
        check!(loc.base().as_str() == "http://example.com:8080/");
    }

    #[test]
    fn bare_host_mentioning_https_uses_https() {
        let loc = location("https-gateway.example.com");
        check!(loc.base().scheme() == "https");
    }

    #[test]
    fn unparseable_address_is_an_error() {
        let_assert!(Err(Error::InvalidUrl(message)) = Location::parse("[::1"));
        check!(message.contains("[::1"));
    }

    #[test]
    fn join_path_cleans_segments() {
        check!(join_path(["/", ""]) == "/");
        check!(join_path(["/a/./b", "../c"]) == "/a/c");
        check!(join_path(["/", "..", "x"]) == "/x");
        check!(join_path(["a", ".."]) == ".");
        check!(join_path(["..", "a"]) == "../a");
        check!(join_path(Vec::<String>::new()).is_empty());
    }
}
