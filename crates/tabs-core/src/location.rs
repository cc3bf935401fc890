//! The routing collaborator: location snapshots, URL building, navigation.

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use tabs_config::{NavigationMode, UrlStrategy};

/// Characters left unescaped in query components.
const QUERY_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Path and query of the current location.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocationSnapshot {
    /// Decoded path segments, empty segments removed.
    pub segments: Vec<String>,
    /// Decoded query parameters. Repeated names keep the last value.
    pub query: BTreeMap<String, String>,
}

impl LocationSnapshot {
    /// Parse a path with an optional query string (`/a/b?x=1#frag`).
    ///
    /// A scheme and host, if present, are skipped.
    #[must_use]
    pub fn parse(url: &str) -> Self {
        let url = url.split_once('#').map_or(url, |(before, _)| before);
        let url = match url.split_once("://") {
            Some((_, rest)) => rest.find('/').map_or("", |i| &rest[i..]),
            None => url,
        };
        let (path, query) = url.split_once('?').unwrap_or((url, ""));

        let segments = path
            .split('/')
            .filter(|s| !s.is_empty())
            .map(decode)
            .collect();

        let query = query
            .split('&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| {
                let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
                (decode(name), decode(value))
            })
            .collect();

        Self { segments, query }
    }

    #[must_use]
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    /// Path part, re-encoded.
    #[must_use]
    pub fn path(&self) -> String {
        let mut path = String::new();
        for segment in &self.segments {
            path.push('/');
            path.extend(utf8_percent_encode(segment, QUERY_SET));
        }
        if path.is_empty() {
            path.push('/');
        }
        path
    }

    /// Full path with query string, re-encoded.
    #[must_use]
    pub fn to_url(&self) -> String {
        let mut url = self.path();
        let mut sep = '?';
        for (name, value) in &self.query {
            url.push(sep);
            url.extend(utf8_percent_encode(name, QUERY_SET));
            url.push('=');
            url.extend(utf8_percent_encode(value, QUERY_SET));
            sep = '&';
        }
        url
    }
}

fn decode(raw: &str) -> String {
    let raw = raw.replace('+', " ");
    percent_decode_str(&raw).decode_utf8_lossy().into_owned()
}

/// Reads and writes the tab id in a location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlBuilder {
    strategy: UrlStrategy,
    query_param: String,
}

impl UrlBuilder {
    #[must_use]
    pub fn new(strategy: UrlStrategy, query_param: impl Into<String>) -> Self {
        Self {
            strategy,
            query_param: query_param.into(),
        }
    }

    #[must_use]
    pub fn strategy(&self) -> UrlStrategy {
        self.strategy
    }

    /// Raw tab id encoded in `location`, unvalidated.
    ///
    /// With the path strategy the last segment counts only when the path has
    /// at least two segments, so `/settings` alone carries no tab.
    #[must_use]
    pub fn tab_from<'a>(&self, location: &'a LocationSnapshot) -> Option<&'a str> {
        match self.strategy {
            UrlStrategy::Path => match location.segments.as_slice() {
                [_, .., last] => Some(last.as_str()),
                _ => None,
            },
            UrlStrategy::Query => location
                .query_param(&self.query_param)
                .filter(|v| !v.is_empty()),
        }
    }

    /// URL for `location` with the tab set to `tab_id`.
    #[must_use]
    pub fn url_for(&self, location: &LocationSnapshot, tab_id: &str) -> String {
        let mut target = location.clone();
        match self.strategy {
            UrlStrategy::Path => {
                if target.segments.len() >= 2 {
                    target.segments.pop();
                }
                target.segments.push(tab_id.to_owned());
            }
            UrlStrategy::Query => {
                target
                    .query
                    .insert(self.query_param.clone(), tab_id.to_owned());
            }
        }
        target.to_url()
    }
}

/// A URL update the core asks the host to perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationRequest {
    pub url: String,
    pub mode: NavigationMode,
    /// Add a history entry rather than replacing the current one.
    pub push_history: bool,
}

/// Requests navigation on behalf of the core.
pub trait Router: Send + Sync {
    fn navigate(&self, request: &NavigationRequest);
}

/// Router that ignores every request.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullRouter;

impl Router for NullRouter {
    fn navigate(&self, _request: &NavigationRequest) {}
}

/// Router that records requests for the host to replay.
#[derive(Debug, Default)]
pub struct MemoryRouter {
    history: Mutex<Vec<NavigationRequest>>,
}

impl MemoryRouter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every request so far, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<NavigationRequest> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn last_url(&self) -> Option<String> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .map(|request| request.url.clone())
    }
}

impl Router for MemoryRouter {
    fn navigate(&self, request: &NavigationRequest) {
        tracing::debug!(url = %request.url, mode = ?request.mode, "navigation requested");
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());
    }
}
