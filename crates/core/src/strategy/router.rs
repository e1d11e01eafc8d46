//! Per-URL strategy selection.
//!
//! Resolution order: exact path overrides, then ordered pattern rules, then
//! the policy default. Overrides exist for resources reachable through both
//! an API-style and a static path, where pattern order alone is ambiguous.

use std::collections::BTreeMap;

use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

/// The two fetch strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    CacheFirst,
    NetworkFirst,
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Strategy::CacheFirst => write!(f, "cache-first"),
            Strategy::NetworkFirst => write!(f, "network-first"),
        }
    }
}

/// A path pattern mapped to a strategy.
#[derive(Debug, Clone)]
pub struct RouteRule {
    pattern: Regex,
    strategy: Strategy,
}

impl RouteRule {
    fn builtin(pattern: &str, strategy: Strategy) -> Self {
        Self { pattern: Regex::new(pattern).expect("built-in route pattern is valid"), strategy }
    }

    pub fn matches(&self, path: &str) -> bool {
        self.pattern.is_match(path)
    }
}

/// Ordered routing table.
#[derive(Debug, Clone)]
pub struct RoutePolicy {
    overrides: BTreeMap<String, Strategy>,
    rules: Vec<RouteRule>,
    default: Strategy,
}

impl RoutePolicy {
    pub fn new(rules: Vec<RouteRule>, default: Strategy) -> Self {
        Self { overrides: BTreeMap::new(), rules, default }
    }

    /// Worker routing: API calls network-first; media, styles, scripts,
    /// icons, image/video folders and directory paths cache-first; anything
    /// else network-first.
    pub fn worker_default() -> Self {
        Self::new(
            vec![
                RouteRule::builtin(r"^/api/", Strategy::NetworkFirst),
                RouteRule::builtin(r"\.(?:mp4|webp|css|js|ico|gif|png|jpe?g)$", Strategy::CacheFirst),
                RouteRule::builtin(r"^/(?:images|video)/", Strategy::CacheFirst),
                RouteRule::builtin(r"/$", Strategy::CacheFirst),
            ],
            Strategy::NetworkFirst,
        )
    }

    /// Fallback routing: API calls network-first, everything else cache-first.
    pub fn fallback_default() -> Self {
        Self::new(vec![RouteRule::builtin(r"^/api/", Strategy::NetworkFirst)], Strategy::CacheFirst)
    }

    /// Pin a single path to a strategy regardless of the pattern rules.
    pub fn with_override(mut self, path: impl Into<String>, strategy: Strategy) -> Self {
        self.overrides.insert(path.into(), strategy);
        self
    }

    pub fn with_overrides(mut self, overrides: &BTreeMap<String, Strategy>) -> Self {
        self.overrides.extend(overrides.iter().map(|(k, v)| (k.clone(), *v)));
        self
    }

    pub fn strategy_for(&self, url: &Url) -> Strategy {
        let path = url.path();
        if let Some(strategy) = self.overrides.get(path) {
            return *strategy;
        }
        self.rules
            .iter()
            .find(|rule| rule.matches(path))
            .map_or(self.default, |rule| rule.strategy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(path: &str) -> Url {
        Url::parse("https://app.test").unwrap().join(path).unwrap()
    }

    #[test]
    fn test_worker_api_is_network_first() {
        let policy = RoutePolicy::worker_default();
        assert_eq!(policy.strategy_for(&url("/api/notes/sync")), Strategy::NetworkFirst);
        assert_eq!(policy.strategy_for(&url("/api/video/1.mp4")), Strategy::NetworkFirst);
    }

    #[test]
    fn test_worker_static_assets_are_cache_first() {
        let policy = RoutePolicy::worker_default();
        for path in [
            "/video/1.mp4",
            "/video/cover-1.webp",
            "/dist/css/styles.css",
            "/dist/js/main.js",
            "/favicon.ico",
            "/images/editor-star.gif",
            "/images/icons/b1",
            "/",
            "/dist/",
        ] {
            assert_eq!(policy.strategy_for(&url(path)), Strategy::CacheFirst, "{path}");
        }
    }

    #[test]
    fn test_worker_default_is_network_first() {
        let policy = RoutePolicy::worker_default();
        assert_eq!(policy.strategy_for(&url("/index.html")), Strategy::NetworkFirst);
        assert_eq!(policy.strategy_for(&url("/manifest.json")), Strategy::NetworkFirst);
    }

    #[test]
    fn test_query_string_is_ignored() {
        let policy = RoutePolicy::worker_default();
        assert_eq!(policy.strategy_for(&url("/favicon.ico?_=1700000000")), Strategy::CacheFirst);
    }

    #[test]
    fn test_override_wins() {
        let policy = RoutePolicy::worker_default().with_override("/video/live.mp4", Strategy::NetworkFirst);
        assert_eq!(policy.strategy_for(&url("/video/live.mp4")), Strategy::NetworkFirst);
        assert_eq!(policy.strategy_for(&url("/video/1.mp4")), Strategy::CacheFirst);
    }

    #[test]
    fn test_fallback_policy() {
        let policy = RoutePolicy::fallback_default();
        assert_eq!(policy.strategy_for(&url("/api/notes")), Strategy::NetworkFirst);
        assert_eq!(policy.strategy_for(&url("/index.html")), Strategy::CacheFirst);
    }

    #[test]
    fn test_strategy_serde() {
        let json = serde_json::to_string(&Strategy::CacheFirst).unwrap();
        assert_eq!(json, "\"cache-first\"");
    }
}
