//! Ordered pattern rules mapping requests to strategies.
//!
//! Rules are plain data so they can be loaded from configuration and tested
//! without an engine. A [`RuleSet`] keeps them grouped in strategy priority
//! order; within a group, declaration order is preserved. The first matching
//! rule wins and unmatched requests fall through to network-first.

use serde::{Deserialize, Serialize};
use url::Url;

use super::Strategy;
use crate::network::InterceptedRequest;

/// Request predicate of a rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pattern {
    /// Path equals the given string exactly.
    Exact(String),
    /// Path starts with the given prefix.
    PathPrefix(String),
    /// Last path segment has the given extension (case-insensitive, no dot).
    Extension(String),
    /// Request is a full-document navigation.
    Navigation,
}

impl Pattern {
    pub fn matches(&self, request: &InterceptedRequest) -> bool {
        let path = request.url.path();
        match self {
            Pattern::Exact(p) => path == p,
            Pattern::PathPrefix(prefix) => path.starts_with(prefix.as_str()),
            Pattern::Extension(ext) => path
                .rsplit('/')
                .next()
                .and_then(|segment| segment.rsplit_once('.'))
                .is_some_and(|(stem, e)| !stem.is_empty() && e.eq_ignore_ascii_case(ext)),
            Pattern::Navigation => request.navigate,
        }
    }
}

/// One pattern→strategy mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyRule {
    pub strategy: Strategy,
    pub pattern: Pattern,
}

impl StrategyRule {
    pub fn new(strategy: Strategy, pattern: Pattern) -> Self {
        Self { strategy, pattern }
    }
}

/// Why a request is not handled by a strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum BypassReason {
    CrossOrigin,
    NonGet,
    NotActive,
}

/// Routing decision for an intercepted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Bypass(BypassReason),
    Apply(Strategy),
}

/// Ordered rules, evaluated first-match in strategy priority order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleSet {
    rules: Vec<StrategyRule>,
}

impl RuleSet {
    /// Build a rule set; rules are regrouped by strategy priority, keeping
    /// their relative order inside each group.
    pub fn new(mut rules: Vec<StrategyRule>) -> Self {
        rules.sort_by_key(|r| r.strategy.priority());
        Self { rules }
    }

    pub fn rules(&self) -> &[StrategyRule] {
        &self.rules
    }

    /// Select the strategy for a request. Pure; defaults to network-first.
    pub fn select(&self, request: &InterceptedRequest) -> Strategy {
        self.rules
            .iter()
            .find(|rule| rule.pattern.matches(request))
            .map(|rule| rule.strategy)
            .unwrap_or(Strategy::NetworkFirst)
    }

    /// Route a request: cross-origin and non-GET requests bypass the engine,
    /// everything else gets a strategy.
    pub fn route(&self, origin: &Url, request: &InterceptedRequest) -> Route {
        if request.url.origin() != origin.origin() {
            return Route::Bypass(BypassReason::CrossOrigin);
        }
        if !request.is_get() {
            return Route::Bypass(BypassReason::NonGet);
        }
        Route::Apply(self.select(request))
    }
}

impl Default for RuleSet {
    fn default() -> Self {
        let ext = |e: &str| Pattern::Extension(e.into());
        let prefix = |p: &str| Pattern::PathPrefix(p.into());

        let mut rules = Vec::new();
        for pattern in ["js", "mjs", "css", "woff", "woff2", "ttf", "otf", "eot"]
            .into_iter()
            .map(ext)
            .chain(["png", "jpg", "jpeg", "gif", "webp", "avif", "svg", "ico"].into_iter().map(ext))
            .chain(["/static/", "/assets/", "/fonts/", "/images/", "/icons/"].into_iter().map(prefix))
        {
            rules.push(StrategyRule::new(Strategy::CacheFirst, pattern));
        }
        for pattern in [prefix("/api/"), ext("json")] {
            rules.push(StrategyRule::new(Strategy::NetworkFirst, pattern));
        }
        for pattern in [Pattern::Exact("/".into()), Pattern::Navigation, ext("html"), ext("htm")] {
            rules.push(StrategyRule::new(Strategy::StaleWhileRevalidate, pattern));
        }
        rules.push(StrategyRule::new(Strategy::CacheOnly, prefix("/offline/")));

        Self::new(rules)
    }
}
