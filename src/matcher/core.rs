use std::collections::HashMap;

use regex::Regex;
use tracing::{debug, warn};

use super::compile::{self, ParamValue};
use crate::error::RoutingError;

/// Pattern registry and matcher.
///
/// Literal patterns (and concrete variants expanded from parameter values)
/// live in an enumeration set checked by exact equality; dynamic patterns
/// compile into anchored regexes scanned in registration order. The first
/// matching regex wins — not the longest match and not the most specific.
/// That ordering is part of the contract and is pinned by tests.
#[derive(Default, Clone)]
pub struct RouteMatcher {
    /// Known patterns in registration order: literals, expanded concrete
    /// variants, and subscribable wildcard topics. Doubles as the enumeration
    /// set handed to subscribing transports.
    routes: Vec<String>,
    /// Compiled dynamic matchers in registration order, each mapped back to
    /// the original pattern string.
    matchers: Vec<(Regex, String)>,
}

impl RouteMatcher {
    /// Create an empty matcher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// True if the route contains any dynamic token.
    #[must_use]
    pub fn is_pattern(route: &str) -> bool {
        compile::is_pattern(route)
    }

    /// Register a pattern.
    ///
    /// Literal patterns go straight into the enumeration set. Dynamic
    /// patterns are first expanded against `params` (list values multiply the
    /// variants); variants that become fully literal join the enumeration
    /// set, the rest compile into regexes mapped back to the original
    /// pattern. With `subscribable`, every variant also joins the enumeration
    /// set so a topic transport can subscribe to it.
    ///
    /// Returns the concrete variants produced by this registration.
    pub fn register(
        &mut self,
        pattern: &str,
        params: Option<&HashMap<String, ParamValue>>,
        subscribable: bool,
    ) -> Result<Vec<String>, RoutingError> {
        if !compile::is_pattern(pattern) {
            self.push_known(pattern);
            debug!(pattern = %pattern, "Registered literal route");
            return Ok(vec![pattern.to_string()]);
        }

        let empty = HashMap::new();
        let variants = compile::expand_params(pattern, params.unwrap_or(&empty));
        for variant in &variants {
            if !compile::is_pattern(variant) {
                self.push_known(variant);
                debug!(pattern = %pattern, variant = %variant, "Registered expanded literal variant");
                continue;
            }
            let regex = compile::compile(variant)?;
            debug!(
                pattern = %pattern,
                variant = %variant,
                regex = %regex.as_str(),
                "Registered dynamic matcher"
            );
            self.matchers.push((regex, pattern.to_string()));
            if subscribable {
                self.push_known(variant);
            }
        }
        Ok(variants)
    }

    /// Resolve a path to the pattern that matches it.
    ///
    /// Exact enumeration-set hit first, then the dynamic matchers in
    /// registration order; the first matching regex wins.
    #[must_use]
    pub fn matches(&self, path: &str) -> Option<&str> {
        if let Some(known) = self.routes.iter().find(|p| p.as_str() == path) {
            return Some(known.as_str());
        }
        for (regex, pattern) in &self.matchers {
            if regex.is_match(path) {
                debug!(path = %path, pattern = %pattern, "Dynamic pattern matched");
                return Some(pattern.as_str());
            }
        }
        None
    }

    /// Remove a pattern's enumeration-set bookkeeping.
    ///
    /// Compiled dynamic matchers are intentionally left in place: an
    /// unregistered dynamic pattern keeps matching until `clear()`. Callers
    /// that need full removal own both halves of that bookkeeping.
    pub fn unregister(&mut self, pattern: &str) {
        let before = self.routes.len();
        self.routes.retain(|p| p != pattern);
        if before == self.routes.len() && compile::is_pattern(pattern) {
            warn!(
                pattern = %pattern,
                "Unregistered a dynamic pattern; its compiled matcher remains active"
            );
        }
    }

    /// Drop every pattern and every compiled matcher.
    pub fn clear(&mut self) {
        self.routes.clear();
        self.matchers.clear();
    }

    /// The enumeration set: known literal patterns, expanded variants, and
    /// subscribable wildcard topics, in registration order.
    #[must_use]
    pub fn known_patterns(&self) -> &[String] {
        &self.routes
    }

    fn push_known(&mut self, pattern: &str) {
        if !self.routes.iter().any(|p| p == pattern) {
            self.routes.push(pattern.to_string());
        }
    }
}
