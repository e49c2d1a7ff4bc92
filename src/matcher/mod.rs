//! # Matcher Module
//!
//! Pattern compilation and path matching shared by request routing and
//! topic-style pub/sub routing.
//!
//! ## Overview
//!
//! The matcher works in two phases:
//!
//! 1. **Compilation**: at registration time a pattern string is classified as
//!    literal or dynamic. Dynamic patterns are translated token by token
//!    (named parameters, wildcard segments, the optional `/#` tail) into an
//!    anchored regex; declared parameter values substitute their tokens and
//!    may expand one pattern into several concrete variants.
//!
//! 2. **Matching**: an incoming address is checked against the known-pattern
//!    set by exact equality, then against the compiled regexes in
//!    registration order. The first match wins.
//!
//! ## Example
//!
//! ```rust
//! use corroute::matcher::RouteMatcher;
//!
//! let mut matcher = RouteMatcher::new();
//! matcher.register("device/:id/used", None, false).unwrap();
//! assert_eq!(matcher.matches("device/42/used"), Some("device/:id/used"));
//! assert_eq!(matcher.matches("device/used"), None);
//! ```

mod compile;
mod core;

pub use compile::{expand_params, is_pattern, translate, ParamValue};
pub use core::RouteMatcher;
