//! # Router Module
//!
//! Pattern-keyed route table and dispatch.
//!
//! ## Overview
//!
//! A [`Router`] owns a table of formatted pattern strings mapped to tagged
//! [`RouteEntry`] values: single handlers, ordered handler lists, controller
//! routes, child routers (static or deferred), and redirects. Incoming
//! addresses are resolved by exact table hit first, then through the
//! [`RouteMatcher`](crate::matcher::RouteMatcher) in registration order.
//!
//! Declarative configuration goes through [`RouteSpec`] and
//! [`Router::mount`]; imperative configuration through
//! [`Router::use_route`] and friends. Routers nest: a mounted child strips
//! the mount path as its prefix before resolving locally, and a fallback
//! handler or [`Router::intercept`] chains a router in front of another
//! resolver.

mod core;

pub use core::{ChildLoader, GuardFn, LazyChild, RouteEntry, RouteSpec, Router};
