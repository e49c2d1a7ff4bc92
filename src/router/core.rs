use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::context::RouteContext;
use crate::controller::ControllerRoute;
use crate::error::RoutingError;
use crate::matcher::{ParamValue, RouteMatcher};
use crate::middleware::{Handler, RouteMiddleware};

/// Factory producing a deferred child router.
pub type ChildLoader = Box<dyn FnOnce() -> Router + Send + Sync>;

/// Guard predicate attached to a declarative route.
pub type GuardFn = Arc<dyn Fn(&RouteContext) -> bool + Send + Sync>;

/// A route-table value. Closed set, so dispatch is a `match` rather than
/// shape sniffing on the stored value.
pub enum RouteEntry {
    /// One handler
    Single(Handler),
    /// Ordered handler list, executed in registration order until the
    /// context is marked done
    Many(Vec<Handler>),
    /// Controller-backed entry resolved per operation
    Controller(ControllerRoute),
    /// Statically mounted child router
    Child(Router),
    /// Deferred child router, resolved once and memoized
    Lazy(LazyChild),
    /// Redirect: rewrite the path and re-resolve once
    Redirect(String),
}

impl std::fmt::Debug for RouteEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RouteEntry::Single(_) => f.write_str("Single"),
            RouteEntry::Many(hs) => write!(f, "Many({})", hs.len()),
            RouteEntry::Controller(_) => f.write_str("Controller"),
            RouteEntry::Child(_) => f.write_str("Child"),
            RouteEntry::Lazy(_) => f.write_str("Lazy"),
            RouteEntry::Redirect(t) => write!(f, "Redirect({t})"),
        }
    }
}

/// Deferred child router: an unresolved factory, or the memoized router it
/// produced.
pub struct LazyChild {
    path: String,
    factory: Mutex<Option<ChildLoader>>,
    resolved: OnceCell<Router>,
}

impl LazyChild {
    fn new(path: String, factory: ChildLoader) -> Self {
        LazyChild {
            path,
            factory: Mutex::new(Some(factory)),
            resolved: OnceCell::new(),
        }
    }

    /// Run the factory on first use; later calls return the memoized router.
    /// The loaded router's prefix is rebound to the mount path.
    fn resolve(&self) -> Result<&Router, RoutingError> {
        self.resolved.get_or_try_init(|| {
            let factory = self.factory.lock().take().ok_or_else(|| {
                RoutingError::bad_request("deferred route group failed to resolve previously")
            })?;
            info!(path = %self.path, "Resolving deferred route group");
            let mut router = factory();
            router.set_prefix(self.path.clone());
            Ok(router)
        })
    }
}

/// Declarative route descriptor.
///
/// Resolved at mount time in priority order: inline handler, middleware
/// object, redirect, controller, static children, deferred children. The
/// optional guard is evaluated per dispatch and logged; its verdict does not
/// gate dispatch.
pub struct RouteSpec {
    /// Route path, relative to the mounting router
    pub path: String,
    /// Inline handler
    pub handler: Option<Handler>,
    /// Middleware-like object
    pub middleware: Option<Arc<dyn RouteMiddleware>>,
    /// Redirect target path
    pub redirect_to: Option<String>,
    /// Controller binding
    pub controller: Option<ControllerRoute>,
    /// Static child-route list
    pub children: Option<Vec<RouteSpec>>,
    /// Deferred child-route loader
    pub load_children: Option<ChildLoader>,
    /// Guard predicate
    pub can_activate: Option<GuardFn>,
}

impl RouteSpec {
    /// Empty descriptor for `path`.
    #[must_use]
    pub fn path(path: impl Into<String>) -> Self {
        RouteSpec {
            path: path.into(),
            handler: None,
            middleware: None,
            redirect_to: None,
            controller: None,
            children: None,
            load_children: None,
            can_activate: None,
        }
    }

    /// Attach an inline handler.
    #[must_use]
    pub fn handler(mut self, handler: Handler) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Attach a middleware object.
    #[must_use]
    pub fn middleware(mut self, mw: Arc<dyn RouteMiddleware>) -> Self {
        self.middleware = Some(mw);
        self
    }

    /// Redirect to another path.
    #[must_use]
    pub fn redirect_to(mut self, target: impl Into<String>) -> Self {
        self.redirect_to = Some(target.into());
        self
    }

    /// Attach a controller binding.
    #[must_use]
    pub fn controller(mut self, controller: ControllerRoute) -> Self {
        self.controller = Some(controller);
        self
    }

    /// Attach static child routes.
    #[must_use]
    pub fn children(mut self, children: Vec<RouteSpec>) -> Self {
        self.children = Some(children);
        self
    }

    /// Attach a deferred child-route loader.
    #[must_use]
    pub fn load_children(mut self, loader: ChildLoader) -> Self {
        self.load_children = Some(loader);
        self
    }

    /// Attach a guard predicate.
    #[must_use]
    pub fn can_activate(mut self, guard: GuardFn) -> Self {
        self.can_activate = Some(guard);
        self
    }
}

/// Route table plus dispatch.
///
/// The table maps formatted pattern strings to tagged entries and is owned
/// by this instance; there are no process-wide registries. Mutation
/// (`use_route`, `unuse`) assumes a single configuring owner; sharing a
/// router across preemptive threads for mutation needs external
/// synchronization.
pub struct Router {
    prefix: String,
    table: HashMap<String, RouteEntry>,
    matcher: RouteMatcher,
    /// Expanded concrete variant -> table key
    aliases: HashMap<String, String>,
    /// Parameter values declared in this router's scope
    params: HashMap<String, ParamValue>,
    fallback: Option<Handler>,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    /// Router with no prefix.
    #[must_use]
    pub fn new() -> Self {
        Self::with_prefix("")
    }

    /// Router that strips `prefix` from every incoming address before
    /// resolution.
    #[must_use]
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Router {
            prefix: prefix.into(),
            table: HashMap::new(),
            matcher: RouteMatcher::new(),
            aliases: HashMap::new(),
            params: HashMap::new(),
            fallback: None,
        }
    }

    /// The configured prefix.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Rebind the prefix. Used when mounting under a parent route.
    pub fn set_prefix(&mut self, prefix: impl Into<String>) {
        self.prefix = prefix.into();
    }

    /// Declare a parameter value in this router's scope. Patterns registered
    /// afterwards substitute the value for matching `:name` / `${name}`
    /// tokens.
    pub fn declare_param(&mut self, name: impl Into<String>, value: impl Into<ParamValue>) {
        self.params.insert(name.into(), value.into());
    }

    /// Handler invoked when nothing matches, instead of failing with
    /// `NotFound`. Typically the outer router or a backend delegate.
    pub fn set_fallback(&mut self, handler: Handler) {
        self.fallback = Some(handler);
    }

    /// Canonical pattern formatting: collapse duplicate slashes and strip a
    /// trailing slash (the bare root keeps its single `/`).
    #[must_use]
    pub fn format_route(route: &str) -> String {
        let mut out = String::with_capacity(route.len());
        let mut prev_slash = false;
        for c in route.chars() {
            if c == '/' {
                if prev_slash {
                    continue;
                }
                prev_slash = true;
            } else {
                prev_slash = false;
            }
            out.push(c);
        }
        while out.len() > 1 && out.ends_with('/') {
            out.pop();
        }
        if out.is_empty() {
            out.push('/');
        }
        out
    }

    /// Register a handler under a pattern.
    ///
    /// Repeated registrations under one pattern accumulate into an ordered
    /// list executed in registration order. A pattern already bound to a
    /// controller route or a mounted child router cannot take handlers.
    pub fn use_route(&mut self, pattern: &str, handler: Handler) -> Result<(), RoutingError> {
        let key = Self::format_route(pattern);
        if let Some(prev) = self.table.remove(&key) {
            let entry = match prev {
                RouteEntry::Single(first) => RouteEntry::Many(vec![first, handler]),
                RouteEntry::Many(mut handlers) => {
                    handlers.push(handler);
                    RouteEntry::Many(handlers)
                }
                other => {
                    self.table.insert(key.clone(), other);
                    return Err(RoutingError::ConfigurationConflict { pattern: key });
                }
            };
            debug!(pattern = %key, "Appended handler to existing registration");
            self.table.insert(key, entry);
            return Ok(());
        }

        let variants = self.matcher.register(&key, Some(&self.params), true)?;
        for variant in variants {
            if variant != key {
                self.aliases.insert(variant, key.clone());
            }
        }
        info!(pattern = %key, "Route registered");
        self.table.insert(key, RouteEntry::Single(handler));
        Ok(())
    }

    /// Mount a controller route under a pattern. The controller owns every
    /// sub-path below the pattern.
    pub fn use_controller(
        &mut self,
        pattern: &str,
        mut controller: ControllerRoute,
    ) -> Result<(), RoutingError> {
        let key = Self::format_route(pattern);
        if self.table.contains_key(&key) {
            return Err(RoutingError::ConfigurationConflict { pattern: key });
        }
        controller.set_prefix(key.clone());
        self.register_subtree(&key)?;
        info!(pattern = %key, "Controller route mounted");
        self.table.insert(key, RouteEntry::Controller(controller));
        Ok(())
    }

    /// Mount a child router under a pattern.
    pub fn use_child(&mut self, pattern: &str, mut child: Router) -> Result<(), RoutingError> {
        let key = Self::format_route(pattern);
        if self.table.contains_key(&key) {
            return Err(RoutingError::ConfigurationConflict { pattern: key });
        }
        child.set_prefix(key.clone());
        self.register_subtree(&key)?;
        info!(pattern = %key, "Child router mounted");
        self.table.insert(key, RouteEntry::Child(child));
        Ok(())
    }

    /// Mount a deferred child-route group under a pattern. The factory runs
    /// on first dispatch and the produced router is memoized.
    pub fn use_lazy(&mut self, pattern: &str, loader: ChildLoader) -> Result<(), RoutingError> {
        let key = Self::format_route(pattern);
        if self.table.contains_key(&key) {
            return Err(RoutingError::ConfigurationConflict { pattern: key });
        }
        self.register_subtree(&key)?;
        info!(pattern = %key, "Deferred route group mounted");
        self.table
            .insert(key.clone(), RouteEntry::Lazy(LazyChild::new(key, loader)));
        Ok(())
    }

    /// Mount a declarative route descriptor.
    ///
    /// Resolution priority: handler, middleware, redirect, controller,
    /// static children, deferred children. A descriptor carrying none of
    /// those fails with `BadRequest`.
    pub fn mount(&mut self, spec: RouteSpec) -> Result<(), RoutingError> {
        let key = Self::format_route(&spec.path);
        let guard = spec.can_activate;

        if let Some(handler) = spec.handler {
            return self.use_route(&key, Self::guarded(handler, guard, &key));
        }
        if let Some(mw) = spec.middleware {
            let handler = Handler::from_middleware(mw);
            return self.use_route(&key, Self::guarded(handler, guard, &key));
        }
        if let Some(target) = spec.redirect_to {
            if self.table.contains_key(&key) {
                return Err(RoutingError::ConfigurationConflict { pattern: key });
            }
            self.matcher.register(&key, Some(&self.params), true)?;
            info!(pattern = %key, target = %target, "Redirect mounted");
            self.table
                .insert(key, RouteEntry::Redirect(Self::format_route(&target)));
            return Ok(());
        }
        if let Some(controller) = spec.controller {
            return self.use_controller(&key, controller);
        }
        if let Some(children) = spec.children {
            let mut child = Router::new();
            for c in children {
                child.mount(c)?;
            }
            return self.use_child(&key, child);
        }
        if let Some(loader) = spec.load_children {
            return self.use_lazy(&key, loader);
        }
        Err(RoutingError::bad_request(format!(
            "route descriptor for '{key}' resolves to nothing"
        )))
    }

    /// Remove a registration.
    ///
    /// With a specific handler, removes just that handler from a list entry
    /// (matched by identity, or by a middleware's `equals` hook); the entry
    /// survives while other handlers remain. Otherwise the whole entry and
    /// its matcher bookkeeping are removed together.
    pub fn unuse(&mut self, pattern: &str, handler: Option<&Handler>) {
        let key = Self::format_route(pattern);

        if let (Some(target), Some(RouteEntry::Many(handlers))) =
            (handler, self.table.get_mut(&key))
        {
            let before = handlers.len();
            handlers.retain(|h| !h.same_as(target));
            if handlers.len() != before && !handlers.is_empty() {
                debug!(pattern = %key, remaining = handlers.len(), "Handler removed from list");
                return;
            }
        }

        match self.table.remove(&key) {
            Some(entry) => {
                // Controller, child, and deferred mounts register their
                // subtree pattern in the matcher.
                let registered = match entry {
                    RouteEntry::Controller(_) | RouteEntry::Child(_) | RouteEntry::Lazy(_) => {
                        format!("{key}/#")
                    }
                    _ => key.clone(),
                };
                self.matcher.unregister(&registered);
                self.aliases.retain(|_, v| v != &key);
                info!(pattern = %key, "Route removed");
            }
            None => {
                warn!(pattern = %key, "Attempted to remove an unknown route");
            }
        }
    }

    /// Drop every entry and every compiled matcher.
    pub fn clear(&mut self) {
        self.table.clear();
        self.matcher.clear();
        self.aliases.clear();
    }

    /// Patterns a topic transport should subscribe to: registered literals,
    /// expanded concrete variants, and wildcard topic patterns.
    #[must_use]
    pub fn subscribable_routes(&self) -> &[String] {
        self.matcher.known_patterns()
    }

    /// Resolve and run the entry for the context's address.
    ///
    /// The prefix strip is committed to `ctx.path` only while resolution is
    /// inside this router: on a miss the original address is restored before
    /// the fallback runs or the caller sees the error, so an outer router
    /// can still resolve it.
    pub fn handle(&self, ctx: &mut RouteContext) -> Result<(), RoutingError> {
        let original = ctx.path.clone();
        if !self.prefix.is_empty() {
            match ctx.path.strip_prefix(self.prefix.as_str()) {
                Some(rest) => {
                    ctx.path = if rest.is_empty() {
                        "/".to_string()
                    } else {
                        rest.to_string()
                    };
                }
                None => {
                    debug!(prefix = %self.prefix, path = %ctx.path, "Address outside router prefix");
                    return self.miss(ctx);
                }
            }
        }
        match self.dispatch(ctx, true) {
            Err(RoutingError::NotFound { .. }) => {
                ctx.path = original;
                self.miss(ctx)
            }
            other => other,
        }
    }

    /// Run this router as one stage of a larger chain: on `NotFound`, hand
    /// the context to `next` instead of failing.
    pub fn intercept(
        &self,
        ctx: &mut RouteContext,
        next: &dyn Fn(&mut RouteContext) -> Result<(), RoutingError>,
    ) -> Result<(), RoutingError> {
        match self.handle(ctx) {
            Err(RoutingError::NotFound { .. }) => next(ctx),
            other => other,
        }
    }

    fn dispatch(&self, ctx: &mut RouteContext, allow_redirect: bool) -> Result<(), RoutingError> {
        let (pattern, entry) = match self.resolve(&ctx.path) {
            Some(hit) => hit,
            None => {
                debug!(path = %ctx.path, "No route matched");
                return Err(RoutingError::NotFound {
                    path: ctx.path.clone(),
                });
            }
        };

        let path = ctx.path.clone();
        ctx.extract_params(pattern, &path);

        match entry {
            RouteEntry::Single(h) => h.call(ctx),
            RouteEntry::Many(handlers) => {
                for h in handlers {
                    if ctx.done {
                        break;
                    }
                    h.call(ctx)?;
                }
                Ok(())
            }
            RouteEntry::Controller(c) => c.dispatch(ctx),
            RouteEntry::Child(r) => r.handle(ctx),
            RouteEntry::Lazy(l) => l.resolve()?.handle(ctx),
            RouteEntry::Redirect(target) => {
                if !allow_redirect {
                    warn!(path = %ctx.path, target = %target, "Refusing chained redirect");
                    return Err(RoutingError::NotFound {
                        path: ctx.path.clone(),
                    });
                }
                debug!(path = %ctx.path, target = %target, "Redirecting");
                ctx.path = target.clone();
                self.dispatch(ctx, false)
            }
        }
    }

    fn resolve(&self, path: &str) -> Option<(&str, &RouteEntry)> {
        if let Some((key, entry)) = self.table.get_key_value(path) {
            return Some((key.as_str(), entry));
        }
        let pattern = self.matcher.matches(path)?;
        if let Some((key, entry)) = self.table.get_key_value(pattern) {
            return Some((key.as_str(), entry));
        }
        // Alias hits report the original registered pattern so parameter
        // extraction sees its tokens, not the expanded literal.
        let key = self.aliases.get(pattern)?;
        self.table
            .get_key_value(key.as_str())
            .map(|(k, entry)| (k.as_str(), entry))
    }

    fn miss(&self, ctx: &mut RouteContext) -> Result<(), RoutingError> {
        match &self.fallback {
            Some(h) => h.call(ctx),
            None => Err(RoutingError::NotFound {
                path: ctx.path.clone(),
            }),
        }
    }

    fn register_subtree(&mut self, key: &str) -> Result<(), RoutingError> {
        let subtree = format!("{key}/#");
        self.matcher.register(&subtree, Some(&self.params), true)?;
        self.aliases.insert(subtree, key.to_string());
        Ok(())
    }

    fn guarded(handler: Handler, guard: Option<GuardFn>, key: &str) -> Handler {
        match guard {
            None => handler,
            Some(guard) => {
                let pattern = key.to_string();
                Handler::from_fn(move |ctx| {
                    let allowed = guard(ctx);
                    // The verdict is recorded but does not gate dispatch.
                    debug!(pattern = %pattern, allowed = allowed, "Route guard evaluated");
                    handler.call(ctx)
                })
            }
        }
    }
}
