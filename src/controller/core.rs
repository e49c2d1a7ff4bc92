use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use http::Method;
use parking_lot::Mutex;
use regex::Regex;
use tracing::{debug, info};

use crate::context::RouteContext;
use crate::error::RoutingError;
use crate::middleware::{compose, Handler};

/// Operation invoker supplied by the host alongside the operation metadata.
pub type OpInvoker = dyn Fn(&mut RouteContext) -> Result<(), RoutingError> + Send + Sync;

/// One annotated operation of a controller type.
///
/// Discovery is the host's concern; this crate consumes the extracted list.
/// `regex` is set when the declared route carries regex-significant
/// constructs and is matched against the normalized sub-path as an
/// alternative to exact string equality.
#[derive(Clone)]
pub struct OperationMeta {
    /// Operation (method) name, used as the handler-cache key
    pub name: String,
    /// Declared verb
    pub verb: Method,
    /// Declared route string, e.g. `/a` or `/a/:id`
    pub route: String,
    /// Compiled route regex, when the route is not a plain string
    pub regex: Option<Regex>,
    /// Invoker bound to the resolved operation
    pub invoke: Arc<OpInvoker>,
}

impl std::fmt::Debug for OperationMeta {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationMeta")
            .field("name", &self.name)
            .field("verb", &self.verb)
            .field("route", &self.route)
            .field("regex", &self.regex.as_ref().map(Regex::as_str))
            .finish()
    }
}

/// Router entry backed by a controller type's annotated operations.
///
/// Operations are scanned shortest-declared-route-first, so `/a` is checked
/// before `/a/:id` and a request to `/a` can never land on the parameterized
/// operation. Concrete handlers are built on first use and cached by
/// operation name for the life of the instance.
pub struct ControllerRoute {
    prefix: String,
    ops: Mutex<Vec<OperationMeta>>,
    interceptors: Vec<Handler>,
    built: Mutex<HashMap<String, Handler>>,
    destroyed: AtomicBool,
}

impl ControllerRoute {
    /// Bind a controller's operations under `prefix`.
    ///
    /// `interceptors` are route-level handlers composed around every built
    /// operation handler, in order, ahead of the operation itself.
    #[must_use]
    pub fn new(prefix: impl Into<String>, mut ops: Vec<OperationMeta>) -> Self {
        ops.sort_by_key(|op| op.route.len());
        ControllerRoute {
            prefix: prefix.into(),
            ops: Mutex::new(ops),
            interceptors: Vec::new(),
            built: Mutex::new(HashMap::new()),
            destroyed: AtomicBool::new(false),
        }
    }

    /// Attach route-level interceptors composed ahead of every operation.
    #[must_use]
    pub fn with_interceptors(mut self, interceptors: Vec<Handler>) -> Self {
        self.interceptors = interceptors;
        self
    }

    /// The prefix this controller is mounted under.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Rebind the mount prefix. Used when a lazily loaded route group is
    /// attached under its parent route's path.
    pub fn set_prefix(&mut self, prefix: impl Into<String>) {
        self.prefix = prefix.into();
    }

    /// Resolve and invoke the operation matching the context.
    pub fn dispatch(&self, ctx: &mut RouteContext) -> Result<(), RoutingError> {
        if self.destroyed.load(Ordering::SeqCst) {
            return Err(RoutingError::Destroyed);
        }

        let sub = self.normalize(&ctx.path);
        let matched = {
            let ops = self.ops.lock();
            ops.iter()
                .find(|op| {
                    op.verb == ctx.method
                        && (op.route == sub
                            || op.regex.as_ref().map(|r| r.is_match(&sub)).unwrap_or(false))
                })
                .cloned()
        };

        let op = match matched {
            Some(op) => op,
            None => {
                debug!(path = %ctx.path, verb = %ctx.method, "No controller operation matched");
                return Err(RoutingError::NotFound {
                    path: ctx.path.clone(),
                });
            }
        };

        ctx.extract_params(&op.route, &sub);
        if !ctx.params.is_empty() {
            debug!(route = %op.route, params = ?ctx.params, "Extracted path parameters");
        }

        let handler = self.handler_for(&op);
        handler.call(ctx)
    }

    /// Drop the cached handlers and the operation list. The instance must
    /// not be reused afterwards; further dispatch fails with `Destroyed`.
    pub fn destroy(&self) {
        self.destroyed.store(true, Ordering::SeqCst);
        self.built.lock().clear();
        self.ops.lock().clear();
        info!(prefix = %self.prefix, "Controller route destroyed");
    }

    /// Number of handlers built so far (cache introspection for tests).
    #[must_use]
    pub fn built_handlers(&self) -> usize {
        self.built.lock().len()
    }

    fn handler_for(&self, op: &OperationMeta) -> Handler {
        if let Some(h) = self.built.lock().get(&op.name) {
            return h.clone();
        }
        debug!(operation = %op.name, route = %op.route, "Building controller handler");
        let invoke = Arc::clone(&op.invoke);
        let mut units = self.interceptors.clone();
        units.push(Handler::Func(invoke));
        let handler = compose(units);
        self.built
            .lock()
            .insert(op.name.clone(), handler.clone());
        handler
    }

    fn normalize(&self, path: &str) -> String {
        let rest = path.strip_prefix(self.prefix.as_str()).unwrap_or(path);
        if rest.starts_with('/') {
            rest.to_string()
        } else {
            format!("/{}", rest)
        }
    }
}
