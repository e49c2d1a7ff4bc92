//! Handler units and the middleware composer.
//!
//! A route-table entry ultimately runs one or more [`Handler`]s. A handler is
//! either a plain closure or an object implementing [`RouteMiddleware`]; the
//! closed enum keeps dispatch a `match` instead of runtime shape-sniffing.
//! [`compose`] reduces an ordered handler list into a single pipeline that
//! stops as soon as the context is marked done.

use std::sync::Arc;

use crate::context::RouteContext;
use crate::error::RoutingError;

/// Boxed handler closure. Writes its result into the context.
pub type HandlerFn = Arc<dyn Fn(&mut RouteContext) -> Result<(), RoutingError> + Send + Sync>;

/// Object-shaped handler unit.
///
/// Implementors can override [`RouteMiddleware::equals`] so `unuse` can remove
/// a logically equal registration even when the `Arc` identity differs.
pub trait RouteMiddleware: Send + Sync {
    /// Process the context. Mark it done to stop the rest of the chain.
    fn invoke(&self, ctx: &mut RouteContext) -> Result<(), RoutingError>;

    /// Logical equality hook used by handler removal. Defaults to false;
    /// identity comparison is handled separately.
    fn equals(&self, _other: &dyn RouteMiddleware) -> bool {
        false
    }
}

/// A handler unit in a route entry: plain closure or middleware object.
#[derive(Clone)]
pub enum Handler {
    /// Plain closure handler
    Func(HandlerFn),
    /// Middleware-like object with an `invoke` method
    Middleware(Arc<dyn RouteMiddleware>),
}

impl Handler {
    /// Wrap a closure as a handler.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&mut RouteContext) -> Result<(), RoutingError> + Send + Sync + 'static,
    {
        Handler::Func(Arc::new(f))
    }

    /// Wrap a middleware object as a handler.
    pub fn from_middleware(mw: Arc<dyn RouteMiddleware>) -> Self {
        Handler::Middleware(mw)
    }

    /// Invoke the handler against the context.
    pub fn call(&self, ctx: &mut RouteContext) -> Result<(), RoutingError> {
        match self {
            Handler::Func(f) => f(ctx),
            Handler::Middleware(mw) => mw.invoke(ctx),
        }
    }

    /// True if `other` is the same registration: pointer identity for both
    /// shapes, falling back to the middleware's `equals` hook.
    #[must_use]
    pub fn same_as(&self, other: &Handler) -> bool {
        match (self, other) {
            (Handler::Func(a), Handler::Func(b)) => Arc::ptr_eq(a, b),
            (Handler::Middleware(a), Handler::Middleware(b)) => {
                Arc::ptr_eq(a, b) || a.equals(other_ref(b)) || b.equals(other_ref(a))
            }
            _ => false,
        }
    }
}

fn other_ref(mw: &Arc<dyn RouteMiddleware>) -> &dyn RouteMiddleware {
    mw.as_ref()
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Handler::Func(_) => f.write_str("Handler::Func"),
            Handler::Middleware(_) => f.write_str("Handler::Middleware"),
        }
    }
}

/// Reduce an ordered handler list into one pipeline handler.
///
/// Units run in order; a unit that marks the context done stops the units
/// after it. Errors propagate immediately.
#[must_use]
pub fn compose(units: Vec<Handler>) -> Handler {
    Handler::from_fn(move |ctx| {
        for unit in &units {
            if ctx.done {
                break;
            }
            unit.call(ctx)?;
        }
        Ok(())
    })
}
