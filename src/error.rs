use std::fmt;

/// Failure taxonomy shared by the session and the router.
///
/// Every fallible operation in this crate surfaces one of these variants so
/// callers can branch on the failure class. `Timeout` and `Closed` are
/// deliberately distinct: a bounded `request()` that expires reports
/// `Timeout`, while a connection teardown mid-flight reports `Closed`.
/// Nothing in this crate retries; retry policy belongs to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutingError {
    /// No route-table entry matched the resolved address.
    NotFound {
        /// The address that failed to resolve
        path: String,
    },
    /// A route rejected invocation policy.
    Forbidden {
        /// Human-readable rejection reason
        reason: String,
    },
    /// Malformed correlation or addressing data, e.g. a topic publish with no
    /// resolvable topic.
    BadRequest {
        /// What was malformed
        reason: String,
    },
    /// A `request()` exceeded its configured wait window.
    Timeout,
    /// The correlation-id pool is exhausted. Fatal for the request, not for
    /// the session.
    AllocationFailure,
    /// A plain handler was attached to a pattern already bound to a
    /// controller route.
    ConfigurationConflict {
        /// The pattern both registrations targeted
        pattern: String,
    },
    /// The underlying connection closed while an operation was outstanding.
    Closed,
    /// The packet codec rejected an inbound or outbound packet.
    Codec {
        /// Codec-supplied detail
        reason: String,
    },
    /// The component was destroyed and must not be reused.
    Destroyed,
}

impl fmt::Display for RoutingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoutingError::NotFound { path } => {
                write!(f, "no route matched address '{}'", path)
            }
            RoutingError::Forbidden { reason } => {
                write!(f, "route invocation forbidden: {}", reason)
            }
            RoutingError::BadRequest { reason } => {
                write!(f, "bad request: {}", reason)
            }
            RoutingError::Timeout => {
                write!(f, "request timed out waiting for a correlated response")
            }
            RoutingError::AllocationFailure => {
                write!(f, "correlation-id pool exhausted")
            }
            RoutingError::ConfigurationConflict { pattern } => {
                write!(
                    f,
                    "pattern '{}' is bound to a controller route and cannot take \
                    additional handlers",
                    pattern
                )
            }
            RoutingError::Closed => {
                write!(f, "connection closed while the operation was in flight")
            }
            RoutingError::Codec { reason } => {
                write!(f, "packet codec error: {}", reason)
            }
            RoutingError::Destroyed => {
                write!(f, "component was destroyed and cannot be reused")
            }
        }
    }
}

impl std::error::Error for RoutingError {}

impl RoutingError {
    /// Shorthand for a `BadRequest` with an owned reason.
    pub fn bad_request(reason: impl Into<String>) -> Self {
        RoutingError::BadRequest {
            reason: reason.into(),
        }
    }

    /// Shorthand for a `Codec` failure with an owned reason.
    pub fn codec(reason: impl Into<String>) -> Self {
        RoutingError::Codec {
            reason: reason.into(),
        }
    }
}
