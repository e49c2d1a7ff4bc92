//! Per-message routing context.
//!
//! One [`RouteContext`] is created per inbound packet and threaded through the
//! handler chain. Handlers write their result into the response slot and mark
//! the context done to stop the remaining chain.

use std::sync::Arc;

use http::Method;
use smallvec::SmallVec;

use crate::packet::Packet;

/// Maximum number of extracted path parameters before heap allocation.
/// Most routes declare well under eight parameters.
pub const MAX_INLINE_PARAMS: usize = 8;

/// Stack-allocated parameter storage. Names come from the route table and use
/// `Arc<str>`; values are per-request strings cut out of the address.
pub type ParamVec = SmallVec<[(Arc<str>, String); MAX_INLINE_PARAMS]>;

/// Mutable context carried through dispatch for one inbound packet.
#[derive(Debug, Clone)]
pub struct RouteContext {
    /// The inbound packet being routed
    pub packet: Packet,
    /// Request verb, taken from the packet's `method` header (GET when absent)
    pub method: Method,
    /// Address under resolution; routers strip their prefix from this copy,
    /// leaving `packet.address` untouched
    pub path: String,
    /// Path parameters extracted during matching
    pub params: ParamVec,
    /// Response produced by a handler, if any
    pub response: Option<Packet>,
    /// Set by a handler to short-circuit the rest of the chain
    pub done: bool,
}

impl RouteContext {
    /// Build a context for an inbound packet.
    ///
    /// The verb is parsed from a `method` header when one is present and
    /// parses as an HTTP method; everything else routes as GET. Topic-style
    /// traffic usually never sets the header.
    #[must_use]
    pub fn new(packet: Packet) -> Self {
        let method = packet
            .get_header("method")
            .and_then(|v| v.first())
            .and_then(|v| v.to_ascii_uppercase().parse::<Method>().ok())
            .unwrap_or(Method::GET);
        let path = packet.address.clone();
        RouteContext {
            packet,
            method,
            path,
            params: ParamVec::new(),
            response: None,
            done: false,
        }
    }

    /// Get an extracted path parameter by name.
    ///
    /// Last write wins: when nested routers extract the same name at
    /// different depths, the innermost extraction is returned.
    #[inline]
    #[must_use]
    pub fn get_param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .rfind(|(k, _)| k.as_ref() == name)
            .map(|(_, v)| v.as_str())
    }

    /// Positional parameter extraction: split the declared route and the
    /// actual path by `/` and take the path token at each `:name` / `${name}`
    /// segment's index.
    pub fn extract_params(&mut self, route: &str, actual: &str) {
        if !route.contains(':') && !route.contains("${") {
            return;
        }
        let declared: Vec<&str> = route.split('/').collect();
        let actual: Vec<&str> = actual.split('/').collect();
        for (i, seg) in declared.iter().enumerate() {
            let name = seg
                .strip_prefix(':')
                .or_else(|| seg.strip_prefix("${").and_then(|s| s.strip_suffix('}')));
            if let (Some(name), Some(value)) = (name, actual.get(i)) {
                self.params.push((Arc::from(name), (*value).to_string()));
            }
        }
    }

    /// Record a response and mark the context done.
    pub fn respond(&mut self, response: Packet) {
        self.response = Some(response);
        self.done = true;
    }

    /// Mark the context done without producing a response.
    pub fn finish(&mut self) {
        self.done = true;
    }
}
