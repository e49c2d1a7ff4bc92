//! # Corroute
//!
//! **Corroute** is a transport session and pattern-routing engine for Rust,
//! built on the `may` coroutine runtime.
//!
//! ## Overview
//!
//! Corroute gives a message-oriented service two things: a correlated
//! request/response session over a shared connection, and a pattern-keyed
//! route table for dispatching the packets that arrive on it. Patterns use
//! an MQTT/HTTP-flavoured grammar (`:name`, `${name}`, `+`, `*`, `**`, a
//! trailing `/#`) compiled into anchored regexes, with first-match-wins
//! resolution in registration order.
//!
//! ## Architecture
//!
//! The library is organized into several key modules:
//!
//! - **[`packet`]** - The wire unit: correlation id, address, headers,
//!   payload, and the codec seam
//! - **[`session`]** - Correlated request/response over a shared connection,
//!   with close and timeout signals merged into the waiters
//! - **[`matcher`]** - Pattern grammar, parameter expansion, and the
//!   compiled-regex matcher
//! - **[`router`]** - Pattern-keyed route table with handlers, handler
//!   lists, controller routes, nested and deferred child routers
//! - **[`controller`]** - Route entries backed by a type's annotated
//!   operations, resolved lazily and cached
//! - **[`middleware`]** - Handler units and the done-flag composer
//!
//! ## Example
//!
//! ```no_run
//! use corroute::middleware::Handler;
//! use corroute::packet::Packet;
//! use corroute::router::Router;
//!
//! let mut router = Router::new();
//! router
//!     .use_route(
//!         "device/:id/used",
//!         Handler::from_fn(|ctx| {
//!             let device = ctx.get_param("id").unwrap_or("?").to_string();
//!             let reply = Packet::response_to(&ctx.packet)
//!                 .with_payload(serde_json::json!({ "device": device }));
//!             ctx.respond(reply);
//!             Ok(())
//!         }),
//!     )
//!     .unwrap();
//! ```
//!
//! ## Concurrency Model
//!
//! Sessions run on `may` coroutines: one pump coroutine demultiplexes
//! inbound packets to pending waiters by correlation id, and timed requests
//! spawn a timer coroutine that fails the waiter after the deadline. Router
//! configuration assumes a single configuring owner; dispatch is read-only
//! and borrows the table immutably.

pub mod context;
pub mod controller;
pub mod error;
pub mod matcher;
pub mod middleware;
pub mod packet;
pub mod router;
pub mod session;

pub use context::RouteContext;
pub use controller::{ControllerRoute, OperationMeta};
pub use error::RoutingError;
pub use matcher::{ParamValue, RouteMatcher};
pub use middleware::{compose, Handler, RouteMiddleware};
pub use packet::{CorrelationId, Packet, PacketCodec, RawMessage};
pub use router::{RouteEntry, RouteSpec, Router};
pub use session::{CorrelationAllocator, TransportSession};
