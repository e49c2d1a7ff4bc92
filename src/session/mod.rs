//! # Session Module
//!
//! Correlated request/response over a shared connection.
//!
//! ## Overview
//!
//! A [`TransportSession`] wraps a connection-like resource and provides:
//!
//! - `send` — encode and transmit a packet
//! - `request` — send plus a bounded wait for the correlated response
//! - `receive` — the inbound packet stream, with reply-channel traffic
//!   filtered out on the serving side
//! - `destroy` — teardown that fails everything still outstanding
//!
//! Correlation identifiers come from a bounded [`CorrelationAllocator`] owned
//! exclusively by the session. Two wire variants adapt the session core to
//! its connection: [`DuplexWire`] writes raw bytes to a stream,
//! [`TopicWire`] publishes to topics and tracks the reply topics it
//! subscribes.
//!
//! ## Concurrency
//!
//! One pump coroutine consumes raw inbound messages and routes each decoded
//! packet either to the pending waiter with the matching correlation id or
//! onto the inbound stream. Close and timeout signals are merged into the
//! same per-request channel as the response, so no caller blocks past the
//! lifetime of the connection.

mod allocator;
mod core;

pub use allocator::{CorrelationAllocator, POOL_MAX, POOL_MIN};
pub use core::{
    DuplexConnection, DuplexWire, TopicConnection, TopicWire, TransportSession, Wire,
};
