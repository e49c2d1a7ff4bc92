//! Logical packet model shared by sessions and the router.
//!
//! A [`Packet`] is the unit exchanged over a transport session: a correlation
//! id, an address (URL-like path or topic string), an ordered header list, an
//! opaque payload, and an optional explicit reply topic. Request and response
//! are role-tagged views of the same shape; a response's id must equal the
//! originating request's id.
//!
//! Byte-level encoding is not defined here. The [`PacketCodec`] trait is the
//! seam through which a host supplies its wire format.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use smallvec::SmallVec;

use crate::error::RoutingError;

/// Maximum number of inline headers before heap allocation.
/// Most packets carry only a handful of headers.
pub const MAX_INLINE_HEADERS: usize = 16;

/// Ordered header storage. Duplicate keys are allowed; lookup helpers use
/// first-match semantics. Header names use `Arc<str>` because the same names
/// repeat across packets and `Arc::clone()` is O(1).
pub type HeaderVec = SmallVec<[(Arc<str>, HeaderValue); MAX_INLINE_HEADERS]>;

/// Suffix appended to a request topic to derive its reply topic.
pub const REPLY_SUFFIX: &str = "/reply";

/// Correlation identifier pairing a response packet to its request.
///
/// Session-allocated ids are small integers; hosts may also supply string ids
/// (e.g. pre-existing message ids from an external broker).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CorrelationId {
    /// Integer id issued by the session's allocator
    Num(u64),
    /// Host-supplied string id
    Str(String),
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CorrelationId::Num(n) => write!(f, "{}", n),
            CorrelationId::Str(s) => write!(f, "{}", s),
        }
    }
}

impl From<u64> for CorrelationId {
    fn from(n: u64) -> Self {
        CorrelationId::Num(n)
    }
}

impl From<&str> for CorrelationId {
    fn from(s: &str) -> Self {
        CorrelationId::Str(s.to_string())
    }
}

impl FromStr for CorrelationId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(s.parse::<u64>()
            .map(CorrelationId::Num)
            .unwrap_or_else(|_| CorrelationId::Str(s.to_string())))
    }
}

/// A header value: a single string or a repeated string list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HeaderValue {
    /// Single-valued header
    One(String),
    /// Multi-valued header
    Many(Vec<String>),
}

impl HeaderValue {
    /// First value, regardless of arity.
    #[must_use]
    pub fn first(&self) -> Option<&str> {
        match self {
            HeaderValue::One(v) => Some(v.as_str()),
            HeaderValue::Many(vs) => vs.first().map(String::as_str),
        }
    }
}

impl From<&str> for HeaderValue {
    fn from(v: &str) -> Self {
        HeaderValue::One(v.to_string())
    }
}

impl From<String> for HeaderValue {
    fn from(v: String) -> Self {
        HeaderValue::One(v)
    }
}

/// Logical packet exchanged over a transport session.
///
/// Immutable after send by convention: sessions never mutate a packet they
/// were handed, except to assign a correlation id to an id-less request.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    /// Correlation identifier; unset until assigned by the session or host
    pub id: Option<CorrelationId>,
    /// URL-like path or topic string
    pub address: String,
    /// Ordered header list
    pub headers: HeaderVec,
    /// Decoded payload, if any
    pub payload: Option<Value>,
    /// Explicit reply topic (topic-based transports only)
    pub reply_to: Option<String>,
}

impl Packet {
    /// Create a request packet addressed to `address` with no id assigned.
    #[must_use]
    pub fn request(address: impl Into<String>) -> Self {
        Packet {
            id: None,
            address: address.into(),
            headers: HeaderVec::new(),
            payload: None,
            reply_to: None,
        }
    }

    /// Create a response packet correlated to `request`.
    ///
    /// The response carries the request's id and is addressed to the
    /// request's reply topic.
    #[must_use]
    pub fn response_to(request: &Packet) -> Self {
        Packet {
            id: request.id.clone(),
            address: request.reply_topic(),
            headers: HeaderVec::new(),
            payload: None,
            reply_to: None,
        }
    }

    /// Builder-style payload assignment.
    #[must_use]
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Builder-style header append.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<HeaderValue>) -> Self {
        self.headers.push((Arc::from(name), value.into()));
        self
    }

    /// Get a header by name (case-insensitive), first occurrence wins.
    #[inline]
    #[must_use]
    pub fn get_header(&self, name: &str) -> Option<&HeaderValue> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }

    /// The topic a response to this packet travels over: `reply_to` if
    /// present, else `address + "/reply"`.
    #[must_use]
    pub fn reply_topic(&self) -> String {
        match &self.reply_to {
            Some(t) => t.clone(),
            None => format!("{}{}", self.address, REPLY_SUFFIX),
        }
    }

    /// True if this packet correlates to `request` (equal, assigned ids).
    #[must_use]
    pub fn correlates_to(&self, request: &Packet) -> bool {
        match (&self.id, &request.id) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

/// Raw inbound message as delivered by a connection, before decoding.
///
/// Topic-based connections set `topic`; duplex byte streams leave it unset.
#[derive(Debug, Clone)]
pub struct RawMessage {
    /// Topic the message arrived on, for topic-based transports
    pub topic: Option<String>,
    /// Undecoded message bytes
    pub bytes: Vec<u8>,
}

impl RawMessage {
    /// A raw message with no topic (duplex transports).
    #[must_use]
    pub fn bytes(bytes: Vec<u8>) -> Self {
        RawMessage { topic: None, bytes }
    }

    /// A raw message tagged with the topic it arrived on.
    #[must_use]
    pub fn on_topic(topic: impl Into<String>, bytes: Vec<u8>) -> Self {
        RawMessage {
            topic: Some(topic.into()),
            bytes,
        }
    }
}

/// Wire codec seam. Supplied by the host; this crate never defines a byte
/// layout of its own.
pub trait PacketCodec: Send + Sync + 'static {
    /// Serialize a packet for transmission.
    fn encode(&self, packet: &Packet) -> Result<Vec<u8>, RoutingError>;

    /// Decode a raw inbound message into a packet.
    fn decode(&self, raw: &RawMessage) -> Result<Packet, RoutingError>;
}
