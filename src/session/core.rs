//! Transport session: correlated request/response over one connection.
//!
//! A [`TransportSession`] owns a connection-like resource behind a [`Wire`]
//! adapter and multiplexes packets over it. The key invariant mirrors the
//! dispatcher it is modeled on: only the pump coroutine consumes raw inbound
//! messages — every other interested party is fed through a channel.
//!
//! ```text
//!                    ┌──────────────────────────────────┐
//!                    │         TransportSession         │
//!                    ├──────────────────────────────────┤
//!                    │  wire: W (duplex | topic)        │
//!                    │  pending: id -> Sender<Arrival>  │
//!                    │  allocator: CorrelationAllocator │
//!                    └──────────────┬───────────────────┘
//!                                   │
//!                             pump coroutine
//!                                   │
//!          ┌────────────────────────┼────────────────────────┐
//!          │                        │                        │
//!   pending waiter?          reply-suffix topic?       everything else
//!          │                        │                        │
//!   deliver Response          drop (server-side        forward to the
//!   to the caller             inbound filter)          inbound stream
//! ```
//!
//! Close, timeout, and response are merged into a single per-request channel
//! as tagged [`Arrival`] events; whichever event removes the pending entry
//! first wins, so a caller can never hang on a dead connection.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use may::coroutine;
use may::sync::mpsc;
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use super::allocator::CorrelationAllocator;
use crate::error::RoutingError;
use crate::packet::{CorrelationId, Packet, PacketCodec, RawMessage, REPLY_SUFFIX};

/// Duplex, stream-oriented connection: raw bytes in both directions.
pub trait DuplexConnection: Send + Sync + 'static {
    /// Write encoded packet bytes to the stream.
    fn write(&self, bytes: &[u8]) -> Result<(), RoutingError>;
}

/// Topic-based pub/sub connection.
pub trait TopicConnection: Send + Sync + 'static {
    /// Publish encoded packet bytes to a topic.
    fn publish(&self, topic: &str, bytes: &[u8]) -> Result<(), RoutingError>;
    /// Subscribe to a topic.
    fn subscribe(&self, topic: &str) -> Result<(), RoutingError>;
    /// Unsubscribe from a topic.
    fn unsubscribe(&self, topic: &str) -> Result<(), RoutingError>;
}

/// Transport-variant seam between the session core and a connection.
pub trait Wire: Send + Sync + 'static {
    /// Transmit an encoded packet.
    fn transmit(&self, packet: &Packet, bytes: &[u8]) -> Result<(), RoutingError>;

    /// Hook run before a request is sent. Topic wires subscribe the derived
    /// reply topic here.
    fn prepare_request(&self, _packet: &Packet) -> Result<(), RoutingError> {
        Ok(())
    }

    /// True if the raw message arrived on a reply channel and must be kept
    /// out of the general server-side inbound stream.
    fn is_reply_channel(&self, _raw: &RawMessage) -> bool {
        false
    }

    /// Release transport-side resources on session teardown.
    fn teardown(&self) {}
}

/// Wire over a duplex byte stream.
pub struct DuplexWire<C: DuplexConnection> {
    conn: C,
}

impl<C: DuplexConnection> DuplexWire<C> {
    /// Wrap a duplex connection.
    #[must_use]
    pub fn new(conn: C) -> Self {
        DuplexWire { conn }
    }
}

impl<C: DuplexConnection> Wire for DuplexWire<C> {
    fn transmit(&self, _packet: &Packet, bytes: &[u8]) -> Result<(), RoutingError> {
        self.conn.write(bytes)
    }
}

/// Wire over a topic-based connection. Tracks the reply topics it has
/// subscribed so teardown can unsubscribe them all.
pub struct TopicWire<C: TopicConnection> {
    conn: C,
    subscribed: Mutex<HashSet<String>>,
}

impl<C: TopicConnection> TopicWire<C> {
    /// Wrap a topic connection.
    #[must_use]
    pub fn new(conn: C) -> Self {
        TopicWire {
            conn,
            subscribed: Mutex::new(HashSet::new()),
        }
    }

    /// Reply topics currently subscribed.
    #[must_use]
    pub fn subscribed_topics(&self) -> Vec<String> {
        self.subscribed.lock().iter().cloned().collect()
    }
}

impl<C: TopicConnection> Wire for TopicWire<C> {
    fn transmit(&self, packet: &Packet, bytes: &[u8]) -> Result<(), RoutingError> {
        if packet.address.is_empty() {
            return Err(RoutingError::bad_request(
                "topic session cannot publish a packet with no resolvable topic",
            ));
        }
        self.conn.publish(&packet.address, bytes)
    }

    fn prepare_request(&self, packet: &Packet) -> Result<(), RoutingError> {
        let reply = packet.reply_topic();
        let newly = self.subscribed.lock().insert(reply.clone());
        if newly {
            debug!(reply_topic = %reply, "Subscribing reply topic before first use");
            if let Err(e) = self.conn.subscribe(&reply) {
                self.subscribed.lock().remove(&reply);
                return Err(e);
            }
        }
        Ok(())
    }

    fn is_reply_channel(&self, raw: &RawMessage) -> bool {
        raw.topic
            .as_deref()
            .map(|t| t.ends_with(REPLY_SUFFIX))
            .unwrap_or(false)
    }

    fn teardown(&self) {
        let drained: Vec<String> = self.subscribed.lock().drain().collect();
        for topic in drained {
            if let Err(e) = self.conn.unsubscribe(&topic) {
                warn!(reply_topic = %topic, error = %e, "Failed to unsubscribe reply topic");
            }
        }
    }
}

/// Event delivered to a pending request waiter. First event wins.
enum Arrival {
    Response(Packet),
    Closed,
    TimedOut,
}

type PendingMap = Arc<Mutex<HashMap<CorrelationId, mpsc::Sender<Arrival>>>>;

/// Correlated transport session over one connection.
///
/// Multiple `request()` calls may be in flight at once; responses pair up
/// strictly by correlation id, so out-of-order arrival is fine. Closing the
/// connection fails every outstanding operation promptly instead of leaving
/// callers hanging.
pub struct TransportSession<W: Wire> {
    wire: Arc<W>,
    codec: Arc<dyn PacketCodec>,
    allocator: Mutex<CorrelationAllocator>,
    pending: PendingMap,
    inbound_tx: Mutex<Option<mpsc::Sender<Packet>>>,
    inbound_rx: Mutex<Option<mpsc::Receiver<Packet>>>,
    closed: Arc<AtomicBool>,
    timeout: Option<Duration>,
}

impl<W: Wire> TransportSession<W> {
    /// Create a session over `wire` with an optional `request()` timeout.
    #[must_use]
    pub fn new(wire: W, codec: Arc<dyn PacketCodec>, timeout: Option<Duration>) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel();
        TransportSession {
            wire: Arc::new(wire),
            codec,
            allocator: Mutex::new(CorrelationAllocator::new()),
            pending: Arc::new(Mutex::new(HashMap::new())),
            inbound_tx: Mutex::new(Some(inbound_tx)),
            inbound_rx: Mutex::new(Some(inbound_rx)),
            closed: Arc::new(AtomicBool::new(false)),
            timeout,
        }
    }

    /// Access the wire adapter (e.g. to inspect subscribed reply topics).
    #[must_use]
    pub fn wire(&self) -> &W {
        &self.wire
    }

    /// True once the connection has closed or the session was destroyed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Start the pump coroutine that demultiplexes `raw_rx`.
    ///
    /// The pump is the only consumer of raw inbound messages. When `raw_rx`
    /// closes (the connection is gone), every pending waiter fails with
    /// `Closed` and the inbound stream ends.
    ///
    /// # Safety
    ///
    /// `may::coroutine::spawn()` is unsafe by the runtime's contract. The
    /// caller must ensure the may runtime is initialized and that this
    /// session outlives nothing the coroutine touches — the coroutine holds
    /// its own `Arc` clones, so dropping the session handle is fine.
    pub unsafe fn start(self: &Arc<Self>, raw_rx: mpsc::Receiver<RawMessage>) {
        let session = Arc::clone(self);
        let inbound_tx = session.inbound_tx.lock().take();
        // SAFETY: see function-level contract; the coroutine owns Arc clones
        // of everything it touches.
        unsafe {
            coroutine::spawn(move || {
                debug!("Session pump start");
                for raw in raw_rx.iter() {
                    let packet = match session.codec.decode(&raw) {
                        Ok(p) => p,
                        Err(e) => {
                            warn!(error = %e, "Dropping undecodable inbound message");
                            continue;
                        }
                    };

                    if let Some(id) = packet.id.clone() {
                        let waiter = session.pending.lock().remove(&id);
                        if let Some(tx) = waiter {
                            debug!(correlation_id = %id, "Correlated response delivered");
                            let _ = tx.send(Arrival::Response(packet));
                            continue;
                        }
                    }

                    if session.wire.is_reply_channel(&raw) {
                        debug!(
                            topic = raw.topic.as_deref().unwrap_or_default(),
                            "Filtered reply-channel message from inbound stream"
                        );
                        continue;
                    }

                    if let Some(tx) = inbound_tx.as_ref() {
                        if tx.send(packet).is_err() {
                            // Inbound receiver dropped; keep pumping so
                            // correlated requests still resolve.
                            debug!("Inbound stream receiver dropped");
                        }
                    }
                }

                info!("Connection closed; failing outstanding operations");
                session.closed.store(true, Ordering::SeqCst);
                let drained: Vec<_> = session.pending.lock().drain().collect();
                for (id, tx) in drained {
                    debug!(correlation_id = %id, "Pending request failed by close");
                    let _ = tx.send(Arrival::Closed);
                }
                // inbound_tx drops here, ending the inbound stream.
            });
        }
    }

    /// Serialize and transmit a packet.
    pub fn send(&self, packet: &Packet) -> Result<(), RoutingError> {
        if self.is_closed() {
            return Err(RoutingError::Closed);
        }
        let bytes = self.codec.encode(packet)?;
        self.wire.transmit(packet, &bytes)
    }

    /// Send a request and wait for its correlated response.
    ///
    /// Allocates a correlation id when the packet has none, subscribes the
    /// reply channel on topic wires, sends, and blocks the calling coroutine
    /// until the first of: the correlated response, the configured timeout,
    /// or connection close.
    pub fn request(&self, mut packet: Packet) -> Result<Packet, RoutingError> {
        if self.is_closed() {
            return Err(RoutingError::Closed);
        }

        let id = match packet.id.clone() {
            Some(id) => id,
            None => {
                let n = self.allocator.lock().alloc()?;
                let id = CorrelationId::Num(n);
                packet.id = Some(id.clone());
                id
            }
        };

        self.wire.prepare_request(&packet)?;

        let (tx, rx) = mpsc::channel();
        self.pending.lock().insert(id.clone(), tx);

        // The pump may have drained pending between the closed check and the
        // insert; re-check so this entry cannot be stranded.
        if self.is_closed() {
            self.pending.lock().remove(&id);
            return Err(RoutingError::Closed);
        }

        if let Err(e) = self.send(&packet) {
            self.pending.lock().remove(&id);
            return Err(e);
        }

        info!(
            correlation_id = %id,
            address = %packet.address,
            "Request in flight"
        );

        if let Some(window) = self.timeout {
            let pending = Arc::clone(&self.pending);
            let timer_id = id.clone();
            // SAFETY: may::coroutine::spawn() is unsafe by the runtime's
            // contract; the timer owns Arc clones of the pending map only.
            unsafe {
                coroutine::spawn(move || {
                    coroutine::sleep(window);
                    if let Some(tx) = pending.lock().remove(&timer_id) {
                        warn!(correlation_id = %timer_id, timeout_ms = window.as_millis() as u64, "Request timed out");
                        let _ = tx.send(Arrival::TimedOut);
                    }
                });
            }
        }

        match rx.recv() {
            Ok(Arrival::Response(response)) => Ok(response),
            Ok(Arrival::TimedOut) => Err(RoutingError::Timeout),
            Ok(Arrival::Closed) => Err(RoutingError::Closed),
            Err(e) => {
                error!(correlation_id = %id, error = %e, "Request waiter channel dropped");
                Err(RoutingError::Closed)
            }
        }
    }

    /// Take the inbound packet stream.
    ///
    /// Single consumer: the stream can be taken exactly once. Correlated
    /// responses and reply-channel traffic never appear here.
    pub fn receive(&self) -> Result<mpsc::Receiver<Packet>, RoutingError> {
        self.inbound_rx.lock().take().ok_or_else(|| {
            RoutingError::bad_request("inbound stream was already taken from this session")
        })
    }

    /// Tear the session down: unsubscribe tracked reply topics, mark the
    /// session closed, and fail every outstanding request.
    pub fn destroy(&self) {
        self.wire.teardown();
        self.closed.store(true, Ordering::SeqCst);
        let drained: Vec<_> = self.pending.lock().drain().collect();
        for (id, tx) in drained {
            debug!(correlation_id = %id, "Pending request failed by destroy");
            let _ = tx.send(Arrival::Closed);
        }
        // Drop our inbound sender so a pump-less session's stream also ends.
        self.inbound_tx.lock().take();
    }
}
