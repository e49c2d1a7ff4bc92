#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::{Arc, Once};

use parking_lot::Mutex;

use corroute::error::RoutingError;
use corroute::packet::{CorrelationId, Packet, PacketCodec, RawMessage};
use corroute::session::{DuplexConnection, TopicConnection};

/// Ensures May coroutines are configured only once.
static MAY_INIT: Once = Once::new();

pub fn setup_may_runtime() {
    MAY_INIT.call_once(|| {
        may::config().set_stack_size(0x8000);
    });
}

/// JSON codec for tests. Headers stay local to a process in these tests, so
/// only id, address, payload, and reply topic cross the wire.
pub struct JsonCodec;

impl PacketCodec for JsonCodec {
    fn encode(&self, packet: &Packet) -> Result<Vec<u8>, RoutingError> {
        let value = serde_json::json!({
            "id": packet.id,
            "address": packet.address,
            "payload": packet.payload,
            "reply_to": packet.reply_to,
        });
        serde_json::to_vec(&value).map_err(|e| RoutingError::codec(e.to_string()))
    }

    fn decode(&self, raw: &RawMessage) -> Result<Packet, RoutingError> {
        let value: serde_json::Value =
            serde_json::from_slice(&raw.bytes).map_err(|e| RoutingError::codec(e.to_string()))?;
        let id: Option<CorrelationId> = match value.get("id") {
            None | Some(serde_json::Value::Null) => None,
            Some(v) => Some(
                serde_json::from_value(v.clone())
                    .map_err(|e| RoutingError::codec(e.to_string()))?,
            ),
        };
        let mut packet = Packet::request(
            value
                .get("address")
                .and_then(|v| v.as_str())
                .unwrap_or_default(),
        );
        packet.id = id;
        packet.payload = value.get("payload").cloned().filter(|v| !v.is_null());
        packet.reply_to = value
            .get("reply_to")
            .and_then(|v| v.as_str())
            .map(String::from);
        Ok(packet)
    }
}

/// Duplex connection that records every written frame.
#[derive(Default)]
pub struct MemoryDuplex {
    pub written: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl MemoryDuplex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_count(&self) -> usize {
        self.written.lock().len()
    }

    pub fn frame(&self, i: usize) -> Option<Vec<u8>> {
        self.written.lock().get(i).cloned()
    }
}

impl DuplexConnection for MemoryDuplex {
    fn write(&self, bytes: &[u8]) -> Result<(), RoutingError> {
        self.written.lock().push(bytes.to_vec());
        Ok(())
    }
}

/// Topic connection that records publishes and tracks subscriptions.
#[derive(Default)]
pub struct MemoryTopic {
    pub published: Arc<Mutex<Vec<(String, Vec<u8>)>>>,
    pub subscriptions: Arc<Mutex<HashSet<String>>>,
}

impl MemoryTopic {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_subscribed(&self, topic: &str) -> bool {
        self.subscriptions.lock().contains(topic)
    }
}

impl TopicConnection for MemoryTopic {
    fn publish(&self, topic: &str, bytes: &[u8]) -> Result<(), RoutingError> {
        self.published.lock().push((topic.to_string(), bytes.to_vec()));
        Ok(())
    }

    fn subscribe(&self, topic: &str) -> Result<(), RoutingError> {
        self.subscriptions.lock().insert(topic.to_string());
        Ok(())
    }

    fn unsubscribe(&self, topic: &str) -> Result<(), RoutingError> {
        self.subscriptions.lock().remove(topic);
        Ok(())
    }
}
