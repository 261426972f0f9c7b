//! Outbound transport abstraction — any topic-based publisher.
//!
//! Concrete implementations:
//! - `EspMqttClient` (ESP-IDF MQTT client) in the firmware binary
//! - recording publishers in tests
//!
//! The [`MqttEventSink`](crate::adapters::mqtt_sink::MqttEventSink) is
//! generic over `Publisher`, so swapping the broker client requires zero
//! changes to message routing.

/// Topic-based message publisher.
pub trait Publisher {
    /// Error type for this transport.
    type Error: core::fmt::Debug;

    /// Publish `payload` on `topic`.  `retained` asks the broker to keep
    /// the message for late subscribers.
    fn publish(&mut self, topic: &str, payload: &[u8], retained: bool) -> Result<(), Self::Error>;
}

/// A null publisher that discards everything.
/// Useful while the broker connection is not up yet.
pub struct NullPublisher;

impl Publisher for NullPublisher {
    type Error = ();

    fn publish(&mut self, _topic: &str, _payload: &[u8], _retained: bool) -> Result<(), ()> {
        Ok(())
    }
}
