//! Inbound message channel.
//!
//! Uses an `embassy-sync` bounded channel to bridge the transport's
//! receive callback with the synchronous control loop, without heap
//! allocation.
//!
//! ```text
//! ┌──────────────┐ InboundMessage ┌──────────────┐
//! │ MQTT client  │───────────────▶│ Control loop │
//! │ (callback)   │                │ (Gateway)    │
//! └──────────────┘                └──────────────┘
//! ```

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use heapless::Vec;

use crate::error::CommsError;
use crate::time::Millis;

/// Largest accepted control payload (a full fragment plus envelope).
pub const MAX_INBOUND_PAYLOAD: usize = 640;

/// Channel depth for inbound messages.
pub const INBOUND_DEPTH: usize = 8;

/// One message received on the control topic.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub payload: Vec<u8, MAX_INBOUND_PAYLOAD>,
    /// Clock reading when the transport handed the message over.
    pub received_at: Millis,
}

impl InboundMessage {
    pub fn new(payload: &[u8], received_at: Millis) -> Result<Self, CommsError> {
        let payload = Vec::from_slice(payload).map_err(|()| CommsError::PayloadTooLarge)?;
        Ok(Self {
            payload,
            received_at,
        })
    }
}

pub type InboundChannel = Channel<CriticalSectionRawMutex, InboundMessage, INBOUND_DEPTH>;

/// Inbound channel: transport callback → control loop.
pub static INBOUND_CHANNEL: InboundChannel = Channel::new();

/// Queue a received payload without blocking.  Called from the transport
/// context; oversize payloads and a full queue are dropped.
pub fn push_inbound(
    channel: &InboundChannel,
    payload: &[u8],
    received_at: Millis,
) -> Result<(), CommsError> {
    let msg = InboundMessage::new(payload, received_at)?;
    channel.try_send(msg).map_err(|_| CommsError::QueueFull)
}
