//! MQTT event sink adapter.
//!
//! Implements [`EventSink`] by encoding [`AppEvent`]s into JSON messages
//! (see [`gateway::messages`](crate::gateway::messages)) and handing them
//! to a [`Publisher`].  This is the "push" direction: the controller
//! reports to the remote application.

use log::warn;

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;
use crate::gateway::messages::encode;
use crate::gateway::transport::Publisher;

/// Adapter that publishes every [`AppEvent`] on its `dropster/*` topic.
pub struct MqttEventSink<P: Publisher> {
    publisher: P,
    failures: u32,
}

impl<P: Publisher> MqttEventSink<P> {
    pub fn new(publisher: P) -> Self {
        Self {
            publisher,
            failures: 0,
        }
    }

    /// Publishes that were dropped since boot.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn publisher_mut(&mut self) -> &mut P {
        &mut self.publisher
    }
}

impl<P: Publisher> EventSink for MqttEventSink<P> {
    fn emit(&mut self, event: &AppEvent) {
        let (topic, payload) = match encode(event) {
            Ok(encoded) => encoded,
            Err(e) => {
                self.failures = self.failures.wrapping_add(1);
                warn!("MQTT sink: cannot encode event: {e}");
                return;
            }
        };
        // Publishing is best effort; the control loop never waits on the
        // broker.
        if let Err(e) = self
            .publisher
            .publish(topic.path(), &payload, topic.retained())
        {
            self.failures = self.failures.wrapping_add(1);
            warn!("MQTT sink: publish to {} failed: {e:?}", topic.path());
        }
    }
}
