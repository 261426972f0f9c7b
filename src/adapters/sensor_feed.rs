//! Sensor feed adapter.
//!
//! Sensor drivers (I²C, UART, ultrasonic echo timing) run in their own
//! context and push finished samples into a bounded `embassy-sync`
//! channel.  [`SensorFeed`] drains that channel and serves the domain
//! through [`SensorPort`] without ever blocking on a bus:
//!
//! ```text
//! ┌──────────────┐ SensorSample ┌────────────┐ read(kind) ┌───────────┐
//! │ driver tasks │─────────────▶│ SensorFeed │───────────▶│ SensorHub │
//! └──────────────┘              └────────────┘            └───────────┘
//! ```
//!
//! Each sample is handed out once.  A channel with nothing new since the
//! previous read reports an invalid sample; the hub keeps its last good
//! value until that goes stale.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use log::debug;

use crate::app::ports::SensorPort;
use crate::error::CommsError;
use crate::sensors::{SensorKind, SensorSample};
use crate::time::Millis;

/// Channel depth: a full round of every channel plus headroom.
pub const SENSOR_DEPTH: usize = 32;

pub type SensorChannel = Channel<CriticalSectionRawMutex, SensorSample, SENSOR_DEPTH>;

/// Sensor channel: driver tasks → control loop.
pub static SENSOR_CHANNEL: SensorChannel = Channel::new();

/// Queue a sample without blocking.  A full queue drops the sample.
pub fn push_sample(channel: &SensorChannel, sample: SensorSample) -> Result<(), CommsError> {
    channel.try_send(sample).map_err(|_| CommsError::QueueFull)
}

pub struct SensorFeed<'a> {
    channel: &'a SensorChannel,
    latest: [Option<SensorSample>; SensorKind::COUNT],
}

impl<'a> SensorFeed<'a> {
    pub fn new(channel: &'a SensorChannel) -> Self {
        Self {
            channel,
            latest: [None; SensorKind::COUNT],
        }
    }

    /// Move everything queued into the per-channel slots.  A newer sample
    /// replaces an unread older one.
    pub fn drain(&mut self) -> usize {
        let mut n = 0;
        while let Ok(sample) = self.channel.try_receive() {
            let slot = &mut self.latest[sample.kind as usize];
            if slot.is_some() {
                debug!("SensorFeed: unread {} sample replaced", sample.kind.name());
            }
            *slot = Some(sample);
            n += 1;
        }
        n
    }
}

impl SensorPort for SensorFeed<'_> {
    fn read(&mut self, kind: SensorKind, now: Millis) -> SensorSample {
        self.drain();
        self.latest[kind as usize]
            .take()
            .unwrap_or_else(|| SensorSample::invalid(kind, now))
    }
}
