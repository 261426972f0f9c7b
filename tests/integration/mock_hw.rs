//! Mock adapters for integration tests.
//!
//! `MockHardware` serves scripted sensor readings and records every relay
//! write, so tests can drive the full tick pipeline without GPIO or buses.

use std::collections::HashMap;

use dropster::alerts::{AlertEvent, AlertKind};
use dropster::app::events::{AppEvent, CommandAck, ErrorReport};
use dropster::app::ports::{ActuatorPort, EventSink, SensorPort, StorageError, StoragePort};
use dropster::error::ActuatorError;
use dropster::fsm::StateId;
use dropster::fsm::context::{Actuator, ActuatorCommands};
use dropster::sensors::{SensorKind, SensorSample};
use dropster::time::Millis;

// ── MockHardware ──────────────────────────────────────────────

pub struct MockHardware {
    /// Scripted reading per channel, `None` reports an invalid sample.
    readings: [Option<f32>; SensorKind::COUNT],
    /// Relay states as last written.
    pub relays: ActuatorCommands,
    /// Every successful write, in order.
    pub writes: Vec<(Actuator, bool)>,
    /// Writes to this actuator fail.
    pub broken: Option<Actuator>,
    /// Mains current while the compressor relay is closed; 0 A otherwise.
    draw: Option<f32>,
}

#[allow(dead_code)]
impl MockHardware {
    pub fn new() -> Self {
        Self {
            readings: [None; SensorKind::COUNT],
            relays: ActuatorCommands::all_off(),
            writes: Vec::new(),
            broken: None,
            draw: None,
        }
    }

    /// A room at 25 °C / 60 % on healthy mains with a compressor that
    /// draws 4 A once its relay closes.
    pub fn healthy() -> Self {
        let mut hw = Self::new();
        hw.set(SensorKind::AmbientTemp, 25.0);
        hw.set(SensorKind::AmbientHumidity, 60.0);
        hw.set(SensorKind::AmbientPressure, 1013.0);
        hw.set(SensorKind::Voltage, 230.0);
        hw.compressor_draw(4.0);
        hw
    }

    /// Current reported while the compressor relay is on.  A dead
    /// compressor is `0.0`.
    pub fn compressor_draw(&mut self, amps: f32) {
        self.draw = Some(amps);
    }

    pub fn set(&mut self, kind: SensorKind, value: f32) {
        self.readings[kind as usize] = Some(value);
    }

    pub fn clear(&mut self, kind: SensorKind) {
        self.readings[kind as usize] = None;
    }

    /// Put the evaporator `error_c` above the ambient dew point.
    pub fn set_error(&mut self, error_c: f32) {
        let dew = dew_point().expect("ambient readings set");
        self.set(SensorKind::EvapTemp, dew + error_c);
    }

    pub fn is_on(&self, actuator: Actuator) -> bool {
        self.relays.get(actuator)
    }

    /// Number of off→on writes seen for `actuator`.
    pub fn starts(&self, actuator: Actuator) -> usize {
        self.writes
            .iter()
            .filter(|(a, on)| *a == actuator && *on)
            .count()
    }
}

impl Default for MockHardware {
    fn default() -> Self {
        Self::new()
    }
}

/// Dew point of the `healthy()` room.
pub fn dew_point() -> Option<f32> {
    dropster::sensors::psychro::dew_point(25.0, 60.0)
}

impl SensorPort for MockHardware {
    fn read(&mut self, kind: SensorKind, now: Millis) -> SensorSample {
        if let (SensorKind::Current, Some(amps)) = (kind, self.draw) {
            let value = if self.relays.compressor { amps } else { 0.0 };
            return SensorSample::new(kind, value, now);
        }
        match self.readings[kind as usize] {
            Some(v) => SensorSample::new(kind, v, now),
            None => SensorSample::invalid(kind, now),
        }
    }
}

impl ActuatorPort for MockHardware {
    fn set(&mut self, actuator: Actuator, on: bool) -> Result<(), ActuatorError> {
        if self.broken == Some(actuator) {
            return Err(ActuatorError::GpioWriteFailed);
        }
        self.relays.set(actuator, on);
        self.writes.push((actuator, on));
        Ok(())
    }
}

// ── RecordingSink ─────────────────────────────────────────────

/// Collects every event for later inspection.
#[derive(Default)]
pub struct RecordingSink {
    pub events: Vec<AppEvent>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn transitions(&self) -> Vec<(StateId, StateId)> {
        self.events
            .iter()
            .filter_map(|e| match e {
                AppEvent::StateChanged { from, to } => Some((*from, *to)),
                _ => None,
            })
            .collect()
    }

    pub fn alerts(&self, kind: AlertKind) -> Vec<AlertEvent> {
        self.events
            .iter()
            .filter_map(|e| match e {
                AppEvent::Alert(a) if a.kind == kind => Some(*a),
                _ => None,
            })
            .collect()
    }

    pub fn errors(&self) -> Vec<ErrorReport> {
        self.events
            .iter()
            .filter_map(|e| match e {
                AppEvent::Error(r) => Some(*r),
                _ => None,
            })
            .collect()
    }

    pub fn acks(&self) -> Vec<CommandAck> {
        self.events
            .iter()
            .filter_map(|e| match e {
                AppEvent::CommandAck(a) => Some(a.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn applied_versions(&self) -> Vec<u32> {
        self.events
            .iter()
            .filter_map(|e| match e {
                AppEvent::ConfigApplied { version } => Some(*version),
                _ => None,
            })
            .collect()
    }

    pub fn start_failures(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, AppEvent::StartFailure { .. }))
            .count()
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &AppEvent) {
        self.events.push(event.clone());
    }
}

// ── MockStorage ───────────────────────────────────────────────

/// In-memory key/value store with an optional write failure.
#[derive(Default)]
pub struct MockStorage {
    data: HashMap<(String, String), Vec<u8>>,
    pub fail_writes: bool,
    pub writes: usize,
}

#[allow(dead_code)]
impl MockStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }
}

impl StoragePort for MockStorage {
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        let data = self
            .data
            .get(&(namespace.to_owned(), key.to_owned()))
            .ok_or(StorageError::NotFound)?;
        if data.len() > buf.len() {
            return Err(StorageError::BufferTooSmall);
        }
        buf[..data.len()].copy_from_slice(data);
        Ok(data.len())
    }

    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        if self.fail_writes {
            return Err(StorageError::IoError);
        }
        self.writes += 1;
        self.data
            .insert((namespace.to_owned(), key.to_owned()), data.to_vec());
        Ok(())
    }

    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError> {
        self.data
            .remove(&(namespace.to_owned(), key.to_owned()))
            .map(|_| ())
            .ok_or(StorageError::NotFound)
    }

    fn exists(&self, namespace: &str, key: &str) -> bool {
        self.data
            .contains_key(&(namespace.to_owned(), key.to_owned()))
    }
}
