//! Outbound application events.
//!
//! The [`AppService`](super::service::AppService) and the
//! [`Gateway`](crate::gateway::engine::Gateway) emit these through the
//! [`EventSink`](super::ports::EventSink) port.  Adapters on the other
//! side decide what to do with them: log to serial, publish over MQTT.

use heapless::String;
use serde::Serialize;

use crate::alerts::AlertEvent;
use crate::config::SystemConfig;
use crate::fsm::StateId;
use crate::fsm::context::{ActuatorCommands, SensorSnapshot};
use crate::tank::TankState;
use crate::tank::calibration::CalibrationTable;
use crate::time::Millis;

/// Correlation id copied from a JSON command into its acknowledgement.
pub type RequestId = String<32>;

/// Structured events emitted by the application core.
#[derive(Debug, Clone)]
pub enum AppEvent {
    /// The application service has started (carries initial state).
    Started(StateId),

    /// The FSM transitioned between states.
    StateChanged { from: StateId, to: StateId },

    /// Mode, actuators or failure count changed, or status was requested.
    Status(StatusData),

    /// Periodic or requested measurement snapshot.
    Data(TelemetryData),

    /// An alert became active or cleared.
    Alert(AlertEvent),

    /// The compressor did not draw start current inside the window.
    StartFailure {
        consecutive_failures: u8,
        measured_current_a: f32,
        /// Failure count reached the alert threshold.
        alert: bool,
    },

    /// Consecutive failures latched the Fault state.
    FaultLatched { consecutive_failures: u8 },

    /// Something the remote side should know failed.
    Error(ErrorReport),

    /// Periodic liveness message.
    Heartbeat(HeartbeatData),

    /// Outcome of one inbound command.
    CommandAck(CommandAck),

    /// Live configuration, on request or after a reset.
    Config { version: u32, config: SystemConfig },

    /// Calibration table, on request or after a change.
    Calibration(CalibrationTable),

    /// A configuration transfer was applied.
    ConfigApplied { version: u32 },
}

/// Retained status message body.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StatusData {
    pub mode: StateId,
    pub enabled: bool,
    pub compressor: bool,
    /// Compressor (condenser) fan.
    pub vent: bool,
    pub evap_fan: bool,
    pub pump: bool,
    pub consecutive_failures: u8,
    pub tank_level_percent: Option<f32>,
    pub volume_l: Option<f32>,
    pub evap_temp_c: Option<f32>,
    pub dew_point_c: Option<f32>,
    pub current_a: Option<f32>,
}

/// Data message body.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TelemetryData {
    pub timestamp: Millis,
    pub mode: StateId,
    pub sensors: SensorSnapshot,
    pub tank: Option<TankState>,
    pub smoothed_error_c: Option<f32>,
    pub actuators: ActuatorCommands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSource {
    Transfer,
    Command,
    Storage,
    Actuator,
}

/// Error message body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ErrorReport {
    pub source: ErrorSource,
    pub code: &'static str,
    /// Offending field or actuator, when there is one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<&'static str>,
    /// Transfer version the error refers to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HeartbeatData {
    pub uptime_ms: u32,
    pub mode: StateId,
    pub enabled: bool,
    /// Bitmask of sensor channels whose latest read was rejected.
    pub failing_sensors: u16,
    pub config_version: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandAck {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,
    pub command: &'static str,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
}
