//! Outbound wire messages.
//!
//! Every [`AppEvent`] maps to one JSON message on one topic.  The body is
//! tagged with `type` so consumers on a shared topic can tell messages
//! apart:
//!
//! ```text
//! dropster/status  {"type":"status","mode":"cooling","enabled":true,...}
//! dropster/alerts  {"type":"alert","kind":"tank_full","active":true,...}
//! dropster/system  {"type":"ack","id":"a1","command":"reset_fault","ok":false,...}
//! ```

use serde::Serialize;

use crate::alerts::AlertEvent;
use crate::app::events::{AppEvent, CommandAck, ErrorReport, HeartbeatData, StatusData, TelemetryData};
use crate::config::SystemConfig;
use crate::error::CommsError;
use crate::fsm::StateId;
use crate::tank::calibration::CalibrationTable;

use super::topics::Topic;

/// Largest serialised message handed to the transport.
pub const MAX_OUTBOUND_PAYLOAD: usize = 1024;

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outbound<'a> {
    Started {
        mode: StateId,
    },
    StateChanged {
        from: StateId,
        to: StateId,
    },
    Status(&'a StatusData),
    Data(&'a TelemetryData),
    Alert(&'a AlertEvent),
    StartFailure {
        consecutive_failures: u8,
        measured_current_a: f32,
        alert: bool,
    },
    FaultLatched {
        consecutive_failures: u8,
    },
    Error(&'a ErrorReport),
    Heartbeat(&'a HeartbeatData),
    Ack(&'a CommandAck),
    Config {
        version: u32,
        config: &'a SystemConfig,
    },
    Calibration(&'a CalibrationTable),
    ConfigApplied {
        version: u32,
    },
}

/// Topic and body for one event.
pub fn route(event: &AppEvent) -> (Topic, Outbound<'_>) {
    match event {
        AppEvent::Started(mode) => (Topic::System, Outbound::Started { mode: *mode }),
        AppEvent::StateChanged { from, to } => (
            Topic::System,
            Outbound::StateChanged {
                from: *from,
                to: *to,
            },
        ),
        AppEvent::Status(s) => (Topic::Status, Outbound::Status(s)),
        AppEvent::Data(d) => (Topic::Data, Outbound::Data(d)),
        AppEvent::Alert(a) => (Topic::Alerts, Outbound::Alert(a)),
        AppEvent::StartFailure {
            consecutive_failures,
            measured_current_a,
            alert,
        } => (
            if *alert { Topic::Alerts } else { Topic::System },
            Outbound::StartFailure {
                consecutive_failures: *consecutive_failures,
                measured_current_a: *measured_current_a,
                alert: *alert,
            },
        ),
        AppEvent::FaultLatched {
            consecutive_failures,
        } => (
            Topic::Alerts,
            Outbound::FaultLatched {
                consecutive_failures: *consecutive_failures,
            },
        ),
        AppEvent::Error(e) => (Topic::Errors, Outbound::Error(e)),
        AppEvent::Heartbeat(h) => (Topic::System, Outbound::Heartbeat(h)),
        AppEvent::CommandAck(a) => (Topic::System, Outbound::Ack(a)),
        AppEvent::Config { version, config } => (
            Topic::System,
            Outbound::Config {
                version: *version,
                config,
            },
        ),
        AppEvent::Calibration(t) => (Topic::System, Outbound::Calibration(t)),
        AppEvent::ConfigApplied { version } => {
            (Topic::System, Outbound::ConfigApplied { version: *version })
        }
    }
}

/// Serialise an event for publishing.
pub fn encode(event: &AppEvent) -> Result<(Topic, Vec<u8>), CommsError> {
    let (topic, body) = route(event);
    let bytes = serde_json::to_vec(&body).map_err(|_| CommsError::PublishFailed)?;
    if bytes.len() > MAX_OUTBOUND_PAYLOAD {
        return Err(CommsError::PayloadTooLarge);
    }
    Ok((topic, bytes))
}
