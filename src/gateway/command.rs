//! Inbound command parsing and gating.
//!
//! Two payload forms are accepted on the control topic:
//!
//! ```text
//! {"type":"add_calibration_point","id":"a1","distance":25.0,"volume":9.0}
//! GET_STATUS
//! ```
//!
//! JSON commands carry an optional `id` that is echoed in the ack.  Bare
//! tokens are the legacy form used by early field tools.

use heapless::String;
use serde::Deserialize;

use crate::app::commands::AppCommand;
use crate::app::events::RequestId;
use crate::config::TimingConfig;
use crate::error::CommandError;
use crate::time::Millis;

use super::fragments::ConfigFragment;

/// A parsed control payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Command {
        id: Option<RequestId>,
        command: AppCommand,
    },
    Fragment {
        id: Option<RequestId>,
        fragment: ConfigFragment,
    },
}

impl Inbound {
    pub fn id(&self) -> Option<&RequestId> {
        match self {
            Self::Command { id, .. } | Self::Fragment { id, .. } => id.as_ref(),
        }
    }

    /// Wire name used in the acknowledgement.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Command { command, .. } => command.name(),
            Self::Fragment { .. } => super::fragments::KIND,
        }
    }
}

/// Flat envelope: every parameter any command takes, all optional.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String<32>,
    id: Option<RequestId>,
    enabled: Option<bool>,
    distance: Option<f32>,
    volume: Option<f32>,
    version: Option<u32>,
    index: Option<u8>,
    total: Option<u8>,
    chunk: Option<std::string::String>,
}

/// Parse one control payload.
pub fn parse(payload: &[u8]) -> Result<Inbound, CommandError> {
    let text = core::str::from_utf8(payload).map_err(|_| CommandError::Malformed)?;
    let text = text.trim();
    if text.starts_with('{') {
        parse_json(text)
    } else {
        parse_token(text).map(|command| Inbound::Command { id: None, command })
    }
}

fn parse_json(text: &str) -> Result<Inbound, CommandError> {
    let env: Envelope = serde_json::from_str(text).map_err(|_| CommandError::Malformed)?;
    let id = env.id;

    let command = match env.kind.as_str() {
        "get_status" => AppCommand::GetStatus,
        "get_data" => AppCommand::GetData,
        "get_config" => AppCommand::GetConfig,
        "get_calibration" => AppCommand::GetCalibration,
        "reset_fault" => AppCommand::ResetFault,
        "set_enabled" => AppCommand::SetEnabled(env.enabled.ok_or(CommandError::Malformed)?),
        "add_calibration_point" => AppCommand::AddCalibrationPoint {
            distance_cm: env.distance.ok_or(CommandError::Malformed)?,
            volume_l: env.volume.ok_or(CommandError::Malformed)?,
        },
        "clear_calibration" => AppCommand::ClearCalibration,
        "reset_config" => AppCommand::ResetConfig,
        "save_config" => AppCommand::SaveConfig,
        super::fragments::KIND => {
            let (Some(version), Some(index), Some(total), Some(chunk)) =
                (env.version, env.index, env.total, env.chunk)
            else {
                return Err(CommandError::Malformed);
            };
            return Ok(Inbound::Fragment {
                id,
                fragment: ConfigFragment {
                    version,
                    index,
                    total,
                    chunk,
                },
            });
        }
        _ => return Err(CommandError::Malformed),
    };
    Ok(Inbound::Command { id, command })
}

fn parse_token(token: &str) -> Result<AppCommand, CommandError> {
    const TOKENS: [(&str, AppCommand); 12] = [
        ("GET_STATUS", AppCommand::GetStatus),
        ("GET_DATA", AppCommand::GetData),
        ("GET_CONFIG", AppCommand::GetConfig),
        ("GET_CALIBRATION", AppCommand::GetCalibration),
        ("RESET_FAULT", AppCommand::ResetFault),
        ("ENABLE", AppCommand::SetEnabled(true)),
        ("ON", AppCommand::SetEnabled(true)),
        ("DISABLE", AppCommand::SetEnabled(false)),
        ("OFF", AppCommand::SetEnabled(false)),
        ("CLEAR_CALIBRATION", AppCommand::ClearCalibration),
        ("RESET_CONFIG", AppCommand::ResetConfig),
        ("SAVE_CONFIG", AppCommand::SaveConfig),
    ];
    TOKENS
        .iter()
        .find(|(t, _)| token.eq_ignore_ascii_case(t))
        .map(|(_, cmd)| cmd.clone())
        .ok_or(CommandError::Malformed)
}

// ───────────────────────────────────────────────────────────────
// Debounce / expiry gate
// ───────────────────────────────────────────────────────────────

/// Drops repeats of the last accepted payload inside the debounce window
/// and commands that waited too long in the inbound queue.
#[derive(Debug, Default)]
pub struct CommandGate {
    last: Option<([u8; 32], Millis)>,
}

impl CommandGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check a raw payload.  Only accepted payloads restart the debounce
    /// window.
    pub fn check(
        &mut self,
        payload: &[u8],
        received_at: Millis,
        now: Millis,
        timing: &TimingConfig,
    ) -> Result<(), CommandError> {
        if now.since(received_at) > timing.command_timeout_ms {
            return Err(CommandError::Expired);
        }

        let digest = hmac_sha256::Hash::hash(payload);
        if let Some((last, at)) = self.last {
            if last == digest && !received_at.has_elapsed(at, timing.command_debounce_ms) {
                return Err(CommandError::Debounced);
            }
        }
        self.last = Some((digest, received_at));
        Ok(())
    }
}
