//! Inbound commands to the application service.
//!
//! These represent actions requested by the remote application (through
//! the [`gateway`](crate::gateway)) that the
//! [`AppService`](super::service::AppService) interprets and acts upon.

use crate::config::SystemConfig;

/// Commands that external adapters can send into the application core.
#[derive(Debug, Clone, PartialEq)]
pub enum AppCommand {
    /// Publish the current status message.
    GetStatus,

    /// Publish a data message now instead of waiting for the next period.
    GetData,

    /// Publish the live configuration.
    GetConfig,

    /// Publish the calibration table.
    GetCalibration,

    /// Leave Fault and clear the start-failure counter.
    ResetFault,

    /// Enable or disable the automatic cooling cycle.
    SetEnabled(bool),

    /// Record one `(distance, volume)` calibration pair.
    AddCalibrationPoint { distance_cm: f32, volume_l: f32 },

    /// Empty the calibration table.
    ClearCalibration,

    /// Replace the live configuration with the factory defaults.
    ResetConfig,

    /// Swap in a configuration assembled from a remote transfer.
    ApplyConfig { version: u32, config: SystemConfig },

    /// Persist the current config immediately.
    SaveConfig,
}

impl AppCommand {
    /// Wire name, echoed in acknowledgements.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::GetStatus => "get_status",
            Self::GetData => "get_data",
            Self::GetConfig => "get_config",
            Self::GetCalibration => "get_calibration",
            Self::ResetFault => "reset_fault",
            Self::SetEnabled(_) => "set_enabled",
            Self::AddCalibrationPoint { .. } => "add_calibration_point",
            Self::ClearCalibration => "clear_calibration",
            Self::ResetConfig => "reset_config",
            Self::ApplyConfig { .. } => "config_fragment",
            Self::SaveConfig => "save_config",
        }
    }
}
