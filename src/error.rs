//! Unified error types for the Dropster firmware.
//!
//! A single `Error` enum that every subsystem can convert into, keeping the
//! top-level control loop's error handling uniform.  All variants are `Copy`
//! so they can be passed through the gateway and into acknowledgements
//! without allocation.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

/// Every fallible operation in the firmware funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A sensor could not be read or returned out-of-range data.
    Sensor(SensorError),
    /// An actuator command failed.
    Actuator(ActuatorError),
    /// A calibration point was rejected.
    Calibration(CalibrationError),
    /// A configuration transfer was rejected or abandoned.
    Transfer(TransferError),
    /// An inbound command could not be accepted.
    Command(CommandError),
    /// A communication subsystem failed.
    Comms(CommsError),
    /// Configuration is invalid or could not be loaded.
    Config(&'static str),
}

impl Error {
    /// Short machine-readable reason for acknowledgements and error reports.
    pub const fn reason(self) -> &'static str {
        match self {
            Self::Sensor(SensorError::OutOfRange) => "sensor_out_of_range",
            Self::Sensor(SensorError::Unavailable) => "sensor_unavailable",
            Self::Actuator(_) => "gpio_write_failed",
            Self::Calibration(e) => e.code(),
            Self::Transfer(TransferError::Invalid(msg)) | Self::Config(msg) => msg,
            Self::Transfer(e) => e.code(),
            Self::Command(e) => e.code(),
            Self::Comms(CommsError::PublishFailed) => "publish_failed",
            Self::Comms(CommsError::PayloadTooLarge) => "payload_too_large",
            Self::Comms(CommsError::QueueFull) => "queue_full",
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sensor(e) => write!(f, "sensor: {e}"),
            Self::Actuator(e) => write!(f, "actuator: {e}"),
            Self::Calibration(e) => write!(f, "calibration: {e}"),
            Self::Transfer(e) => write!(f, "transfer: {e}"),
            Self::Command(e) => write!(f, "command: {e}"),
            Self::Comms(e) => write!(f, "comms: {e}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Sensor errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    /// Reading is outside the physically plausible range.
    OutOfRange,
    /// No reading has been produced yet, or the driver reported a failure.
    Unavailable,
}

impl fmt::Display for SensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfRange => write!(f, "reading out of range"),
            Self::Unavailable => write!(f, "reading unavailable"),
        }
    }
}

impl From<SensorError> for Error {
    fn from(e: SensorError) -> Self {
        Self::Sensor(e)
    }
}

// ---------------------------------------------------------------------------
// Actuator errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuatorError {
    /// Relay GPIO write failed.
    GpioWriteFailed,
}

impl fmt::Display for ActuatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GpioWriteFailed => write!(f, "GPIO write failed"),
        }
    }
}

impl From<ActuatorError> for Error {
    fn from(e: ActuatorError) -> Self {
        Self::Actuator(e)
    }
}

// ---------------------------------------------------------------------------
// Calibration errors
// ---------------------------------------------------------------------------

/// Why a calibration point was not added.  The table is left unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationError {
    /// The table holds the maximum number of points; clear it first.
    TableFull,
    /// Another point lies within the distance tolerance.
    DuplicateDistance,
    /// Distance outside the sensor's valid physical range.
    DistanceOutOfRange,
    /// Volume negative or above tank capacity.
    VolumeOutOfRange,
    /// Volume would increase with distance against a neighbour.
    NotMonotonic,
    /// Slope to a neighbour exceeds the plausible litres-per-cm bound.
    SlopeOutOfBounds,
}

impl CalibrationError {
    /// Short machine-readable reason for acknowledgements.
    pub const fn code(self) -> &'static str {
        match self {
            Self::TableFull => "table_full",
            Self::DuplicateDistance => "duplicate_distance",
            Self::DistanceOutOfRange => "distance_out_of_range",
            Self::VolumeOutOfRange => "volume_out_of_range",
            Self::NotMonotonic => "not_monotonic",
            Self::SlopeOutOfBounds => "slope_out_of_bounds",
        }
    }
}

impl fmt::Display for CalibrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl From<CalibrationError> for Error {
    fn from(e: CalibrationError) -> Self {
        Self::Calibration(e)
    }
}

// ---------------------------------------------------------------------------
// Configuration transfer errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferError {
    /// `total` is zero, exceeds the fragment cap, or `index >= total`.
    InvalidFragment,
    /// Fragment chunk larger than the per-fragment limit.
    ChunkTooLarge,
    /// A fragment disagreed with the transfer's announced total.
    TotalMismatch,
    /// Version already applied; fragment ignored.
    Stale,
    /// An in-flight transfer was replaced by a newer version.
    Superseded,
    /// Not every fragment arrived within the assembly timeout.
    TimedOut,
    /// Assembled document is not a valid configuration document.
    Malformed,
    /// A field failed range validation.
    Invalid(&'static str),
}

impl TransferError {
    pub const fn code(self) -> &'static str {
        match self {
            Self::InvalidFragment => "invalid_fragment",
            Self::ChunkTooLarge => "chunk_too_large",
            Self::TotalMismatch => "total_mismatch",
            Self::Stale => "stale_version",
            Self::Superseded => "superseded",
            Self::TimedOut => "timed_out",
            Self::Malformed => "malformed",
            Self::Invalid(_) => "invalid_field",
        }
    }
}

impl fmt::Display for TransferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invalid(msg) => write!(f, "invalid_field: {msg}"),
            other => f.write_str(other.code()),
        }
    }
}

impl From<TransferError> for Error {
    fn from(e: TransferError) -> Self {
        Self::Transfer(e)
    }
}

// ---------------------------------------------------------------------------
// Command errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandError {
    /// Payload is neither a known token nor a valid JSON command.
    Malformed,
    /// Identical command received within the debounce window.
    Debounced,
    /// Command waited in the inbound queue past its deadline.
    Expired,
    /// Command not valid in the current mode.
    Rejected(&'static str),
}

impl CommandError {
    pub const fn code(self) -> &'static str {
        match self {
            Self::Malformed => "malformed",
            Self::Debounced => "debounced",
            Self::Expired => "expired",
            Self::Rejected(why) => why,
        }
    }
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed => write!(f, "malformed"),
            Self::Debounced => write!(f, "debounced"),
            Self::Expired => write!(f, "expired"),
            Self::Rejected(why) => write!(f, "rejected: {why}"),
        }
    }
}

impl From<CommandError> for Error {
    fn from(e: CommandError) -> Self {
        Self::Command(e)
    }
}

// ---------------------------------------------------------------------------
// Communications errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommsError {
    /// Transport refused or failed the publish.
    PublishFailed,
    /// Serialised message exceeds the transport buffer.
    PayloadTooLarge,
    /// Inbound queue full; message dropped.
    QueueFull,
}

impl fmt::Display for CommsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PublishFailed => write!(f, "publish failed"),
            Self::PayloadTooLarge => write!(f, "payload too large"),
            Self::QueueFull => write!(f, "inbound queue full"),
        }
    }
}

impl From<CommsError> for Error {
    fn from(e: CommsError) -> Self {
        Self::Comms(e)
    }
}

impl From<crate::app::ports::ConfigError> for Error {
    fn from(e: crate::app::ports::ConfigError) -> Self {
        use crate::app::ports::ConfigError;
        match e {
            ConfigError::ValidationFailed(msg) => Self::Config(msg),
            ConfigError::NotFound => Self::Config("config not found"),
            ConfigError::Corrupted => Self::Config("config corrupted"),
            ConfigError::Storage(_) => Self::Config("storage failure"),
        }
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
