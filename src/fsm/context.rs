//! Shared mutable context threaded through every FSM handler.
//!
//! `FsmContext` is the single struct that state handlers read from and
//! write to.  It contains the latest sensor snapshot, the tank level,
//! actuator command outputs, compressor timers, the live configuration and
//! the protection monitor's verdict for this tick.  Think of it as the
//! "blackboard" in a blackboard architecture.

use serde::Serialize;

use crate::config::SystemConfig;
use crate::time::{Millis, secs_to_ms};

// ---------------------------------------------------------------------------
// Sensor snapshot (read-only to state handlers; written by sensor hub)
// ---------------------------------------------------------------------------

/// A point-in-time snapshot of every measured quantity.
///
/// `None` means the quantity is unavailable: never read, or its last good
/// value went stale.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SensorSnapshot {
    /// Ambient air temperature (°C).
    pub ambient_temp_c: Option<f32>,
    /// Ambient relative humidity (%).
    pub ambient_humidity: Option<f32>,
    /// Ambient pressure (hPa).
    pub ambient_pressure_hpa: Option<f32>,
    /// Evaporator outlet air temperature (°C).
    pub evap_temp_c: Option<f32>,
    /// Evaporator outlet relative humidity (%).
    pub evap_humidity: Option<f32>,
    /// Compressor body temperature from the thermistor (°C).
    pub compressor_temp_c: Option<f32>,
    /// Filtered ultrasonic distance accepted *this* read cycle (cm).
    pub distance_cm: Option<f32>,
    /// Mains voltage (V).
    pub voltage_v: Option<f32>,
    /// Mains current (A).
    pub current_a: Option<f32>,
    /// Active power (W).
    pub power_w: Option<f32>,
    /// Accumulated energy (kWh).
    pub energy_kwh: Option<f32>,
    /// Ambient dew point (°C) — the control setpoint.
    pub dew_point_c: Option<f32>,
    /// Ambient absolute humidity (g/m³).
    pub absolute_humidity_gm3: Option<f32>,
}

// ---------------------------------------------------------------------------
// Actuators
// ---------------------------------------------------------------------------

/// The four relay-driven loads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actuator {
    Compressor,
    /// Condenser fan next to the compressor ("vent" in status messages).
    CompressorFan,
    /// Evaporator fan, driven by its own hysteresis loop.
    EvapFan,
    Pump,
}

impl Actuator {
    pub const ALL: [Actuator; 4] = [
        Actuator::Compressor,
        Actuator::CompressorFan,
        Actuator::EvapFan,
        Actuator::Pump,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Self::Compressor => "compressor",
            Self::CompressorFan => "compressor_fan",
            Self::EvapFan => "evap_fan",
            Self::Pump => "pump",
        }
    }
}

/// Relay states that handlers write.  The service applies them to the
/// hardware after each tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ActuatorCommands {
    pub compressor: bool,
    pub compressor_fan: bool,
    pub evap_fan: bool,
    pub pump: bool,
}

impl ActuatorCommands {
    /// All actuators off — safe default.
    pub fn all_off() -> Self {
        Self::default()
    }

    pub fn get(&self, actuator: Actuator) -> bool {
        match actuator {
            Actuator::Compressor => self.compressor,
            Actuator::CompressorFan => self.compressor_fan,
            Actuator::EvapFan => self.evap_fan,
            Actuator::Pump => self.pump,
        }
    }

    pub fn set(&mut self, actuator: Actuator, on: bool) {
        match actuator {
            Actuator::Compressor => self.compressor = on,
            Actuator::CompressorFan => self.compressor_fan = on,
            Actuator::EvapFan => self.evap_fan = on,
            Actuator::Pump => self.pump = on,
        }
    }
}

// ---------------------------------------------------------------------------
// FsmContext
// ---------------------------------------------------------------------------

/// The shared context passed to every state handler function.
pub struct FsmContext {
    // -- Timing --
    /// Current tick's timestamp.
    pub now: Millis,
    /// When the current state was entered.
    pub state_entered_at: Millis,

    // -- Inputs --
    pub sensors: SensorSnapshot,
    /// Published tank level (%), `None` until the estimator has one.
    pub tank_level_percent: Option<f32>,
    /// Automatic cycle enabled by the operator.
    pub enabled: bool,

    // -- Compressor timers --
    /// Set while the compressor runs.
    pub on_since: Option<Millis>,
    /// Set while the minimum rest period is still running.  Boot counts
    /// as a switch-off so a brown-out reboot cannot short-cycle.
    pub resting_since: Option<Millis>,
    /// Exponentially smoothed control error (°C).
    pub smoothed_error: Option<f32>,

    // -- Outputs --
    pub commands: ActuatorCommands,

    // -- Configuration --
    pub config: SystemConfig,

    // -- Protection --
    /// The protection monitor declared a failed start this tick.
    pub start_failed: bool,
    /// Consecutive failed starts, mirrored from the monitor.
    pub consecutive_failures: u8,
    /// Operator asked to leave Fault.
    pub fault_reset_requested: bool,
}

impl FsmContext {
    /// Create a new context with the given configuration at boot time `now`.
    pub fn new(config: SystemConfig, now: Millis) -> Self {
        Self {
            now,
            state_entered_at: now,
            sensors: SensorSnapshot::default(),
            tank_level_percent: None,
            enabled: true,
            on_since: None,
            resting_since: Some(now),
            smoothed_error: None,
            commands: ActuatorCommands::all_off(),
            config,
            start_failed: false,
            consecutive_failures: 0,
            fault_reset_requested: false,
        }
    }

    /// Milliseconds spent in the current state.
    pub fn ms_in_state(&self) -> u32 {
        self.now.since(self.state_entered_at)
    }

    /// Ambient dew point — the target the evaporator must reach.
    pub fn setpoint(&self) -> Option<f32> {
        self.sensors.dew_point_c
    }

    /// Fold the current error into the smoothed error.  Call once per
    /// sampling interval; the first sample seeds the filter.
    pub fn sample_error(&mut self) {
        let (Some(evap), Some(setpoint)) = (self.sensors.evap_temp_c, self.setpoint()) else {
            return;
        };
        let error = evap - setpoint;
        let alpha = self.config.control.alpha;
        self.smoothed_error = Some(match self.smoothed_error {
            Some(prev) => alpha * error + (1.0 - alpha) * prev,
            None => error,
        });
    }

    /// True once the compressor has rested at least `min_off`.  Latches so
    /// the comparison never sees a timestamp older than half the clock range.
    pub fn rest_elapsed(&mut self) -> bool {
        match self.resting_since {
            None => true,
            Some(since) => {
                if self
                    .now
                    .has_elapsed(since, secs_to_ms(self.config.control.min_off_secs))
                {
                    self.resting_since = None;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// True once the compressor has run at least `max_on`.
    pub fn max_on_reached(&self) -> bool {
        self.on_since.is_some_and(|since| {
            self.now
                .has_elapsed(since, secs_to_ms(self.config.control.max_on_secs))
        })
    }

    /// Milliseconds of continuous compressor runtime, 0 when off.
    pub fn compressor_runtime_ms(&self) -> u32 {
        self.on_since.map_or(0, |since| self.now.since(since))
    }

    pub fn compressor_over_temperature(&self) -> bool {
        self.sensors
            .compressor_temp_c
            .is_some_and(|t| t >= self.config.control.max_compressor_temp_c)
    }

    /// Consecutive failures have reached the latching threshold.
    pub fn fault_threshold_reached(&self) -> bool {
        self.consecutive_failures >= self.config.protection.fault_after_failures
    }

    /// Pump runs only with a known tank level at or above the minimum.
    pub fn pump_allowed(&self) -> bool {
        self.tank_level_percent
            .is_some_and(|level| level >= self.config.tank.min_pump_level_percent)
    }
}
