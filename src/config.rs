//! System configuration parameters
//!
//! All tunable parameters for the Dropster controller, grouped per
//! component.  [`SystemConfig::DEFAULTS`] is the immutable factory record;
//! the live copy owned by the application service starts from it and can be
//! replaced at runtime by a validated configuration transfer or loaded from
//! flash.  Every replacement goes through [`SystemConfig::validate`], so the
//! defaults and a remote update are held to the same bounds.

use serde::{Deserialize, Serialize};

use crate::app::ports::ConfigError;

/// Thermal control state machine parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControlConfig {
    /// Hysteresis half-band around the setpoint (°C).
    pub deadband_c: f32,
    /// Minimum compressor rest time between cycles (seconds).
    pub min_off_secs: u32,
    /// Maximum continuous compressor runtime (seconds).
    pub max_on_secs: u32,
    /// Interval between hysteresis evaluations (seconds).
    pub sampling_secs: u32,
    /// Exponential smoothing factor for the temperature error (0–1].
    pub alpha: f32,
    /// Compressor body temperature above which it must not run (°C).
    pub max_compressor_temp_c: f32,
}

/// Compressor start-failure protection parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProtectionConfig {
    /// Window after switch-on in which start current must appear (ms).
    pub window_ms: u32,
    /// Current draw that proves the compressor started (A).
    pub min_start_current_a: f32,
    /// Delay before retrying after a failed start (seconds).
    pub retry_delay_secs: u32,
    /// Consecutive failures from which an alert is published.
    pub alert_after_failures: u8,
    /// Consecutive failures that latch the Fault state.
    pub fault_after_failures: u8,
}

/// Evaporator fan hysteresis loop parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvapFanConfig {
    /// Fan turns on at `setpoint + on_offset_c`.
    pub on_offset_c: f32,
    /// Fan turns off at `setpoint - off_offset_c`.
    pub off_offset_c: f32,
    /// Minimum fan rest time (seconds).
    pub min_off_secs: u32,
    /// Maximum continuous fan runtime (seconds).
    pub max_on_secs: u32,
    /// Continuous compressor runtime after which compensation applies (seconds).
    pub compensation_delay_secs: u32,
    /// Subtracted from the evaporator reading once compensation applies (°C).
    pub compensation_offset_c: f32,
}

/// Tank geometry and level estimation parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TankConfig {
    /// Usable tank capacity (litres).
    pub capacity_l: f32,
    /// Closest physically valid ultrasonic distance (cm).
    pub min_distance_cm: f32,
    /// Farthest physically valid ultrasonic distance (cm).
    pub max_distance_cm: f32,
    /// Consecutive valid distance samples required before publishing.
    pub min_valid_run: u8,
    /// Pump runs only at or above this level (%).
    pub min_pump_level_percent: f32,
    /// Calibration points closer than this are ambiguous (cm).
    pub calibration_tolerance_cm: f32,
    /// Steepest plausible calibration slope (litres per cm).
    pub max_liters_per_cm: f32,
    /// Outlier rejection factor for the ultrasonic filter (MADs).
    pub ultrasonic_filter_k: f32,
}

/// Alert thresholds and enables.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlertConfig {
    pub tank_full_enabled: bool,
    /// Tank-full alert at or above this level (%).
    pub tank_full_percent: f32,
    pub voltage_low_enabled: bool,
    /// Voltage-low alert below this mains voltage (V).
    pub voltage_low_v: f32,
    /// Voltage-zero alert at or below this voltage (V).  Always armed.
    pub voltage_zero_v: f32,
    pub humidity_low_enabled: bool,
    /// Humidity-low alert below this relative humidity (%).
    pub humidity_low_percent: f32,
}

/// Loop, publish and protocol timing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Sensor poll interval (ms).
    pub sensor_read_interval_ms: u32,
    /// Periodic data message interval (ms).
    pub data_interval_ms: u32,
    /// Heartbeat system message interval (ms).
    pub heartbeat_interval_ms: u32,
    /// Identical commands within this window are dropped (ms).
    pub command_debounce_ms: u32,
    /// Commands queued longer than this are expired unprocessed (ms).
    pub command_timeout_ms: u32,
    /// Configuration transfer assembly timeout from first fragment (ms).
    pub transfer_timeout_ms: u32,
}

/// Core system configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SystemConfig {
    pub control: ControlConfig,
    pub protection: ProtectionConfig,
    pub evap_fan: EvapFanConfig,
    pub tank: TankConfig,
    pub alerts: AlertConfig,
    pub timing: TimingConfig,
}

impl SystemConfig {
    /// Factory defaults.
    pub const DEFAULTS: Self = Self {
        control: ControlConfig {
            deadband_c: 3.0,
            min_off_secs: 60,
            max_on_secs: 1800,
            sampling_secs: 8,
            alpha: 0.2,
            max_compressor_temp_c: 100.0,
        },
        protection: ProtectionConfig {
            window_ms: 5_000,
            min_start_current_a: 0.5,
            retry_delay_secs: 120,
            alert_after_failures: 2,
            fault_after_failures: 3,
        },
        evap_fan: EvapFanConfig {
            on_offset_c: 1.0,
            off_offset_c: 1.0,
            min_off_secs: 30,
            max_on_secs: 3600,
            compensation_delay_secs: 300,
            compensation_offset_c: 3.0,
        },
        tank: TankConfig {
            capacity_l: 1000.0,
            min_distance_cm: 2.0,
            max_distance_cm: 400.0,
            min_valid_run: 3,
            min_pump_level_percent: 5.0,
            calibration_tolerance_cm: 0.5,
            max_liters_per_cm: 50.0,
            ultrasonic_filter_k: 3.5,
        },
        alerts: AlertConfig {
            tank_full_enabled: true,
            tank_full_percent: 90.0,
            voltage_low_enabled: true,
            voltage_low_v: 100.0,
            voltage_zero_v: 0.0,
            humidity_low_enabled: true,
            humidity_low_percent: 40.0,
        },
        timing: TimingConfig {
            sensor_read_interval_ms: 3_000,
            data_interval_ms: 10_000,
            heartbeat_interval_ms: 60_000,
            command_debounce_ms: 1_000,
            command_timeout_ms: 5_000,
            transfer_timeout_ms: 15_000,
        },
    };

    /// Range-check every field.  The first violation is reported.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let c = &self.control;
        check(c.deadband_c, 0.5, 10.0, "control.deadband_c must be 0.5–10.0")?;
        check(c.min_off_secs, 10, 3600, "control.min_off_secs must be 10–3600")?;
        check(c.max_on_secs, 60, 7200, "control.max_on_secs must be 60–7200")?;
        check(c.sampling_secs, 1, 300, "control.sampling_secs must be 1–300")?;
        check(c.alpha, 0.01, 1.0, "control.alpha must be 0.01–1.0")?;
        check(
            c.max_compressor_temp_c,
            40.0,
            130.0,
            "control.max_compressor_temp_c must be 40.0–130.0",
        )?;
        if c.sampling_secs >= c.max_on_secs {
            return Err(ConfigError::ValidationFailed(
                "control.sampling_secs must be < control.max_on_secs",
            ));
        }

        let p = &self.protection;
        check(p.window_ms, 500, 30_000, "protection.window_ms must be 500–30000")?;
        check(
            p.min_start_current_a,
            0.05,
            20.0,
            "protection.min_start_current_a must be 0.05–20.0",
        )?;
        check(
            p.retry_delay_secs,
            10,
            3600,
            "protection.retry_delay_secs must be 10–3600",
        )?;
        check(
            p.fault_after_failures,
            1,
            10,
            "protection.fault_after_failures must be 1–10",
        )?;
        check(
            p.alert_after_failures,
            1,
            p.fault_after_failures,
            "protection.alert_after_failures must be 1–fault_after_failures",
        )?;

        let e = &self.evap_fan;
        check(e.on_offset_c, 0.0, 10.0, "evap_fan.on_offset_c must be 0.0–10.0")?;
        check(e.off_offset_c, 0.0, 10.0, "evap_fan.off_offset_c must be 0.0–10.0")?;
        if e.on_offset_c + e.off_offset_c < 0.5 {
            return Err(ConfigError::ValidationFailed(
                "evap_fan on/off offsets must span at least 0.5",
            ));
        }
        check(e.min_off_secs, 0, 3600, "evap_fan.min_off_secs must be 0–3600")?;
        check(e.max_on_secs, 60, 14_400, "evap_fan.max_on_secs must be 60–14400")?;
        check(
            e.compensation_delay_secs,
            0,
            7200,
            "evap_fan.compensation_delay_secs must be 0–7200",
        )?;
        check(
            e.compensation_offset_c,
            0.0,
            15.0,
            "evap_fan.compensation_offset_c must be 0.0–15.0",
        )?;

        let t = &self.tank;
        check(t.capacity_l, 1.0, 10_000.0, "tank.capacity_l must be 1–10000")?;
        check(t.min_distance_cm, 0.0, 50.0, "tank.min_distance_cm must be 0–50")?;
        check(t.max_distance_cm, 10.0, 600.0, "tank.max_distance_cm must be 10–600")?;
        if t.min_distance_cm >= t.max_distance_cm {
            return Err(ConfigError::ValidationFailed(
                "tank.min_distance_cm must be < tank.max_distance_cm",
            ));
        }
        check(t.min_valid_run, 1, 20, "tank.min_valid_run must be 1–20")?;
        check(
            t.min_pump_level_percent,
            0.0,
            50.0,
            "tank.min_pump_level_percent must be 0–50",
        )?;
        check(
            t.calibration_tolerance_cm,
            0.1,
            10.0,
            "tank.calibration_tolerance_cm must be 0.1–10.0",
        )?;
        check(
            t.max_liters_per_cm,
            0.1,
            1000.0,
            "tank.max_liters_per_cm must be 0.1–1000",
        )?;
        check(
            t.ultrasonic_filter_k,
            1.0,
            10.0,
            "tank.ultrasonic_filter_k must be 1.0–10.0",
        )?;

        let a = &self.alerts;
        check(
            a.tank_full_percent,
            50.0,
            100.0,
            "alerts.tank_full_percent must be 50–100",
        )?;
        check(a.voltage_low_v, 1.0, 260.0, "alerts.voltage_low_v must be 1–260")?;
        check(a.voltage_zero_v, 0.0, 20.0, "alerts.voltage_zero_v must be 0–20")?;
        if a.voltage_zero_v >= a.voltage_low_v {
            return Err(ConfigError::ValidationFailed(
                "alerts.voltage_zero_v must be < alerts.voltage_low_v",
            ));
        }
        check(
            a.humidity_low_percent,
            0.0,
            100.0,
            "alerts.humidity_low_percent must be 0–100",
        )?;

        let m = &self.timing;
        check(
            m.sensor_read_interval_ms,
            500,
            60_000,
            "timing.sensor_read_interval_ms must be 500–60000",
        )?;
        check(
            m.data_interval_ms,
            1_000,
            600_000,
            "timing.data_interval_ms must be 1000–600000",
        )?;
        check(
            m.heartbeat_interval_ms,
            5_000,
            3_600_000,
            "timing.heartbeat_interval_ms must be 5000–3600000",
        )?;
        check(
            m.command_debounce_ms,
            0,
            10_000,
            "timing.command_debounce_ms must be 0–10000",
        )?;
        check(
            m.command_timeout_ms,
            500,
            60_000,
            "timing.command_timeout_ms must be 500–60000",
        )?;
        check(
            m.transfer_timeout_ms,
            1_000,
            120_000,
            "timing.transfer_timeout_ms must be 1000–120000",
        )?;
        Ok(())
    }
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self::DEFAULTS
    }
}

/// Inclusive range check.  NaN fails every range.
fn check<T: PartialOrd>(value: T, min: T, max: T, msg: &'static str) -> Result<(), ConfigError> {
    if value >= min && value <= max {
        Ok(())
    } else {
        Err(ConfigError::ValidationFailed(msg))
    }
}

// ---------------------------------------------------------------------------
// Remote update document
// ---------------------------------------------------------------------------

/// Partial configuration carried by an assembled configuration transfer.
///
/// Field names follow the remote application's flat naming.  Absent fields
/// keep their live value; unknown fields reject the whole document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigPatch {
    pub deadband: Option<f32>,
    pub min_off: Option<u32>,
    pub max_on: Option<u32>,
    pub sampling: Option<u32>,
    pub alpha: Option<f32>,
    pub max_compressor_temp: Option<f32>,

    pub protection_window_ms: Option<u32>,
    pub min_start_current: Option<f32>,
    pub retry_delay: Option<u32>,
    pub alert_after_failures: Option<u8>,
    pub fault_after_failures: Option<u8>,

    pub evap_on_offset: Option<f32>,
    pub evap_off_offset: Option<f32>,
    pub evap_min_off: Option<u32>,
    pub evap_max_on: Option<u32>,
    pub evap_compensation_delay: Option<u32>,
    pub evap_compensation_offset: Option<f32>,

    pub tank_capacity: Option<f32>,
    pub min_distance: Option<f32>,
    pub max_distance: Option<f32>,
    pub min_pump_level: Option<f32>,

    pub alert_tank_full_enabled: Option<bool>,
    pub alert_tank_full: Option<f32>,
    pub alert_voltage_low_enabled: Option<bool>,
    pub alert_voltage_low: Option<f32>,
    pub alert_voltage_zero: Option<f32>,
    pub alert_humidity_low_enabled: Option<bool>,
    pub alert_humidity_low: Option<f32>,

    pub data_interval_ms: Option<u32>,
    pub heartbeat_interval_ms: Option<u32>,
}

macro_rules! merge {
    ($($src:expr => $dst:expr),+ $(,)?) => {
        $( if let Some(v) = $src { $dst = v; } )+
    };
}

impl ConfigPatch {
    /// Produce a candidate by overlaying this patch on `base`.
    ///
    /// The candidate is not validated here; callers validate before use.
    pub fn apply_to(&self, base: &SystemConfig) -> SystemConfig {
        let mut c = *base;
        merge! {
            self.deadband => c.control.deadband_c,
            self.min_off => c.control.min_off_secs,
            self.max_on => c.control.max_on_secs,
            self.sampling => c.control.sampling_secs,
            self.alpha => c.control.alpha,
            self.max_compressor_temp => c.control.max_compressor_temp_c,
            self.protection_window_ms => c.protection.window_ms,
            self.min_start_current => c.protection.min_start_current_a,
            self.retry_delay => c.protection.retry_delay_secs,
            self.alert_after_failures => c.protection.alert_after_failures,
            self.fault_after_failures => c.protection.fault_after_failures,
            self.evap_on_offset => c.evap_fan.on_offset_c,
            self.evap_off_offset => c.evap_fan.off_offset_c,
            self.evap_min_off => c.evap_fan.min_off_secs,
            self.evap_max_on => c.evap_fan.max_on_secs,
            self.evap_compensation_delay => c.evap_fan.compensation_delay_secs,
            self.evap_compensation_offset => c.evap_fan.compensation_offset_c,
            self.tank_capacity => c.tank.capacity_l,
            self.min_distance => c.tank.min_distance_cm,
            self.max_distance => c.tank.max_distance_cm,
            self.min_pump_level => c.tank.min_pump_level_percent,
            self.alert_tank_full_enabled => c.alerts.tank_full_enabled,
            self.alert_tank_full => c.alerts.tank_full_percent,
            self.alert_voltage_low_enabled => c.alerts.voltage_low_enabled,
            self.alert_voltage_low => c.alerts.voltage_low_v,
            self.alert_voltage_zero => c.alerts.voltage_zero_v,
            self.alert_humidity_low_enabled => c.alerts.humidity_low_enabled,
            self.alert_humidity_low => c.alerts.humidity_low_percent,
            self.data_interval_ms => c.timing.data_interval_ms,
            self.heartbeat_interval_ms => c.timing.heartbeat_interval_ms,
        }
        c
    }
}
