//! Sensor subsystem — smoothing, plausibility checks and the aggregating
//! [`SensorHub`].
//!
//! The hub polls every [`SensorKind`] through the
//! [`SensorPort`](crate::app::ports::SensorPort) and produces a
//! [`SensorSnapshot`] that gets written into `FsmContext.sensors`.

pub mod filter;
pub mod psychro;
pub mod thermistor;

use log::{debug, warn};
use serde::Serialize;

use crate::app::ports::SensorPort;
use crate::fsm::context::SensorSnapshot;
use crate::time::Millis;
use filter::{MovingAverage, OutlierFilter};
use thermistor::Thermistor;

/// Last good value is dropped after this long without a fresh one.
pub const SENSOR_STALE_MS: u32 = 30_000;

const POWER_AVG_SAMPLES: usize = 5;

/// Every quantity the controller measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    AmbientTemp,
    AmbientHumidity,
    AmbientPressure,
    EvapTemp,
    EvapHumidity,
    /// Raw ADC counts from the compressor thermistor.
    CompressorTempAdc,
    Distance,
    Voltage,
    Current,
    Power,
    Energy,
}

impl SensorKind {
    pub const COUNT: usize = 11;

    pub const ALL: [SensorKind; Self::COUNT] = [
        SensorKind::AmbientTemp,
        SensorKind::AmbientHumidity,
        SensorKind::AmbientPressure,
        SensorKind::EvapTemp,
        SensorKind::EvapHumidity,
        SensorKind::CompressorTempAdc,
        SensorKind::Distance,
        SensorKind::Voltage,
        SensorKind::Current,
        SensorKind::Power,
        SensorKind::Energy,
    ];

    /// Physically plausible range of the value *as reported by the driver*.
    pub const fn plausible_range(self) -> (f32, f32) {
        match self {
            Self::AmbientTemp => (-10.0, 50.0),
            Self::AmbientHumidity | Self::EvapHumidity => (0.0, 100.0),
            Self::AmbientPressure => (300.0, 1100.0),
            Self::EvapTemp => (-20.0, 60.0),
            Self::CompressorTempAdc => (0.0, 4095.0),
            // The tank estimator applies the configured window.
            Self::Distance => (0.0, 1000.0),
            Self::Voltage => (0.0, 300.0),
            Self::Current => (0.0, 100.0),
            Self::Power => (0.0, 25_000.0),
            Self::Energy => (0.0, 1.0e7),
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::AmbientTemp => "ambient_temp",
            Self::AmbientHumidity => "ambient_humidity",
            Self::AmbientPressure => "ambient_pressure",
            Self::EvapTemp => "evap_temp",
            Self::EvapHumidity => "evap_humidity",
            Self::CompressorTempAdc => "compressor_temp",
            Self::Distance => "distance",
            Self::Voltage => "voltage",
            Self::Current => "current",
            Self::Power => "power",
            Self::Energy => "energy",
        }
    }
}

/// One raw reading from a driver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorSample {
    pub kind: SensorKind,
    pub value: f32,
    pub timestamp: Millis,
    /// Driver-level validity (CRC, timeout, bus error).
    pub valid: bool,
}

impl SensorSample {
    pub fn new(kind: SensorKind, value: f32, timestamp: Millis) -> Self {
        Self {
            kind,
            value,
            timestamp,
            valid: true,
        }
    }

    pub fn invalid(kind: SensorKind, timestamp: Millis) -> Self {
        Self {
            kind,
            value: f32::NAN,
            timestamp,
            valid: false,
        }
    }
}

/// Held value for one channel.
#[derive(Debug, Clone, Copy, Default)]
struct Held {
    value: Option<f32>,
    at: Millis,
}

/// Aggregates all channels and produces a unified snapshot.
pub struct SensorHub {
    held: [Held; SensorKind::COUNT],
    thermistor: Thermistor,
    ultrasonic: OutlierFilter,
    voltage_avg: MovingAverage<POWER_AVG_SAMPLES>,
    current_avg: MovingAverage<POWER_AVG_SAMPLES>,
    power_avg: MovingAverage<POWER_AVG_SAMPLES>,
    /// Distance accepted during the latest read cycle only.
    fresh_distance: Option<f32>,
    /// Unsmoothed readings accepted during the latest read cycle.
    latest: [Option<f32>; SensorKind::COUNT],
    /// Channels currently failing, for edge-only warnings.
    failing: u16,
}

impl SensorHub {
    pub fn new() -> Self {
        Self {
            held: [Held::default(); SensorKind::COUNT],
            thermistor: Thermistor::new(),
            ultrasonic: OutlierFilter::new(),
            voltage_avg: MovingAverage::new(),
            current_avg: MovingAverage::new(),
            power_avg: MovingAverage::new(),
            fresh_distance: None,
            latest: [None; SensorKind::COUNT],
            failing: 0,
        }
    }

    /// Poll every channel once and return the updated snapshot.
    ///
    /// Individual read failures are logged and the previous good value is
    /// retained — a single flaky sensor must not stall the control loop.
    pub fn read_all<S: SensorPort>(&mut self, port: &mut S, now: Millis, filter_k: f32) -> SensorSnapshot {
        self.fresh_distance = None;
        self.latest = [None; SensorKind::COUNT];
        for kind in SensorKind::ALL {
            let sample = port.read(kind, now);
            self.ingest(sample, filter_k);
        }
        self.expire(now);
        self.snapshot(now)
    }

    /// Drop held values that went stale together with the smoothing
    /// history behind them, so a channel that comes back starts clean.
    fn expire(&mut self, now: Millis) {
        for kind in SensorKind::ALL {
            let held = &mut self.held[kind as usize];
            if held.value.is_none() || !now.has_elapsed(held.at, SENSOR_STALE_MS) {
                continue;
            }
            held.value = None;
            debug!("SENSOR {}: stale, dropped", kind.name());
            match kind {
                SensorKind::CompressorTempAdc => self.thermistor.reset(),
                SensorKind::Distance => self.ultrasonic.reset(),
                SensorKind::Voltage => self.voltage_avg.clear(),
                SensorKind::Current => self.current_avg.clear(),
                SensorKind::Power => self.power_avg.clear(),
                _ => {}
            }
        }
    }

    /// Validate, smooth and hold one sample.
    pub fn ingest(&mut self, sample: SensorSample, filter_k: f32) {
        let kind = sample.kind;
        let (min, max) = kind.plausible_range();
        let plausible = sample.valid && sample.value.is_finite() && (min..=max).contains(&sample.value);

        let bit = 1u16 << (kind as u16);
        if !plausible {
            if self.failing & bit == 0 {
                warn!("SENSOR {}: rejected reading {:.2}", kind.name(), sample.value);
            }
            self.failing |= bit;
            return;
        }
        if self.failing & bit != 0 {
            debug!("SENSOR {}: recovered", kind.name());
            self.failing &= !bit;
        }
        self.latest[kind as usize] = Some(sample.value);

        let value = match kind {
            SensorKind::CompressorTempAdc => self.thermistor.push(sample.value),
            SensorKind::Distance => {
                let filtered = self.ultrasonic.filter(sample.value, filter_k);
                self.fresh_distance = filtered;
                filtered
            }
            SensorKind::Voltage => Some(self.voltage_avg.push(sample.value)),
            SensorKind::Current => Some(self.current_avg.push(sample.value)),
            SensorKind::Power => Some(self.power_avg.push(sample.value)),
            _ => Some(sample.value),
        };

        if let Some(v) = value {
            self.held[kind as usize] = Held {
                value: Some(v),
                at: sample.timestamp,
            };
        }
    }

    /// Current value of one channel, `None` if never read or stale.
    pub fn value(&self, kind: SensorKind, now: Millis) -> Option<f32> {
        let held = self.held[kind as usize];
        held.value.filter(|_| !now.has_elapsed(held.at, SENSOR_STALE_MS))
    }

    /// Unsmoothed reading from the latest read cycle, `None` if the channel
    /// was not read or was rejected.  Threshold decisions on mains voltage
    /// and compressor current use this rather than the averaged value.
    pub fn latest(&self, kind: SensorKind) -> Option<f32> {
        self.latest[kind as usize]
    }

    /// Bitmask of channels whose latest read was rejected.
    pub fn failing_mask(&self) -> u16 {
        self.failing
    }

    /// Build the snapshot, deriving psychrometric quantities.
    pub fn snapshot(&self, now: Millis) -> SensorSnapshot {
        let v = |kind| self.value(kind, now);
        let ambient_temp_c = v(SensorKind::AmbientTemp);
        let ambient_humidity = v(SensorKind::AmbientHumidity);
        let (dew_point_c, absolute_humidity_gm3) = match (ambient_temp_c, ambient_humidity) {
            (Some(t), Some(h)) => (psychro::dew_point(t, h), psychro::absolute_humidity(t, h)),
            _ => (None, None),
        };

        SensorSnapshot {
            ambient_temp_c,
            ambient_humidity,
            ambient_pressure_hpa: v(SensorKind::AmbientPressure),
            evap_temp_c: v(SensorKind::EvapTemp),
            evap_humidity: v(SensorKind::EvapHumidity),
            compressor_temp_c: v(SensorKind::CompressorTempAdc),
            distance_cm: self.fresh_distance,
            voltage_v: v(SensorKind::Voltage),
            current_a: v(SensorKind::Current),
            power_w: v(SensorKind::Power),
            energy_kwh: v(SensorKind::Energy),
            dew_point_c,
            absolute_humidity_gm3,
        }
    }
}

impl Default for SensorHub {
    fn default() -> Self {
        Self::new()
    }
}
