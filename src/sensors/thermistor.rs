//! NTC thermistor on the compressor body (10 kOhm @ 25 C, B = 3950).
//!
//! Excited by a 100 uA constant-current source rather than a divider, so
//! the resistance is simply `V / I`.  The simplified Beta equation converts
//! resistance to temperature.  Raw ADC counts are averaged before
//! conversion because the compressor motor couples noise into the line.

use super::filter::MovingAverage;

const R_NOMINAL: f32 = 10_000.0;
const BETA: f32 = 3950.0;
const T_NOMINAL_K: f32 = 298.15;
const EXCITATION_A: f32 = 100e-6;
const ADC_MAX: f32 = 4095.0;
const V_REF: f32 = 3.3;
/// Within this many counts of either rail the probe is open or shorted.
const RAIL_MARGIN: f32 = 8.0;

const AVG_SAMPLES: usize = 5;

pub struct Thermistor {
    counts: MovingAverage<AVG_SAMPLES>,
}

impl Thermistor {
    pub const fn new() -> Self {
        Self {
            counts: MovingAverage::new(),
        }
    }

    /// Feed one raw ADC reading; returns the averaged temperature in °C,
    /// or `None` if the averaged reading sits on a rail.
    pub fn push(&mut self, raw: f32) -> Option<f32> {
        let avg = self.counts.push(raw);
        counts_to_celsius(avg)
    }

    pub fn reset(&mut self) {
        self.counts.clear();
    }
}

impl Default for Thermistor {
    fn default() -> Self {
        Self::new()
    }
}

/// Convert averaged ADC counts to °C.
pub fn counts_to_celsius(counts: f32) -> Option<f32> {
    if !(RAIL_MARGIN..=ADC_MAX - RAIL_MARGIN).contains(&counts) {
        return None;
    }
    let voltage = counts / ADC_MAX * V_REF;
    let r_ntc = voltage / EXCITATION_A;
    let inv_t = 1.0 / T_NOMINAL_K + (r_ntc / R_NOMINAL).ln() / BETA;
    if inv_t <= 0.0 {
        return None;
    }
    Some(1.0 / inv_t - 273.15)
}
