//! Psychrometric helpers: saturation pressure, dew point, absolute humidity.
//!
//! Uses the integrated Clausius–Clapeyron form anchored at 0 °C
//! (`es(0 °C) = 611.2 Pa`), which is accurate to ~1 % over the AWG's
//! −10 °C … 50 °C operating window and needs only one `exp`/`ln`.

/// Saturation vapour pressure at 0 °C (Pa).
pub const A_MAGNUS: f32 = 611.2;
/// Specific gas constant of water vapour (J/(kg·K)).
pub const RV: f32 = 461.5;
/// Latent heat of vaporisation (J/kg).
pub const L_VAP: f32 = 2.5e6;

const T0_K: f32 = 273.15;

/// Saturation vapour pressure over water at `temp_c` (Pa).
pub fn saturation_pressure(temp_c: f32) -> f32 {
    let t_k = temp_c + T0_K;
    A_MAGNUS * ((L_VAP / RV) * (1.0 / T0_K - 1.0 / t_k)).exp()
}

/// Dew point (°C) for the given air temperature and relative humidity.
///
/// Returns `None` for non-positive humidity (no condensation possible) or
/// non-finite inputs.
pub fn dew_point(temp_c: f32, rh_percent: f32) -> Option<f32> {
    if !temp_c.is_finite() || !rh_percent.is_finite() || rh_percent <= 0.0 {
        return None;
    }
    let rh = rh_percent.min(100.0) / 100.0;
    let e = rh * saturation_pressure(temp_c);
    let inv_td = 1.0 / T0_K - (RV / L_VAP) * (e / A_MAGNUS).ln();
    if inv_td <= 0.0 {
        return None;
    }
    Some(1.0 / inv_td - T0_K)
}

/// Absolute humidity (g/m³) for the given air temperature and relative humidity.
pub fn absolute_humidity(temp_c: f32, rh_percent: f32) -> Option<f32> {
    if !temp_c.is_finite() || !rh_percent.is_finite() || rh_percent < 0.0 {
        return None;
    }
    let e = rh_percent.min(100.0) / 100.0 * saturation_pressure(temp_c);
    Some(e / (RV * (temp_c + T0_K)) * 1000.0)
}
