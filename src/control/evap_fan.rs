//! Evaporator fan hysteresis loop.
//!
//! Runs beside the thermal FSM with its own thresholds and timers:
//!
//! - on when `T ≥ setpoint + on_offset`, off when `T ≤ setpoint − off_offset`
//! - never on longer than `max_on`; a forced stop is followed by `min_off` rest
//! - once the compressor has run continuously for `compensation_delay`, the
//!   evaporator reading is lowered by `compensation_offset` before comparing,
//!   since the sensor then sits in the coil's cold air stream
//! - forced off while the FSM is in Fault
//!
//! Missing temperature or setpoint holds the current state.

use log::{debug, info};

use crate::config::EvapFanConfig;
use crate::time::{Millis, secs_to_ms};

/// Per-tick inputs, borrowed from the FSM context.
#[derive(Debug, Clone, Copy)]
pub struct EvapFanInputs {
    pub evap_temp_c: Option<f32>,
    pub setpoint_c: Option<f32>,
    /// Continuous compressor runtime, 0 while off.
    pub compressor_runtime_ms: u32,
    pub fault: bool,
}

#[derive(Debug, Clone, Default)]
pub struct EvapFanController {
    on: bool,
    on_since: Option<Millis>,
    resting_since: Option<Millis>,
}

impl EvapFanController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_on(&self) -> bool {
        self.on
    }

    /// Evaluate the loop and return the desired fan state.
    pub fn update(&mut self, inputs: EvapFanInputs, cfg: &EvapFanConfig, now: Millis) -> bool {
        if inputs.fault {
            if self.on {
                info!("EVAP_FAN: forced off by fault");
                self.switch_off(now);
            }
            return false;
        }

        let max_on = secs_to_ms(cfg.max_on_secs);
        if self.on_since.is_some_and(|since| now.has_elapsed(since, max_on)) {
            info!("EVAP_FAN: max run time reached, resting");
            self.switch_off(now);
            return false;
        }

        let (Some(temp), Some(setpoint)) = (inputs.evap_temp_c, inputs.setpoint_c) else {
            return self.on;
        };

        let compensated = inputs.compressor_runtime_ms
            >= secs_to_ms(cfg.compensation_delay_secs);
        let t = if compensated {
            temp - cfg.compensation_offset_c
        } else {
            temp
        };

        if self.on {
            if t <= setpoint - cfg.off_offset_c {
                debug!("EVAP_FAN: {t:.2} °C ≤ {:.2} °C, off", setpoint - cfg.off_offset_c);
                self.switch_off(now);
            }
        } else if t >= setpoint + cfg.on_offset_c && self.rest_elapsed(now, cfg) {
            debug!("EVAP_FAN: {t:.2} °C ≥ {:.2} °C, on", setpoint + cfg.on_offset_c);
            self.on = true;
            self.on_since = Some(now);
        }

        self.on
    }

    fn switch_off(&mut self, now: Millis) {
        self.on = false;
        self.on_since = None;
        self.resting_since = Some(now);
    }

    fn rest_elapsed(&mut self, now: Millis, cfg: &EvapFanConfig) -> bool {
        match self.resting_since {
            Some(since) if !now.has_elapsed(since, secs_to_ms(cfg.min_off_secs)) => false,
            _ => {
                self.resting_since = None;
                true
            }
        }
    }
}
