//! Compressor start-failure protection.
//!
//! The monitor runs **every tick before the FSM**.  It watches the
//! compressor relay output and the mains current:
//!
//! 1. On an off→on edge it opens a protection window.
//! 2. While the window is open, a current reading at or above
//!    `min_start_current_a` proves the start: the consecutive-failure
//!    counter resets and the window closes early.
//! 3. If the window expires without such a reading the start failed:
//!    the counter increments by exactly one and the FSM is told to drop
//!    to ProtectionHold, which forces the compressor off.
//!
//! The counter is what escalates to Fault; the FSM compares it against
//! `fault_after_failures`.

use log::{error, info, warn};

use crate::config::ProtectionConfig;
use crate::time::Millis;

/// What the monitor concluded on this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtectionVerdict {
    /// Nothing to report.
    Quiet,
    /// Start current seen inside the window.
    Started,
    /// Window expired without start current.
    StartFailed {
        consecutive_failures: u8,
        /// Counter has reached the alert threshold.
        alert: bool,
    },
}

/// Protection record for the compressor.
#[derive(Debug, Clone, Default)]
pub struct ProtectionMonitor {
    /// Output state seen at the last [`observe_output`](Self::observe_output).
    output_on: bool,
    /// Open protection window.
    window_start: Option<Millis>,
    /// Peak current seen in the current window (A).
    measured_current: f32,
    consecutive_failures: u8,
}

impl ProtectionMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report the compressor relay state just written to hardware.
    /// An off→on edge opens the window at `now`.
    pub fn observe_output(&mut self, compressor_on: bool, now: Millis) {
        if compressor_on && !self.output_on {
            self.window_start = Some(now);
            self.measured_current = 0.0;
        } else if !compressor_on {
            self.window_start = None;
        }
        self.output_on = compressor_on;
    }

    /// Sample the current draw against the open window.
    pub fn evaluate(
        &mut self,
        current_a: Option<f32>,
        now: Millis,
        config: &ProtectionConfig,
    ) -> ProtectionVerdict {
        let Some(start) = self.window_start else {
            return ProtectionVerdict::Quiet;
        };

        if let Some(amps) = current_a {
            self.measured_current = self.measured_current.max(amps);
        }

        if self.measured_current >= config.min_start_current_a {
            if self.consecutive_failures > 0 {
                info!(
                    "PROTECTION: compressor started ({:.2} A), clearing {} failures",
                    self.measured_current, self.consecutive_failures
                );
            }
            self.consecutive_failures = 0;
            self.window_start = None;
            return ProtectionVerdict::Started;
        }

        if now.has_elapsed(start, config.window_ms) {
            self.window_start = None;
            self.consecutive_failures = self.consecutive_failures.saturating_add(1);
            let alert = self.consecutive_failures >= config.alert_after_failures;
            if self.consecutive_failures >= config.fault_after_failures {
                error!(
                    "PROTECTION: start failure #{} (peak {:.2} A), fault threshold reached",
                    self.consecutive_failures, self.measured_current
                );
            } else {
                warn!(
                    "PROTECTION: start failure #{} (peak {:.2} A < {:.2} A)",
                    self.consecutive_failures, self.measured_current, config.min_start_current_a
                );
            }
            return ProtectionVerdict::StartFailed {
                consecutive_failures: self.consecutive_failures,
                alert,
            };
        }

        ProtectionVerdict::Quiet
    }

    pub fn consecutive_failures(&self) -> u8 {
        self.consecutive_failures
    }

    /// Peak current observed in the latest window (A).
    pub fn measured_current(&self) -> f32 {
        self.measured_current
    }

    /// Operator reset after Fault.
    pub fn reset(&mut self) {
        self.consecutive_failures = 0;
        self.window_start = None;
    }
}
