//! Threshold alert engine.
//!
//! Each cycle evaluates one predicate per [`AlertKind`] and reports only the
//! edges: one event when an alert becomes active, one when it clears.  A
//! predicate whose input is unavailable keeps its previous state, so a
//! flaky sensor cannot produce alert chatter.

use heapless::Vec;
use log::{info, warn};
use serde::Serialize;

use crate::config::AlertConfig;
use crate::time::Millis;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    TankFull,
    VoltageLow,
    VoltageZero,
    HumidityLow,
}

impl AlertKind {
    pub const ALL: [AlertKind; 4] = [
        AlertKind::TankFull,
        AlertKind::VoltageLow,
        AlertKind::VoltageZero,
        AlertKind::HumidityLow,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Self::TankFull => "tank_full",
            Self::VoltageLow => "voltage_low",
            Self::VoltageZero => "voltage_zero",
            Self::HumidityLow => "humidity_low",
        }
    }
}

/// Current state of one alert.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Alert {
    pub kind: AlertKind,
    pub active: bool,
    /// When the alert last became active.
    pub since: Option<Millis>,
    pub threshold: f32,
}

/// An edge reported by [`AlertEngine::evaluate`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AlertEvent {
    pub kind: AlertKind,
    pub active: bool,
    /// Reading that caused the edge; `None` when a disabled alert is cleared.
    pub value: Option<f32>,
    pub threshold: f32,
    /// Activation time of the breach this edge belongs to.
    pub since: Millis,
}

/// Inputs for one evaluation; `None` = unavailable this cycle.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlertInputs {
    pub tank_level_percent: Option<f32>,
    pub voltage_v: Option<f32>,
    pub humidity_percent: Option<f32>,
}

pub type AlertEvents = Vec<AlertEvent, 4>;

#[derive(Debug, Clone)]
pub struct AlertEngine {
    alerts: [Alert; 4],
}

impl AlertEngine {
    pub fn new() -> Self {
        Self {
            alerts: AlertKind::ALL.map(|kind| Alert {
                kind,
                active: false,
                since: None,
                threshold: 0.0,
            }),
        }
    }

    pub fn alerts(&self) -> &[Alert; 4] {
        &self.alerts
    }

    pub fn is_active(&self, kind: AlertKind) -> bool {
        self.alerts[kind as usize].active
    }

    /// Evaluate every predicate and return the edges.
    pub fn evaluate(&mut self, inputs: &AlertInputs, cfg: &AlertConfig, now: Millis) -> AlertEvents {
        let mut events = AlertEvents::new();

        for kind in AlertKind::ALL {
            let (enabled, threshold, value, breach) = match kind {
                AlertKind::TankFull => (
                    cfg.tank_full_enabled,
                    cfg.tank_full_percent,
                    inputs.tank_level_percent,
                    inputs
                        .tank_level_percent
                        .map(|l| l >= cfg.tank_full_percent),
                ),
                AlertKind::VoltageLow => (
                    cfg.voltage_low_enabled,
                    cfg.voltage_low_v,
                    inputs.voltage_v,
                    inputs.voltage_v.map(|v| v > 0.0 && v < cfg.voltage_low_v),
                ),
                AlertKind::VoltageZero => (
                    true,
                    cfg.voltage_zero_v,
                    inputs.voltage_v,
                    inputs.voltage_v.map(|v| v <= cfg.voltage_zero_v),
                ),
                AlertKind::HumidityLow => (
                    cfg.humidity_low_enabled,
                    cfg.humidity_low_percent,
                    inputs.humidity_percent,
                    inputs
                        .humidity_percent
                        .map(|h| h < cfg.humidity_low_percent),
                ),
            };

            let alert = &mut self.alerts[kind as usize];
            alert.threshold = threshold;

            let next = if enabled {
                // Unavailable input keeps the previous state.
                breach.unwrap_or(alert.active)
            } else {
                false
            };
            if next == alert.active {
                continue;
            }

            alert.active = next;
            let since = if next {
                alert.since = Some(now);
                warn!("ALERT {}: active ({value:?} vs {threshold})", kind.name());
                now
            } else {
                info!("ALERT {}: cleared", kind.name());
                alert.since.unwrap_or(now)
            };

            // Capacity equals the number of kinds, so push cannot fail.
            let _ = events.push(AlertEvent {
                kind,
                active: next,
                value: if enabled { value } else { None },
                threshold,
                since,
            });
        }

        events
    }
}

impl Default for AlertEngine {
    fn default() -> Self {
        Self::new()
    }
}
