//! Tank level estimation from ultrasonic distance.
//!
//! ```text
//!  distance ─▶ range check ─▶ valid-run counter ─▶ calibration lookup ─▶ TankState
//! ```
//!
//! Readings outside the physical range reset the run and leave the
//! published level untouched.  A new level is only published once
//! `min_valid_run` consecutive readings are in range, which suppresses the
//! odd echo that survives the outlier filter.

pub mod calibration;

use log::debug;
use serde::Serialize;

use crate::config::TankConfig;
use crate::time::Millis;
use calibration::CalibrationTable;

/// Last published tank estimate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TankState {
    pub level_percent: f32,
    pub volume_l: f32,
    pub last_update: Millis,
}

#[derive(Debug, Clone, Default)]
pub struct TankLevelEstimator {
    valid_run: u8,
    state: Option<TankState>,
}

impl TankLevelEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one distance reading (`None` = sensor gave nothing usable).
    ///
    /// Returns the new state when a level was published on this call.
    pub fn update(
        &mut self,
        distance_cm: Option<f32>,
        table: &CalibrationTable,
        cfg: &TankConfig,
        now: Millis,
    ) -> Option<TankState> {
        let Some(d) = distance_cm.filter(|d| (cfg.min_distance_cm..=cfg.max_distance_cm).contains(d))
        else {
            if self.valid_run > 0 {
                debug!("TANK: invalid distance {distance_cm:?}, run reset");
            }
            self.valid_run = 0;
            return None;
        };

        self.valid_run = self.valid_run.saturating_add(1);
        if self.valid_run < cfg.min_valid_run {
            return None;
        }

        let volume_l = table.volume_at(d)?.max(0.0);
        let level_percent = (volume_l / cfg.capacity_l * 100.0).clamp(0.0, 100.0);
        let state = TankState {
            level_percent,
            volume_l,
            last_update: now,
        };
        self.state = Some(state);
        Some(state)
    }

    pub fn state(&self) -> Option<TankState> {
        self.state
    }

    pub fn level_percent(&self) -> Option<f32> {
        self.state.map(|s| s.level_percent)
    }

    /// Forget the published level, e.g. after the calibration table is cleared.
    pub fn invalidate(&mut self) {
        self.state = None;
        self.valid_run = 0;
    }
}
