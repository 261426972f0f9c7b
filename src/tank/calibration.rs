//! Field calibration table: ultrasonic distance → stored volume.
//!
//! Operators fill the tank in steps and record `(distance, volume)` pairs.
//! The table is kept sorted by distance.  Every accepted point keeps volume
//! non-increasing as distance grows (a farther water surface can never mean
//! more water), and bounds the slope to each neighbour so a typo such as
//! 180 L instead of 18 L is caught at entry time instead of showing up as a
//! level jump later.

use heapless::Vec;
use serde::{Deserialize, Serialize};

use crate::config::TankConfig;
use crate::error::CalibrationError;

/// Maximum number of stored points.
pub const MAX_CALIBRATION_POINTS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationPoint {
    pub distance_cm: f32,
    pub volume_l: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalibrationTable {
    points: Vec<CalibrationPoint, MAX_CALIBRATION_POINTS>,
}

impl CalibrationTable {
    pub const fn new() -> Self {
        Self { points: Vec::new() }
    }

    pub fn points(&self) -> &[CalibrationPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.points.is_full()
    }

    /// Validate and insert a point.  On error the table is unchanged.
    pub fn add_point(
        &mut self,
        distance_cm: f32,
        volume_l: f32,
        cfg: &TankConfig,
    ) -> Result<(), CalibrationError> {
        if self.points.is_full() {
            return Err(CalibrationError::TableFull);
        }
        if !(cfg.min_distance_cm..=cfg.max_distance_cm).contains(&distance_cm) {
            return Err(CalibrationError::DistanceOutOfRange);
        }
        if !(0.0..=cfg.capacity_l).contains(&volume_l) {
            return Err(CalibrationError::VolumeOutOfRange);
        }
        if self
            .points
            .iter()
            .any(|p| (p.distance_cm - distance_cm).abs() < cfg.calibration_tolerance_cm)
        {
            return Err(CalibrationError::DuplicateDistance);
        }

        let idx = self.points.partition_point(|p| p.distance_cm < distance_cm);
        let candidate = CalibrationPoint {
            distance_cm,
            volume_l,
        };

        // Nearer neighbour must hold at least as much, farther at most as much.
        if let Some(nearer) = idx.checked_sub(1).map(|i| self.points[i]) {
            check_slope(nearer, candidate, cfg)?;
        }
        if let Some(&farther) = self.points.get(idx) {
            check_slope(candidate, farther, cfg)?;
        }

        self.points
            .insert(idx, candidate)
            .map_err(|_| CalibrationError::TableFull)
    }

    /// Explicit reset; the only way the table becomes empty again.
    pub fn clear(&mut self) {
        self.points.clear();
    }

    /// Interpolated volume at `distance_cm`, clamped to the extreme points.
    /// `None` with an empty table.
    pub fn volume_at(&self, distance_cm: f32) -> Option<f32> {
        let first = self.points.first()?;
        let last = self.points.last()?;
        if distance_cm <= first.distance_cm {
            return Some(first.volume_l);
        }
        if distance_cm >= last.distance_cm {
            return Some(last.volume_l);
        }

        let idx = self.points.partition_point(|p| p.distance_cm < distance_cm);
        let hi = self.points[idx];
        let lo = self.points[idx - 1];
        let span = hi.distance_cm - lo.distance_cm;
        let frac = (distance_cm - lo.distance_cm) / span;
        Some(lo.volume_l + frac * (hi.volume_l - lo.volume_l))
    }

    /// Check a table loaded from storage against the same rules as
    /// [`add_point`](Self::add_point).
    pub fn is_consistent(&self, cfg: &TankConfig) -> bool {
        let mut rebuilt = CalibrationTable::new();
        self.points
            .iter()
            .all(|p| rebuilt.add_point(p.distance_cm, p.volume_l, cfg).is_ok())
    }
}

/// `nearer` has the smaller distance.
fn check_slope(
    nearer: CalibrationPoint,
    farther: CalibrationPoint,
    cfg: &TankConfig,
) -> Result<(), CalibrationError> {
    let dv = farther.volume_l - nearer.volume_l;
    let dd = farther.distance_cm - nearer.distance_cm;
    let slope = dv / dd;
    if slope > 0.0 {
        return Err(CalibrationError::NotMonotonic);
    }
    if slope.abs() > cfg.max_liters_per_cm {
        return Err(CalibrationError::SlopeOutOfBounds);
    }
    Ok(())
}
