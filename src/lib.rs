//! Dropster firmware library.
//!
//! Control core for an atmospheric water generator: thermal control state
//! machine with compressor start protection, evaporator fan loop, tank
//! level estimation, threshold alerts and the MQTT command/telemetry
//! gateway.  Exposes the pure-logic modules for integration testing; all
//! ESP-IDF-specific code is guarded by `#[cfg(target_os = "espidf")]`
//! within each module.

#![deny(unused_must_use)]

pub mod adapters;
pub mod alerts;
pub mod app;
pub mod config;
pub mod control;
pub mod drivers;
pub mod error;
pub mod fsm;
pub mod gateway;
pub mod persistence;
pub mod pins;
pub mod protection;
pub mod scheduler;
pub mod sensors;
pub mod tank;
pub mod time;
