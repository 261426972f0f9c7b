//! Application core — pure domain logic, zero I/O.
//!
//! This module contains the business rules for the Dropster controller:
//! sensor conditioning, the thermal FSM, compressor protection, tank level
//! estimation, alerts and scheduling.  All interaction with hardware happens
//! through **port traits** defined in [`ports`], keeping this layer fully
//! testable without real peripherals.

pub mod commands;
pub mod events;
pub mod ports;
pub mod service;
