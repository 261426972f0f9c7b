//! Secondary control loops that run beside the thermal FSM.

pub mod evap_fan;
