//! Concrete state handler functions and table builder.
//!
//! Each state is defined by plain `fn` pointers — no closures, no
//! dynamic dispatch, no heap.
//!
//! ```text
//!  IDLE ──[err > +deadband, rested, enabled, compressor cool]──▶ COOLING
//!    ▲                                                             │
//!    ├──────[err < −deadband | max_on | disabled | hot]────────────┤
//!    │                                                             │
//!    └──[retry_delay elapsed]── PROTECTION_HOLD ◀──[failed start]──┘
//!
//!  Any state ──[failures ≥ fault_after]──▶ FAULT ──[reset_fault]──▶ IDLE
//! ```

use super::context::{ActuatorCommands, FsmContext};
use super::{StateDescriptor, StateId};
use crate::time::secs_to_ms;
use log::{info, warn};

// ═══════════════════════════════════════════════════════════════════════════
//  Table builder
// ═══════════════════════════════════════════════════════════════════════════

/// Build the static state table.  Called once at startup.
pub fn build_state_table() -> [StateDescriptor; StateId::COUNT] {
    [
        // Index 0 — Idle
        StateDescriptor {
            id: StateId::Idle,
            name: "Idle",
            on_enter: Some(idle_enter),
            on_exit: None,
            on_update: idle_update,
        },
        // Index 1 — Cooling
        StateDescriptor {
            id: StateId::Cooling,
            name: "Cooling",
            on_enter: Some(cooling_enter),
            on_exit: Some(cooling_exit),
            on_update: cooling_update,
        },
        // Index 2 — ProtectionHold
        StateDescriptor {
            id: StateId::ProtectionHold,
            name: "ProtectionHold",
            on_enter: Some(hold_enter),
            on_exit: None,
            on_update: hold_update,
        },
        // Index 3 — Fault
        StateDescriptor {
            id: StateId::Fault,
            name: "Fault",
            on_enter: Some(fault_enter),
            on_exit: Some(fault_exit),
            on_update: fault_update,
        },
    ]
}

// ═══════════════════════════════════════════════════════════════════════════
//  IDLE state — compressor resting, waiting for a warm evaporator
// ═══════════════════════════════════════════════════════════════════════════

fn idle_enter(ctx: &mut FsmContext) {
    ctx.commands.compressor = false;
    ctx.commands.compressor_fan = false;
    ctx.commands.pump = false;
    info!("IDLE: compressor off");
}

fn idle_update(ctx: &mut FsmContext) -> Option<StateId> {
    if ctx.fault_threshold_reached() {
        return Some(StateId::Fault);
    }

    if !ctx.enabled || ctx.compressor_over_temperature() {
        return None;
    }

    let deadband = ctx.config.control.deadband_c;
    let err = ctx.smoothed_error?;
    if err > deadband && ctx.rest_elapsed() {
        info!("IDLE: error {err:.2} °C above deadband {deadband:.1} → cooling");
        return Some(StateId::Cooling);
    }

    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  COOLING state — compressor, condenser fan and (level permitting) pump on
// ═══════════════════════════════════════════════════════════════════════════

fn cooling_enter(ctx: &mut FsmContext) {
    ctx.commands.compressor = true;
    ctx.commands.compressor_fan = true;
    ctx.commands.pump = ctx.pump_allowed();
    ctx.on_since = Some(ctx.now);
    info!(
        "COOLING: compressor on, max run {} s",
        ctx.config.control.max_on_secs
    );
}

fn cooling_exit(ctx: &mut FsmContext) {
    ctx.commands.compressor = false;
    ctx.commands.compressor_fan = false;
    ctx.commands.pump = false;
    ctx.on_since = None;
    ctx.resting_since = Some(ctx.now);
    info!("COOLING: compressor off, resting {} s", ctx.config.control.min_off_secs);
}

fn cooling_update(ctx: &mut FsmContext) -> Option<StateId> {
    if ctx.fault_threshold_reached() {
        return Some(StateId::Fault);
    }

    if core::mem::take(&mut ctx.start_failed) {
        warn!(
            "COOLING: start failure #{} → holding",
            ctx.consecutive_failures
        );
        return Some(StateId::ProtectionHold);
    }

    if ctx.max_on_reached() {
        info!("COOLING: max run time reached → forced rest");
        return Some(StateId::Idle);
    }

    if !ctx.enabled {
        info!("COOLING: cycle disabled");
        return Some(StateId::Idle);
    }

    if ctx.compressor_over_temperature() {
        warn!(
            "COOLING: compressor at {:.1} °C over limit",
            ctx.sensors.compressor_temp_c.unwrap_or_default()
        );
        return Some(StateId::Idle);
    }

    let deadband = ctx.config.control.deadband_c;
    if let Some(err) = ctx.smoothed_error.filter(|e| *e < -deadband) {
        info!("COOLING: error {err:.2} °C below deadband → idle");
        return Some(StateId::Idle);
    }

    // Low tank suspends the pump without ending the cycle.
    let pump = ctx.pump_allowed();
    if pump != ctx.commands.pump {
        info!("COOLING: pump {}", if pump { "resumed" } else { "suspended, tank low" });
        ctx.commands.pump = pump;
    }

    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  PROTECTION_HOLD state — compressor inhibited after a failed start
// ═══════════════════════════════════════════════════════════════════════════

fn hold_enter(ctx: &mut FsmContext) {
    ctx.commands.compressor = false;
    ctx.commands.compressor_fan = false;
    ctx.commands.pump = false;
    info!(
        "PROTECTION_HOLD: retry in {} s",
        ctx.config.protection.retry_delay_secs
    );
}

fn hold_update(ctx: &mut FsmContext) -> Option<StateId> {
    if ctx.fault_threshold_reached() {
        return Some(StateId::Fault);
    }

    if ctx.ms_in_state() >= secs_to_ms(ctx.config.protection.retry_delay_secs) {
        return Some(StateId::Idle);
    }

    None
}

// ═══════════════════════════════════════════════════════════════════════════
//  FAULT state — latched until the operator resets it
// ═══════════════════════════════════════════════════════════════════════════

fn fault_enter(ctx: &mut FsmContext) {
    ctx.commands = ActuatorCommands::all_off();
    warn!(
        "FAULT: {} consecutive start failures, all actuators disabled",
        ctx.consecutive_failures
    );
}

fn fault_exit(ctx: &mut FsmContext) {
    ctx.consecutive_failures = 0;
    info!("FAULT: cleared by operator");
}

fn fault_update(ctx: &mut FsmContext) -> Option<StateId> {
    if core::mem::take(&mut ctx.fault_reset_requested) {
        return Some(StateId::Idle);
    }
    None
}
