//! Function-pointer finite state machine engine for the thermal cycle.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  StateTable                                                     │
//! │  ┌────────────────┬──────────┬──────────┬───────────────────┐   │
//! │  │ StateId        │ on_enter │ on_exit  │ on_update         │   │
//! │  ├────────────────┼──────────┼──────────┼───────────────────┤   │
//! │  │ Idle           │ fn(ctx)  │ —        │ fn(ctx)->Option<> │   │
//! │  │ Cooling        │ fn(ctx)  │ fn(ctx)  │ fn(ctx)->Option<> │   │
//! │  │ ProtectionHold │ fn(ctx)  │ —        │ fn(ctx)->Option<> │   │
//! │  │ Fault          │ fn(ctx)  │ fn(ctx)  │ fn(ctx)->Option<> │   │
//! │  └────────────────┴──────────┴──────────┴───────────────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each tick the engine calls `on_update` for the **current** state.
//! If it returns `Some(next_id)`, the engine runs `on_exit` for the
//! current state, then `on_enter` for the next, and updates the
//! current pointer.  All functions receive `&mut FsmContext` which
//! holds sensor readings, actuator commands, config, and timing.

pub mod context;
pub mod states;

use context::FsmContext;
use log::info;
use serde::Serialize;

// ---------------------------------------------------------------------------
// State identity
// ---------------------------------------------------------------------------

/// Control modes.
/// Must stay in sync with the state table built in [`states::build_state_table`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum StateId {
    Idle = 0,
    Cooling = 1,
    ProtectionHold = 2,
    Fault = 3,
}

impl StateId {
    /// Total number of states — used to size the table array.
    pub const COUNT: usize = 4;

    /// Convert an index back to `StateId`.  Panics on out-of-range in
    /// debug builds; returns `Fault` in release (safe fallback).
    pub fn from_index(idx: usize) -> Self {
        match idx {
            0 => Self::Idle,
            1 => Self::Cooling,
            2 => Self::ProtectionHold,
            3 => Self::Fault,
            _ => {
                debug_assert!(false, "invalid state index: {idx}");
                Self::Fault
            }
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Cooling => "cooling",
            Self::ProtectionHold => "protection_hold",
            Self::Fault => "fault",
        }
    }
}

// ---------------------------------------------------------------------------
// Function-pointer type aliases
// ---------------------------------------------------------------------------

/// Signature for `on_enter` and `on_exit` actions.
/// These run exactly once on each state transition.
pub type StateActionFn = fn(&mut FsmContext);

/// Signature for the per-tick update handler.
/// Returns `Some(next)` to trigger a transition, or `None` to stay.
pub type StateUpdateFn = fn(&mut FsmContext) -> Option<StateId>;

// ---------------------------------------------------------------------------
// State descriptor (one row in the table)
// ---------------------------------------------------------------------------

/// Static descriptor for a single FSM state.
pub struct StateDescriptor {
    pub id: StateId,
    pub name: &'static str,
    pub on_enter: Option<StateActionFn>,
    pub on_exit: Option<StateActionFn>,
    pub on_update: StateUpdateFn,
}

// ---------------------------------------------------------------------------
// FSM engine
// ---------------------------------------------------------------------------

/// The finite state machine engine.
pub struct Fsm {
    /// Fixed-size table indexed by `StateId as usize`.
    table: [StateDescriptor; StateId::COUNT],
    /// Index of the currently active state.
    current: usize,
}

impl Fsm {
    /// Construct a new FSM with the given state table, starting in `initial`.
    pub fn new(table: [StateDescriptor; StateId::COUNT], initial: StateId) -> Self {
        Self {
            table,
            current: initial as usize,
        }
    }

    /// Run the initial `on_enter` for the starting state.
    /// Call once after construction, before the first `tick()`.
    pub fn start(&mut self, ctx: &mut FsmContext) {
        info!("FSM starting in state: {}", self.table[self.current].name);
        ctx.state_entered_at = ctx.now;
        if let Some(enter) = self.table[self.current].on_enter {
            enter(ctx);
        }
    }

    /// Advance the FSM by one tick.
    ///
    /// 1. Call `on_update` for the current state.
    /// 2. If it returns `Some(next)`, execute the transition:
    ///    `on_exit(current)` → update pointer → `on_enter(next)`.
    ///
    /// Returns the new state if a transition happened.
    pub fn tick(&mut self, ctx: &mut FsmContext) -> Option<StateId> {
        let next = (self.table[self.current].on_update)(ctx)?;
        if next as usize == self.current {
            return None;
        }
        self.transition(next, ctx);
        Some(next)
    }

    /// Force an immediate transition (used when the protection monitor
    /// latches Fault regardless of what `on_update` would return).
    pub fn force_transition(&mut self, next: StateId, ctx: &mut FsmContext) -> bool {
        if next as usize != self.current {
            self.transition(next, ctx);
            true
        } else {
            false
        }
    }

    /// The current state's identity.
    pub fn current_state(&self) -> StateId {
        self.table[self.current].id
    }

    // -----------------------------------------------------------------------
    // Internal
    // -----------------------------------------------------------------------

    fn transition(&mut self, next_id: StateId, ctx: &mut FsmContext) {
        let next_idx = next_id as usize;

        info!(
            "FSM transition: {} -> {}",
            self.table[self.current].name, self.table[next_idx].name
        );

        if let Some(exit) = self.table[self.current].on_exit {
            exit(ctx);
        }

        self.current = next_idx;
        ctx.state_entered_at = ctx.now;

        if let Some(enter) = self.table[self.current].on_enter {
            enter(ctx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::context::FsmContext;
    use super::*;
    use crate::config::SystemConfig;
    use crate::time::Millis;

    const MIN_OFF_MS: u32 = 60_000;

    fn make_ctx() -> FsmContext {
        let mut ctx = FsmContext::new(SystemConfig::default(), Millis(0));
        ctx.sensors.dew_point_c = Some(10.0);
        ctx.tank_level_percent = Some(50.0);
        ctx
    }

    fn make_fsm() -> Fsm {
        Fsm::new(states::build_state_table(), StateId::Idle)
    }

    fn started() -> (Fsm, FsmContext) {
        let mut fsm = make_fsm();
        let mut ctx = make_ctx();
        fsm.start(&mut ctx);
        (fsm, ctx)
    }

    /// Advance the clock past the boot rest period with a warm evaporator.
    fn into_cooling(fsm: &mut Fsm, ctx: &mut FsmContext) {
        ctx.now = Millis(MIN_OFF_MS);
        ctx.smoothed_error = Some(8.0);
        fsm.tick(ctx);
        assert_eq!(fsm.current_state(), StateId::Cooling);
    }

    #[test]
    fn starts_in_idle_with_everything_off() {
        let (fsm, ctx) = started();
        assert_eq!(fsm.current_state(), StateId::Idle);
        assert_eq!(ctx.commands, context::ActuatorCommands::all_off());
    }

    #[test]
    fn idle_to_cooling_above_deadband() {
        let (mut fsm, mut ctx) = started();
        into_cooling(&mut fsm, &mut ctx);
        assert!(ctx.commands.compressor);
        assert!(ctx.commands.compressor_fan);
        assert!(ctx.commands.pump);
    }

    #[test]
    fn idle_waits_for_min_off_after_boot() {
        let (mut fsm, mut ctx) = started();
        ctx.now = Millis(MIN_OFF_MS - 1);
        ctx.smoothed_error = Some(8.0);
        fsm.tick(&mut ctx);
        assert_eq!(fsm.current_state(), StateId::Idle);
    }

    #[test]
    fn idle_stays_inside_deadband() {
        let (mut fsm, mut ctx) = started();
        ctx.now = Millis(MIN_OFF_MS);
        ctx.smoothed_error = Some(3.0);
        fsm.tick(&mut ctx);
        assert_eq!(fsm.current_state(), StateId::Idle);
    }

    #[test]
    fn disabled_cycle_never_starts() {
        let (mut fsm, mut ctx) = started();
        ctx.enabled = false;
        ctx.now = Millis(MIN_OFF_MS);
        ctx.smoothed_error = Some(8.0);
        fsm.tick(&mut ctx);
        assert_eq!(fsm.current_state(), StateId::Idle);
    }

    #[test]
    fn hot_compressor_never_starts() {
        let (mut fsm, mut ctx) = started();
        ctx.sensors.compressor_temp_c = Some(105.0);
        ctx.now = Millis(MIN_OFF_MS);
        ctx.smoothed_error = Some(8.0);
        fsm.tick(&mut ctx);
        assert_eq!(fsm.current_state(), StateId::Idle);
    }

    #[test]
    fn cooling_to_idle_below_negative_deadband() {
        let (mut fsm, mut ctx) = started();
        into_cooling(&mut fsm, &mut ctx);
        ctx.smoothed_error = Some(-3.5);
        ctx.now = ctx.now.add_ms(1_000);
        fsm.tick(&mut ctx);
        assert_eq!(fsm.current_state(), StateId::Idle);
        assert!(!ctx.commands.compressor);
        assert_eq!(ctx.resting_since, Some(ctx.now));
    }

    #[test]
    fn max_on_forces_idle_regardless_of_temperature() {
        let (mut fsm, mut ctx) = started();
        ctx.config.control.max_on_secs = 60;
        into_cooling(&mut fsm, &mut ctx);
        ctx.smoothed_error = Some(20.0);
        ctx.now = ctx.now.add_ms(65_000);
        fsm.tick(&mut ctx);
        assert_eq!(fsm.current_state(), StateId::Idle);
        assert!(!ctx.commands.compressor);
    }

    #[test]
    fn pump_follows_tank_level_while_cooling() {
        let (mut fsm, mut ctx) = started();
        into_cooling(&mut fsm, &mut ctx);

        ctx.tank_level_percent = Some(2.0);
        fsm.tick(&mut ctx);
        assert_eq!(fsm.current_state(), StateId::Cooling);
        assert!(!ctx.commands.pump);
        assert!(ctx.commands.compressor);

        ctx.tank_level_percent = Some(20.0);
        fsm.tick(&mut ctx);
        assert!(ctx.commands.pump);
    }

    #[test]
    fn failed_start_enters_hold_then_retries() {
        let (mut fsm, mut ctx) = started();
        into_cooling(&mut fsm, &mut ctx);

        ctx.start_failed = true;
        ctx.consecutive_failures = 1;
        fsm.tick(&mut ctx);
        assert_eq!(fsm.current_state(), StateId::ProtectionHold);
        assert!(!ctx.commands.compressor);
        assert!(!ctx.start_failed, "failure flag consumed");

        let retry_ms = ctx.config.protection.retry_delay_secs * 1000;
        ctx.now = ctx.now.add_ms(retry_ms - 1);
        fsm.tick(&mut ctx);
        assert_eq!(fsm.current_state(), StateId::ProtectionHold);
        ctx.now = ctx.now.add_ms(1);
        fsm.tick(&mut ctx);
        assert_eq!(fsm.current_state(), StateId::Idle);
    }

    #[test]
    fn fault_threshold_latches_from_any_state() {
        for start in [StateId::Idle, StateId::Cooling, StateId::ProtectionHold] {
            let (mut fsm, mut ctx) = started();
            fsm.force_transition(start, &mut ctx);
            ctx.consecutive_failures = ctx.config.protection.fault_after_failures;
            fsm.tick(&mut ctx);
            assert_eq!(fsm.current_state(), StateId::Fault, "from {start:?}");
            assert_eq!(ctx.commands, context::ActuatorCommands::all_off());
        }
    }

    #[test]
    fn fault_requires_explicit_reset() {
        let (mut fsm, mut ctx) = started();
        ctx.consecutive_failures = 3;
        fsm.force_transition(StateId::Fault, &mut ctx);
        for i in 0..10 {
            ctx.now = Millis(i * 600_000);
            fsm.tick(&mut ctx);
        }
        assert_eq!(fsm.current_state(), StateId::Fault);

        ctx.fault_reset_requested = true;
        fsm.tick(&mut ctx);
        assert_eq!(fsm.current_state(), StateId::Idle);
        assert_eq!(ctx.consecutive_failures, 0);
        assert!(!ctx.fault_reset_requested);
    }

    #[test]
    fn state_id_from_index_roundtrip() {
        for i in 0..StateId::COUNT {
            let id = StateId::from_index(i);
            assert_eq!(id as usize, i);
        }
    }

    #[test]
    #[cfg(not(debug_assertions))]
    fn state_id_from_invalid_index_returns_fault() {
        assert_eq!(StateId::from_index(99), StateId::Fault);
    }
}
