//! Application service — the hexagonal core.
//!
//! [`AppService`] owns the FSM, the sensor hub, the tank estimator, the
//! protection monitor, the evaporator fan loop, the alert engine and the
//! scheduler.  It exposes a clean, hardware-agnostic API.  All I/O flows
//! through port traits injected at call sites, making the entire service
//! testable with mock adapters.
//!
//! ```text
//!  SensorPort ──▶ ┌─────────────────────────────┐ ──▶ EventSink
//!                 │         AppService          │
//! ActuatorPort ◀──│ FSM · Protection · Tank ·   │◀──▶ StoragePort
//!                 │ Alerts · EvapFan · Schedule │
//!                 └─────────────────────────────┘
//! ```
//!
//! One [`tick`](AppService::tick) runs, in order: due sensor read → tank
//! level → alerts, control sampling, protection, FSM, evaporator fan,
//! relay writes, then status/data/heartbeat events.

use log::{debug, info, warn};

use crate::alerts::{AlertEngine, AlertInputs};
use crate::config::SystemConfig;
use crate::control::evap_fan::{EvapFanController, EvapFanInputs};
use crate::error::{CommandError, Error, TransferError};
use crate::fsm::context::{Actuator, ActuatorCommands, FsmContext, SensorSnapshot};
use crate::fsm::states::build_state_table;
use crate::fsm::{Fsm, StateId};
use crate::persistence::{self, PersistedConfig};
use crate::protection::{ProtectionMonitor, ProtectionVerdict};
use crate::scheduler::Scheduler;
use crate::sensors::{SensorHub, SensorKind};
use crate::tank::calibration::CalibrationTable;
use crate::tank::{TankLevelEstimator, TankState};
use crate::time::Millis;

use super::commands::AppCommand;
use super::events::{AppEvent, ErrorReport, ErrorSource, HeartbeatData, StatusData, TelemetryData};
use super::ports::{ActuatorPort, ConfigError, EventSink, SensorPort, StoragePort};

/// Config is written this long after the last change.
const CONFIG_SAVE_DELAY_MS: u32 = 5_000;
/// A failed save is retried after this long.
const SAVE_RETRY_MS: u32 = 5_000;

#[derive(Debug, Clone, Copy)]
struct PendingSave {
    since: Millis,
    delay_ms: u32,
}

impl PendingSave {
    fn due(self, now: Millis) -> bool {
        now.has_elapsed(self.since, self.delay_ms)
    }
}

/// Fields whose change triggers a status message.
#[derive(Debug, Clone, Copy, PartialEq)]
struct StatusKey {
    mode: StateId,
    enabled: bool,
    commands: ActuatorCommands,
    failures: u8,
}

// ───────────────────────────────────────────────────────────────
// AppService
// ───────────────────────────────────────────────────────────────

/// The application service orchestrates all domain logic.
pub struct AppService {
    fsm: Fsm,
    ctx: FsmContext,
    hub: SensorHub,
    tank: TankLevelEstimator,
    calibration: CalibrationTable,
    alerts: AlertEngine,
    protection: ProtectionMonitor,
    evap_fan: EvapFanController,
    scheduler: Scheduler,
    /// Version of the last applied configuration transfer.
    applied_version: u32,
    boot: Millis,
    /// Relay states last written, `None` until the first write.
    applied: Option<ActuatorCommands>,
    /// Actuators whose last write failed, for edge-only error reports.
    actuator_failures: u8,
    last_status: Option<StatusKey>,
    config_save: Option<PendingSave>,
    calibration_save: Option<PendingSave>,
}

impl AppService {
    /// Construct the service from persisted state.
    ///
    /// Does **not** start the FSM — call [`start`](Self::start) next.
    pub fn new(persisted: PersistedConfig, calibration: CalibrationTable, now: Millis) -> Self {
        let config = persisted.config;
        Self {
            fsm: Fsm::new(build_state_table(), StateId::Idle),
            ctx: FsmContext::new(config, now),
            hub: SensorHub::new(),
            tank: TankLevelEstimator::new(),
            calibration,
            alerts: AlertEngine::new(),
            protection: ProtectionMonitor::new(),
            evap_fan: EvapFanController::new(),
            scheduler: Scheduler::new(&config),
            applied_version: persisted.applied_version,
            boot: now,
            applied: None,
            actuator_failures: 0,
            last_status: None,
            config_save: None,
            calibration_save: None,
        }
    }

    /// Load config and calibration from storage (defaults on any failure)
    /// and construct the service.
    pub fn from_storage(storage: &impl StoragePort, now: Millis) -> Self {
        let persisted = persistence::load_config(storage);
        let calibration = persistence::load_calibration(storage, &persisted.config.tank);
        Self::new(persisted, calibration, now)
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Release every relay and start the FSM in Idle.
    pub fn start(&mut self, hw: &mut impl ActuatorPort, sink: &mut impl EventSink) {
        hw.all_off();
        self.applied = Some(ActuatorCommands::all_off());
        self.protection.observe_output(false, self.ctx.now);
        self.fsm.start(&mut self.ctx);
        sink.emit(&AppEvent::Started(self.fsm.current_state()));
        self.emit_status_if_changed(sink);
        info!(
            "AppService started in {:?} (config version {}, {} calibration points)",
            self.fsm.current_state(),
            self.applied_version,
            self.calibration.len()
        );
    }

    // ── Per-tick orchestration ────────────────────────────────

    /// Run one full control cycle.
    ///
    /// The `hw` parameter satisfies **both** [`SensorPort`] and
    /// [`ActuatorPort`] — this avoids a double mutable borrow while
    /// keeping the port boundary explicit.
    pub fn tick(
        &mut self,
        now: Millis,
        hw: &mut (impl SensorPort + ActuatorPort),
        sink: &mut impl EventSink,
    ) {
        self.ctx.now = now;
        self.ctx.start_failed = false;
        let prev_state = self.fsm.current_state();
        let due = self.scheduler.poll(now);

        // 1. Sensors → tank level → alerts
        if due.sensor_read {
            self.read_sensors(hw, now, sink);
        }

        // 2. Control sampling.  The rest latch is refreshed every tick so
        //    its timestamp never ages past half the clock range.
        self.ctx.rest_elapsed();
        if due.control_sample {
            self.ctx.sample_error();
        }

        // 3. Protection, before the FSM sees this tick.  Only unsmoothed
        //    readings taken this tick count: the average still carries the
        //    idle draw from before the relay closed.
        let current = if due.sensor_read {
            self.hub.latest(SensorKind::Current)
        } else {
            None
        };
        match self
            .protection
            .evaluate(current, now, &self.ctx.config.protection)
        {
            ProtectionVerdict::StartFailed {
                consecutive_failures,
                alert,
            } => {
                self.ctx.start_failed = true;
                self.ctx.consecutive_failures = consecutive_failures;
                sink.emit(&AppEvent::StartFailure {
                    consecutive_failures,
                    measured_current_a: self.protection.measured_current(),
                    alert,
                });
            }
            ProtectionVerdict::Started => self.ctx.consecutive_failures = 0,
            ProtectionVerdict::Quiet => {}
        }

        // 4. FSM tick (pure state logic)
        self.fsm.tick(&mut self.ctx);
        let state = self.fsm.current_state();

        // 5. Evaporator fan loop
        self.ctx.commands.evap_fan = self.evap_fan.update(
            EvapFanInputs {
                evap_temp_c: self.ctx.sensors.evap_temp_c,
                setpoint_c: self.ctx.setpoint(),
                compressor_runtime_ms: self.ctx.compressor_runtime_ms(),
                fault: state == StateId::Fault,
            },
            &self.ctx.config.evap_fan,
            now,
        );

        // 6. Apply actuator commands via ActuatorPort
        self.apply_actuators(hw, sink);
        self.protection
            .observe_output(self.ctx.commands.compressor, now);

        // 7. Events
        if state != prev_state {
            sink.emit(&AppEvent::StateChanged {
                from: prev_state,
                to: state,
            });
            if state == StateId::Fault {
                sink.emit(&AppEvent::FaultLatched {
                    consecutive_failures: self.ctx.consecutive_failures,
                });
            }
        }
        self.emit_status_if_changed(sink);
        if due.data_publish {
            sink.emit(&AppEvent::Data(self.telemetry()));
        }
        if due.heartbeat {
            sink.emit(&AppEvent::Heartbeat(self.heartbeat()));
        }
    }

    // ── Command handling ──────────────────────────────────────

    /// Process one command.  Replies (status, config, calibration) go out
    /// through `sink`; the result feeds the acknowledgement.
    pub fn handle_command(
        &mut self,
        cmd: AppCommand,
        now: Millis,
        sink: &mut impl EventSink,
    ) -> Result<(), Error> {
        match cmd {
            AppCommand::GetStatus => sink.emit(&AppEvent::Status(self.status())),
            AppCommand::GetData => sink.emit(&AppEvent::Data(self.telemetry())),
            AppCommand::GetConfig => sink.emit(&AppEvent::Config {
                version: self.applied_version,
                config: self.ctx.config,
            }),
            AppCommand::GetCalibration => {
                sink.emit(&AppEvent::Calibration(self.calibration.clone()));
            }
            AppCommand::ResetFault => {
                if self.fsm.current_state() != StateId::Fault {
                    return Err(CommandError::Rejected("not_in_fault").into());
                }
                self.protection.reset();
                self.ctx.fault_reset_requested = true;
                info!("Fault reset requested");
            }
            AppCommand::SetEnabled(enabled) => {
                if self.ctx.enabled != enabled {
                    info!("Automatic cycle {}", if enabled { "enabled" } else { "disabled" });
                }
                self.ctx.enabled = enabled;
            }
            AppCommand::AddCalibrationPoint {
                distance_cm,
                volume_l,
            } => {
                self.calibration
                    .add_point(distance_cm, volume_l, &self.ctx.config.tank)
                    .inspect_err(|e| {
                        warn!("Calibration point ({distance_cm} cm, {volume_l} L) rejected: {e}");
                    })?;
                info!(
                    "Calibration point ({distance_cm} cm, {volume_l} L) added, {} total",
                    self.calibration.len()
                );
                self.calibration_changed(now, sink);
            }
            AppCommand::ClearCalibration => {
                self.calibration.clear();
                self.tank.invalidate();
                self.ctx.tank_level_percent = None;
                info!("Calibration table cleared");
                self.calibration_changed(now, sink);
            }
            AppCommand::ResetConfig => {
                self.replace_config(SystemConfig::DEFAULTS, now);
                info!("Configuration reset to defaults");
                sink.emit(&AppEvent::Config {
                    version: self.applied_version,
                    config: self.ctx.config,
                });
            }
            AppCommand::ApplyConfig { version, config } => {
                if version <= self.applied_version {
                    return Err(TransferError::Stale.into());
                }
                config.validate().map_err(|e| match e {
                    ConfigError::ValidationFailed(msg) => TransferError::Invalid(msg),
                    _ => TransferError::Malformed,
                })?;
                self.applied_version = version;
                self.replace_config(config, now);
                info!("Configuration version {version} applied");
                sink.emit(&AppEvent::ConfigApplied { version });
            }
            AppCommand::SaveConfig => {
                self.config_save = Some(PendingSave {
                    since: now,
                    delay_ms: 0,
                });
                info!("Explicit config save requested");
            }
        }
        Ok(())
    }

    // ── Queries ───────────────────────────────────────────────

    /// Build the status message body from the current context.
    pub fn status(&self) -> StatusData {
        let c = &self.ctx.commands;
        let s = &self.ctx.sensors;
        StatusData {
            mode: self.fsm.current_state(),
            enabled: self.ctx.enabled,
            compressor: c.compressor,
            vent: c.compressor_fan,
            evap_fan: c.evap_fan,
            pump: c.pump,
            consecutive_failures: self.ctx.consecutive_failures,
            tank_level_percent: self.tank.level_percent(),
            volume_l: self.tank.state().map(|t| t.volume_l),
            evap_temp_c: s.evap_temp_c,
            dew_point_c: s.dew_point_c,
            current_a: s.current_a,
        }
    }

    /// Build a telemetry snapshot from the current context.
    pub fn telemetry(&self) -> TelemetryData {
        TelemetryData {
            timestamp: self.ctx.now,
            mode: self.fsm.current_state(),
            sensors: self.ctx.sensors,
            tank: self.tank.state(),
            smoothed_error_c: self.ctx.smoothed_error,
            actuators: self.ctx.commands,
        }
    }

    fn heartbeat(&self) -> HeartbeatData {
        HeartbeatData {
            uptime_ms: self.ctx.now.since(self.boot),
            mode: self.fsm.current_state(),
            enabled: self.ctx.enabled,
            failing_sensors: self.hub.failing_mask(),
            config_version: self.applied_version,
        }
    }

    /// Current FSM state.
    pub fn state(&self) -> StateId {
        self.fsm.current_state()
    }

    /// The live configuration.
    pub fn config(&self) -> &SystemConfig {
        &self.ctx.config
    }

    pub fn applied_version(&self) -> u32 {
        self.applied_version
    }

    pub fn calibration(&self) -> &CalibrationTable {
        &self.calibration
    }

    pub fn tank_state(&self) -> Option<TankState> {
        self.tank.state()
    }

    pub fn sensors(&self) -> &SensorSnapshot {
        &self.ctx.sensors
    }

    pub fn commands(&self) -> ActuatorCommands {
        self.ctx.commands
    }

    pub fn smoothed_error(&self) -> Option<f32> {
        self.ctx.smoothed_error
    }

    pub fn consecutive_failures(&self) -> u8 {
        self.ctx.consecutive_failures
    }

    pub fn is_enabled(&self) -> bool {
        self.ctx.enabled
    }

    pub fn alerts(&self) -> &AlertEngine {
        &self.alerts
    }

    // ── Internal ──────────────────────────────────────────────

    fn read_sensors(&mut self, port: &mut impl SensorPort, now: Millis, sink: &mut impl EventSink) {
        let snapshot = self
            .hub
            .read_all(port, now, self.ctx.config.tank.ultrasonic_filter_k);
        self.ctx.sensors = snapshot;

        if let Some(tank) =
            self.tank
                .update(snapshot.distance_cm, &self.calibration, &self.ctx.config.tank, now)
        {
            debug!(
                "TANK: {:.1} L ({:.1} %)",
                tank.volume_l, tank.level_percent
            );
        }
        self.ctx.tank_level_percent = self.tank.level_percent();

        let inputs = AlertInputs {
            tank_level_percent: self.ctx.tank_level_percent,
            // Averaging would walk a mains loss through the low band.
            voltage_v: self.hub.latest(SensorKind::Voltage),
            humidity_percent: snapshot.ambient_humidity,
        };
        for event in self.alerts.evaluate(&inputs, &self.ctx.config.alerts, now) {
            sink.emit(&AppEvent::Alert(event));
        }
    }

    /// Write changed relay states.  A failed write is retried next tick.
    fn apply_actuators(&mut self, hw: &mut impl ActuatorPort, sink: &mut impl EventSink) {
        let want = self.ctx.commands;
        let prev = self.applied;
        let mut written = prev.unwrap_or_default();
        let mut complete = true;

        for actuator in Actuator::ALL {
            let on = want.get(actuator);
            if prev.is_some_and(|p| p.get(actuator) == on) {
                continue;
            }
            let bit = 1u8 << (actuator as u8);
            match hw.set(actuator, on) {
                Ok(()) => {
                    debug!("ACTUATOR {}: {}", actuator.name(), if on { "on" } else { "off" });
                    written.set(actuator, on);
                    self.actuator_failures &= !bit;
                }
                Err(e) => {
                    complete = false;
                    if self.actuator_failures & bit == 0 {
                        warn!("ACTUATOR {}: {e}", actuator.name());
                        sink.emit(&AppEvent::Error(ErrorReport {
                            source: ErrorSource::Actuator,
                            code: Error::from(e).reason(),
                            detail: Some(actuator.name()),
                            version: None,
                        }));
                    }
                    self.actuator_failures |= bit;
                }
            }
        }

        // Unknown relay state after a failed first write: rewrite everything.
        self.applied = if complete || prev.is_some() {
            Some(if complete { want } else { written })
        } else {
            None
        };
    }

    fn emit_status_if_changed(&mut self, sink: &mut impl EventSink) {
        let key = StatusKey {
            mode: self.fsm.current_state(),
            enabled: self.ctx.enabled,
            commands: self.ctx.commands,
            failures: self.ctx.consecutive_failures,
        };
        if self.last_status != Some(key) {
            self.last_status = Some(key);
            sink.emit(&AppEvent::Status(self.status()));
        }
    }

    fn replace_config(&mut self, config: SystemConfig, now: Millis) {
        self.ctx.config = config;
        self.scheduler.set_intervals(&config);
        self.config_save = Some(PendingSave {
            since: now,
            delay_ms: CONFIG_SAVE_DELAY_MS,
        });
    }

    fn calibration_changed(&mut self, now: Millis, sink: &mut impl EventSink) {
        self.calibration_save = Some(PendingSave {
            since: now,
            delay_ms: 0,
        });
        sink.emit(&AppEvent::Calibration(self.calibration.clone()));
    }

    // ── Persistence ───────────────────────────────────────────

    /// Write pending changes: calibration right away, config 5 s after
    /// its last change (or right away after an explicit save).
    /// Returns `true` if anything was written.
    pub fn persist_if_needed(
        &mut self,
        storage: &mut impl StoragePort,
        now: Millis,
        sink: &mut impl EventSink,
    ) -> bool {
        let mut saved = false;

        if self.calibration_save.is_some_and(|p| p.due(now)) {
            match persistence::save_calibration(storage, &self.calibration) {
                Ok(()) => {
                    self.calibration_save = None;
                    saved = true;
                    info!("Calibration saved");
                }
                Err(e) => {
                    self.calibration_save = Some(PendingSave {
                        since: now,
                        delay_ms: SAVE_RETRY_MS,
                    });
                    report_storage_error("calibration", e, sink);
                }
            }
        }

        if self.config_save.is_some_and(|p| p.due(now)) {
            match persistence::save_config(storage, &self.persisted()) {
                Ok(()) => {
                    self.config_save = None;
                    saved = true;
                    info!("Config saved");
                }
                Err(e) => {
                    self.config_save = Some(PendingSave {
                        since: now,
                        delay_ms: SAVE_RETRY_MS,
                    });
                    report_storage_error("config", e, sink);
                }
            }
        }

        saved
    }

    /// Write everything pending regardless of delays (before a restart).
    pub fn flush(&mut self, storage: &mut impl StoragePort) {
        if self.calibration_save.take().is_some() {
            if let Err(e) = persistence::save_calibration(storage, &self.calibration) {
                warn!("Calibration flush failed: {e}");
            }
        }
        if self.config_save.take().is_some() {
            if let Err(e) = persistence::save_config(storage, &self.persisted()) {
                warn!("Config flush failed: {e}");
            }
        }
    }

    /// Whether the config has unsaved changes.
    pub fn is_config_dirty(&self) -> bool {
        self.config_save.is_some()
    }

    pub fn is_calibration_dirty(&self) -> bool {
        self.calibration_save.is_some()
    }

    fn persisted(&self) -> PersistedConfig {
        PersistedConfig {
            config: self.ctx.config,
            applied_version: self.applied_version,
        }
    }
}

fn report_storage_error(what: &'static str, e: ConfigError, sink: &mut impl EventSink) {
    warn!("Saving {what} failed: {e}");
    sink.emit(&AppEvent::Error(ErrorReport {
        source: ErrorSource::Storage,
        code: Error::from(e).reason(),
        detail: Some(what),
        version: None,
    }));
}
