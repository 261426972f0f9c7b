//! Integration tests for the AppService → FSM → relays pipeline.
//!
//! These run on the host and drive whole ticks through mock sensors and
//! relays at a 1 s cadence, with the sampling and rest periods shortened
//! so scenarios finish in a few dozen ticks.

use crate::mock_hw::{MockHardware, RecordingSink};

use dropster::alerts::AlertKind;
use dropster::app::commands::AppCommand;
use dropster::app::events::{AppEvent, ErrorSource};
use dropster::app::service::AppService;
use dropster::config::SystemConfig;
use dropster::error::{CommandError, Error};
use dropster::fsm::StateId;
use dropster::fsm::context::Actuator;
use dropster::persistence::PersistedConfig;
use dropster::sensors::SensorKind;
use dropster::tank::calibration::CalibrationTable;
use dropster::time::Millis;

const STEP_MS: u32 = 1_000;

fn config() -> SystemConfig {
    let mut c = SystemConfig::DEFAULTS;
    c.control.min_off_secs = 10;
    c.control.sampling_secs = 1;
    c.protection.retry_delay_secs = 10;
    c.tank.capacity_l = 20.0;
    c.timing.sensor_read_interval_ms = STEP_MS;
    c
}

struct Rig {
    app: AppService,
    hw: MockHardware,
    sink: RecordingSink,
    now: u32,
}

impl Rig {
    fn new(config: SystemConfig, mut hw: MockHardware) -> Self {
        let persisted = PersistedConfig {
            config,
            applied_version: 0,
        };
        let mut app = AppService::new(persisted, CalibrationTable::new(), Millis(0));
        let mut sink = RecordingSink::new();
        app.start(&mut hw, &mut sink);
        Self {
            app,
            hw,
            sink,
            now: 0,
        }
    }

    fn step(&mut self) {
        self.now += STEP_MS;
        self.app.tick(Millis(self.now), &mut self.hw, &mut self.sink);
    }

    fn advance(&mut self, secs: u32) {
        for _ in 0..secs {
            self.step();
        }
    }

    /// Step until `done` holds; `false` if `limit_secs` ran out first.
    fn run_until(&mut self, limit_secs: u32, done: impl Fn(&AppService) -> bool) -> bool {
        for _ in 0..limit_secs {
            self.step();
            if done(&self.app) {
                return true;
            }
        }
        false
    }

    fn command(&mut self, cmd: AppCommand) -> Result<(), Error> {
        self.app.handle_command(cmd, Millis(self.now), &mut self.sink)
    }

    fn calibrate(&mut self) {
        self.command(AppCommand::AddCalibrationPoint {
            distance_cm: 40.0,
            volume_l: 0.0,
        })
        .unwrap();
        self.command(AppCommand::AddCalibrationPoint {
            distance_cm: 10.0,
            volume_l: 18.0,
        })
        .unwrap();
    }
}

fn warm_room(error_c: f32) -> MockHardware {
    let mut hw = MockHardware::healthy();
    hw.set_error(error_c);
    hw
}

// ── Start-up ─────────────────────────────────────────────────

#[test]
fn start_releases_every_relay_and_idles() {
    let rig = Rig::new(config(), MockHardware::healthy());
    assert_eq!(rig.app.state(), StateId::Idle);
    for actuator in Actuator::ALL {
        assert!(!rig.hw.is_on(actuator), "{} left on", actuator.name());
    }
    assert!(matches!(rig.sink.events[0], AppEvent::Started(StateId::Idle)));
}

// ── Tank level ───────────────────────────────────────────────

#[test]
fn calibrated_tank_reports_volume_and_level() {
    let mut hw = MockHardware::healthy();
    hw.set(SensorKind::Distance, 25.0);
    let mut rig = Rig::new(config(), hw);
    rig.calibrate();

    // Level is published only after a run of valid readings.
    rig.advance(2);
    assert!(rig.app.tank_state().is_none());
    rig.step();

    let tank = rig.app.tank_state().expect("level published");
    assert!((tank.volume_l - 9.0).abs() < 1e-3, "volume {}", tank.volume_l);
    assert!((tank.level_percent - 45.0).abs() < 1e-2);
    assert!((rig.app.status().tank_level_percent.unwrap() - 45.0).abs() < 1e-2);
}

#[test]
fn clearing_calibration_drops_level() {
    let mut hw = MockHardware::healthy();
    hw.set(SensorKind::Distance, 25.0);
    let mut rig = Rig::new(config(), hw);
    rig.calibrate();
    rig.advance(3);
    assert!(rig.app.tank_state().is_some());

    rig.command(AppCommand::ClearCalibration).unwrap();
    assert!(rig.app.calibration().is_empty());
    assert!(rig.app.tank_state().is_none());
    rig.advance(3);
    assert!(rig.app.tank_state().is_none());
}

// ── Hysteresis and compressor timing ─────────────────────────

#[test]
fn error_above_deadband_starts_cooling() {
    let mut rig = Rig::new(config(), warm_room(2.0));
    rig.advance(12);
    assert_eq!(rig.app.state(), StateId::Idle);
    assert!((rig.app.smoothed_error().unwrap() - 2.0).abs() < 1e-3);

    // 0.2 × 8 + 0.8 × 2 = 3.2 > 3.0 on the next sample.
    rig.hw.set_error(8.0);
    rig.step();

    assert_eq!(rig.app.state(), StateId::Cooling);
    assert_eq!(rig.sink.transitions(), vec![(StateId::Idle, StateId::Cooling)]);
    assert!(rig.hw.is_on(Actuator::Compressor));
    assert!(rig.hw.is_on(Actuator::CompressorFan));
    assert_eq!(rig.hw.starts(Actuator::Compressor), 1);
    assert!(rig.sink.events.iter().any(|e| matches!(
        e,
        AppEvent::Status(s) if s.mode == StateId::Cooling && s.compressor
    )));
}

#[test]
fn boot_counts_as_rest() {
    let mut rig = Rig::new(config(), warm_room(8.0));
    rig.advance(9);
    assert_eq!(rig.app.state(), StateId::Idle);
    assert!(!rig.hw.is_on(Actuator::Compressor));
    rig.step();
    assert_eq!(rig.app.state(), StateId::Cooling);
}

#[test]
fn max_on_forces_rest() {
    let mut cfg = config();
    cfg.control.max_on_secs = 60;
    let mut rig = Rig::new(cfg, warm_room(8.0));
    assert!(rig.run_until(20, |app| app.state() == StateId::Cooling));

    rig.advance(65);
    assert_eq!(rig.app.state(), StateId::Idle);
    assert!(!rig.hw.is_on(Actuator::Compressor));
    assert!(
        rig.sink
            .transitions()
            .contains(&(StateId::Cooling, StateId::Idle))
    );

    // The rest period applies before the next cycle.
    rig.advance(4);
    assert_eq!(rig.app.state(), StateId::Idle);
    assert!(rig.run_until(2, |app| app.state() == StateId::Cooling));
    assert_eq!(rig.hw.starts(Actuator::Compressor), 2);
}

#[test]
fn cold_evaporator_ends_cycle() {
    let mut rig = Rig::new(config(), warm_room(8.0));
    assert!(rig.run_until(20, |app| app.state() == StateId::Cooling));

    rig.hw.set_error(-8.0);
    assert!(rig.run_until(30, |app| app.state() == StateId::Idle));
    assert!(rig.app.smoothed_error().unwrap() < -3.0);
    assert!(!rig.hw.is_on(Actuator::Compressor));
}

#[test]
fn disabled_cycle_never_starts() {
    let mut rig = Rig::new(config(), warm_room(8.0));
    rig.command(AppCommand::SetEnabled(false)).unwrap();
    rig.advance(30);
    assert_eq!(rig.app.state(), StateId::Idle);
    assert_eq!(rig.hw.starts(Actuator::Compressor), 0);
    assert!(!rig.app.status().enabled);

    rig.command(AppCommand::SetEnabled(true)).unwrap();
    rig.step();
    assert_eq!(rig.app.state(), StateId::Cooling);
}

#[test]
fn missing_evaporator_reading_blocks_start() {
    let mut hw = MockHardware::healthy();
    hw.clear(SensorKind::EvapTemp);
    let mut rig = Rig::new(config(), hw);
    rig.advance(30);
    assert_eq!(rig.app.state(), StateId::Idle);
    assert!(rig.app.smoothed_error().is_none());
}

// ── Pump gating ──────────────────────────────────────────────

#[test]
fn pump_follows_tank_level() {
    // 39 cm → 0.6 L → 3 %, under the 5 % pump minimum.
    let mut hw = warm_room(8.0);
    hw.set(SensorKind::Distance, 39.0);
    let mut low = Rig::new(config(), hw);
    low.calibrate();
    assert!(low.run_until(20, |app| app.state() == StateId::Cooling));
    assert!(low.hw.is_on(Actuator::Compressor));
    assert!(!low.hw.is_on(Actuator::Pump));

    let mut hw = warm_room(8.0);
    hw.set(SensorKind::Distance, 25.0);
    let mut ok = Rig::new(config(), hw);
    ok.calibrate();
    assert!(ok.run_until(20, |app| app.state() == StateId::Cooling));
    assert!(ok.hw.is_on(Actuator::Pump));
}

#[test]
fn pump_stays_off_without_level() {
    let mut rig = Rig::new(config(), warm_room(8.0));
    assert!(rig.run_until(20, |app| app.state() == StateId::Cooling));
    rig.advance(5);
    assert!(!rig.hw.is_on(Actuator::Pump));
}

// ── Start protection ─────────────────────────────────────────

#[test]
fn dead_compressor_holds_then_latches_fault() {
    let mut hw = warm_room(8.0);
    hw.compressor_draw(0.0);
    let mut rig = Rig::new(config(), hw);

    assert!(rig.run_until(300, |app| app.state() == StateId::Fault));
    assert_eq!(rig.sink.start_failures(), 3);
    assert_eq!(rig.app.consecutive_failures(), 3);

    let transitions = rig.sink.transitions();
    assert!(transitions.contains(&(StateId::Cooling, StateId::ProtectionHold)));
    assert!(transitions.contains(&(StateId::ProtectionHold, StateId::Idle)));
    assert_eq!(transitions.last(), Some(&(StateId::Cooling, StateId::Fault)));
    assert!(
        rig.sink
            .events
            .iter()
            .any(|e| matches!(e, AppEvent::FaultLatched { consecutive_failures: 3 }))
    );

    // Second failure reaches the alert threshold.
    let alerts: Vec<bool> = rig
        .sink
        .events
        .iter()
        .filter_map(|e| match e {
            AppEvent::StartFailure { alert, .. } => Some(*alert),
            _ => None,
        })
        .collect();
    assert_eq!(alerts, vec![false, true, true]);

    for actuator in Actuator::ALL {
        assert!(!rig.hw.is_on(actuator));
    }
}

#[test]
fn fault_is_latched_until_reset() {
    let mut hw = warm_room(8.0);
    hw.compressor_draw(0.0);
    let mut rig = Rig::new(config(), hw);
    assert!(rig.run_until(300, |app| app.state() == StateId::Fault));

    // A healthy compressor does not clear the latch by itself.
    rig.hw.compressor_draw(4.0);
    rig.advance(60);
    assert_eq!(rig.app.state(), StateId::Fault);

    rig.command(AppCommand::ResetFault).unwrap();
    rig.step();
    assert_eq!(rig.app.state(), StateId::Idle);
    assert_eq!(rig.app.consecutive_failures(), 0);
    assert_eq!(
        rig.command(AppCommand::ResetFault),
        Err(Error::Command(CommandError::Rejected("not_in_fault")))
    );
}

#[test]
fn hold_keeps_compressor_off_for_retry_delay() {
    let mut hw = warm_room(8.0);
    hw.compressor_draw(0.0);
    let mut rig = Rig::new(config(), hw);
    assert!(rig.run_until(60, |app| app.state() == StateId::ProtectionHold));
    assert!(!rig.hw.is_on(Actuator::Compressor));

    rig.advance(9);
    assert_eq!(rig.app.state(), StateId::ProtectionHold);
    rig.step();
    assert_eq!(rig.app.state(), StateId::Idle);
}

#[test]
fn good_start_clears_failure_count() {
    let mut hw = warm_room(8.0);
    hw.compressor_draw(0.0);
    let mut rig = Rig::new(config(), hw);
    assert!(rig.run_until(60, |app| app.state() == StateId::ProtectionHold));
    assert_eq!(rig.app.consecutive_failures(), 1);

    rig.hw.compressor_draw(4.0);
    assert!(rig.run_until(60, |app| app.state() == StateId::Cooling));
    rig.advance(3);
    assert_eq!(rig.app.consecutive_failures(), 0);
    assert_eq!(rig.app.state(), StateId::Cooling);
}

#[test]
fn weak_but_healthy_start_is_not_a_failure() {
    // Field timing: reads every 3 s, so only one or two readings land in
    // the 5 s window, after several idle 0 A readings.
    let mut cfg = config();
    cfg.timing.sensor_read_interval_ms = 3_000;
    let mut hw = warm_room(8.0);
    hw.compressor_draw(1.2);
    let mut rig = Rig::new(cfg, hw);

    assert!(rig.run_until(60, |app| app.state() == StateId::Cooling));
    rig.advance(30);
    assert_eq!(rig.sink.start_failures(), 0);
    assert_eq!(rig.app.consecutive_failures(), 0);
    assert_eq!(rig.app.state(), StateId::Cooling);
    assert!(rig.hw.is_on(Actuator::Compressor));
}

// ── Alerts ───────────────────────────────────────────────────

#[test]
fn zero_voltage_raises_alert() {
    let mut cfg = config();
    cfg.alerts.voltage_zero_v = 0.1;
    let mut hw = MockHardware::healthy();
    hw.set(SensorKind::Voltage, 0.0);
    let mut rig = Rig::new(cfg, hw);
    rig.step();

    assert!(rig.app.alerts().is_active(AlertKind::VoltageZero));
    assert!(!rig.app.alerts().is_active(AlertKind::VoltageLow));
    let raised = rig.sink.alerts(AlertKind::VoltageZero);
    assert_eq!(raised.len(), 1);
    assert!(raised[0].active);
    assert!((raised[0].threshold - 0.1).abs() < f32::EPSILON);

    // Held while the breach lasts: still a single edge.
    rig.advance(3);
    assert_eq!(rig.sink.alerts(AlertKind::VoltageZero).len(), 1);

    rig.hw.set(SensorKind::Voltage, 230.0);
    rig.advance(5);
    let edges = rig.sink.alerts(AlertKind::VoltageZero);
    assert_eq!(edges.len(), 2);
    assert!(!edges[1].active);
}

#[test]
fn mains_loss_is_zero_not_low() {
    let mut rig = Rig::new(config(), MockHardware::healthy());
    rig.advance(10);
    assert!(rig.sink.alerts(AlertKind::VoltageZero).is_empty());

    rig.hw.set(SensorKind::Voltage, 0.0);
    rig.step();
    assert!(rig.app.alerts().is_active(AlertKind::VoltageZero));

    rig.advance(10);
    rig.hw.set(SensorKind::Voltage, 230.0);
    rig.step();
    assert!(!rig.app.alerts().is_active(AlertKind::VoltageZero));

    let edges = rig.sink.alerts(AlertKind::VoltageZero);
    assert_eq!(edges.len(), 2);
    assert!(edges[0].active && !edges[1].active);
    assert!(rig.sink.alerts(AlertKind::VoltageLow).is_empty());
}

#[test]
fn full_tank_alert() {
    let mut hw = MockHardware::healthy();
    hw.set(SensorKind::Distance, 10.0);
    let mut rig = Rig::new(config(), hw);
    rig.calibrate();
    rig.advance(3);
    // 18 L of 20 L = 90 %.
    assert!(rig.app.alerts().is_active(AlertKind::TankFull));
}

#[test]
fn dry_air_alert_respects_enable() {
    let mut hw = MockHardware::healthy();
    hw.set(SensorKind::AmbientHumidity, 30.0);
    let mut cfg = config();
    cfg.alerts.humidity_low_enabled = false;
    let mut rig = Rig::new(cfg, hw);
    rig.advance(3);
    assert!(!rig.app.alerts().is_active(AlertKind::HumidityLow));
    assert!(rig.sink.alerts(AlertKind::HumidityLow).is_empty());
}

// ── Relay failures ───────────────────────────────────────────

#[test]
fn failed_relay_write_reported_once_and_retried() {
    let mut hw = warm_room(8.0);
    hw.broken = Some(Actuator::Compressor);
    let mut rig = Rig::new(config(), hw);
    assert!(rig.run_until(20, |app| app.state() == StateId::Cooling));
    rig.advance(2);

    let reports: Vec<_> = rig
        .sink
        .errors()
        .into_iter()
        .filter(|r| r.source == ErrorSource::Actuator)
        .collect();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].detail, Some("compressor"));
    assert!(!rig.hw.is_on(Actuator::Compressor));

    rig.hw.broken = None;
    rig.step();
    assert!(rig.hw.is_on(Actuator::Compressor));
}

// ── Periodic messages and queries ────────────────────────────

#[test]
fn data_and_heartbeat_are_periodic() {
    let mut rig = Rig::new(config(), MockHardware::healthy());
    rig.advance(60);
    let data = rig
        .sink
        .events
        .iter()
        .filter(|e| matches!(e, AppEvent::Data(_)))
        .count();
    let beats = rig
        .sink
        .events
        .iter()
        .filter(|e| matches!(e, AppEvent::Heartbeat(_)))
        .count();
    // Due immediately, then every 10 s and 60 s.
    assert_eq!(data, 6);
    assert_eq!(beats, 1);
}

#[test]
fn get_commands_reply_through_sink() {
    let mut rig = Rig::new(config(), MockHardware::healthy());
    rig.sink.clear();
    rig.command(AppCommand::GetStatus).unwrap();
    rig.command(AppCommand::GetConfig).unwrap();
    rig.command(AppCommand::GetCalibration).unwrap();

    assert!(matches!(rig.sink.events[0], AppEvent::Status(_)));
    assert!(matches!(
        rig.sink.events[1],
        AppEvent::Config { version: 0, .. }
    ));
    assert!(matches!(rig.sink.events[2], AppEvent::Calibration(_)));
}
