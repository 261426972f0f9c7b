//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing structured application events to
//! the ESP-IDF logger (UART / USB-CDC in production).  Paired with the
//! [`MqttEventSink`](super::mqtt_sink::MqttEventSink) so the serial
//! console mirrors what goes out to the broker.

use log::{info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`AppEvent`] to the serial console.
#[derive(Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

/// `Display` for optional readings: one decimal or `--`.
struct OptF32(Option<f32>);

fn opt(v: Option<f32>) -> OptF32 {
    OptF32(v)
}

impl core::fmt::Display for OptF32 {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self.0 {
            Some(v) => write!(f, "{v:.1}"),
            None => f.write_str("--"),
        }
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent) {
        match event {
            AppEvent::Data(t) => {
                info!(
                    "DATA  | mode={:?} | T={}\u{00b0}C RH={}% evap={}\u{00b0}C | \
                     {}V {}A {}W | tank={}L | err={}",
                    t.mode,
                    opt(t.sensors.ambient_temp_c),
                    opt(t.sensors.ambient_humidity),
                    opt(t.sensors.evap_temp_c),
                    opt(t.sensors.voltage_v),
                    opt(t.sensors.current_a),
                    opt(t.sensors.power_w),
                    opt(t.tank.map(|s| s.volume_l)),
                    opt(t.smoothed_error_c),
                );
            }
            AppEvent::Status(s) => {
                info!(
                    "STAT  | mode={:?} enabled={} | comp={} vent={} evap_fan={} pump={} | \
                     level={}% failures={}",
                    s.mode,
                    s.enabled,
                    s.compressor,
                    s.vent,
                    s.evap_fan,
                    s.pump,
                    opt(s.tank_level_percent),
                    s.consecutive_failures,
                );
            }
            AppEvent::StateChanged { from, to } => {
                info!("STATE | {:?} -> {:?}", from, to);
            }
            AppEvent::Started(state) => {
                info!("START | initial_state={:?}", state);
            }
            AppEvent::Alert(a) => {
                info!(
                    "ALERT | {:?} {} | value={} threshold={:.1}",
                    a.kind,
                    if a.active { "ACTIVE" } else { "cleared" },
                    opt(a.value),
                    a.threshold,
                );
            }
            AppEvent::StartFailure {
                consecutive_failures,
                measured_current_a,
                alert,
            } => {
                warn!(
                    "PROT  | start failure #{} ({:.2}A){}",
                    consecutive_failures,
                    measured_current_a,
                    if *alert { " ALERT" } else { "" },
                );
            }
            AppEvent::FaultLatched {
                consecutive_failures,
            } => {
                warn!("FAULT | latched after {} start failures", consecutive_failures);
            }
            AppEvent::Error(e) => {
                warn!(
                    "ERROR | {:?} {} {} v{}",
                    e.source,
                    e.code,
                    e.detail.unwrap_or(""),
                    e.version.unwrap_or(0),
                );
            }
            AppEvent::Heartbeat(h) => {
                info!(
                    "BEAT  | up={}s mode={:?} failing=0b{:011b} cfg=v{}",
                    h.uptime_ms / 1_000,
                    h.mode,
                    h.failing_sensors,
                    h.config_version,
                );
            }
            AppEvent::CommandAck(a) => {
                info!(
                    "ACK   | {} id={} ok={} {}",
                    a.command,
                    a.id.as_deref().unwrap_or("-"),
                    a.ok,
                    a.reason.unwrap_or(""),
                );
            }
            AppEvent::Config { version, .. } => {
                info!("CONF  | config v{} sent", version);
            }
            AppEvent::Calibration(t) => {
                info!("CAL   | {} points", t.len());
            }
            AppEvent::ConfigApplied { version } => {
                info!("CONF  | v{} applied", version);
            }
        }
    }
}
