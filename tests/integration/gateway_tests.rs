//! Integration tests for the inbound path: control topic payload →
//! channel → Gateway → AppService, including fragmented configuration
//! transfers.

use crate::mock_hw::RecordingSink;

use dropster::app::service::AppService;
use dropster::config::SystemConfig;
use dropster::gateway::channels::{InboundChannel, push_inbound};
use dropster::gateway::engine::Gateway;
use dropster::persistence::PersistedConfig;
use dropster::tank::calibration::CalibrationTable;
use dropster::time::Millis;

const DOCUMENT: &str = r#"{"deadband":2.0,"min_off":120,"max_on":900,"sampling":4,"alpha":0.3}"#;

struct Link {
    channel: InboundChannel,
    gateway: Gateway,
    app: AppService,
    sink: RecordingSink,
}

impl Link {
    fn new() -> Self {
        Self {
            channel: InboundChannel::new(),
            gateway: Gateway::new(),
            app: AppService::new(PersistedConfig::default(), CalibrationTable::new(), Millis(0)),
            sink: RecordingSink::new(),
        }
    }

    /// Deliver one payload and poll at the same instant.
    fn deliver(&mut self, payload: &str, at: u32) {
        push_inbound(&self.channel, payload.as_bytes(), Millis(at)).unwrap();
        self.poll(at);
    }

    fn poll(&mut self, at: u32) {
        self.gateway
            .poll(&self.channel, Millis(at), &mut self.app, &mut self.sink);
    }
}

/// Split `doc` into `parts` roughly equal fragment payloads.
fn fragments(version: u32, doc: &str, parts: usize) -> Vec<String> {
    let size = doc.len().div_ceil(parts);
    let chunks: Vec<&str> = doc
        .as_bytes()
        .chunks(size)
        .map(|c| std::str::from_utf8(c).unwrap())
        .collect();
    let total = chunks.len();
    chunks
        .iter()
        .enumerate()
        .map(|(index, chunk)| {
            serde_json::to_string(&serde_json::json!({
                "type": "config_fragment",
                "id": format!("v{version}-{index}"),
                "version": version,
                "index": index,
                "total": total,
                "chunk": chunk,
            }))
            .unwrap()
        })
        .collect()
}

// ── Plain commands ───────────────────────────────────────────

#[test]
fn identical_command_inside_window_runs_once() {
    let mut link = Link::new();
    link.deliver("GET_STATUS", 0);
    link.deliver("GET_STATUS", 400);
    assert_eq!(link.sink.acks().len(), 1);

    // Outside the debounce window it runs again.
    link.deliver("GET_STATUS", 2_000);
    assert_eq!(link.sink.acks().len(), 2);
}

#[test]
fn queued_too_long_is_expired() {
    let mut link = Link::new();
    push_inbound(&link.channel, br#"{"type":"set_enabled","id":"e1","enabled":false}"#, Millis(0)).unwrap();
    link.poll(6_000);

    let acks = link.sink.acks();
    assert_eq!(acks.len(), 1);
    assert!(!acks[0].ok);
    assert_eq!(acks[0].reason, Some("expired"));
    assert_eq!(acks[0].id.as_deref(), Some("e1"));
    assert!(link.app.is_enabled(), "expired command must not run");
}

#[test]
fn json_command_acked_with_id() {
    let mut link = Link::new();
    link.deliver(r#"{"type":"set_enabled","id":"abc","enabled":false}"#, 0);
    assert!(!link.app.is_enabled());
    let acks = link.sink.acks();
    assert_eq!(acks[0].id.as_deref(), Some("abc"));
    assert_eq!(acks[0].command, "set_enabled");
    assert!(acks[0].ok);
}

#[test]
fn calibration_point_over_the_wire() {
    let mut link = Link::new();
    link.deliver(
        r#"{"type":"add_calibration_point","distance":40.0,"volume":0.0}"#,
        0,
    );
    link.deliver(
        r#"{"type":"add_calibration_point","distance":10.0,"volume":18.0}"#,
        100,
    );
    assert_eq!(link.app.calibration().len(), 2);
    assert!(link.app.is_calibration_dirty());

    // Too close to an existing point.
    link.deliver(
        r#"{"type":"add_calibration_point","distance":10.2,"volume":17.0}"#,
        200,
    );
    assert_eq!(link.app.calibration().len(), 2);
    assert!(!link.sink.acks()[2].ok);
}

// ── Configuration transfers ──────────────────────────────────

#[test]
fn four_fragment_transfer_applies() {
    let mut link = Link::new();
    for (i, f) in fragments(1, DOCUMENT, 4).iter().enumerate() {
        link.deliver(f, i as u32 * 100);
    }
    assert_eq!(link.app.applied_version(), 1);
    let c = link.app.config();
    assert!((c.control.deadband_c - 2.0).abs() < f32::EPSILON);
    assert_eq!(c.control.min_off_secs, 120);
    assert_eq!(c.control.max_on_secs, 900);
    assert_eq!(c.control.sampling_secs, 4);
    assert!((c.control.alpha - 0.3).abs() < f32::EPSILON);
    // Fields absent from the document keep their values.
    assert_eq!(c.tank, SystemConfig::DEFAULTS.tank);
    assert_eq!(link.sink.applied_versions(), vec![1]);
    assert!(link.sink.acks().iter().all(|a| a.ok));
    assert!(link.app.is_config_dirty());
}

#[test]
fn out_of_order_fragments_assemble() {
    let mut link = Link::new();
    let parts = fragments(2, DOCUMENT, 3);
    link.deliver(&parts[2], 0);
    link.deliver(&parts[0], 100);
    assert_eq!(link.app.applied_version(), 0);
    link.deliver(&parts[1], 200);
    assert_eq!(link.app.applied_version(), 2);
}

#[test]
fn incomplete_transfer_times_out_without_change() {
    let mut link = Link::new();
    let parts = fragments(3, DOCUMENT, 4);
    for (i, f) in parts.iter().take(3).enumerate() {
        link.deliver(f, i as u32 * 100);
    }
    assert_eq!(link.gateway.transfer_in_flight(), Some(3));

    let timeout = link.app.config().timing.transfer_timeout_ms;
    link.poll(timeout - 1);
    assert_eq!(link.gateway.transfer_in_flight(), Some(3));
    link.poll(timeout);

    assert!(link.gateway.transfer_in_flight().is_none());
    let errors = link.sink.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].code, "timed_out");
    assert_eq!(errors[0].version, Some(3));
    assert_eq!(link.app.config(), &SystemConfig::DEFAULTS);
    assert_eq!(link.app.applied_version(), 0);

    // The straggler starts a fresh transfer and applies nothing.
    link.deliver(&parts[3], timeout + 500);
    assert_eq!(link.app.config(), &SystemConfig::DEFAULTS);
    assert!(link.sink.applied_versions().is_empty());
}

#[test]
fn newer_version_supersedes_in_flight_transfer() {
    let mut link = Link::new();
    let old = fragments(5, r#"{"deadband":4.0}"#, 2);
    link.deliver(&old[0], 0);
    assert_eq!(link.gateway.transfer_in_flight(), Some(5));

    for (i, f) in fragments(6, DOCUMENT, 2).iter().enumerate() {
        link.deliver(f, 100 + i as u32 * 100);
    }
    assert_eq!(link.app.applied_version(), 6);
    let superseded: Vec<_> = link
        .sink
        .errors()
        .into_iter()
        .filter(|e| e.code == "superseded")
        .collect();
    assert_eq!(superseded.len(), 1);
    assert_eq!(superseded[0].version, Some(5));

    // The rest of the old transfer is now stale.
    link.deliver(&old[1], 400);
    assert_eq!(link.app.applied_version(), 6);
    assert!((link.app.config().control.deadband_c - 2.0).abs() < f32::EPSILON);
}

#[test]
fn replayed_transfer_is_not_applied_twice() {
    let mut link = Link::new();
    let parts = fragments(7, DOCUMENT, 2);
    link.deliver(&parts[0], 0);
    // Retransmitted fragment inside the transfer: acked, not double counted.
    link.deliver(&parts[0], 1_500);
    assert_eq!(link.app.applied_version(), 0);
    link.deliver(&parts[1], 1_600);
    assert_eq!(link.sink.applied_versions(), vec![7]);

    for (i, f) in parts.iter().enumerate() {
        link.deliver(f, 5_000 + i as u32 * 100);
    }
    assert_eq!(link.sink.applied_versions(), vec![7]);
    let stale = link
        .sink
        .errors()
        .into_iter()
        .filter(|e| e.code == "stale_version" && e.version == Some(7))
        .count();
    assert_eq!(stale, 2);
}

#[test]
fn invalid_transfer_leaves_config_untouched() {
    let mut link = Link::new();
    let doc = r#"{"deadband":2.0,"min_off":120,"alpha":5.0}"#;
    for (i, f) in fragments(8, doc, 2).iter().enumerate() {
        link.deliver(f, i as u32 * 100);
    }
    assert_eq!(link.app.applied_version(), 0);
    assert_eq!(link.app.config(), &SystemConfig::DEFAULTS);
    let errors = link.sink.errors();
    assert_eq!(errors.last().map(|e| e.code), Some("invalid_field"));
    assert!(!link.sink.acks().last().unwrap().ok);

    // Unknown keys reject the whole document.
    for (i, f) in fragments(9, r#"{"deadband":2.0,"turbo":true}"#, 1).iter().enumerate() {
        link.deliver(f, 1_000 + i as u32 * 100);
    }
    assert_eq!(link.app.config(), &SystemConfig::DEFAULTS);
    assert_eq!(link.sink.errors().last().map(|e| e.code), Some("malformed"));
}

#[test]
fn reset_config_keeps_applied_version() {
    let mut link = Link::new();
    for (i, f) in fragments(4, DOCUMENT, 2).iter().enumerate() {
        link.deliver(f, i as u32 * 100);
    }
    link.deliver("RESET_CONFIG", 1_000);
    assert_eq!(link.app.config(), &SystemConfig::DEFAULTS);
    assert_eq!(link.app.applied_version(), 4);

    // A replay of version 4 is still refused.
    for (i, f) in fragments(4, DOCUMENT, 2).iter().enumerate() {
        link.deliver(f, 3_000 + i as u32 * 100);
    }
    assert_eq!(link.app.config(), &SystemConfig::DEFAULTS);
}
