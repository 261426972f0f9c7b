//! Dropster Firmware — Main Entry Point
//!
//! Hexagonal architecture with a single cooperative control loop.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  SensorFeed     RelayBank      LogEventSink   MqttEventSink    │
//! │  (SensorPort)   (ActuatorPort) (EventSink)    (EventSink)      │
//! │  NvsAdapter     SystemClock    MQTT callback ─▶ INBOUND_CHANNEL│
//! │  (StoragePort)  (Clock)                                        │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │              AppService (pure logic)                   │    │
//! │  │  FSM · Protection · Tank · Alerts · EvapFan            │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! │                                                                │
//! │  Gateway (command gate · transfer assembly)                    │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use core::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use log::{info, warn};

use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::hal::gpio::{AnyOutputPin, Output, PinDriver};
use esp_idf_svc::hal::prelude::Peripherals;
use esp_idf_svc::mqtt::client::{
    Details, EspMqttClient, EventPayload, MqttClientConfiguration, QoS,
};
use esp_idf_svc::sys::EspError;
use esp_idf_svc::wifi::{BlockingWifi, ClientConfiguration, Configuration, EspWifi};

use dropster::adapters::hardware::RelayBank;
use dropster::adapters::log_sink::LogEventSink;
use dropster::adapters::mqtt_sink::MqttEventSink;
use dropster::adapters::nvs::NvsAdapter;
use dropster::adapters::sensor_feed::{SENSOR_CHANNEL, SensorFeed};
use dropster::adapters::time::SystemClock;
use dropster::app::ports::{ActuatorPort, Clock, SensorPort};
use dropster::app::service::AppService;
use dropster::drivers::relay::Relay;
use dropster::error::ActuatorError;
use dropster::fsm::context::Actuator;
use dropster::gateway::channels::{INBOUND_CHANNEL, push_inbound};
use dropster::gateway::engine::Gateway;
use dropster::gateway::topics::Topic;
use dropster::gateway::transport::Publisher;
use dropster::pins;
use dropster::sensors::{SensorKind, SensorSample};
use dropster::time::Millis;

const MQTT_URL: &str = "mqtt://test.mosquitto.org:1883";
const MQTT_CLIENT_ID: &str = "ESP32_Dropster_AWG";
/// Station credentials, baked in at build time.
const WIFI_SSID: &str = match option_env!("DROPSTER_WIFI_SSID") {
    Some(ssid) => ssid,
    None => "",
};
const WIFI_PASS: &str = match option_env!("DROPSTER_WIFI_PASS") {
    Some(pass) => pass,
    None => "",
};

/// Control loop period.  Every component keeps its own interval on top.
const LOOP_PERIOD: Duration = Duration::from_millis(100);

/// Set by the MQTT callback; read by the control loop.
static MQTT_CONNECTED: AtomicBool = AtomicBool::new(false);

type RelayPin = PinDriver<'static, AnyOutputPin, Output>;

// ── MQTT publisher ────────────────────────────────────────────

struct EspMqttPublisher {
    client: EspMqttClient<'static>,
    subscribed: bool,
}

impl EspMqttPublisher {
    /// (Re)subscribe to the control topic after every reconnect.
    fn maintain_subscription(&mut self) {
        let connected = MQTT_CONNECTED.load(Ordering::Relaxed);
        if !connected {
            self.subscribed = false;
            return;
        }
        if self.subscribed {
            return;
        }
        match self.client.subscribe(Topic::Control.path(), QoS::AtLeastOnce) {
            Ok(_) => {
                info!("MQTT: subscribed to {}", Topic::Control.path());
                self.subscribed = true;
            }
            Err(e) => warn!("MQTT: subscribe failed: {e}"),
        }
    }
}

impl Publisher for EspMqttPublisher {
    type Error = EspError;

    fn publish(&mut self, topic: &str, payload: &[u8], retained: bool) -> Result<(), EspError> {
        if !MQTT_CONNECTED.load(Ordering::Relaxed) {
            // Offline: drop quietly, the next periodic message catches up.
            return Ok(());
        }
        self.client
            .enqueue(topic, QoS::AtMostOnce, retained, payload)
            .map(|_| ())
    }
}

fn create_mqtt_client() -> Result<EspMqttClient<'static>> {
    let conf = MqttClientConfiguration {
        client_id: Some(MQTT_CLIENT_ID),
        ..Default::default()
    };
    let client = EspMqttClient::new_cb(MQTT_URL, &conf, move |event| {
        match event.payload() {
            EventPayload::Connected(_) => {
                info!("MQTT: connected");
                MQTT_CONNECTED.store(true, Ordering::Relaxed);
            }
            EventPayload::Disconnected => {
                warn!("MQTT: disconnected");
                MQTT_CONNECTED.store(false, Ordering::Relaxed);
            }
            EventPayload::Received {
                topic,
                data,
                details,
                ..
            } => {
                // Only complete payloads on the control topic.
                if !matches!(details, Details::Complete)
                    || topic != Some(Topic::Control.path())
                {
                    return;
                }
                let now = SystemClock::new().now();
                if let Err(e) = push_inbound(&INBOUND_CHANNEL, data, now) {
                    warn!("MQTT: inbound command dropped: {e}");
                }
            }
            _ => {}
        }
    })?;
    Ok(client)
}

// ── Hardware ──────────────────────────────────────────────────

fn relay(gpio: i32, name: &'static str) -> Result<Relay<RelayPin>> {
    // SAFETY: each relay GPIO is claimed exactly once, here.
    let pin = unsafe { PinDriver::output(AnyOutputPin::new(gpio)) }
        .with_context(|| format!("relay {name} on GPIO{gpio}"))?;
    Relay::new(pin, pins::RELAY_ACTIVE_LOW, name).map_err(|e| anyhow!("relay {name}: {e}"))
}

fn connect_wifi(
    modem: esp_idf_svc::hal::modem::Modem,
    sys_loop: EspSystemEventLoop,
) -> Result<BlockingWifi<EspWifi<'static>>> {
    if WIFI_SSID.is_empty() {
        return Err(anyhow!("no wifi credentials configured"));
    }
    let mut wifi = BlockingWifi::wrap(EspWifi::new(modem, sys_loop.clone(), None)?, sys_loop)?;
    wifi.set_configuration(&Configuration::Client(ClientConfiguration {
        ssid: WIFI_SSID
            .try_into()
            .map_err(|_| anyhow!("wifi ssid too long"))?,
        password: WIFI_PASS
            .try_into()
            .map_err(|_| anyhow!("wifi password too long"))?,
        ..Default::default()
    }))?;
    wifi.start()?;
    info!("wifi started, connecting to `{}`", WIFI_SSID);
    wifi.connect()?;
    wifi.wait_netif_up()?;
    Ok(wifi)
}

// ── Main ──────────────────────────────────────────────────────

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  Dropster AWG v{}                     ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    let clock = SystemClock::new();

    // ── 2. Relays first: everything released before anything else ──
    let mut relays = RelayBank::new(
        relay(pins::COMPRESSOR_RELAY_GPIO, "compressor")?,
        relay(pins::COMPRESSOR_FAN_RELAY_GPIO, "compressor_fan")?,
        relay(pins::EVAP_FAN_RELAY_GPIO, "evap_fan")?,
        relay(pins::PUMP_RELAY_GPIO, "pump")?,
    );

    // ── 3. Config + calibration from NVS (or defaults) ────────
    let mut nvs = NvsAdapter::new().map_err(|e| anyhow!("NVS init failed: {e}"))?;
    let mut app = AppService::from_storage(&nvs, clock.now());

    // ── 4. Connectivity ───────────────────────────────────────
    // The controller runs without a network; it only loses reporting.
    let peripherals = Peripherals::take()?;
    let sys_loop = EspSystemEventLoop::take()?;
    let _wifi = match connect_wifi(peripherals.modem, sys_loop) {
        Ok(wifi) => Some(wifi),
        Err(e) => {
            warn!("wifi unavailable ({e:#}); running offline");
            None
        }
    };

    let publisher = EspMqttPublisher {
        client: create_mqtt_client()?,
        subscribed: false,
    };
    let mut sink = (LogEventSink::new(), MqttEventSink::new(publisher));

    // ── 5. Start ──────────────────────────────────────────────
    let mut feed = SensorFeed::new(&SENSOR_CHANNEL);
    app.start(&mut relays, &mut sink);
    let mut gateway = Gateway::new();

    info!("System ready. Entering control loop.");

    // ── 6. Control loop ───────────────────────────────────────
    loop {
        let now = clock.now();
        sink.1.publisher_mut().maintain_subscription();

        let mut io = BoardIo {
            sensors: &mut feed,
            relays: &mut relays,
        };
        app.tick(now, &mut io, &mut sink);
        gateway.poll(&INBOUND_CHANNEL, now, &mut app, &mut sink);
        app.persist_if_needed(&mut nvs, now, &mut sink);

        std::thread::sleep(LOOP_PERIOD);
    }
}

/// Joins the sensor feed and the relay bank into the single
/// `SensorPort + ActuatorPort` value the service ticks with.
struct BoardIo<'a, 'c> {
    sensors: &'a mut SensorFeed<'c>,
    relays: &'a mut RelayBank<RelayPin>,
}

impl SensorPort for BoardIo<'_, '_> {
    fn read(&mut self, kind: SensorKind, now: Millis) -> SensorSample {
        self.sensors.read(kind, now)
    }
}

impl ActuatorPort for BoardIo<'_, '_> {
    fn set(&mut self, actuator: Actuator, on: bool) -> Result<(), ActuatorError> {
        self.relays.set(actuator, on)
    }
}
