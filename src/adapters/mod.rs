//! Adapters — concrete implementations of the hexagonal port traits.
//!
//! | Adapter       | Implements    | Connects to                    |
//! |---------------|---------------|--------------------------------|
//! | `hardware`    | ActuatorPort  | Relay GPIOs                    |
//! | `sensor_feed` | SensorPort    | Driver tasks via sample channel|
//! | `log_sink`    | EventSink     | Serial log output              |
//! | `mqtt_sink`   | EventSink     | `Publisher` (MQTT client)      |
//! | `nvs`         | StoragePort   | NVS / in-memory store          |
//! | `time`        | Clock         | ESP32 system timer             |

pub mod hardware;
pub mod log_sink;
pub mod mqtt_sink;
pub mod nvs;
pub mod sensor_feed;
pub mod time;
