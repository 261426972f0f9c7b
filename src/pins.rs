//! GPIO / peripheral pin assignments for the Dropster main board (ESP32).
//!
//! Single source of truth — every driver references this module rather than
//! hard-coding pin numbers.  Change a pin here and it propagates everywhere.

use crate::fsm::context::Actuator;

// ---------------------------------------------------------------------------
// Relays
// ---------------------------------------------------------------------------

pub const COMPRESSOR_RELAY_GPIO: i32 = 4;
/// Evaporator fan ("ventilador").  GPIO 0 is a strapping pin: the relay
/// must not pull it low during reset.
pub const EVAP_FAN_RELAY_GPIO: i32 = 0;
/// Condenser fan next to the compressor.
pub const COMPRESSOR_FAN_RELAY_GPIO: i32 = 26;
pub const PUMP_RELAY_GPIO: i32 = 27;

/// Relay coils are energised on a high level.
pub const RELAY_ACTIVE_LOW: bool = false;

/// Relay GPIO for each actuator.
pub const fn relay_gpio(actuator: Actuator) -> i32 {
    match actuator {
        Actuator::Compressor => COMPRESSOR_RELAY_GPIO,
        Actuator::CompressorFan => COMPRESSOR_FAN_RELAY_GPIO,
        Actuator::EvapFan => EVAP_FAN_RELAY_GPIO,
        Actuator::Pump => PUMP_RELAY_GPIO,
    }
}

// ---------------------------------------------------------------------------
// I²C — SHT31 (evaporator outlet) and BME280 (ambient)
// ---------------------------------------------------------------------------

pub const I2C_SDA_GPIO: i32 = 21;
pub const I2C_SCL_GPIO: i32 = 22;
pub const SHT31_ADDR: u8 = 0x44;
pub const BME280_ADDR: u8 = 0x76;

// ---------------------------------------------------------------------------
// UARTs
// ---------------------------------------------------------------------------

pub const UART1_RX_GPIO: i32 = 14;
pub const UART1_TX_GPIO: i32 = 15;
pub const UART2_RX_GPIO: i32 = 19;
pub const UART2_TX_GPIO: i32 = 18;

// ---------------------------------------------------------------------------
// Ultrasonic tank level sensor (HC-SR04 style)
// ---------------------------------------------------------------------------

pub const ULTRASONIC_TRIG_GPIO: i32 = 12;
pub const ULTRASONIC_ECHO_GPIO: i32 = 13;

// ---------------------------------------------------------------------------
// Analog / misc
// ---------------------------------------------------------------------------

/// Compressor NTC thermistor, ADC1 channel 6.
pub const THERMISTOR_ADC_GPIO: i32 = 34;
/// Configuration push-button (active low, internal pull-up).
pub const CONFIG_BUTTON_GPIO: i32 = 5;
