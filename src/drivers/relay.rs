//! Relay output driver.
//!
//! One GPIO per relay coil.  Boards differ in polarity (most opto-isolated
//! relay modules energise on a low level), so each relay carries its own
//! `active_low` flag.
//!
//! ## Dual-target design
//!
//! Generic over `embedded_hal::digital::OutputPin`: on ESP-IDF the pin is
//! an `esp_idf_hal::gpio::PinDriver`, on host a mock pin.

use embedded_hal::digital::OutputPin;
use log::warn;

use crate::error::ActuatorError;

pub struct Relay<P: OutputPin> {
    pin: P,
    active_low: bool,
    on: bool,
    name: &'static str,
}

impl<P: OutputPin> Relay<P> {
    /// Take ownership of `pin` and drive it to the released level.
    pub fn new(pin: P, active_low: bool, name: &'static str) -> Result<Self, ActuatorError> {
        let mut relay = Self {
            pin,
            active_low,
            on: true,
            name,
        };
        relay.set(false)?;
        Ok(relay)
    }

    /// Energise or release the coil.
    pub fn set(&mut self, on: bool) -> Result<(), ActuatorError> {
        let high = on != self.active_low;
        let result = if high {
            self.pin.set_high()
        } else {
            self.pin.set_low()
        };
        if let Err(e) = result {
            warn!("Relay {}: GPIO write failed: {:?}", self.name, e);
            return Err(ActuatorError::GpioWriteFailed);
        }
        self.on = on;
        Ok(())
    }

    pub fn is_on(&self) -> bool {
        self.on
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}
