//! Hardware adapter — bridges the relay drivers to [`ActuatorPort`].
//!
//! This is the only module on the write side that touches actual GPIO.
//! On non-espidf targets the relays are built over mock pins in tests.

use embedded_hal::digital::OutputPin;

use crate::app::ports::ActuatorPort;
use crate::drivers::relay::Relay;
use crate::error::ActuatorError;
use crate::fsm::context::Actuator;

/// The four relay outputs of the main board.
pub struct RelayBank<P: OutputPin> {
    compressor: Relay<P>,
    compressor_fan: Relay<P>,
    evap_fan: Relay<P>,
    pump: Relay<P>,
}

impl<P: OutputPin> RelayBank<P> {
    pub fn new(
        compressor: Relay<P>,
        compressor_fan: Relay<P>,
        evap_fan: Relay<P>,
        pump: Relay<P>,
    ) -> Self {
        Self {
            compressor,
            compressor_fan,
            evap_fan,
            pump,
        }
    }

    fn relay(&mut self, actuator: Actuator) -> &mut Relay<P> {
        match actuator {
            Actuator::Compressor => &mut self.compressor,
            Actuator::CompressorFan => &mut self.compressor_fan,
            Actuator::EvapFan => &mut self.evap_fan,
            Actuator::Pump => &mut self.pump,
        }
    }

    pub fn is_on(&mut self, actuator: Actuator) -> bool {
        self.relay(actuator).is_on()
    }
}

// ── ActuatorPort implementation ───────────────────────────────

impl<P: OutputPin> ActuatorPort for RelayBank<P> {
    fn set(&mut self, actuator: Actuator, on: bool) -> Result<(), ActuatorError> {
        self.relay(actuator).set(on)
    }
}
