//! Driver for the Velleman K8056 8 channel relay card.
//!
//! The card is command-only: every instruction is a single 5 byte [`Frame`]
//! and nothing is ever read back. Lost frames are compensated for by writing
//! each frame `repeat + 1` times (see [`DriverConfig`]).

use crate::k8056_types::CardAddress;
use crate::k8056_types::DriverConfig;
use crate::k8056_types::Frame;
use crate::k8056_types::Instruction;
use crate::k8056_types::Instruction::*;
use crate::k8056_types::RelayIndex;
use crate::k8056_types::BAUD_RATE;

use log::debug;
use log::info;
use serialport::DataBits;
use serialport::Parity;
use serialport::SerialPort;
use serialport::StopBits;
use std::io;
use std::io::Write;
use std::thread;
use std::time::Duration;
use thiserror::Error;

const SETTLE_TIME: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum K8056Error {
    #[error("Invalid relay number '{0}', expected 1-8 or 9 for all relays")]
    InvalidRelayIndex(u8),

    #[error("Relay card transport unavailable: {0}")]
    TransportUnavailable(#[source] io::Error),
}

/// Byte sink the frames are written to.
pub trait Transport {
    fn send(&mut self, frame: &Frame) -> io::Result<()>;
}

impl<W: Write + ?Sized> Transport for W {
    fn send(&mut self, frame: &Frame) -> io::Result<()> {
        self.write_all(frame.as_bytes())?;
        self.flush()
    }
}

/// Command set of the relay card.
///
/// Relay commands accept 1-8 for a single relay and 9 for all relays of the
/// card at `address`. Emergency stop, force address and query address always
/// go to address 1 and reach every card on the bus.
pub trait RelayDriver {
    fn set_relay(&mut self, relay: u8, address: CardAddress) -> Result<(), K8056Error>;

    fn clear_relay(&mut self, relay: u8, address: CardAddress) -> Result<(), K8056Error>;

    fn toggle_relay(&mut self, relay: u8, address: CardAddress) -> Result<(), K8056Error>;

    /// Changes the address of the card at `address` to `new_address`.
    fn set_address(&mut self, new_address: CardAddress, address: CardAddress)
        -> Result<(), K8056Error>;

    /// Sets all 8 relays at once from the bits of `value`.
    fn send_byte(&mut self, value: u8, address: CardAddress) -> Result<(), K8056Error>;

    /// Clears all relays on all cards.
    fn emergency_stop(&mut self) -> Result<(), K8056Error>;

    /// Resets every card on the bus to address 1.
    fn force_address(&mut self) -> Result<(), K8056Error>;

    /// Makes the cards show their address on the relay LEDs.
    fn query_address(&mut self) -> Result<(), K8056Error>;

    fn is_simulated(&self) -> bool {
        false
    }
}

impl<D: RelayDriver + ?Sized> RelayDriver for Box<D> {
    fn set_relay(&mut self, relay: u8, address: CardAddress) -> Result<(), K8056Error> {
        (**self).set_relay(relay, address)
    }

    fn clear_relay(&mut self, relay: u8, address: CardAddress) -> Result<(), K8056Error> {
        (**self).clear_relay(relay, address)
    }

    fn toggle_relay(&mut self, relay: u8, address: CardAddress) -> Result<(), K8056Error> {
        (**self).toggle_relay(relay, address)
    }

    fn set_address(
        &mut self,
        new_address: CardAddress,
        address: CardAddress,
    ) -> Result<(), K8056Error> {
        (**self).set_address(new_address, address)
    }

    fn send_byte(&mut self, value: u8, address: CardAddress) -> Result<(), K8056Error> {
        (**self).send_byte(value, address)
    }

    fn emergency_stop(&mut self) -> Result<(), K8056Error> {
        (**self).emergency_stop()
    }

    fn force_address(&mut self) -> Result<(), K8056Error> {
        (**self).force_address()
    }

    fn query_address(&mut self) -> Result<(), K8056Error> {
        (**self).query_address()
    }

    fn is_simulated(&self) -> bool {
        (**self).is_simulated()
    }
}

fn relay_index(relay: u8) -> Result<RelayIndex, K8056Error> {
    RelayIndex::new(relay).ok_or(K8056Error::InvalidRelayIndex(relay))
}

pub struct K8056<T: Transport> {
    transport: T,
    config: DriverConfig,
}

impl K8056<Box<dyn SerialPort>> {
    /// Opens `device` at 2400 baud 8N1 and waits for the card to settle.
    pub fn open(device: &str, config: DriverConfig) -> Result<Self, K8056Error> {
        let port = serialport::new(device, BAUD_RATE)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .open()
            .map_err(|e| K8056Error::TransportUnavailable(e.into()))?;

        thread::sleep(SETTLE_TIME);

        info!(
            "Opened K8056 on '{}' (repeat {}, wait {:?})",
            device, config.repeat, config.wait
        );
        Ok(K8056::with_transport(port, config))
    }
}

impl<T: Transport> K8056<T> {
    pub fn with_transport(transport: T, config: DriverConfig) -> Self {
        K8056 { transport, config }
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Releases the transport.
    pub fn close(self) {
        info!("Closing K8056");
    }

    fn process(
        &mut self,
        instruction: Instruction,
        data: u8,
        address: CardAddress,
    ) -> Result<(), K8056Error> {
        let frame = Frame::new(address, instruction, data);
        for _ in 0..self.config.transmissions() {
            debug!("Write {}", frame);
            self.transport
                .send(&frame)
                .map_err(K8056Error::TransportUnavailable)?;
            thread::sleep(self.config.wait);
        }
        Ok(())
    }
}

impl<T: Transport> RelayDriver for K8056<T> {
    fn set_relay(&mut self, relay: u8, address: CardAddress) -> Result<(), K8056Error> {
        let relay = relay_index(relay)?;
        info!("Set relay '{}' of card '{}'", relay, address);
        self.process(SetRelay, relay.data_byte(), address)
    }

    fn clear_relay(&mut self, relay: u8, address: CardAddress) -> Result<(), K8056Error> {
        let relay = relay_index(relay)?;
        info!("Clear relay '{}' of card '{}'", relay, address);
        self.process(ClearRelay, relay.data_byte(), address)
    }

    fn toggle_relay(&mut self, relay: u8, address: CardAddress) -> Result<(), K8056Error> {
        let relay = relay_index(relay)?;
        info!("Toggle relay '{}' of card '{}'", relay, address);
        self.process(ToggleRelay, relay.data_byte(), address)
    }

    fn set_address(
        &mut self,
        new_address: CardAddress,
        address: CardAddress,
    ) -> Result<(), K8056Error> {
        info!("Change address of card '{}' to '{}'", address, new_address);
        self.process(SetAddress, new_address, address)
    }

    fn send_byte(&mut self, value: u8, address: CardAddress) -> Result<(), K8056Error> {
        info!("Set relays of card '{}' to {:08b}", address, value);
        self.process(SendByte, value, address)
    }

    fn emergency_stop(&mut self) -> Result<(), K8056Error> {
        info!("Emergency stop");
        self.process(EmergencyStop, 1, 1)
    }

    fn force_address(&mut self) -> Result<(), K8056Error> {
        info!("Force all cards to address 1");
        self.process(ForceAddress, 1, 1)
    }

    fn query_address(&mut self) -> Result<(), K8056Error> {
        info!("Display card addresses");
        self.process(DisplayAddress, 1, 1)
    }
}

/// Stand-in used when no card is attached. Commands are validated like on
/// the real card and then dropped.
#[derive(Debug, Default)]
pub struct SimulatedDriver {}

impl SimulatedDriver {
    pub fn new() -> Self {
        SimulatedDriver {}
    }
}

impl RelayDriver for SimulatedDriver {
    fn set_relay(&mut self, relay: u8, address: CardAddress) -> Result<(), K8056Error> {
        let relay = relay_index(relay)?;
        debug!("Simulated: set relay '{}' of card '{}'", relay, address);
        Ok(())
    }

    fn clear_relay(&mut self, relay: u8, address: CardAddress) -> Result<(), K8056Error> {
        let relay = relay_index(relay)?;
        debug!("Simulated: clear relay '{}' of card '{}'", relay, address);
        Ok(())
    }

    fn toggle_relay(&mut self, relay: u8, address: CardAddress) -> Result<(), K8056Error> {
        let relay = relay_index(relay)?;
        debug!("Simulated: toggle relay '{}' of card '{}'", relay, address);
        Ok(())
    }

    fn set_address(
        &mut self,
        new_address: CardAddress,
        address: CardAddress,
    ) -> Result<(), K8056Error> {
        debug!(
            "Simulated: change address of card '{}' to '{}'",
            address, new_address
        );
        Ok(())
    }

    fn send_byte(&mut self, value: u8, address: CardAddress) -> Result<(), K8056Error> {
        debug!("Simulated: set relays of card '{}' to {:08b}", address, value);
        Ok(())
    }

    fn emergency_stop(&mut self) -> Result<(), K8056Error> {
        debug!("Simulated: emergency stop");
        Ok(())
    }

    fn force_address(&mut self) -> Result<(), K8056Error> {
        debug!("Simulated: force all cards to address 1");
        Ok(())
    }

    fn query_address(&mut self) -> Result<(), K8056Error> {
        debug!("Simulated: display card addresses");
        Ok(())
    }

    fn is_simulated(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Frames(Vec<Vec<u8>>);

    impl Write for Frames {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.push(buf.to_vec());
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_write_impl_sends_whole_frame() {
        let mut frames = Frames(Vec::new());
        frames.send(&Frame::new(1, ClearRelay, b'4')).unwrap();
        assert_eq!(frames.0, vec![vec![13, 1, 67, 52, 123]]);
    }

    #[test]
    fn test_simulated_driver_validates_relay() {
        let mut driver = SimulatedDriver::new();
        assert!(driver.set_relay(9, 1).is_ok());
        assert!(matches!(
            driver.clear_relay(0, 1),
            Err(K8056Error::InvalidRelayIndex(0))
        ));
        assert!(driver.emergency_stop().is_ok());
        assert!(driver.is_simulated());
    }

    #[test]
    fn test_boxed_driver_delegates() {
        let mut driver: Box<dyn RelayDriver> = Box::new(SimulatedDriver::new());
        assert!(driver.is_simulated());
        assert!(matches!(
            driver.toggle_relay(10, 1),
            Err(K8056Error::InvalidRelayIndex(10))
        ));
    }
}
