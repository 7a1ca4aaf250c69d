//! TCA9548A 8-channel I2C multiplexer.
//!
//! Selecting a channel is a single-byte write of the channel bitmask to
//! the multiplexer address. The caller must hold the multiplexer lock
//! across the select and the downstream transaction.

use embedded_hal::i2c::{Error as _, I2c};
use log::debug;

use crate::app::ports::{BusPort, ChannelSelect};
use crate::error::{Error, Result};

pub const CHANNELS: u8 = 8;

pub struct Tca9548a<I> {
    i2c: I,
    address: u8,
}

impl<I: I2c> Tca9548a<I> {
    pub fn new(i2c: I, address: u16) -> Result<Self> {
        let address = u8::try_from(address)
            .ok()
            .filter(|a| *a < 0x80)
            .ok_or_else(|| Error::config(format!("multiplexer address 0x{address:X} is not 7-bit")))?;
        Ok(Self { i2c, address })
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    /// Give the bus back (e.g. for tests).
    pub fn release(self) -> I {
        self.i2c
    }
}

impl<I: I2c + Send> ChannelSelect for Tca9548a<I> {
    fn select(&mut self, channel: u8) -> Result<()> {
        if channel >= CHANNELS {
            return Err(Error::config(format!("multiplexer channel {channel} out of range")));
        }
        debug!("Mux 0x{:02X}: selecting channel {}", self.address, channel);
        self.i2c.write(self.address, &[1 << channel]).map_err(|e| {
            Error::driver(format!(
                "could not set channel {} on multiplexer 0x{:02X}: {:?}",
                channel,
                self.address,
                e.kind()
            ))
        })
    }
}

/// [`BusPort`] backed by `embedded_hal` buses; `open` yields the bus for a
/// bus number and every multiplexer on it is driven as a TCA9548A.
pub struct HalBus<F> {
    open: F,
}

impl<F> HalBus<F> {
    pub fn new(open: F) -> Self {
        Self { open }
    }
}

impl<F, I> BusPort for HalBus<F>
where
    F: Fn(u8) -> Result<I> + Send + Sync,
    I: I2c + Send + 'static,
{
    fn multiplexer(&self, bus: u8, address: u16) -> Result<Box<dyn ChannelSelect>> {
        let i2c = (self.open)(bus)?;
        Ok(Box::new(Tca9548a::new(i2c, address)?))
    }
}
