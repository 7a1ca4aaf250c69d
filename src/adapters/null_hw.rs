//! Hardware adapters for hosts without GPIO or I2C access.
//!
//! Every call fails with a descriptive error, so a configuration that
//! needs real hardware is rejected at controller construction instead of
//! silently producing nothing.

use crate::app::ports::{BusPort, ChannelSelect, EdgeCallback, GpioPort, PinLevel};
use crate::config::EdgeMode;
use crate::error::{Error, Result};

#[derive(Debug, Default, Clone, Copy)]
pub struct NullGpio;

impl GpioPort for NullGpio {
    fn input_pin(&self, pin: u32) -> Result<Box<dyn PinLevel>> {
        Err(Error::Gpio(format!("no GPIO backend for pin {pin}")))
    }

    fn watch_edges(&self, pin: u32, _mode: EdgeMode, _bounce_ms: u32, _callback: EdgeCallback) -> Result<()> {
        Err(Error::Gpio(format!("no GPIO backend for pin {pin}")))
    }

    fn unwatch(&self, _pin: u32) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullBus;

impl BusPort for NullBus {
    fn multiplexer(&self, bus: u8, address: u16) -> Result<Box<dyn ChannelSelect>> {
        Err(Error::driver(format!(
            "no I2C backend for multiplexer 0x{address:02X} on bus {bus}"
        )))
    }
}
