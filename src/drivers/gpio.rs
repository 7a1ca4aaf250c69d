//! Bridge from `embedded_hal` digital inputs to [`PinLevel`].
//!
//! Any HAL input pin that can move across threads can back an edge input;
//! the HAL error is reduced to its portable `ErrorKind`.

use embedded_hal::digital::{Error as _, InputPin};

use crate::app::ports::PinLevel;
use crate::error::{Error, Result};

impl<T> PinLevel for T
where
    T: InputPin + Send,
{
    fn is_high(&mut self) -> Result<bool> {
        InputPin::is_high(self).map_err(|e| Error::Gpio(format!("{:?}", e.kind())))
    }
}
