//! Measurement from the standard output of a shell command.
//!
//! The command's stdout is trimmed and parsed as a float. A non-zero exit
//! is a driver fault; empty or non-numeric output means "no data".

use std::process::Command;

use log::debug;

use crate::app::ports::MeasurementSource;
use crate::error::{Error, Result};
use crate::reading::Reading;

#[derive(Debug)]
pub struct LinuxCommand {
    command: String,
    measurement: String,
}

impl LinuxCommand {
    pub fn new(command: &str, measurement: &str) -> Self {
        Self {
            command: command.to_string(),
            measurement: measurement.to_string(),
        }
    }
}

impl MeasurementSource for LinuxCommand {
    fn next(&mut self) -> Result<Reading> {
        let output = Command::new("/bin/sh")
            .arg("-c")
            .arg(&self.command)
            .output()
            .map_err(|e| Error::driver(format!("spawning '{}': {e}", self.command)))?;
        if !output.status.success() {
            return Err(Error::driver(format!(
                "'{}' exited with {}",
                self.command, output.status
            )));
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        let text = stdout.trim();
        debug!("LinuxCommand: '{}' -> '{}'", self.command, text);
        let value: f64 = text.parse().map_err(|_| Error::Exhausted)?;
        Ok(Reading::single(self.measurement.as_str(), value))
    }
}
