//! Device-type registry: type tag → driver constructor.
//!
//! Adding a device type means registering a constructor here; the
//! controller only ever sees the [`MeasurementSource`] it returns.
//!
//! | Tag             | Kind   | Driver                              |
//! |-----------------|--------|-------------------------------------|
//! | `DAEMON_RAM`    | Polled | [`DaemonRam`](super::daemon_ram)     |
//! | `CPU_LOAD`      | Polled | [`CpuLoad`](super::cpu_load)         |
//! | `LINUX_COMMAND` | Polled | [`LinuxCommand`](super::linux_command) |
//! | `EDGE`          | Edge   | interrupt-driven, no polled source  |
//!
//! ADC chips register as [`DriverEntry::Adc`]; their source must yield a
//! `voltage` channel which the controller scales.

use std::collections::HashMap;
use std::fmt;

use crate::app::ports::MeasurementSource;
use crate::config::{DeviceConfig, EDGE_DEVICE};
use crate::error::{Error, Result};

use super::cpu_load::CpuLoad;
use super::daemon_ram::DaemonRam;
use super::linux_command::LinuxCommand;

/// Channel an ADC source reports its raw voltage on.
pub const VOLTAGE_CHANNEL: &str = "voltage";

pub type Constructor = Box<dyn Fn(&DeviceConfig) -> Result<Box<dyn MeasurementSource>> + Send + Sync>;

/// How a registered device type is driven.
pub enum DriverEntry {
    /// Polled through the scheduler; the source returns calibrated values.
    Polled(Constructor),
    /// Polled; the source returns a raw `voltage` that gets scaled.
    Adc(Constructor),
    /// Driven by GPIO interrupts rather than the polling cycle.
    Edge,
}

impl fmt::Debug for DriverEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Polled(_) => write!(f, "Polled"),
            Self::Adc(_) => write!(f, "Adc"),
            Self::Edge => write!(f, "Edge"),
        }
    }
}

#[derive(Debug, Default)]
pub struct DriverRegistry {
    entries: HashMap<String, DriverEntry>,
}

impl DriverRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-loaded with the host drivers shipped in this crate.
    pub fn with_builtin() -> Self {
        let mut r = Self::new();
        r.register_polled("DAEMON_RAM", |_| Ok(Box::new(DaemonRam::new())));
        r.register_polled("CPU_LOAD", |_| Ok(Box::new(CpuLoad::new())));
        r.register_polled("LINUX_COMMAND", |cfg| {
            let cmd = cfg.command.as_ref().ok_or_else(|| {
                Error::config(format!("{}: LINUX_COMMAND requires a command block", cfg.id))
            })?;
            Ok(Box::new(LinuxCommand::new(&cmd.command, &cmd.measurement)))
        });
        r.register(EDGE_DEVICE, DriverEntry::Edge);
        r
    }

    /// Add or replace the entry for `tag`.
    pub fn register(&mut self, tag: impl Into<String>, entry: DriverEntry) {
        self.entries.insert(tag.into(), entry);
    }

    pub fn register_polled<F>(&mut self, tag: impl Into<String>, ctor: F)
    where
        F: Fn(&DeviceConfig) -> Result<Box<dyn MeasurementSource>> + Send + Sync + 'static,
    {
        self.register(tag, DriverEntry::Polled(Box::new(ctor)));
    }

    pub fn register_adc<F>(&mut self, tag: impl Into<String>, ctor: F)
    where
        F: Fn(&DeviceConfig) -> Result<Box<dyn MeasurementSource>> + Send + Sync + 'static,
    {
        self.register(tag, DriverEntry::Adc(Box::new(ctor)));
    }

    pub fn lookup(&self, tag: &str) -> Result<&DriverEntry> {
        self.entries
            .get(tag)
            .ok_or_else(|| Error::UnrecognizedDevice(tag.to_string()))
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.entries.contains_key(tag)
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}
