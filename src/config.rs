//! Daemon and per-device configuration.
//!
//! [`DaemonConfig`] is loaded once from JSON at start-up. Each
//! [`DeviceConfig`] is an immutable snapshot owned by exactly one
//! controller; a controller that needs new configuration is stopped and a
//! fresh one is started.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Type tag reserved for interrupt-driven edge inputs.
pub const EDGE_DEVICE: &str = "EDGE";

/// Shortest accepted sampling period.
pub const MIN_PERIOD_SECS: f64 = 0.001;

// ───────────────────────────────────────────────────────────────
// Daemon-wide settings
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Directory holding the inter-process lock files.
    pub lock_dir: PathBuf,
    /// Idle sleep between loop iterations (milliseconds).
    pub tick_interval_ms: u64,
    /// Bounded retry budget for shared-resource locks.
    pub lock_policy: LockPolicy,
    /// Consecutive "no data" cycles before an error is logged.
    pub failure_report_threshold: u32,
    /// Optional JSON file of rule definitions.
    pub rules_path: Option<PathBuf>,
    /// Actuator ids available for pre-actuation.
    pub outputs: Vec<String>,
    pub devices: Vec<DeviceConfig>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            lock_dir: PathBuf::from("/var/lock"),
            tick_interval_ms: 100,
            lock_policy: LockPolicy::default(),
            failure_report_threshold: 3,
            rules_path: None,
            outputs: Vec::new(),
            devices: Vec::new(),
        }
    }
}

impl DaemonConfig {
    /// Read and validate a JSON configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("reading {}: {e}", path.display())))?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| Error::config(format!("parsing {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.tick_interval_ms == 0 {
            return Err(Error::config("tick_interval_ms must be positive"));
        }
        if self.failure_report_threshold == 0 {
            return Err(Error::config("failure_report_threshold must be positive"));
        }
        self.lock_policy.validate()?;
        for (i, dev) in self.devices.iter().enumerate() {
            if self.devices[..i].iter().any(|d| d.id == dev.id) {
                return Err(Error::config(format!("duplicate device id '{}'", dev.id)));
            }
            dev.validate()?;
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

/// Retry budget for a non-blocking lock probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockPolicy {
    pub max_attempts: u32,
    pub retry_interval_ms: u64,
}

impl Default for LockPolicy {
    fn default() -> Self {
        // 600 × 100 ms bounds the worst-case wait to one minute.
        Self {
            max_attempts: 600,
            retry_interval_ms: 100,
        }
    }
}

impl LockPolicy {
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    /// Upper bound on time spent sleeping between attempts.
    pub fn worst_case_wait(&self) -> Duration {
        self.retry_interval() * self.max_attempts.saturating_sub(1)
    }

    fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(Error::config("lock_policy.max_attempts must be positive"));
        }
        Ok(())
    }
}

// ───────────────────────────────────────────────────────────────
// Per-device configuration
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Unique identity used for persistence and rule matching.
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Type tag resolved through the driver registry.
    pub device: String,
    #[serde(default)]
    pub i2c_bus: u8,
    #[serde(default)]
    pub i2c_address: Option<u16>,
    #[serde(default)]
    pub multiplexer: Option<MultiplexerConfig>,
    #[serde(default)]
    pub serial: Option<SerialConfig>,
    /// Free-form location (pin number, mount point, host name).
    #[serde(default)]
    pub location: Option<String>,
    /// Sampling period in seconds.
    pub period_secs: f64,
    #[serde(default)]
    pub pre_output: Option<PreOutputConfig>,
    #[serde(default)]
    pub adc: Option<AdcConfig>,
    #[serde(default)]
    pub edge: Option<EdgeConfig>,
    #[serde(default)]
    pub command: Option<CommandConfig>,
    /// Measurement channels this device is expected to produce.
    #[serde(default)]
    pub measurements: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiplexerConfig {
    pub bus: u8,
    pub address: u16,
    pub channel: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialConfig {
    pub path: String,
    pub baud_rate: u32,
}

/// Actuator engaged for a fixed window before each sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreOutputConfig {
    pub output_id: String,
    pub duration_secs: f64,
}

/// ADC channel selection and linear calibration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdcConfig {
    #[serde(default)]
    pub channel: u8,
    #[serde(default = "default_gain")]
    pub gain: u8,
    #[serde(default)]
    pub resolution: Option<u8>,
    /// Channel name the scaled value is stored under.
    pub measurement: String,
    #[serde(default)]
    pub unit: String,
    pub volts_min: f64,
    pub volts_max: f64,
    pub units_min: f64,
    pub units_max: f64,
    #[serde(default)]
    pub inverse: bool,
}

fn default_gain() -> u8 {
    1
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeMode {
    Rising,
    Falling,
    Both,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EdgeConfig {
    /// BCM pin number.
    pub pin: u32,
    pub mode: EdgeMode,
    /// Hardware-level bounce filter handed to the GPIO layer (ms).
    #[serde(default)]
    pub bounce_ms: u32,
    /// Debounce window after an accepted edge (seconds).
    pub reset_period_secs: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandConfig {
    pub command: String,
    pub measurement: String,
    #[serde(default)]
    pub unit: String,
}

impl DeviceConfig {
    /// Minimal polled device, mostly for tests and programmatic setup.
    pub fn new(id: impl Into<String>, device: impl Into<String>, period_secs: f64) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            device: device.into(),
            i2c_bus: 0,
            i2c_address: None,
            multiplexer: None,
            serial: None,
            location: None,
            period_secs,
            pre_output: None,
            adc: None,
            edge: None,
            command: None,
            measurements: Vec::new(),
        }
    }

    pub fn is_edge(&self) -> bool {
        self.device == EDGE_DEVICE
    }

    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(Error::config("device id must not be empty"));
        }
        if !self.is_edge() && !(self.period_secs.is_finite() && self.period_secs >= MIN_PERIOD_SECS) {
            return Err(Error::config(format!(
                "{}: period_secs must be at least {} s, got {}",
                self.id, MIN_PERIOD_SECS, self.period_secs
            )));
        }
        if let Some(mux) = &self.multiplexer {
            if mux.channel > 7 {
                return Err(Error::config(format!(
                    "{}: multiplexer channel {} out of range 0-7",
                    self.id, mux.channel
                )));
            }
        }
        if let Some(pre) = &self.pre_output {
            if !pre.duration_secs.is_finite() || pre.duration_secs < 0.0 {
                return Err(Error::config(format!(
                    "{}: pre_output duration must be a non-negative number",
                    self.id
                )));
            }
        }
        if let Some(adc) = &self.adc {
            let bounds = [adc.volts_min, adc.volts_max, adc.units_min, adc.units_max];
            if bounds.iter().any(|b| !b.is_finite()) {
                return Err(Error::config(format!("{}: ADC bounds must be finite", self.id)));
            }
            if adc.volts_min > adc.volts_max {
                return Err(Error::config(format!("{}: volts_min exceeds volts_max", self.id)));
            }
            if adc.units_min > adc.units_max {
                return Err(Error::config(format!("{}: units_min exceeds units_max", self.id)));
            }
        }
        match &self.edge {
            Some(edge) if !(edge.reset_period_secs.is_finite() && edge.reset_period_secs >= 0.0) => {
                Err(Error::config(format!(
                    "{}: edge reset period must be a non-negative number",
                    self.id
                )))
            }
            None if self.is_edge() => Err(Error::config(format!(
                "{}: edge device without an edge block",
                self.id
            ))),
            _ => Ok(()),
        }
    }
}
