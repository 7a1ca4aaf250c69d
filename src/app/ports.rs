//! Port traits: the boundary between the controller core and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ InputController (domain)
//! ```
//!
//! Measurement drivers, the time-series store, the rule engine, actuators
//! and GPIO all sit behind these traits. Controllers run on their own
//! threads, so every shared port is `Send + Sync` and held as an `Arc`.

use std::sync::Arc;

use crate::config::EdgeMode;
use crate::edge::EdgeDirection;
use crate::error::Result;
use crate::reading::Reading;

// ───────────────────────────────────────────────────────────────
// Measurement source (driver → domain)
// ───────────────────────────────────────────────────────────────

/// The capability every device driver implements.
pub trait MeasurementSource: Send {
    /// Produce the next reading.
    ///
    /// `Err(Error::Exhausted)` means "no data this call" and is not fatal;
    /// any other error is a driver fault for this cycle only.
    fn next(&mut self) -> Result<Reading>;

    /// Release driver-held resources. Must be idempotent.
    fn stop(&mut self) {}
}

// ───────────────────────────────────────────────────────────────
// Persistence (domain → time-series store)
// ───────────────────────────────────────────────────────────────

/// Write path of the time-series store. The timestamp is implicit.
pub trait PersistencePort: Send + Sync {
    fn write(&self, device_id: &str, channel: &str, value: f64) -> Result<()>;

    /// Write every channel of a reading, stopping at the first failure.
    fn write_reading(&self, device_id: &str, reading: &Reading) -> Result<()> {
        for (channel, value) in reading.iter() {
            self.write(device_id, channel, value)?;
        }
        Ok(())
    }
}

// ───────────────────────────────────────────────────────────────
// Rule engine (store query + dispatch)
// ───────────────────────────────────────────────────────────────

/// An active edge-type rule bound to one input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeRule {
    pub id: String,
    pub name: String,
    /// Which edge direction the rule fires on.
    pub edge: EdgeMode,
}

/// Read side of the rule store.
pub trait RuleStore: Send + Sync {
    /// Active edge rules whose input is `device_id`.
    fn active_edge_rules(&self, device_id: &str) -> Result<Vec<EdgeRule>>;
}

/// Hands a matched rule to the external rule-execution engine.
pub trait RuleDispatch: Send + Sync {
    fn trigger(&self, rule_id: &str, message: &str, direction: EdgeDirection);
}

// ───────────────────────────────────────────────────────────────
// Actuators
// ───────────────────────────────────────────────────────────────

pub trait ActuatorPort: Send + Sync {
    /// Whether an actuator with this id is configured.
    fn exists(&self, output_id: &str) -> bool;

    /// Turn the actuator on for `duration_secs`. May block for the whole
    /// duration; callers run it off the polling thread.
    fn activate(&self, output_id: &str, duration_secs: f64);
}

// ───────────────────────────────────────────────────────────────
// GPIO and I2C primitives
// ───────────────────────────────────────────────────────────────

/// Level of a digital input. Any `embedded_hal` input pin qualifies
/// (see [`crate::drivers::gpio`]).
pub trait PinLevel: Send {
    fn is_high(&mut self) -> Result<bool>;
}

/// Invoked from the GPIO layer's interrupt thread with the BCM pin number.
pub type EdgeCallback = Arc<dyn Fn(u32) + Send + Sync>;

pub trait GpioPort: Send + Sync {
    fn input_pin(&self, pin: u32) -> Result<Box<dyn PinLevel>>;

    /// Register `callback` for transitions on `pin`.
    fn watch_edges(&self, pin: u32, mode: EdgeMode, bounce_ms: u32, callback: EdgeCallback)
    -> Result<()>;

    /// Remove any registration for `pin`. Unwatched pins are ignored.
    fn unwatch(&self, pin: u32);
}

/// Channel selection on a bus multiplexer.
pub trait ChannelSelect: Send {
    fn select(&mut self, channel: u8) -> Result<()>;
}

/// Opens bus devices that the core drives itself.
pub trait BusPort: Send + Sync {
    fn multiplexer(&self, bus: u8, address: u16) -> Result<Box<dyn ChannelSelect>>;
}

// ───────────────────────────────────────────────────────────────
// Time
// ───────────────────────────────────────────────────────────────

/// Wall-clock source in epoch seconds.
pub trait Clock: Send + Sync {
    fn now(&self) -> f64;
}

// ───────────────────────────────────────────────────────────────
// Bundle
// ───────────────────────────────────────────────────────────────

/// Every collaborator a controller needs, shared across controllers.
#[derive(Clone)]
pub struct Ports {
    pub clock: Arc<dyn Clock>,
    pub locks: Arc<dyn crate::lock::LockBackend>,
    pub persistence: Arc<dyn PersistencePort>,
    pub rules: Arc<dyn RuleStore>,
    pub dispatch: Arc<dyn RuleDispatch>,
    pub actuators: Arc<dyn ActuatorPort>,
    pub gpio: Arc<dyn GpioPort>,
    pub bus: Arc<dyn BusPort>,
}
