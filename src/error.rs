//! Unified error types for the input controllers.
//!
//! A single `Error` enum that every subsystem converts into, so the
//! per-device loop can contain every per-cycle fault with one `match`.
//! Only [`Error::UnrecognizedDevice`] and [`Error::Config`] are fatal, and
//! only at construction time.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The configuration names a device type with no registered driver.
    UnrecognizedDevice(String),
    /// A shared-resource lock was not acquired within the retry budget.
    LockTimeout { key: String, attempts: u32 },
    /// The measurement source has no data for this call.
    Exhausted,
    /// Any other fault from a measurement source (I/O, parsing, timeout).
    Driver(String),
    /// The time-series store could not be reached.
    PersistenceUnavailable(String),
    /// Configuration is invalid or could not be loaded.
    Config(String),
    /// GPIO pin access or interrupt registration failed.
    Gpio(String),
}

impl Error {
    pub fn driver(detail: impl fmt::Display) -> Self {
        Self::Driver(detail.to_string())
    }

    pub fn config(detail: impl fmt::Display) -> Self {
        Self::Config(detail.to_string())
    }

    /// `true` for the "no data this cycle" signal.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted)
    }

    /// `true` for connectivity-class faults of a downstream collaborator.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::PersistenceUnavailable(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnrecognizedDevice(tag) => write!(f, "'{tag}' is not a valid device type"),
            Self::LockTimeout { key, attempts } => {
                write!(f, "unable to acquire lock '{key}' after {attempts} attempts")
            }
            Self::Exhausted => write!(f, "measurement source exhausted"),
            Self::Driver(detail) => write!(f, "driver: {detail}"),
            Self::PersistenceUnavailable(detail) => {
                write!(f, "time-series store unavailable: {detail}")
            }
            Self::Config(detail) => write!(f, "config: {detail}"),
            Self::Gpio(detail) => write!(f, "gpio: {detail}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Driver(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
