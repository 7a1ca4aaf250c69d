//! Input controller library.
//!
//! Periodic and interrupt-driven acquisition of measurements from
//! heterogeneous devices, with cross-process bus locking, analog scaling,
//! pre-actuation and edge-rule dispatch. Everything here is host-testable;
//! hardware and storage sit behind the traits in [`app::ports`].

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod dispatch;
pub mod drivers;
pub mod edge;
pub mod error;
pub mod lock;
pub mod reading;
pub mod scaling;
pub mod scheduler;
#[cfg(unix)]
pub mod signals;

pub use error::{Error, Result};
pub use reading::Reading;
