//! Application core: per-device scheduling, zero concrete I/O.
//!
//! Business rules for one input controller: the sampling cycle, the
//! failure-report policy and the control surface. All interaction with
//! drivers, storage, rules and hardware happens through **port traits**
//! defined in [`ports`], keeping this layer testable without peripherals.

pub mod controller;
pub mod failure;
pub mod handle;
pub mod ports;

pub use controller::{ControllerSettings, InputController, TickOutcome};
pub use handle::ControllerHandle;
