//! Device drivers, the type-tag registry and bus/GPIO helpers.

pub mod cpu_load;
pub mod daemon_ram;
pub mod gpio;
pub mod linux_command;
pub mod mux;
pub mod registry;
