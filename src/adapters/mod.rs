//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter      | Implements        | Connects to                 |
//! |--------------|-------------------|-----------------------------|
//! | `log_sink`   | PersistencePort   | `log` facade                |
//! |              | RuleDispatch      |                             |
//! |              | ActuatorPort      |                             |
//! | `rules_file` | RuleStore         | JSON rule definitions       |
//! | `null_hw`    | GpioPort, BusPort | hosts without GPIO/I2C      |
//! | `time`       | Clock             | system clock / manual clock |

pub mod log_sink;
pub mod null_hw;
pub mod rules_file;
pub mod time;
