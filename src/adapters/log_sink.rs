//! Log-backed collaborator adapters.
//!
//! Implements [`PersistencePort`], [`RuleDispatch`] and [`ActuatorPort`]
//! by writing structured lines through the `log` facade. The daemon uses
//! them when no time-series store or rule engine is wired in; a real
//! store adapter would implement the same traits.

use std::collections::BTreeSet;
use std::time::Duration;

use log::info;

use crate::app::ports::{ActuatorPort, PersistencePort, RuleDispatch};
use crate::edge::EdgeDirection;
use crate::error::Result;

/// Logs every measurement point.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogPersistence;

impl PersistencePort for LogPersistence {
    fn write(&self, device_id: &str, channel: &str, value: f64) -> Result<()> {
        info!("MEAS | input={} | {}={}", device_id, channel, value);
        Ok(())
    }
}

/// Logs every triggered rule with its context message.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogRuleDispatch;

impl RuleDispatch for LogRuleDispatch {
    fn trigger(&self, rule_id: &str, message: &str, direction: EdgeDirection) {
        info!(
            "RULE | id={} | edge={} | {}",
            rule_id,
            direction.label(),
            message.replace('\n', " | ")
        );
    }
}

/// Logs actuator on/off transitions for a known set of output ids.
#[derive(Debug, Default, Clone)]
pub struct LogActuators {
    outputs: BTreeSet<String>,
}

impl LogActuators {
    pub fn new<I, S>(outputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            outputs: outputs.into_iter().map(Into::into).collect(),
        }
    }
}

impl ActuatorPort for LogActuators {
    fn exists(&self, output_id: &str) -> bool {
        self.outputs.contains(output_id)
    }

    fn activate(&self, output_id: &str, duration_secs: f64) {
        info!("OUTPUT | {} on for {:.1} s", output_id, duration_secs);
        if duration_secs.is_finite() && duration_secs > 0.0 {
            std::thread::sleep(Duration::from_secs_f64(duration_secs));
        }
        info!("OUTPUT | {} off", output_id);
    }
}
