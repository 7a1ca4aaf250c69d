//! Interrupt-driven edge detection with a debounce window.
//!
//! ## Flow
//!
//! ```text
//!  GPIO interrupt ─▶ EdgeHandler::on_interrupt(pin)
//!                      │  read pin level
//!                      │  EdgeDetector::accept(now, level)  ── inside window ─▶ dropped
//!                      ▼
//!                    ±1 ─▶ job queue ─▶ PersistencePort("edge")
//!                      │
//!                      └─▶ RuleStore query (synchronous)
//!                            └─▶ job queue ─▶ RuleDispatch per matching rule
//! ```
//!
//! The handler runs on the GPIO layer's thread, never on the polling loop.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{Local, TimeZone};
use log::{debug, error, info};

use crate::app::ports::{Clock, EdgeRule, PersistencePort, PinLevel, RuleDispatch, RuleStore};
use crate::config::{EdgeConfig, EdgeMode};
use crate::dispatch::JobSender;

/// Channel name under which edge values are persisted.
pub const EDGE_CHANNEL: &str = "edge";

/// Classified transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeDirection {
    Rising,
    Falling,
}

impl EdgeDirection {
    /// Signed value written to the time-series store.
    pub fn value(self) -> f64 {
        match self {
            Self::Rising => 1.0,
            Self::Falling => -1.0,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Rising => "Rising",
            Self::Falling => "Falling",
        }
    }

    /// Whether a rule configured for `mode` fires on this direction.
    pub fn matches(self, mode: EdgeMode) -> bool {
        matches!(
            (mode, self),
            (EdgeMode::Both, _)
                | (EdgeMode::Rising, Self::Rising)
                | (EdgeMode::Falling, Self::Falling)
        )
    }
}

// ═══════════════════════════════════════════════════════════════
//  Debounce + classification
// ═══════════════════════════════════════════════════════════════

/// Last-accepted-edge bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeDetector {
    mode: EdgeMode,
    reset_period: f64,
    /// Events strictly before this instant are discarded.
    deadline: f64,
}

impl EdgeDetector {
    /// Events are accepted from `start` onward.
    pub fn new(mode: EdgeMode, reset_period: f64, start: f64) -> Self {
        Self {
            mode,
            reset_period,
            deadline: start,
        }
    }

    pub fn deadline(&self) -> f64 {
        self.deadline
    }

    /// Debounce and classify one transition observed at `now` with the pin
    /// reading `level_high`. Returns `None` if the event is inside the
    /// window of a previously accepted edge.
    pub fn accept(&mut self, now: f64, level_high: bool) -> Option<EdgeDirection> {
        if now < self.deadline {
            return None;
        }
        self.deadline = now + self.reset_period;
        let direction = match self.mode {
            EdgeMode::Rising => EdgeDirection::Rising,
            EdgeMode::Falling => EdgeDirection::Falling,
            EdgeMode::Both if level_high => EdgeDirection::Rising,
            EdgeMode::Both => EdgeDirection::Falling,
        };
        Some(direction)
    }
}

// ═══════════════════════════════════════════════════════════════
//  Handler
// ═══════════════════════════════════════════════════════════════

/// Identity of the input an edge handler belongs to.
#[derive(Debug, Clone)]
pub struct EdgeInput {
    pub device_id: String,
    pub device_name: String,
    pub pin: u32,
}

/// Everything an interrupt callback needs, shareable across threads.
pub struct EdgeHandler {
    input: EdgeInput,
    detector: Mutex<EdgeDetector>,
    pin: Mutex<Box<dyn PinLevel>>,
    clock: Arc<dyn Clock>,
    persistence: Arc<dyn PersistencePort>,
    rules: Arc<dyn RuleStore>,
    dispatch: Arc<dyn RuleDispatch>,
    jobs: JobSender,
}

/// Collaborators of an [`EdgeHandler`].
pub struct EdgeWiring {
    pub clock: Arc<dyn Clock>,
    pub persistence: Arc<dyn PersistencePort>,
    pub rules: Arc<dyn RuleStore>,
    pub dispatch: Arc<dyn RuleDispatch>,
    pub jobs: JobSender,
}

impl EdgeHandler {
    pub fn new(input: EdgeInput, config: &EdgeConfig, pin: Box<dyn PinLevel>, wiring: EdgeWiring) -> Self {
        let start = wiring.clock.now();
        Self {
            input,
            detector: Mutex::new(EdgeDetector::new(config.mode, config.reset_period_secs, start)),
            pin: Mutex::new(pin),
            clock: wiring.clock,
            persistence: wiring.persistence,
            rules: wiring.rules,
            dispatch: wiring.dispatch,
            jobs: wiring.jobs,
        }
    }

    pub fn input(&self) -> &EdgeInput {
        &self.input
    }

    /// Interrupt entry point. Returns the accepted direction, if any.
    pub fn on_interrupt(&self, pin: u32) -> Option<EdgeDirection> {
        let level = match self.pin.lock().unwrap_or_else(PoisonError::into_inner).is_high() {
            Ok(level) => level,
            Err(e) => {
                error!(
                    "Input {}: could not read pin {}, edge ignored: {}",
                    self.input.device_id, pin, e
                );
                return None;
            }
        };
        let now = self.clock.now();
        let direction = self
            .detector
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .accept(now, level)?;

        debug!(
            "Input {}: {} edge on pin {}",
            self.input.device_id,
            direction.label(),
            pin
        );

        let persistence = Arc::clone(&self.persistence);
        let device_id = self.input.device_id.clone();
        self.jobs.submit(move || {
            if let Err(e) = persistence.write(&device_id, EDGE_CHANNEL, direction.value()) {
                log_persistence_error(&device_id, &e);
            }
        });

        match self.rules.active_edge_rules(&self.input.device_id) {
            Ok(rules) => self.dispatch_rules(&rules, direction, now, pin),
            Err(e) => error!("Input {}: could not query rules: {}", self.input.device_id, e),
        }
        Some(direction)
    }

    fn dispatch_rules(&self, rules: &[EdgeRule], direction: EdgeDirection, now: f64, pin: u32) {
        for rule in rules.iter().filter(|r| direction.matches(r.edge)) {
            let message = self.context_message(rule, direction, now, pin);
            info!(
                "Input {}: triggering rule {} ({})",
                self.input.device_id, rule.id, rule.name
            );
            let dispatch = Arc::clone(&self.dispatch);
            let rule_id = rule.id.clone();
            self.jobs
                .submit(move || dispatch.trigger(&rule_id, &message, direction));
        }
    }

    fn context_message(&self, rule: &EdgeRule, direction: EdgeDirection, now: f64, pin: u32) -> String {
        format!(
            "{}\n[Rule {} ({})] Input {} ({}) {} edge detected on pin {}",
            format_timestamp(now),
            rule.id,
            rule.name,
            self.input.device_id,
            self.input.device_name,
            direction.label(),
            pin
        )
    }
}

/// Local time as `YYYY-MM-DD HH-MM-SS`.
pub fn format_timestamp(epoch_secs: f64) -> String {
    let secs = epoch_secs.floor() as i64;
    let nanos = ((epoch_secs - epoch_secs.floor()) * 1e9) as u32;
    match Local.timestamp_opt(secs, nanos).single() {
        Some(t) => t.format("%Y-%m-%d %H-%M-%S").to_string(),
        None => format!("{epoch_secs:.0}"),
    }
}

pub(crate) fn log_persistence_error(device_id: &str, e: &crate::error::Error) {
    if e.is_connectivity() {
        error!(
            "Input {}: could not connect to the time-series store. Check that it is running \
             and accepting connections ({})",
            device_id, e
        );
    } else {
        error!("Input {}: persistence write failed: {}", device_id, e);
    }
}

// ═══════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════
