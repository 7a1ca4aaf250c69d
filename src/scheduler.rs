//! Periodic scheduler and pre-actuation sequencer.
//!
//! One [`CycleSequencer`] per controller. It owns the self-correcting
//! due time and the per-cycle flags; the controller asks it what to do on
//! every loop iteration and reports back when a sample has been taken.
//!
//! ```text
//!   Idle ──now ≥ next_due──▶ Due ──pre-actuation?──▶ PreActuating
//!    ▲                        │                          │
//!    │                        └────────no────────┐       │ now ≥ deadline
//!    │                                           ▼       ▼
//!    └──────────────── finish_cycle() ─────── Reading ◀──┘
//! ```
//!
//! Time is an `f64` of epoch seconds supplied by the caller, so the whole
//! state machine can be stepped deterministically in tests.

use log::debug;

// ═══════════════════════════════════════════════════════════════
//  Schedule state
// ═══════════════════════════════════════════════════════════════

/// Self-correcting next-due timestamp for a fixed period.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduleState {
    next_due: f64,
    period: f64,
}

impl ScheduleState {
    /// First sample becomes due one full period after `start`.
    pub fn new(start: f64, period: f64) -> Self {
        Self {
            next_due: start + period,
            period,
        }
    }

    pub fn next_due(&self) -> f64 {
        self.next_due
    }

    pub fn period(&self) -> f64 {
        self.period
    }

    /// Returns `true` when a sample is due at `now`, re-arming `next_due`
    /// in whole periods until it lies strictly after `now`. A stall of
    /// several periods therefore yields one sample, not a backlog.
    pub fn poll(&mut self, now: f64) -> bool {
        if now < self.next_due {
            return false;
        }
        let missed = ((now - self.next_due) / self.period).floor();
        let mut next = self.next_due + (missed + 1.0) * self.period;
        // Guard against floating-point landing exactly on `now`.
        while next <= now {
            let stepped = next + self.period;
            if stepped <= next {
                // Period is below the resolution of `next`.
                next = now + self.period;
                break;
            }
            next = stepped;
        }
        self.next_due = next;
        if missed >= 1.0 {
            debug!("Scheduler: skipped {} missed period(s)", missed as u64);
        }
        true
    }
}

// ═══════════════════════════════════════════════════════════════
//  Pre-actuation
// ═══════════════════════════════════════════════════════════════

/// Actuator engaged before sampling.
#[derive(Debug, Clone, PartialEq)]
pub struct PreActuation {
    pub output_id: String,
    pub duration_secs: f64,
}

/// Per-cycle pre-actuation bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PreActuationState {
    engaged: bool,
    deadline: f64,
}

impl PreActuationState {
    pub fn is_engaged(&self) -> bool {
        self.engaged
    }

    pub fn deadline(&self) -> f64 {
        self.deadline
    }
}

// ═══════════════════════════════════════════════════════════════
//  Sequencer
// ═══════════════════════════════════════════════════════════════

/// Observable phase of the current cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Due,
    PreActuating,
    Reading,
}

/// What the controller must do after [`CycleSequencer::advance`].
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Nothing due.
    Idle,
    /// Start the actuator now (fire-and-forget), then keep polling.
    Engage(PreActuation),
    /// Actuation window still open.
    Wait { until: f64 },
    /// Take the sample, then call [`CycleSequencer::finish_cycle`].
    Read,
}

#[derive(Debug, Clone)]
pub struct CycleSequencer {
    schedule: ScheduleState,
    pre: Option<PreActuation>,
    pre_state: PreActuationState,
    due: bool,
}

impl CycleSequencer {
    pub fn new(schedule: ScheduleState, pre: Option<PreActuation>) -> Self {
        Self {
            schedule,
            pre,
            pre_state: PreActuationState::default(),
            due: false,
        }
    }

    pub fn schedule(&self) -> &ScheduleState {
        &self.schedule
    }

    pub fn pre_actuation(&self) -> Option<&PreActuation> {
        self.pre.as_ref()
    }

    pub fn phase(&self) -> Phase {
        match (self.due, &self.pre, self.pre_state.engaged) {
            (false, _, _) => Phase::Idle,
            (true, Some(_), true) => Phase::PreActuating,
            (true, Some(_), false) => Phase::Due,
            (true, None, _) => Phase::Reading,
        }
    }

    /// Advance the state machine to `now`.
    pub fn advance(&mut self, now: f64) -> Step {
        if !self.due && self.schedule.poll(now) {
            self.due = true;
        }
        if !self.due {
            return Step::Idle;
        }

        let Some(pre) = &self.pre else {
            return Step::Read;
        };

        if !self.pre_state.engaged {
            self.pre_state = PreActuationState {
                engaged: true,
                deadline: now + pre.duration_secs,
            };
            return Step::Engage(pre.clone());
        }

        if now < self.pre_state.deadline {
            Step::Wait {
                until: self.pre_state.deadline,
            }
        } else {
            Step::Read
        }
    }

    /// Clear every per-cycle flag, whatever the sample outcome was.
    pub fn finish_cycle(&mut self) {
        self.due = false;
        self.pre_state = PreActuationState::default();
    }
}

// ═══════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════
