//! Consecutive "no data" tally used to rate-limit error reporting.

/// Counts consecutive [`Exhausted`](crate::error::Error::Exhausted)
/// outcomes. A report is due when the streak reaches `threshold`; the
/// count then starts over so a long-standing fault is reported once per
/// `threshold` cycles instead of every cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureCounter {
    count: u32,
    threshold: u32,
}

impl FailureCounter {
    pub fn new(threshold: u32) -> Self {
        Self {
            count: 0,
            threshold: threshold.max(1),
        }
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Record one failure. Returns `true` when it should be reported.
    pub fn record(&mut self) -> bool {
        self.count += 1;
        if self.count >= self.threshold {
            self.count = 0;
            true
        } else {
            false
        }
    }

    /// Any success ends the streak.
    pub fn reset(&mut self) {
        self.count = 0;
    }
}
