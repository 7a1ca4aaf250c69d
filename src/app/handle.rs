//! Control surface of a running controller thread.
//!
//! The polling loop and the owning code share one [`ControlState`]. Pause
//! is a handshake: [`ControllerHandle::pause`] raises the flag and blocks
//! until the loop has parked itself, so the caller can safely mutate
//! shared rule dependencies while the loop is guaranteed idle.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use log::{error, info};

use crate::reading::Reading;

/// Most recent successful sample: `(epoch seconds, reading)`.
pub type LastReading = Arc<Mutex<Option<(f64, Reading)>>>;

#[derive(Debug, Default)]
struct Flags {
    running: bool,
    stop: bool,
    paused: bool,
    pause_acked: bool,
}

#[derive(Debug, Default)]
pub(crate) struct ControlState {
    flags: Mutex<Flags>,
    signal: Condvar,
}

impl ControlState {
    pub(crate) fn new_running() -> Self {
        Self {
            flags: Mutex::new(Flags {
                running: true,
                ..Flags::default()
            }),
            signal: Condvar::new(),
        }
    }

    fn flags(&self) -> MutexGuard<'_, Flags> {
        self.flags.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Loop-side gate at the top of every iteration. Parks while paused
    /// (acknowledging the pause once) and returns `false` when the loop
    /// must exit.
    pub(crate) fn checkpoint(&self, device_id: &str) -> bool {
        let mut f = self.flags();
        loop {
            if f.stop {
                return false;
            }
            if !f.paused {
                return true;
            }
            if !f.pause_acked {
                f.pause_acked = true;
                info!("Input {}: paused", device_id);
                self.signal.notify_all();
            }
            f = self.signal.wait(f).unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Idle between iterations. Wakes early on stop or on a fresh pause
    /// request. Returns `false` when the loop must exit.
    pub(crate) fn idle(&self, interval: Duration) -> bool {
        let f = self.flags();
        let (f, _) = self
            .signal
            .wait_timeout_while(f, interval, |f| !f.stop && !(f.paused && !f.pause_acked))
            .unwrap_or_else(PoisonError::into_inner);
        !f.stop
    }

    pub(crate) fn mark_stopped(&self) {
        let mut f = self.flags();
        f.running = false;
        self.signal.notify_all();
    }

    fn request_stop(&self) {
        let mut f = self.flags();
        f.stop = true;
        self.signal.notify_all();
    }

    fn pause(&self) {
        let mut f = self.flags();
        if !f.running {
            return;
        }
        f.paused = true;
        f.pause_acked = false;
        self.signal.notify_all();
        drop(
            self.signal
                .wait_while(f, |f| f.running && !f.pause_acked)
                .unwrap_or_else(PoisonError::into_inner),
        );
    }

    fn resume(&self) {
        let mut f = self.flags();
        f.paused = false;
        f.pause_acked = false;
        self.signal.notify_all();
    }

    fn is_running(&self) -> bool {
        self.flags().running
    }

    fn is_paused(&self) -> bool {
        let f = self.flags();
        f.paused && f.pause_acked
    }
}

/// Owner-side handle returned by [`InputController::start`](super::controller::InputController::start).
///
/// Dropping the handle stops the loop and waits for it to exit.
pub struct ControllerHandle {
    device_id: String,
    state: Arc<ControlState>,
    last: LastReading,
    worker: Option<JoinHandle<()>>,
}

impl ControllerHandle {
    pub(crate) fn new(
        device_id: String,
        state: Arc<ControlState>,
        last: LastReading,
        worker: JoinHandle<()>,
    ) -> Self {
        Self {
            device_id,
            state,
            last,
            worker: Some(worker),
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Ask the loop to exit. Does not wait; see [`join`](Self::join).
    pub fn stop(&self) {
        info!("Input {}: stop requested", self.device_id);
        self.state.request_stop();
    }

    /// Suspend the loop. Returns once the loop has observed the pause, or
    /// immediately if it is no longer running.
    pub fn pause(&self) {
        self.state.pause();
    }

    pub fn resume(&self) {
        info!("Input {}: resumed", self.device_id);
        self.state.resume();
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    pub fn is_paused(&self) -> bool {
        self.state.is_paused()
    }

    pub fn last_reading(&self) -> Option<(f64, Reading)> {
        self.last.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Wait for the loop thread to finish. Call [`stop`](Self::stop) first.
    pub fn join(mut self) {
        self.wait();
    }

    fn wait(&mut self) {
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("Input {}: controller thread panicked", self.device_id);
            }
        }
    }
}

impl Drop for ControllerHandle {
    fn drop(&mut self) {
        if self.worker.is_some() {
            self.state.request_stop();
            self.wait();
        }
    }
}
