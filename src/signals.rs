//! SIGINT / SIGTERM delivery for the daemon binary.
//!
//! Both signals are blocked on the main thread before any other thread
//! exists, so every controller and job thread inherits the mask. A single
//! waiter thread then takes them synchronously with `sigwait` and forwards
//! the signal number over a channel.

use std::io;
use std::sync::mpsc::{self, Receiver};
use std::thread;

use log::{debug, error};

use crate::error::{Error, Result};

/// The termination signal set, blocked on the thread that built it.
pub struct TerminationSignals {
    set: libc::sigset_t,
}

impl TerminationSignals {
    /// Block SIGINT and SIGTERM on the calling thread.
    ///
    /// Call before spawning threads that should not receive them.
    pub fn block() -> Result<Self> {
        // SAFETY: the set is plain data initialised by sigemptyset before
        // use; pthread_sigmask only reads it.
        #[allow(unsafe_code)]
        let (rc, set) = unsafe {
            let mut set: libc::sigset_t = std::mem::zeroed();
            libc::sigemptyset(&mut set);
            libc::sigaddset(&mut set, libc::SIGINT);
            libc::sigaddset(&mut set, libc::SIGTERM);
            (libc::pthread_sigmask(libc::SIG_BLOCK, &set, std::ptr::null_mut()), set)
        };
        if rc != 0 {
            return Err(Error::driver(format!(
                "blocking termination signals: {}",
                io::Error::from_raw_os_error(rc)
            )));
        }
        Ok(Self { set })
    }

    /// Wait for the next termination signal and return its number.
    pub fn wait(&self) -> Result<i32> {
        let mut signal = 0;
        // SAFETY: `self.set` is initialised and `signal` outlives the call.
        #[allow(unsafe_code)]
        let rc = unsafe { libc::sigwait(&self.set, &mut signal) };
        if rc == 0 {
            Ok(signal)
        } else {
            Err(Error::driver(format!("sigwait: {}", io::Error::from_raw_os_error(rc))))
        }
    }

    /// Move the wait onto a named thread. Each received signal is sent on
    /// the returned channel; the thread ends when the receiver is dropped.
    pub fn forward(self) -> Result<Receiver<i32>> {
        let (tx, rx) = mpsc::channel();
        thread::Builder::new()
            .name("signals".into())
            .spawn(move || {
                loop {
                    match self.wait() {
                        Ok(signal) => {
                            debug!("Signals: received {}", signal_name(signal));
                            if tx.send(signal).is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            error!("Signals: {}", e);
                            break;
                        }
                    }
                }
            })
            .map_err(|e| Error::driver(format!("spawning signal thread: {e}")))?;
        Ok(rx)
    }
}

pub fn signal_name(signal: i32) -> &'static str {
    match signal {
        libc::SIGINT => "SIGINT",
        libc::SIGTERM => "SIGTERM",
        _ => "signal",
    }
}
