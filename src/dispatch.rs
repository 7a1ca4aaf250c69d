//! Channel-dispatched background jobs.
//!
//! Persistence writes and rule dispatch must never stall a polling loop or
//! an interrupt callback, so they are queued to a per-controller worker
//! thread. Jobs run in submission order.
//!
//! ```text
//!  polling loop ──┐
//!                 ├──▶ mpsc ──▶ worker thread ──▶ PersistencePort / RuleDispatch
//!  edge callback ─┘
//! ```

use std::sync::mpsc::{self, Sender};
use std::thread::JoinHandle;

use log::{error, warn};

use crate::error::{Error, Result};

type Job = Box<dyn FnOnce() + Send + 'static>;

enum Message {
    Run(Job),
    Stop,
}

/// Cloneable submit side of a [`JobQueue`].
#[derive(Clone)]
pub struct JobSender {
    tx: Sender<Message>,
}

impl JobSender {
    /// Queue `job`. Returns `false` if the worker has already shut down.
    pub fn submit(&self, job: impl FnOnce() + Send + 'static) -> bool {
        if self.tx.send(Message::Run(Box::new(job))).is_err() {
            warn!("Jobs: worker gone, job dropped");
            return false;
        }
        true
    }
}

/// A single background worker draining a job channel.
pub struct JobQueue {
    sender: JobSender,
    worker: Option<JoinHandle<()>>,
}

impl JobQueue {
    pub fn spawn(name: &str) -> Result<Self> {
        let (tx, rx) = mpsc::channel::<Message>();
        let worker = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                for msg in rx {
                    let Message::Run(job) = msg else { break };
                    // A panicking job must not take the worker down with it.
                    if std::panic::catch_unwind(std::panic::AssertUnwindSafe(job)).is_err() {
                        error!("Jobs: background job panicked");
                    }
                }
            })
            .map_err(|e| Error::driver(format!("spawning job worker: {e}")))?;
        Ok(Self {
            sender: JobSender { tx },
            worker: Some(worker),
        })
    }

    pub fn sender(&self) -> JobSender {
        self.sender.clone()
    }

    pub fn submit(&self, job: impl FnOnce() + Send + 'static) -> bool {
        self.sender.submit(job)
    }

    /// Run every job queued so far, then stop the worker. Jobs submitted
    /// afterwards through outstanding clones are dropped.
    pub fn shutdown(mut self) {
        self.close();
    }

    fn close(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = self.sender.tx.send(Message::Stop);
            if worker.join().is_err() {
                error!("Jobs: worker thread panicked");
            }
        }
    }
}

impl Drop for JobQueue {
    fn drop(&mut self) {
        self.close();
    }
}
