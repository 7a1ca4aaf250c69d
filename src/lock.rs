//! Shared-resource lock protocol.
//!
//! Mutual exclusion over physically shared hardware (an I2C multiplexer,
//! an ADC chip) between controllers that may live in different threads or
//! different processes. There is no central lock manager: every call site
//! probes a named lock without blocking, retries a bounded number of times,
//! and gives up with [`Error::LockTimeout`] rather than hanging the loop.
//!
//! Two backends share the [`LockBackend`] contract:
//!
//! | Backend      | Scope                | Primitive                     |
//! |--------------|----------------------|-------------------------------|
//! | [`FileLocks`]  | cross-process        | `flock(LOCK_EX \| LOCK_NB)`   |
//! | [`LocalLocks`] | single process       | `Mutex<HashSet<key>>`         |
//!
//! Locks are keyed by resource identity, never by device identity, so two
//! devices behind the same multiplexer contend while devices on different
//! buses do not.

use std::collections::HashSet;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use log::{debug, error, warn};

use crate::config::LockPolicy;
use crate::error::{Error, Result};

// ───────────────────────────────────────────────────────────────
// Resource keys
// ───────────────────────────────────────────────────────────────

/// Lock key for an I2C multiplexer.
pub fn multiplexer_key(address: u16) -> String {
    format!("multiplexer_0x{address:02X}")
}

/// Lock key for an ADC chip; bus and address together identify it.
pub fn adc_key(bus: u8, address: u16) -> String {
    format!("adc_bus{bus}_0x{address:02X}")
}

// ───────────────────────────────────────────────────────────────
// Backend contract
// ───────────────────────────────────────────────────────────────

/// A held lock. Dropping it releases the underlying resource.
#[derive(Debug)]
pub struct HeldLock {
    key: String,
    inner: Held,
}

enum Held {
    /// The advisory lock is released when the descriptor closes.
    #[allow(dead_code)]
    File(File),
    Local(Arc<Mutex<HashSet<String>>>),
    /// Supplied by a backend outside this module; runs once on drop.
    Custom(Option<Box<dyn FnOnce() + Send + Sync>>),
}

impl fmt::Debug for Held {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(file) => f.debug_tuple("File").field(file).finish(),
            Self::Local(_) => f.write_str("Local"),
            Self::Custom(_) => f.write_str("Custom"),
        }
    }
}

impl HeldLock {
    /// A held lock for a custom backend; `release` runs when it is dropped.
    pub fn with_release(key: impl Into<String>, release: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            key: key.into(),
            inner: Held::Custom(Some(Box::new(release))),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for HeldLock {
    fn drop(&mut self) {
        match &mut self.inner {
            Held::Local(set) => {
                set.lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .remove(&self.key);
            }
            Held::Custom(release) => {
                if let Some(release) = release.take() {
                    release();
                }
            }
            Held::File(_) => {}
        }
    }
}

/// Named, non-blocking mutual exclusion.
pub trait LockBackend: Send + Sync {
    /// Probe once. `Ok(None)` means another holder owns the key.
    fn try_lock(&self, key: &str) -> Result<Option<HeldLock>>;
}

// ───────────────────────────────────────────────────────────────
// File-backed locks (cross-process)
// ───────────────────────────────────────────────────────────────

/// Advisory `flock` on `<dir>/inputd_<key>.lock`.
///
/// Each probe opens its own descriptor, so two threads of the same
/// process contend exactly like two processes do.
#[derive(Debug, Clone)]
pub struct FileLocks {
    dir: PathBuf,
}

impl FileLocks {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn lock_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("inputd_{key}.lock"))
    }
}

impl LockBackend for FileLocks {
    fn try_lock(&self, key: &str) -> Result<Option<HeldLock>> {
        if key.is_empty() || key.contains(['/', '\\']) {
            return Err(Error::config(format!("invalid lock key '{key}'")));
        }
        fs::create_dir_all(&self.dir).map_err(|e| {
            Error::driver(format!("creating lock dir {}: {e}", self.dir.display()))
        })?;
        let path = self.lock_path(key);
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| Error::driver(format!("opening lock file {}: {e}", path.display())))?;

        match try_flock_exclusive(&file) {
            Ok(true) => Ok(Some(HeldLock {
                key: key.to_string(),
                inner: Held::File(file),
            })),
            Ok(false) => Ok(None),
            Err(e) => Err(Error::driver(format!("flock {}: {e}", path.display()))),
        }
    }
}

/// Try to take an exclusive flock without blocking.
///
/// Returns `Ok(false)` if another descriptor already holds it.
fn try_flock_exclusive(file: &File) -> io::Result<bool> {
    #[cfg(unix)]
    {
        use std::os::unix::io::AsRawFd;
        let fd = file.as_raw_fd();
        // SAFETY: `fd` is a valid descriptor owned by `file` for the whole
        // call; LOCK_EX | LOCK_NB never blocks.
        #[allow(unsafe_code)]
        let result = unsafe { libc::flock(fd, libc::LOCK_EX | libc::LOCK_NB) };
        if result == 0 {
            return Ok(true);
        }
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::WouldBlock || err.raw_os_error() == Some(libc::EWOULDBLOCK)
        {
            return Ok(false);
        }
        Err(err)
    }
    #[cfg(not(unix))]
    {
        let _ = file;
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "flock is not available on this platform",
        ))
    }
}

// ───────────────────────────────────────────────────────────────
// In-process locks
// ───────────────────────────────────────────────────────────────

/// Single-process deployment: a shared set of held keys.
#[derive(Debug, Clone, Default)]
pub struct LocalLocks {
    held: Arc<Mutex<HashSet<String>>>,
}

impl LocalLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_held(&self, key: &str) -> bool {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(key)
    }
}

impl LockBackend for LocalLocks {
    fn try_lock(&self, key: &str) -> Result<Option<HeldLock>> {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        if !held.insert(key.to_string()) {
            return Ok(None);
        }
        Ok(Some(HeldLock {
            key: key.to_string(),
            inner: Held::Local(Arc::clone(&self.held)),
        }))
    }
}

// ───────────────────────────────────────────────────────────────
// Call-site lock with bounded retry
// ───────────────────────────────────────────────────────────────

/// A lock bound to one call site and one resource key.
///
/// Remembers whether *this* site acquired it, so [`release`](Self::release)
/// on an unheld lock is a no-op.
pub struct ResourceLock {
    key: String,
    backend: Arc<dyn LockBackend>,
    policy: LockPolicy,
    held: Option<HeldLock>,
}

impl ResourceLock {
    pub fn new(key: impl Into<String>, backend: Arc<dyn LockBackend>, policy: LockPolicy) -> Self {
        Self {
            key: key.into(),
            backend,
            policy,
            held: None,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn is_held(&self) -> bool {
        self.held.is_some()
    }

    /// Probe up to `max_attempts` times, sleeping `retry_interval` between
    /// attempts. Returns whether the lock is now held by this site.
    pub fn acquire(&mut self) -> bool {
        if self.held.is_some() {
            return true;
        }
        let attempts = self.policy.max_attempts;
        for attempt in 1..=attempts {
            match self.backend.try_lock(&self.key) {
                Ok(Some(guard)) => {
                    debug!("Lock: acquired '{}' (attempt {})", self.key, attempt);
                    self.held = Some(guard);
                    return true;
                }
                Ok(None) => {}
                Err(e) => warn!("Lock: probe of '{}' failed: {}", self.key, e),
            }
            if attempt < attempts {
                std::thread::sleep(self.policy.retry_interval());
            }
        }
        error!("Lock: unable to acquire '{}' after {} attempts", self.key, attempts);
        false
    }

    /// Like [`acquire`](Self::acquire), but failure is an [`Error::LockTimeout`].
    pub fn acquire_or_timeout(&mut self) -> Result<()> {
        if self.acquire() {
            Ok(())
        } else {
            Err(Error::LockTimeout {
                key: self.key.clone(),
                attempts: self.policy.max_attempts,
            })
        }
    }

    /// Release if held by this site; otherwise do nothing.
    pub fn release(&mut self) {
        if self.held.take().is_some() {
            debug!("Lock: released '{}'", self.key);
        }
    }
}

impl Drop for ResourceLock {
    fn drop(&mut self) {
        self.release();
    }
}

// ═══════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════
