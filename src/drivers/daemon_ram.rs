//! Peak resident memory of the daemon process, in megabytes.

use crate::app::ports::MeasurementSource;
use crate::error::{Error, Result};
use crate::reading::Reading;

pub const CHANNEL: &str = "ram_use";

#[derive(Debug, Default)]
pub struct DaemonRam {
    last_mb: Option<f64>,
}

impl DaemonRam {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_mb(&self) -> Option<f64> {
        self.last_mb
    }

    #[cfg(unix)]
    fn max_rss_kb() -> Option<i64> {
        let mut usage = std::mem::MaybeUninit::<libc::rusage>::zeroed();
        // SAFETY: `usage` points to writable memory sized for `rusage`.
        #[allow(unsafe_code)]
        let rc = unsafe { libc::getrusage(libc::RUSAGE_SELF, usage.as_mut_ptr()) };
        if rc != 0 {
            return None;
        }
        // SAFETY: getrusage returned 0, so the struct is initialised.
        #[allow(unsafe_code)]
        let usage = unsafe { usage.assume_init() };
        Some(i64::from(usage.ru_maxrss))
    }

    #[cfg(not(unix))]
    fn max_rss_kb() -> Option<i64> {
        None
    }
}

impl MeasurementSource for DaemonRam {
    fn next(&mut self) -> Result<Reading> {
        let kb = Self::max_rss_kb().ok_or(Error::Exhausted)?;
        let mb = (kb as f64 / 1000.0 * 100.0).round() / 100.0;
        self.last_mb = Some(mb);
        Ok(Reading::single(CHANNEL, mb))
    }
}
