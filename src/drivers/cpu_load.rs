//! System load averages from `/proc/loadavg`.

use std::path::PathBuf;

use crate::app::ports::MeasurementSource;
use crate::error::{Error, Result};
use crate::reading::Reading;

pub const CHANNELS: [&str; 3] = ["cpu_load_1m", "cpu_load_5m", "cpu_load_15m"];

#[derive(Debug)]
pub struct CpuLoad {
    path: PathBuf,
}

impl Default for CpuLoad {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuLoad {
    pub fn new() -> Self {
        Self::with_path("/proc/loadavg")
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

/// Parse the first three fields of a loadavg line.
fn parse_loadavg(text: &str) -> Option<[f64; 3]> {
    let mut fields = text.split_whitespace().map(str::parse::<f64>);
    let one = fields.next()?.ok()?;
    let five = fields.next()?.ok()?;
    let fifteen = fields.next()?.ok()?;
    Some([one, five, fifteen])
}

impl MeasurementSource for CpuLoad {
    fn next(&mut self) -> Result<Reading> {
        let text = std::fs::read_to_string(&self.path)
            .map_err(|e| Error::driver(format!("reading {}: {e}", self.path.display())))?;
        let loads = parse_loadavg(&text).ok_or(Error::Exhausted)?;
        Ok(CHANNELS.into_iter().zip(loads).collect())
    }
}
