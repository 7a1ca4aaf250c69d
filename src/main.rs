//! inputd: input controller daemon.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    Adapters (outer ring)                     │
//! │                                                              │
//! │  SystemClock     FileLocks       LogPersistence              │
//! │  (Clock)         (LockBackend)   (PersistencePort)           │
//! │  JsonRuleStore   LogRuleDispatch LogActuators   NullGpio/Bus │
//! │  (RuleStore)     (RuleDispatch)  (ActuatorPort) (GPIO, I2C)  │
//! │                                                              │
//! │  ─────────────────── Port Trait Boundary ──────────────      │
//! │                                                              │
//! │   InputController × N  (one thread per configured device)    │
//! └──────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info, warn};

use inputd::adapters::log_sink::{LogActuators, LogPersistence, LogRuleDispatch};
use inputd::adapters::null_hw::{NullBus, NullGpio};
use inputd::adapters::rules_file::JsonRuleStore;
use inputd::adapters::time::SystemClock;
use inputd::app::ports::{Ports, RuleStore};
use inputd::app::{ControllerHandle, ControllerSettings, InputController};
use inputd::config::DaemonConfig;
use inputd::drivers::registry::DriverRegistry;
use inputd::lock::FileLocks;

#[derive(Parser)]
#[command(name = "inputd")]
#[command(about = "Periodic and edge-triggered input acquisition daemon")]
struct Cli {
    /// Daemon configuration (JSON)
    config: PathBuf,

    /// Override the directory holding inter-process lock files
    #[arg(long)]
    lock_dir: Option<PathBuf>,

    /// Rule definitions (JSON); overrides `rules_path` from the config
    #[arg(long)]
    rules: Option<PathBuf>,
}

/// How often the main thread checks that some controller is still alive.
const LIVENESS_POLL: Duration = Duration::from_secs(1);

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    // Before any other thread exists, so all of them inherit the mask.
    let signals = termination_signals()?;

    let mut config = DaemonConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if let Some(dir) = cli.lock_dir {
        config.lock_dir = dir;
    }
    if let Some(rules) = cli.rules {
        config.rules_path = Some(rules);
    }

    let rules: Arc<dyn RuleStore> = match &config.rules_path {
        Some(path) => Arc::new(
            JsonRuleStore::load(path).with_context(|| format!("loading rules {}", path.display()))?,
        ),
        None => Arc::new(JsonRuleStore::default()),
    };

    let ports = Ports {
        clock: Arc::new(SystemClock::new()),
        locks: Arc::new(FileLocks::new(&config.lock_dir)),
        persistence: Arc::new(LogPersistence),
        rules,
        dispatch: Arc::new(LogRuleDispatch),
        actuators: Arc::new(LogActuators::new(config.outputs.iter().cloned())),
        gpio: Arc::new(NullGpio),
        bus: Arc::new(NullBus),
    };
    let registry = DriverRegistry::with_builtin();
    let settings = ControllerSettings::from(&config);

    info!(
        "inputd v{}: {} device(s), locks in {}",
        env!("CARGO_PKG_VERSION"),
        config.devices.len(),
        config.lock_dir.display()
    );

    let mut handles: Vec<ControllerHandle> = Vec::new();
    for device in &config.devices {
        let id = device.id.clone();
        // A bad device is fatal for that controller only.
        match InputController::new(device.clone(), &registry, ports.clone(), settings)
            .and_then(InputController::start)
        {
            Ok(handle) => handles.push(handle),
            Err(e) => error!("Input {}: not started: {}", id, e),
        }
    }

    if handles.is_empty() {
        warn!("No controllers running, exiting");
        return Ok(());
    }

    wait_for_shutdown(&handles, &signals);
    for handle in &handles {
        handle.stop();
    }
    for handle in handles {
        handle.join();
    }
    info!("All controllers stopped");
    Ok(())
}

#[cfg(unix)]
fn termination_signals() -> Result<Receiver<i32>> {
    use inputd::signals::TerminationSignals;
    let rx = TerminationSignals::block()
        .and_then(TerminationSignals::forward)
        .context("installing SIGINT/SIGTERM handling")?;
    Ok(rx)
}

#[cfg(not(unix))]
fn termination_signals() -> Result<Receiver<i32>> {
    // Never fires; the sender is dropped at once.
    let (_tx, rx) = std::sync::mpsc::channel();
    Ok(rx)
}

/// Block until a termination signal arrives or every controller has exited.
fn wait_for_shutdown(handles: &[ControllerHandle], signals: &Receiver<i32>) {
    let mut signals_open = true;
    loop {
        if signals_open {
            match signals.recv_timeout(LIVENESS_POLL) {
                Ok(signal) => {
                    info!("Received {}, stopping {} controller(s)", signal_name(signal), handles.len());
                    return;
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => signals_open = false,
            }
        } else {
            thread::sleep(LIVENESS_POLL);
        }
        if handles.iter().all(|h| !h.is_running()) {
            warn!("Every controller has exited");
            return;
        }
    }
}

#[cfg(unix)]
fn signal_name(signal: i32) -> &'static str {
    inputd::signals::signal_name(signal)
}

#[cfg(not(unix))]
fn signal_name(_signal: i32) -> &'static str {
    "signal"
}
