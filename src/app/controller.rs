//! Per-device input controller: the scheduling core.
//!
//! [`InputController`] owns one device's driver, its schedule and its
//! share of the lock protocol. It is driven either step by step through
//! [`tick`](InputController::tick) (deterministic, used by tests) or on its
//! own thread through [`start`](InputController::start).
//!
//! ```text
//!                 ┌──────────────────────────────────────┐
//!  Clock ───────▶ │            InputController           │ ──▶ JobQueue ──▶ PersistencePort
//!                 │  CycleSequencer · FailureCounter     │
//!  ActuatorPort ◀─│  mux lock ⊃ adc lock ⊃ source.next() │
//!                 └──────────────────────────────────────┘
//!                        ▲ EDGE devices: GpioPort callback ─▶ EdgeHandler
//! ```

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};

use crate::config::{DaemonConfig, DeviceConfig, LockPolicy};
use crate::dispatch::{JobQueue, JobSender};
use crate::drivers::registry::{DriverEntry, DriverRegistry, VOLTAGE_CHANNEL};
use crate::edge::{log_persistence_error, EdgeHandler, EdgeInput, EdgeWiring};
use crate::error::{Error, Result};
use crate::lock::{adc_key, multiplexer_key, ResourceLock};
use crate::reading::Reading;
use crate::scaling::AdcScale;
use crate::scheduler::{CycleSequencer, Phase, PreActuation, ScheduleState, Step};

use super::failure::FailureCounter;
use super::handle::{ControlState, ControllerHandle, LastReading};
use super::ports::{ActuatorPort, ChannelSelect, Clock, GpioPort, MeasurementSource, PersistencePort, Ports};

// ───────────────────────────────────────────────────────────────
// Settings and outcomes
// ───────────────────────────────────────────────────────────────

/// Daemon-wide knobs every controller shares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerSettings {
    /// Sleep between loop iterations.
    pub tick_interval: Duration,
    pub lock_policy: LockPolicy,
    /// Consecutive "no data" results before one is reported.
    pub failure_threshold: u32,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self::from(&DaemonConfig::default())
    }
}

impl From<&DaemonConfig> for ControllerSettings {
    fn from(cfg: &DaemonConfig) -> Self {
        Self {
            tick_interval: cfg.tick_interval(),
            lock_policy: cfg.lock_policy,
            failure_threshold: cfg.failure_report_threshold,
        }
    }
}

/// Result of one cooperative loop iteration.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Nothing due.
    Idle,
    /// A cycle is open and waiting on its pre-actuation window.
    Waiting,
    /// A sample was taken and queued for persistence.
    Sampled(Reading),
    /// The cycle ended without a reading.
    Failed(Error),
}

// ───────────────────────────────────────────────────────────────
// Sampling back-ends
// ───────────────────────────────────────────────────────────────

struct AdcSampler {
    source: Box<dyn MeasurementSource>,
    scale: AdcScale,
    measurement: String,
    /// Absent when the chip has no bus address to key on.
    lock: Option<ResourceLock>,
}

impl AdcSampler {
    /// One raw-voltage transaction under the ADC lock, then scaling.
    fn sample(&mut self) -> Result<Reading> {
        if let Some(lock) = &mut self.lock {
            lock.acquire_or_timeout()?;
        }
        let raw = self.source.next();
        if let Some(lock) = &mut self.lock {
            lock.release();
        }
        let volts = raw?
            .get(VOLTAGE_CHANNEL)
            .ok_or_else(|| Error::driver("ADC source returned no voltage channel"))?;
        if !volts.is_finite() {
            return Err(Error::driver(format!("ADC returned a non-finite voltage ({volts})")));
        }
        let value = self.scale.apply(volts);
        debug!("ADC: {:.4} V -> {} = {:.4}", volts, self.measurement, value);
        Ok(Reading::single(self.measurement.as_str(), value))
    }
}

enum Sampler {
    Polled(Box<dyn MeasurementSource>),
    Adc(AdcSampler),
    /// Interrupt-driven; the polling loop only keeps the thread alive.
    Edge { pin: u32 },
}

impl Sampler {
    fn sample(&mut self) -> Result<Reading> {
        match self {
            Self::Polled(source) => source.next(),
            Self::Adc(adc) => adc.sample(),
            Self::Edge { .. } => Err(Error::Exhausted),
        }
    }

    fn stop(&mut self) {
        match self {
            Self::Polled(source) => source.stop(),
            Self::Adc(adc) => adc.source.stop(),
            Self::Edge { .. } => {}
        }
    }
}

struct Multiplexer {
    select: Box<dyn ChannelSelect>,
    channel: u8,
    lock: ResourceLock,
}

impl Multiplexer {
    /// Lock and select the channel while the driver is built. Neither step
    /// is fatal: every cycle locks and selects again before reading.
    fn claim_for_setup(&mut self, device_id: &str) {
        if let Err(e) = self.lock.acquire_or_timeout() {
            error!("Input {}: building driver without the multiplexer: {}", device_id, e);
            return;
        }
        if let Err(e) = self.select.select(self.channel) {
            warn!(
                "Input {}: could not select multiplexer channel {}: {}",
                device_id, self.channel, e
            );
        }
    }
}

// ───────────────────────────────────────────────────────────────
// InputController
// ───────────────────────────────────────────────────────────────

pub struct InputController {
    config: DeviceConfig,
    settings: ControllerSettings,
    sampler: Sampler,
    mux: Option<Multiplexer>,
    sequencer: CycleSequencer,
    failures: FailureCounter,
    last: LastReading,
    clock: Arc<dyn Clock>,
    persistence: Arc<dyn PersistencePort>,
    actuators: Arc<dyn ActuatorPort>,
    gpio: Arc<dyn GpioPort>,
    jobs: Option<JobQueue>,
    job_tx: JobSender,
    created: Instant,
    torn_down: bool,
}

impl InputController {
    /// Resolve the driver for `config.device` and prepare the schedule.
    ///
    /// Fails with [`Error::UnrecognizedDevice`] for unknown type tags and
    /// [`Error::Config`] for invalid configuration. For devices behind a
    /// multiplexer the multiplexer lock is held while the driver is built
    /// when it can be had; a busy multiplexer only delays the first cycle.
    pub fn new(
        config: DeviceConfig,
        registry: &DriverRegistry,
        ports: Ports,
        settings: ControllerSettings,
    ) -> Result<Self> {
        let created = Instant::now();
        config.validate()?;
        let entry = registry.lookup(&config.device)?;

        let jobs = JobQueue::spawn(&format!("jobs-{}", config.id))?;
        let job_tx = jobs.sender();

        let mut mux = match &config.multiplexer {
            Some(m) => {
                let mut lock = ResourceLock::new(
                    multiplexer_key(m.address),
                    Arc::clone(&ports.locks),
                    settings.lock_policy,
                );
                let select = ports.bus.multiplexer(m.bus, m.address)?;
                let mut mux = Multiplexer {
                    select,
                    channel: m.channel,
                    lock,
                };
                mux.claim_for_setup(&config.id);
                Some(mux)
            }
            None => None,
        };

        let sampler = Self::build_sampler(&config, entry, &ports, &settings, &job_tx);
        if let Some(m) = &mut mux {
            m.lock.release();
        }
        let sampler = sampler?;

        let start = ports.clock.now();
        let pre = Self::pre_actuation(&config, ports.actuators.as_ref());
        let sequencer = CycleSequencer::new(ScheduleState::new(start, config.period_secs), pre);

        debug!("Input {}: constructed ({})", config.id, config.device);
        Ok(Self {
            failures: FailureCounter::new(settings.failure_threshold),
            config,
            settings,
            sampler,
            mux,
            sequencer,
            last: Arc::new(Mutex::new(None)),
            clock: ports.clock,
            persistence: ports.persistence,
            actuators: ports.actuators,
            gpio: ports.gpio,
            jobs: Some(jobs),
            job_tx,
            created,
            torn_down: false,
        })
    }

    fn build_sampler(
        config: &DeviceConfig,
        entry: &DriverEntry,
        ports: &Ports,
        settings: &ControllerSettings,
        jobs: &JobSender,
    ) -> Result<Sampler> {
        match entry {
            DriverEntry::Polled(ctor) => Ok(Sampler::Polled(ctor(config)?)),
            DriverEntry::Adc(ctor) => {
                let adc = config.adc.as_ref().ok_or_else(|| {
                    Error::config(format!("{}: ADC device without an adc block", config.id))
                })?;
                let lock = config.i2c_address.map(|address| {
                    ResourceLock::new(
                        adc_key(config.i2c_bus, address),
                        Arc::clone(&ports.locks),
                        settings.lock_policy,
                    )
                });
                Ok(Sampler::Adc(AdcSampler {
                    source: ctor(config)?,
                    scale: AdcScale::from_config(adc),
                    measurement: adc.measurement.clone(),
                    lock,
                }))
            }
            DriverEntry::Edge => {
                let edge = config.edge.as_ref().ok_or_else(|| {
                    Error::config(format!("{}: edge device without an edge block", config.id))
                })?;
                let level = ports.gpio.input_pin(edge.pin)?;
                let handler = Arc::new(EdgeHandler::new(
                    EdgeInput {
                        device_id: config.id.clone(),
                        device_name: config.name.clone(),
                        pin: edge.pin,
                    },
                    edge,
                    level,
                    EdgeWiring {
                        clock: Arc::clone(&ports.clock),
                        persistence: Arc::clone(&ports.persistence),
                        rules: Arc::clone(&ports.rules),
                        dispatch: Arc::clone(&ports.dispatch),
                        jobs: jobs.clone(),
                    },
                ));
                ports.gpio.watch_edges(
                    edge.pin,
                    edge.mode,
                    edge.bounce_ms,
                    Arc::new(move |pin: u32| {
                        handler.on_interrupt(pin);
                    }),
                )?;
                Ok(Sampler::Edge { pin: edge.pin })
            }
        }
    }

    /// Pre-actuation is used only with a positive duration and a known output.
    fn pre_actuation(config: &DeviceConfig, actuators: &dyn ActuatorPort) -> Option<PreActuation> {
        let pre = config.pre_output.as_ref()?;
        if pre.duration_secs <= 0.0 {
            return None;
        }
        if !actuators.exists(&pre.output_id) {
            warn!(
                "Input {}: pre-output '{}' does not exist, sampling without it",
                config.id, pre.output_id
            );
            return None;
        }
        Some(PreActuation {
            output_id: pre.output_id.clone(),
            duration_secs: pre.duration_secs,
        })
    }

    // ── Introspection ─────────────────────────────────────────

    pub fn device_id(&self) -> &str {
        &self.config.id
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn phase(&self) -> Phase {
        self.sequencer.phase()
    }

    pub fn next_due(&self) -> f64 {
        self.sequencer.schedule().next_due()
    }

    pub fn pre_actuation_target(&self) -> Option<&PreActuation> {
        self.sequencer.pre_actuation()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.failures.count()
    }

    pub fn last_reading(&self) -> Option<(f64, Reading)> {
        self.last.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    // ── Per-tick orchestration ────────────────────────────────

    /// Run one cooperative iteration at time `now`.
    pub fn tick(&mut self, now: f64) -> TickOutcome {
        if matches!(self.sampler, Sampler::Edge { .. }) {
            return TickOutcome::Idle;
        }
        match self.sequencer.advance(now) {
            Step::Idle => TickOutcome::Idle,
            Step::Engage(pre) => {
                self.engage(pre);
                TickOutcome::Waiting
            }
            Step::Wait { .. } => TickOutcome::Waiting,
            Step::Read => {
                let outcome = self.sample(now);
                self.sequencer.finish_cycle();
                outcome
            }
        }
    }

    /// Fire-and-forget: the actuator runs on its own detached thread.
    fn engage(&self, pre: PreActuation) {
        info!(
            "Input {}: pre-output '{}' on for {:.1} s",
            self.config.id, pre.output_id, pre.duration_secs
        );
        let actuators = Arc::clone(&self.actuators);
        let spawned = thread::Builder::new()
            .name(format!("preout-{}", pre.output_id))
            .spawn(move || actuators.activate(&pre.output_id, pre.duration_secs));
        if let Err(e) = spawned {
            error!("Input {}: could not start pre-output: {}", self.config.id, e);
        }
    }

    fn sample(&mut self, now: f64) -> TickOutcome {
        match self.read_locked() {
            Ok(reading) => {
                self.failures.reset();
                debug!("Input {}: {:?}", self.config.id, reading);
                self.persist(&reading);
                *self.last.lock().unwrap_or_else(PoisonError::into_inner) = Some((now, reading.clone()));
                TickOutcome::Sampled(reading)
            }
            Err(e) => {
                self.report_failure(&e);
                TickOutcome::Failed(e)
            }
        }
    }

    /// Multiplexer lock brackets channel select plus the read; any ADC
    /// lock nests inside it.
    fn read_locked(&mut self) -> Result<Reading> {
        let Some(mux) = &mut self.mux else {
            return self.sampler.sample();
        };
        mux.lock.acquire_or_timeout()?;
        let result = mux
            .select
            .select(mux.channel)
            .and_then(|()| self.sampler.sample());
        mux.lock.release();
        result
    }

    fn persist(&self, reading: &Reading) {
        let persistence = Arc::clone(&self.persistence);
        let device_id = self.config.id.clone();
        let reading = reading.clone();
        self.job_tx.submit(move || {
            if let Err(e) = persistence.write_reading(&device_id, &reading) {
                log_persistence_error(&device_id, &e);
            }
        });
    }

    fn report_failure(&mut self, e: &Error) {
        match e {
            Error::Exhausted => {
                if self.failures.record() {
                    error!(
                        "Input {}: no data returned in {} consecutive reads",
                        self.config.id,
                        self.failures.threshold()
                    );
                } else {
                    debug!("Input {}: no data this cycle", self.config.id);
                }
            }
            Error::LockTimeout { .. } => {
                warn!("Input {}: cycle skipped: {}", self.config.id, e);
            }
            _ => error!("Input {}: read failed: {}", self.config.id, e),
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Move the controller onto its own thread and return its handle.
    pub fn start(self) -> Result<ControllerHandle> {
        let device_id = self.config.id.clone();
        let last = Arc::clone(&self.last);
        let state = Arc::new(ControlState::new_running());
        let loop_state = Arc::clone(&state);
        let worker = thread::Builder::new()
            .name(format!("input-{device_id}"))
            .spawn(move || self.run(&loop_state))
            .map_err(|e| Error::driver(format!("spawning controller thread: {e}")))?;
        Ok(ControllerHandle::new(device_id, state, last, worker))
    }

    fn run(mut self, state: &ControlState) {
        info!(
            "Input {}: activated in {:.1} ms",
            self.config.id,
            self.created.elapsed().as_secs_f64() * 1000.0
        );
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.run_loop(state)));
        if outcome.is_err() {
            error!("Input {}: loop panicked, shutting down", self.config.id);
        }
        let stopping = Instant::now();
        self.teardown();
        state.mark_stopped();
        info!(
            "Input {}: deactivated in {:.1} ms",
            self.config.id,
            stopping.elapsed().as_secs_f64() * 1000.0
        );
    }

    fn run_loop(&mut self, state: &ControlState) {
        let interval = self.settings.tick_interval;
        while state.checkpoint(&self.config.id) {
            let now = self.clock.now();
            self.tick(now);
            if !state.idle(interval) {
                break;
            }
        }
    }

    /// Stop the driver, deregister interrupts and drain queued jobs.
    pub fn shutdown(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        if let Sampler::Edge { pin } = self.sampler {
            self.gpio.unwatch(pin);
        }
        self.sampler.stop();
        if let Some(jobs) = self.jobs.take() {
            jobs.shutdown();
        }
    }
}

impl Drop for InputController {
    fn drop(&mut self) {
        self.teardown();
    }
}
