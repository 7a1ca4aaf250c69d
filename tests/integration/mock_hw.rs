//! Mock collaborators for integration tests.
//!
//! Every adapter records what it was asked to do so tests can assert on
//! the full call history without a time-series store, rule engine or
//! real GPIO/I2C.

use std::collections::{HashMap, VecDeque};
use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use embedded_hal::digital::{ErrorType, InputPin};
use inputd::adapters::time::ManualClock;
use inputd::app::ports::{
    ActuatorPort, BusPort, ChannelSelect, EdgeCallback, EdgeRule, GpioPort, MeasurementSource,
    PersistencePort, PinLevel, Ports, RuleDispatch, RuleStore,
};
use inputd::config::EdgeMode;
use inputd::edge::EdgeDirection;
use inputd::lock::{HeldLock, LocalLocks, LockBackend};
use inputd::{Error, Reading, Result};

// ── Persistence ───────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub device_id: String,
    pub channel: String,
    pub value: f64,
    /// Clock time when the write reached the store.
    pub at: f64,
}

pub struct RecordingStore {
    clock: Arc<ManualClock>,
    pub points: Mutex<Vec<Point>>,
    pub offline: AtomicBool,
}

#[allow(dead_code)]
impl RecordingStore {
    pub fn new(clock: Arc<ManualClock>) -> Self {
        Self {
            clock,
            points: Mutex::new(Vec::new()),
            offline: AtomicBool::new(false),
        }
    }

    pub fn points(&self) -> Vec<Point> {
        self.points.lock().unwrap().clone()
    }

    pub fn channel(&self, channel: &str) -> Vec<Point> {
        self.points().into_iter().filter(|p| p.channel == channel).collect()
    }
}

impl PersistencePort for RecordingStore {
    fn write(&self, device_id: &str, channel: &str, value: f64) -> Result<()> {
        use inputd::app::ports::Clock;
        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::PersistenceUnavailable("connection refused".into()));
        }
        self.points.lock().unwrap().push(Point {
            device_id: device_id.to_string(),
            channel: channel.to_string(),
            value,
            at: self.clock.now(),
        });
        Ok(())
    }
}

// ── Rules ─────────────────────────────────────────────────────

#[derive(Default)]
pub struct StaticRules {
    pub rules: HashMap<String, Vec<EdgeRule>>,
}

#[allow(dead_code)]
impl StaticRules {
    pub fn with(device_id: &str, rules: Vec<EdgeRule>) -> Self {
        let mut map = HashMap::new();
        map.insert(device_id.to_string(), rules);
        Self { rules: map }
    }
}

impl RuleStore for StaticRules {
    fn active_edge_rules(&self, device_id: &str) -> Result<Vec<EdgeRule>> {
        Ok(self.rules.get(device_id).cloned().unwrap_or_default())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Triggered {
    pub rule_id: String,
    pub message: String,
    pub direction: EdgeDirection,
}

#[derive(Default)]
pub struct RecordingDispatch {
    pub calls: Mutex<Vec<Triggered>>,
}

#[allow(dead_code)]
impl RecordingDispatch {
    pub fn calls(&self) -> Vec<Triggered> {
        self.calls.lock().unwrap().clone()
    }
}

impl RuleDispatch for RecordingDispatch {
    fn trigger(&self, rule_id: &str, message: &str, direction: EdgeDirection) {
        self.calls.lock().unwrap().push(Triggered {
            rule_id: rule_id.to_string(),
            message: message.to_string(),
            direction,
        });
    }
}

// ── Actuators ─────────────────────────────────────────────────

#[derive(Default)]
pub struct MockActuators {
    pub known: Vec<String>,
    pub activations: Mutex<Vec<(String, f64)>>,
}

#[allow(dead_code)]
impl MockActuators {
    pub fn with(known: &[&str]) -> Self {
        Self {
            known: known.iter().map(|s| s.to_string()).collect(),
            activations: Mutex::new(Vec::new()),
        }
    }

    pub fn activations(&self) -> Vec<(String, f64)> {
        self.activations.lock().unwrap().clone()
    }
}

impl ActuatorPort for MockActuators {
    fn exists(&self, output_id: &str) -> bool {
        self.known.iter().any(|k| k == output_id)
    }

    fn activate(&self, output_id: &str, duration_secs: f64) {
        self.activations
            .lock()
            .unwrap()
            .push((output_id.to_string(), duration_secs));
    }
}

// ── GPIO ──────────────────────────────────────────────────────

/// An `embedded_hal` input pin whose level the test controls.
#[derive(Clone, Default)]
pub struct MockPin {
    pub high: Arc<AtomicBool>,
}

impl ErrorType for MockPin {
    type Error = Infallible;
}

impl InputPin for MockPin {
    fn is_high(&mut self) -> core::result::Result<bool, Infallible> {
        Ok(self.high.load(Ordering::SeqCst))
    }

    fn is_low(&mut self) -> core::result::Result<bool, Infallible> {
        Ok(!self.high.load(Ordering::SeqCst))
    }
}

/// A pin whose every read fails.
struct FaultyPin;

impl PinLevel for FaultyPin {
    fn is_high(&mut self) -> Result<bool> {
        Err(Error::Gpio("read failed".into()))
    }
}

#[derive(Default)]
pub struct MockGpio {
    pub pin: MockPin,
    /// Hand out pins that cannot be read.
    pub faulty: AtomicBool,
    pub watched: Mutex<HashMap<u32, (EdgeMode, EdgeCallback)>>,
}

#[allow(dead_code)]
impl MockGpio {
    pub fn set_level(&self, high: bool) {
        self.pin.high.store(high, Ordering::SeqCst);
    }

    pub fn is_watched(&self, pin: u32) -> bool {
        self.watched.lock().unwrap().contains_key(&pin)
    }

    /// Simulate a hardware transition on `pin`. Returns `false` if nothing
    /// is registered for it.
    pub fn fire(&self, pin: u32) -> bool {
        let callback = self.watched.lock().unwrap().get(&pin).map(|(_, cb)| Arc::clone(cb));
        match callback {
            Some(cb) => {
                cb(pin);
                true
            }
            None => false,
        }
    }
}

impl GpioPort for MockGpio {
    fn input_pin(&self, _pin: u32) -> Result<Box<dyn PinLevel>> {
        if self.faulty.load(Ordering::SeqCst) {
            return Ok(Box::new(FaultyPin));
        }
        Ok(Box::new(self.pin.clone()))
    }

    fn watch_edges(&self, pin: u32, mode: EdgeMode, _bounce_ms: u32, callback: EdgeCallback) -> Result<()> {
        self.watched.lock().unwrap().insert(pin, (mode, callback));
        Ok(())
    }

    fn unwatch(&self, pin: u32) {
        self.watched.lock().unwrap().remove(&pin);
    }
}

// ── I2C multiplexer ───────────────────────────────────────────

#[derive(Default)]
pub struct MockBus {
    /// `(address, channel)` for every select issued.
    pub selects: Arc<Mutex<Vec<(u16, u8)>>>,
    /// Make every select fail (nothing is logged).
    pub fail_selects: Arc<AtomicBool>,
}

#[allow(dead_code)]
impl MockBus {
    pub fn selects(&self) -> Vec<(u16, u8)> {
        self.selects.lock().unwrap().clone()
    }
}

struct MockMux {
    address: u16,
    log: Arc<Mutex<Vec<(u16, u8)>>>,
    fail: Arc<AtomicBool>,
}

impl ChannelSelect for MockMux {
    fn select(&mut self, channel: u8) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::driver("mux NACK"));
        }
        self.log.lock().unwrap().push((self.address, channel));
        Ok(())
    }
}

impl BusPort for MockBus {
    fn multiplexer(&self, _bus: u8, address: u16) -> Result<Box<dyn ChannelSelect>> {
        Ok(Box::new(MockMux {
            address,
            log: Arc::clone(&self.selects),
            fail: Arc::clone(&self.fail_selects),
        }))
    }
}

// ── Locks ─────────────────────────────────────────────────────

/// Wraps [`LocalLocks`] and logs `acquire <key>` / `release <key>` in
/// the order they happen.
pub struct RecordingLocks {
    inner: LocalLocks,
    events: Arc<Mutex<Vec<String>>>,
}

impl LockBackend for RecordingLocks {
    fn try_lock(&self, key: &str) -> Result<Option<HeldLock>> {
        let Some(held) = self.inner.try_lock(key)? else {
            return Ok(None);
        };
        self.events.lock().unwrap().push(format!("acquire {key}"));
        let events = Arc::clone(&self.events);
        let released = key.to_string();
        Ok(Some(HeldLock::with_release(key, move || {
            drop(held);
            events.lock().unwrap().push(format!("release {released}"));
        })))
    }
}

// ── Measurement sources ───────────────────────────────────────

/// Replays scripted results, then repeats the last one.
pub struct ScriptedSource {
    script: VecDeque<Result<Reading>>,
    last: Result<Reading>,
    pub stopped: Arc<AtomicBool>,
}

#[allow(dead_code)]
impl ScriptedSource {
    pub fn new(script: Vec<Result<Reading>>) -> Self {
        Self {
            script: script.into(),
            last: Err(Error::Exhausted),
            stopped: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn always(reading: Reading) -> Self {
        Self::new(vec![Ok(reading)])
    }
}

impl MeasurementSource for ScriptedSource {
    fn next(&mut self) -> Result<Reading> {
        if let Some(r) = self.script.pop_front() {
            self.last = r;
        }
        self.last.clone()
    }

    fn stop(&mut self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

// ── Bundle ────────────────────────────────────────────────────

/// Typed handles on every mock behind a [`Ports`] bundle.
pub struct Harness {
    pub clock: Arc<ManualClock>,
    pub locks: LocalLocks,
    pub lock_events: Arc<Mutex<Vec<String>>>,
    pub store: Arc<RecordingStore>,
    pub rules: Arc<StaticRules>,
    pub dispatch: Arc<RecordingDispatch>,
    pub actuators: Arc<MockActuators>,
    pub gpio: Arc<MockGpio>,
    pub bus: Arc<MockBus>,
}

#[allow(dead_code)]
impl Harness {
    pub fn new(start: f64) -> Self {
        let clock = Arc::new(ManualClock::new(start));
        Self {
            store: Arc::new(RecordingStore::new(Arc::clone(&clock))),
            clock,
            locks: LocalLocks::new(),
            lock_events: Arc::new(Mutex::new(Vec::new())),
            rules: Arc::new(StaticRules::default()),
            dispatch: Arc::new(RecordingDispatch::default()),
            actuators: Arc::new(MockActuators::default()),
            gpio: Arc::new(MockGpio::default()),
            bus: Arc::new(MockBus::default()),
        }
    }

    /// Lock events taken by controllers built from [`ports`](Self::ports).
    pub fn lock_events(&self) -> Vec<String> {
        self.lock_events.lock().unwrap().clone()
    }

    pub fn with_rules(mut self, rules: StaticRules) -> Self {
        self.rules = Arc::new(rules);
        self
    }

    pub fn with_actuators(mut self, actuators: MockActuators) -> Self {
        self.actuators = Arc::new(actuators);
        self
    }

    pub fn ports(&self) -> Ports {
        Ports {
            clock: self.clock.clone(),
            locks: Arc::new(RecordingLocks {
                inner: self.locks.clone(),
                events: Arc::clone(&self.lock_events),
            }),
            persistence: self.store.clone(),
            rules: self.rules.clone(),
            dispatch: self.dispatch.clone(),
            actuators: self.actuators.clone(),
            gpio: self.gpio.clone(),
            bus: self.bus.clone(),
        }
    }
}
