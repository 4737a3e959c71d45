//! # Fixed-Rate Driver
//!
//! Invokes registered tick callbacks at a configured frequency (default
//! 20 Hz) with a sleep-for-remainder strategy. A tick that overruns its
//! interval is recorded as such and the loop proceeds immediately — there is
//! deliberately **no debt accumulation**: the loop never runs back-to-back
//! ticks to "catch up", which would cascade overload under load.
//!
//! The loop either blocks the caller ([`GameLoop::run`]) or runs on a
//! background thread ([`GameLoop::start`]). [`GameLoop::stop`] is idempotent,
//! safe from any thread, and returns after the in-flight tick completes.
//! A stopped loop cannot be restarted; create a fresh instance.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::json;
use thiserror::Error;

use crate::telemetry::Telemetry;
use crate::DEFAULT_TICK_RATE_HZ;

/// Signature for tick callbacks: receives the zero-indexed sequential tick.
pub type TickCallback = Box<dyn FnMut(u64) + Send>;

/// Errors from driver lifecycle misuse.
#[derive(Error, Debug)]
pub enum LoopError {
    /// `run`/`start` called while the loop is running.
    #[error("game loop is already running")]
    AlreadyRunning,

    /// `run`/`start` called on a loop that has already been stopped.
    #[error("a stopped game loop cannot be restarted; create a fresh instance")]
    Restarted,

    /// `on_tick` called after the loop started.
    #[error("callbacks must be registered before the loop starts")]
    RegisterAfterStart,

    /// The background thread could not be spawned.
    #[error("failed to spawn game loop thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Configuration for the driver.
#[derive(Clone, Copy, Debug)]
pub struct GameLoopConfig {
    /// Tick rate in Hz. The default of 20 Hz gives 50 ms ticks.
    pub tick_rate_hz: f64,
}

impl Default for GameLoopConfig {
    fn default() -> Self {
        Self { tick_rate_hz: DEFAULT_TICK_RATE_HZ }
    }
}

/// Cloneable handle that requests the loop to stop.
///
/// Safe to use from inside a tick callback (it only flips a flag), which is
/// how the server's shutdown signal reaches the loop.
#[derive(Clone, Debug)]
pub struct LoopHandle {
    stop_requested: Arc<AtomicBool>,
}

impl LoopHandle {
    /// Requests the loop to stop at the top of its next iteration.
    pub fn stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
    }
}

/// The fixed-rate driver.
pub struct GameLoop {
    interval: Duration,
    callbacks: Vec<TickCallback>,
    stop_requested: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    consumed: bool,
    tick_count: Arc<AtomicU64>,
    thread: Mutex<Option<JoinHandle<()>>>,
    telemetry: Telemetry,
}

impl GameLoop {
    /// Creates a driver with the given configuration.
    #[must_use]
    pub fn new(config: GameLoopConfig, telemetry: Telemetry) -> Self {
        Self {
            interval: Duration::from_secs_f64(1.0 / config.tick_rate_hz),
            callbacks: Vec::new(),
            stop_requested: Arc::new(AtomicBool::new(false)),
            running: Arc::new(AtomicBool::new(false)),
            consumed: false,
            tick_count: Arc::new(AtomicU64::new(0)),
            thread: Mutex::new(None),
            telemetry,
        }
    }

    /// Registers a callback, invoked each tick in registration order.
    ///
    /// Must be called before [`run`](Self::run) or [`start`](Self::start).
    pub fn on_tick<F>(&mut self, callback: F) -> Result<(), LoopError>
    where
        F: FnMut(u64) + Send + 'static,
    {
        if self.consumed || self.running.load(Ordering::SeqCst) {
            return Err(LoopError::RegisterAfterStart);
        }
        self.callbacks.push(Box::new(callback));
        Ok(())
    }

    /// A handle callbacks can capture to request shutdown.
    #[must_use]
    pub fn handle(&self) -> LoopHandle {
        LoopHandle { stop_requested: Arc::clone(&self.stop_requested) }
    }

    /// Runs the loop on the calling thread, blocking until stopped.
    pub fn run(&mut self) -> Result<(), LoopError> {
        self.arm()?;
        let mut callbacks = std::mem::take(&mut self.callbacks);
        loop_body(
            &mut callbacks,
            self.interval,
            &self.stop_requested,
            &self.running,
            &self.tick_count,
            &self.telemetry,
        );
        Ok(())
    }

    /// Runs the loop on a background thread and returns immediately.
    pub fn start(&mut self) -> Result<(), LoopError> {
        self.arm()?;
        let mut callbacks = std::mem::take(&mut self.callbacks);
        let interval = self.interval;
        let stop_requested = Arc::clone(&self.stop_requested);
        let running = Arc::clone(&self.running);
        let tick_count = Arc::clone(&self.tick_count);
        let telemetry = self.telemetry.clone();

        let handle = thread::Builder::new().name("ashveil-game-loop".into()).spawn(move || {
            loop_body(&mut callbacks, interval, &stop_requested, &running, &tick_count, &telemetry);
        })?;
        *self.thread.lock() = Some(handle);
        Ok(())
    }

    /// Requests the loop to stop and joins the background thread, if any.
    ///
    /// Idempotent and safe from any thread *except* the loop thread itself;
    /// from inside a callback use a [`LoopHandle`] instead.
    pub fn stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
        if let Some(handle) = self.thread.lock().take() {
            let _ = handle.join();
        }
    }

    /// Whether the loop is currently executing ticks.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Number of ticks executed so far.
    #[must_use]
    pub fn tick_count(&self) -> u64 {
        self.tick_count.load(Ordering::SeqCst)
    }

    /// The configured tick interval.
    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        self.interval
    }

    fn arm(&mut self) -> Result<(), LoopError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(LoopError::AlreadyRunning);
        }
        if self.consumed || self.stop_requested.load(Ordering::SeqCst) {
            return Err(LoopError::Restarted);
        }
        self.consumed = true;
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }
}

impl Drop for GameLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

fn loop_body(
    callbacks: &mut [TickCallback],
    interval: Duration,
    stop_requested: &AtomicBool,
    running: &AtomicBool,
    tick_count: &AtomicU64,
    telemetry: &Telemetry,
) {
    while !stop_requested.load(Ordering::SeqCst) {
        let started = Instant::now();
        let tick = tick_count.load(Ordering::SeqCst);

        for callback in callbacks.iter_mut() {
            callback(tick);
        }
        tick_count.store(tick + 1, Ordering::SeqCst);

        let elapsed = started.elapsed();
        let overrun = elapsed >= interval;
        telemetry.metric(
            "game_loop",
            "Tick completed",
            json!({
                "tick": tick,
                "duration_ms": elapsed.as_secs_f64() * 1000.0,
                "overrun": overrun,
            }),
        );

        if !overrun {
            thread::sleep(interval - elapsed);
        }
    }

    running.store(false, Ordering::SeqCst);
    telemetry.event(
        "game_loop",
        "Loop stopped",
        json!({ "total_ticks": tick_count.load(Ordering::SeqCst) }),
    );
}
