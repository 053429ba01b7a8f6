//! Two-state run control.
//!
//! While `Running`, a background thread fires the hardware trigger and
//! then waits either one period of the fixed rate or, in auto mode,
//! until the store has grown by one frame. `stop` returns the loop to
//! `Idle` and joins the thread.

use crate::source::{FrameSource, MockDetector, RawFrame};
use crate::store::SampleStore;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Granularity of stop checks while waiting.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How long auto mode waits for a frame before re-triggering.
const AUTO_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors raised by a trigger target.
#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("trigger target disconnected")]
    Disconnected,
    #[error("trigger failed: {0}")]
    Failed(String),
}

/// Errors raised by run control.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("run already in progress")]
    AlreadyRunning,
    #[error("run thread panicked")]
    ThreadPanicked,
}

/// Run state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
}

/// Trigger pacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunRate {
    /// Fixed rate in Hz.
    Hz(u32),
    /// Trigger again as soon as the previous frame has been stored.
    Auto,
}

impl RunRate {
    /// Maps a rate in Hz to a run rate; 0 selects auto.
    pub fn from_hz(hz: u32) -> Self {
        match hz {
            0 => RunRate::Auto,
            hz => RunRate::Hz(hz),
        }
    }
}

impl std::fmt::Display for RunRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunRate::Hz(hz) => write!(f, "{} Hz", hz),
            RunRate::Auto => write!(f, "Auto"),
        }
    }
}

/// Boundary to the hardware trigger.
pub trait Trigger: Send {
    /// Issues one trigger pulse.
    fn fire(&mut self) -> Result<(), TriggerError>;
}

/// Trigger that drives a [`MockDetector`], forwarding its frames to a channel.
///
/// Each pulse forwards any pending diagnostic frames followed by one data frame.
pub struct DetectorTrigger {
    detector: MockDetector,
    frames: Sender<RawFrame>,
}

impl DetectorTrigger {
    pub fn new(detector: MockDetector, frames: Sender<RawFrame>) -> Self {
        Self { detector, frames }
    }
}

impl Trigger for DetectorTrigger {
    fn fire(&mut self) -> Result<(), TriggerError> {
        loop {
            let frame = self
                .detector
                .next_frame()
                .map_err(|e| TriggerError::Failed(e.to_string()))?
                .ok_or_else(|| TriggerError::Failed("detector exhausted".to_string()))?;
            let text = frame.is_text();
            self.frames
                .send(frame)
                .map_err(|_| TriggerError::Disconnected)?;
            if !text {
                return Ok(());
            }
        }
    }
}

/// Start/stop controller for the trigger loop.
pub struct RunControl {
    store: SampleStore,
    rate: RunRate,
    limit: Option<u64>,
    running: Arc<AtomicBool>,
    run_count: Arc<AtomicU64>,
    handle: Option<JoinHandle<()>>,
}

impl RunControl {
    /// Creates an idle controller pacing against `store`.
    pub fn new(store: SampleStore, rate: RunRate) -> Self {
        Self {
            store,
            rate,
            limit: None,
            running: Arc::new(AtomicBool::new(false)),
            run_count: Arc::new(AtomicU64::new(0)),
            handle: None,
        }
    }

    /// Returns to `Idle` on its own after `triggers` pulses.
    pub fn with_limit(mut self, triggers: u64) -> Self {
        self.limit = Some(triggers);
        self
    }

    /// Current state.
    pub fn state(&self) -> RunState {
        if self.running.load(Ordering::Acquire) {
            RunState::Running
        } else {
            RunState::Idle
        }
    }

    /// Triggers issued in the current (or last) run.
    pub fn run_count(&self) -> u64 {
        self.run_count.load(Ordering::Relaxed)
    }

    /// Configured pacing.
    pub fn rate(&self) -> RunRate {
        self.rate
    }

    /// Starts the trigger loop with `trigger`.
    pub fn start<T: Trigger + 'static>(&mut self, mut trigger: T) -> Result<(), RunError> {
        if self.state() == RunState::Running {
            return Err(RunError::AlreadyRunning);
        }
        // Reap a loop that ended on its own.
        self.join()?;

        self.running.store(true, Ordering::Release);
        self.run_count.store(0, Ordering::Relaxed);

        let running = Arc::clone(&self.running);
        let run_count = Arc::clone(&self.run_count);
        let store = self.store.clone();
        let rate = self.rate;
        let limit = self.limit;

        tracing::info!(rate = %rate, ?limit, "Run started");

        self.handle = Some(thread::spawn(move || {
            let baseline = store.len() as u64;
            let mut count = 0u64;

            while running.load(Ordering::Acquire) {
                if limit.is_some_and(|limit| count >= limit) {
                    break;
                }
                if let Err(e) = trigger.fire() {
                    tracing::warn!(error = %e, "Trigger failed, stopping run");
                    break;
                }

                match rate {
                    RunRate::Auto => {
                        let target = (baseline + count + 1) as usize;
                        wait_for_frame(&store, target, &running);
                    }
                    RunRate::Hz(hz) => {
                        sleep_while_running(Duration::from_secs_f64(1.0 / hz as f64), &running);
                    }
                }

                count += 1;
                run_count.store(count, Ordering::Relaxed);
            }

            running.store(false, Ordering::Release);
            tracing::info!(triggers = count, "Run stopped");
        }));

        Ok(())
    }

    /// Stops the loop and waits for it to exit. Returns the trigger count.
    pub fn stop(&mut self) -> Result<u64, RunError> {
        self.running.store(false, Ordering::Release);
        self.join()?;
        Ok(self.run_count())
    }

    /// Waits for a limited run to finish on its own.
    pub fn wait(&mut self) -> Result<u64, RunError> {
        self.join()?;
        Ok(self.run_count())
    }

    fn join(&mut self) -> Result<(), RunError> {
        if let Some(handle) = self.handle.take() {
            handle.join().map_err(|_| RunError::ThreadPanicked)?;
        }
        Ok(())
    }
}

impl Drop for RunControl {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
        let _ = self.join();
    }
}

fn wait_for_frame(store: &SampleStore, target: usize, running: &AtomicBool) {
    let deadline = Instant::now() + AUTO_TIMEOUT;
    while running.load(Ordering::Acquire) {
        if store.wait_for_len(target, POLL_INTERVAL) {
            return;
        }
        if Instant::now() >= deadline {
            tracing::warn!(target, "No frame received after trigger");
            return;
        }
    }
}

fn sleep_while_running(period: Duration, running: &AtomicBool) {
    let deadline = Instant::now() + period;
    while running.load(Ordering::Acquire) {
        let now = Instant::now();
        if now >= deadline {
            return;
        }
        thread::sleep((deadline - now).min(POLL_INTERVAL));
    }
}
