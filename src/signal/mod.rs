//! Signal handling for the polling loop (SIGINT/SIGTERM)
//!
//! First signal: finish the current cycle (including its result report),
//! then stop polling. Second signal: exit immediately; a claimed job is
//! left for the orchestrator to time out.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::logging::LOG_TAG;

/// Exit code for an interrupted runner
pub const EXIT_CODE_CANCELLED: i32 = 80;

/// Slice used when sleeping between polls
const WAIT_SLICE: Duration = Duration::from_millis(100);

/// Signal handler state
#[derive(Debug, Default)]
pub struct SignalState {
    stop_requested: AtomicBool,
    immediate_exit: AtomicBool,
    signal_count: AtomicU8,
    /// Job being processed when the signal arrived
    current_job: Mutex<Option<String>>,
}

impl SignalState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    pub fn is_immediate_exit(&self) -> bool {
        self.immediate_exit.load(Ordering::SeqCst)
    }

    pub fn signal_count(&self) -> u8 {
        self.signal_count.load(Ordering::SeqCst)
    }

    /// Handle a signal and return the action to take
    pub fn handle_signal(&self) -> SignalAction {
        let count = self.signal_count.fetch_add(1, Ordering::SeqCst);

        if count == 0 {
            self.stop_requested.store(true, Ordering::SeqCst);
            SignalAction::FinishCycle
        } else if count == 1 {
            self.immediate_exit.store(true, Ordering::SeqCst);
            SignalAction::ImmediateExit
        } else {
            SignalAction::Ignore
        }
    }

    pub fn set_current_job(&self, job_id: Option<String>) {
        if let Ok(mut current) = self.current_job.lock() {
            *current = job_id;
        }
    }

    pub fn current_job(&self) -> Option<String> {
        self.current_job.lock().ok().and_then(|j| j.clone())
    }

    /// Sleep for `interval`, waking early if a stop is requested.
    ///
    /// Returns true if the loop should stop.
    pub fn wait_or_stop(&self, interval: Duration) -> bool {
        let start = Instant::now();
        while start.elapsed() < interval {
            if self.is_stop_requested() {
                return true;
            }
            std::thread::sleep(WAIT_SLICE.min(interval.saturating_sub(start.elapsed())));
        }
        self.is_stop_requested()
    }
}

/// Action to take after receiving a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalAction {
    FinishCycle,
    ImmediateExit,
    Ignore,
}

/// Installs the process signal handler
pub struct SignalHandler {
    state: Arc<SignalState>,
}

impl SignalHandler {
    pub fn new() -> Self {
        Self {
            state: Arc::new(SignalState::new()),
        }
    }

    pub fn state(&self) -> Arc<SignalState> {
        Arc::clone(&self.state)
    }

    /// Install handlers for SIGINT and SIGTERM. Call once at startup.
    pub fn install(&self) -> Result<(), ctrlc::Error> {
        let state = Arc::clone(&self.state);
        ctrlc::set_handler(move || match state.handle_signal() {
            SignalAction::FinishCycle => {
                tracing::warn!(
                    job_id = ?state.current_job(),
                    "{LOG_TAG} interrupt received, stopping after the current cycle"
                );
            }
            SignalAction::ImmediateExit => {
                tracing::warn!(
                    job_id = ?state.current_job(),
                    "{LOG_TAG} second interrupt received, exiting immediately"
                );
                std::process::exit(EXIT_CODE_CANCELLED);
            }
            SignalAction::Ignore => {}
        })
    }
}

impl Default for SignalHandler {
    fn default() -> Self {
        Self::new()
    }
}
