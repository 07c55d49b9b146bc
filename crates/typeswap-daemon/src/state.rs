use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use crate::lock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelinePhase {
    Stopped,
    Starting,
    Running,
    Recovering,
    Restarting,
    Stopping,
}

/// Point-in-time copy of the pipeline flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineState {
    pub is_running: bool,
    pub is_replacing: bool,
    pub service_healthy: bool,
    pub last_successful_replacement: Option<DateTime<Utc>>,
}

/// Live pipeline flags shared by the hook, the worker and the supervisor.
#[derive(Debug)]
pub struct SharedState {
    running: AtomicBool,
    replacing: AtomicBool,
    healthy: AtomicBool,
    phase: Mutex<PipelinePhase>,
    last_success: Mutex<Option<DateTime<Utc>>>,
    /// Start of the current liveness window: the last start, recovery or
    /// successful substitution.
    liveness_mark: Mutex<Instant>,
}

impl Default for SharedState {
    fn default() -> Self {
        Self {
            running: AtomicBool::new(false),
            replacing: AtomicBool::new(false),
            healthy: AtomicBool::new(false),
            phase: Mutex::new(PipelinePhase::Stopped),
            last_success: Mutex::new(None),
            liveness_mark: Mutex::new(Instant::now()),
        }
    }
}

impl SharedState {
    pub fn snapshot(&self) -> PipelineState {
        PipelineState {
            is_running: self.is_running(),
            is_replacing: self.is_replacing(),
            service_healthy: self.is_healthy(),
            last_successful_replacement: *lock(&self.last_success),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }

    pub fn is_replacing(&self) -> bool {
        self.replacing.load(Ordering::SeqCst)
    }

    pub fn set_replacing(&self, replacing: bool) {
        self.replacing.store(replacing, Ordering::SeqCst);
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn phase(&self) -> PipelinePhase {
        *lock(&self.phase)
    }

    pub fn set_phase(&self, phase: PipelinePhase) {
        *lock(&self.phase) = phase;
    }

    pub fn record_success(&self) {
        *lock(&self.last_success) = Some(Utc::now());
        self.touch_liveness();
        self.set_healthy(true);
    }

    pub fn touch_liveness(&self) {
        *lock(&self.liveness_mark) = Instant::now();
    }

    pub fn since_liveness_mark(&self) -> Duration {
        lock(&self.liveness_mark).elapsed()
    }
}
