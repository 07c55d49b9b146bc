//! Notifications from the pipeline to its host.
//!
//! The pipeline only holds the sending side. Registered observers run on a
//! small tokio blocking pool so a slow observer never holds up the worker;
//! subscribers get a bounded channel of their own.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use tokio::runtime::{Builder, Runtime};
use tokio::task::JoinHandle;
use tracing::{debug, error, trace, warn};
use typeswap_core::{Result, TypeswapError};

use crate::lock;

const SUBSCRIBER_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    /// The pipeline started or stopped.
    StatusChanged { running: bool },
    /// A typed word was replaced on screen.
    Replaced { typed: String, replacement: String },
}

impl PipelineEvent {
    fn kind(&self) -> &'static str {
        match self {
            PipelineEvent::StatusChanged { .. } => "status_changed",
            PipelineEvent::Replaced { .. } => "replaced",
        }
    }
}

pub type Observer = Arc<dyn Fn(&PipelineEvent) + Send + Sync>;

pub struct EventBus {
    runtime: Option<Runtime>,
    observers: Mutex<Vec<Observer>>,
    subscribers: Mutex<Vec<Sender<PipelineEvent>>>,
    pending: Mutex<Vec<JoinHandle<()>>>,
}

impl EventBus {
    /// Create a bus delivering to observers on at most `workers` threads.
    pub fn new(workers: usize) -> Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(workers.max(1))
            .thread_name("typeswap-notify")
            .build()
            .map_err(|e| {
                TypeswapError::Startup(format!("failed to create notification pool: {}", e))
            })?;

        Ok(Self {
            runtime: Some(runtime),
            observers: Mutex::new(Vec::new()),
            subscribers: Mutex::new(Vec::new()),
            pending: Mutex::new(Vec::new()),
        })
    }

    pub fn on_event(&self, observer: impl Fn(&PipelineEvent) + Send + Sync + 'static) {
        lock(&self.observers).push(Arc::new(observer));
    }

    /// A channel receiving every event from now on. Events are dropped for
    /// a subscriber that falls too far behind.
    pub fn subscribe(&self) -> Receiver<PipelineEvent> {
        let (tx, rx) = bounded(SUBSCRIBER_CAPACITY);
        lock(&self.subscribers).push(tx);
        rx
    }

    pub fn emit(&self, event: PipelineEvent) {
        trace!(kind = event.kind(), "Emitting event");

        lock(&self.subscribers).retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(kind = event.kind(), "Subscriber is lagging, event dropped");
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        });

        let observers = lock(&self.observers).clone();
        if observers.is_empty() {
            return;
        }
        let Some(runtime) = self.runtime.as_ref() else {
            return;
        };

        let handle = runtime.spawn_blocking(move || {
            for observer in &observers {
                if catch_unwind(AssertUnwindSafe(|| observer(&event))).is_err() {
                    error!(kind = event.kind(), "Event observer panicked");
                }
            }
        });

        let mut pending = lock(&self.pending);
        pending.retain(|handle| !handle.is_finished());
        pending.push(handle);
    }

    /// Abort notifications that have not been delivered yet. Returns how
    /// many were still outstanding.
    pub fn cancel_pending(&self) -> usize {
        let mut cancelled = 0;
        for handle in lock(&self.pending).drain(..) {
            if !handle.is_finished() {
                handle.abort();
                cancelled += 1;
            }
        }
        if cancelled > 0 {
            debug!(cancelled, "Cancelled pending notifications");
        }
        cancelled
    }
}

impl Drop for EventBus {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}
