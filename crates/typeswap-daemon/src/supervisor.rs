//! Periodic health checks.
//!
//! The resource check bounds the queue, the typed buffer and the caches; the
//! liveness check decides when the pipeline needs a recovery pass.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::{debug, error, warn};
use typeswap_core::Config;

use crate::buffer::TypedBuffer;
use crate::engine::{Inner, Run};
use crate::lock;
use crate::queue::WorkQueue;
use crate::replacements::ReplacementTable;
use crate::state::SharedState;

pub struct HealthSupervisor {
    state: Arc<SharedState>,
    buffer: Arc<Mutex<TypedBuffer>>,
    table: Arc<ReplacementTable>,
    check_interval: Duration,
    resource_interval: Duration,
    max_queue_len: usize,
    max_buffer_len: usize,
    max_cache_population: usize,
    last_resource_check: Mutex<Option<Instant>>,
}

impl HealthSupervisor {
    pub fn new(
        config: &Config,
        state: Arc<SharedState>,
        buffer: Arc<Mutex<TypedBuffer>>,
        table: Arc<ReplacementTable>,
    ) -> Self {
        Self {
            state,
            buffer,
            table,
            check_interval: config.health_check_interval(),
            resource_interval: config.resource_check_interval(),
            max_queue_len: config.max_queue_len,
            max_buffer_len: config.max_buffer_len,
            max_cache_population: config.max_cache_population,
            last_resource_check: Mutex::new(None),
        }
    }

    /// Override the check periods, which the config only expresses in
    /// whole seconds.
    pub fn with_intervals(mut self, check_interval: Duration, resource_interval: Duration) -> Self {
        self.check_interval = check_interval;
        self.resource_interval = resource_interval;
        self
    }

    pub fn check_interval(&self) -> Duration {
        self.check_interval
    }

    /// Clear whichever structure has grown past its ceiling. Returns false
    /// when something had to be cleared. Only samples once per resource
    /// interval; calls in between report healthy.
    pub fn check_resources(&self, queue: &WorkQueue) -> bool {
        {
            let mut last = lock(&self.last_resource_check);
            if let Some(at) = *last {
                if at.elapsed() < self.resource_interval {
                    return true;
                }
            }
            *last = Some(Instant::now());
        }

        let pending = queue.len();
        if pending > self.max_queue_len {
            warn!(pending, max = self.max_queue_len, "Queue size exceeded");
            let dropped = queue.drain();
            debug!(dropped, "Replacement queue cleared");
            return false;
        }

        let buffered = lock(&self.buffer).len();
        if buffered > self.max_buffer_len {
            warn!(buffered, max = self.max_buffer_len, "Buffer size exceeded");
            lock(&self.buffer).clear();
            return false;
        }

        let cached = self.table.cache_population();
        if cached > self.max_cache_population {
            warn!(cached, max = self.max_cache_population, "Cache size exceeded");
            self.table.clear_caches();
            return false;
        }

        true
    }

    /// False when the pipeline was marked unhealthy or has gone more than
    /// two check intervals without progress.
    pub fn check_liveness(&self) -> bool {
        if !self.state.is_healthy() {
            warn!("Service marked as unhealthy");
            return false;
        }

        let idle = self.state.since_liveness_mark();
        if idle > self.check_interval * 2 {
            warn!(
                idle_secs = idle.as_secs_f64(),
                "No successful replacements recently"
            );
            return false;
        }
        true
    }
}

/// Body of the supervisor thread for one run.
pub(crate) fn supervise(inner: &Arc<Inner>, run: &Run) {
    debug!("Health supervisor started");
    let supervisor = &inner.supervisor;

    while run.sleep(supervisor.check_interval()) {
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            if !supervisor.check_resources(run.queue()) {
                debug!("Resource check reported unhealthy");
            }
            if !supervisor.check_liveness() {
                if let Err(err) = inner.recover_or_restart(run) {
                    error!("Pipeline could not be revived: {}", err);
                }
            }
        }));
        if outcome.is_err() {
            error!("Health monitor error");
        }
    }
    debug!("Health supervisor stopped");
}
