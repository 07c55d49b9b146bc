//! Pipeline lifecycle: start, stop, reload, recovery and restart.
//!
//! Each start creates a fresh [`Run`] (its own queue and active flag) so
//! threads left over from a previous run notice they are obsolete and exit
//! even when they could not be joined in time.

use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use tracing::{debug, error, info, warn};
use typeswap_core::storage::{CredentialStore, ShortcutStore};
use typeswap_core::{Result, TypeswapError};

use crate::buffer::TypedBuffer;
use crate::context::AppContext;
use crate::events::{EventBus, PipelineEvent};
use crate::keyboard_listener::{start_keyboard_listener, KeystrokeDispatcher};
use crate::lock;
use crate::queue::WorkQueue;
use crate::replacements::ReplacementTable;
use crate::state::{PipelinePhase, PipelineState, SharedState};
use crate::substitution::Substitution;
use crate::supervisor::{self, HealthSupervisor};
use crate::worker;

/// Longest single sleep of a pipeline thread, so stops are noticed quickly.
const SLEEP_SLICE: Duration = Duration::from_millis(50);
const JOIN_POLL: Duration = Duration::from_millis(10);

/// One started-to-stopped span of the pipeline.
pub(crate) struct Run {
    active: Arc<AtomicBool>,
    queue: WorkQueue,
}

impl Run {
    fn new(queue_capacity: usize) -> Self {
        Self {
            active: Arc::new(AtomicBool::new(true)),
            queue: WorkQueue::new(queue_capacity),
        }
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn cancel(&self) {
        self.active.store(false, Ordering::SeqCst);
        self.queue.push_stop();
    }

    pub(crate) fn queue(&self) -> &WorkQueue {
        &self.queue
    }

    /// Sleep for `duration` or until the run is cancelled. Returns whether
    /// the run is still active.
    pub(crate) fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        while self.is_active() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep((deadline - now).min(SLEEP_SLICE));
        }
        self.is_active()
    }
}

/// An input queue association made on behalf of the injecting thread.
#[derive(Debug, Clone, Copy)]
struct Attachment {
    thread: u32,
    target: u32,
}

#[derive(Default)]
struct Lifecycle {
    run: Option<Arc<Run>>,
    worker: Option<JoinHandle<()>>,
    supervisor: Option<JoinHandle<()>>,
}

pub(crate) struct Inner {
    pub(crate) ctx: AppContext,
    pub(crate) state: Arc<SharedState>,
    pub(crate) table: Arc<ReplacementTable>,
    pub(crate) substitution: Substitution,
    pub(crate) supervisor: HealthSupervisor,
    buffer: Arc<Mutex<TypedBuffer>>,
    events: Arc<EventBus>,
    lifecycle: Mutex<Lifecycle>,
    /// Platform id of the worker thread, which injects the keys.
    injector_thread: Mutex<Option<u32>>,
    attached: Mutex<Option<Attachment>>,
}

/// The text-expansion pipeline.
///
/// Dropping the engine stops it.
pub struct Engine {
    inner: Arc<Inner>,
}

impl Engine {
    pub fn new(ctx: AppContext) -> Result<Self> {
        ctx.config.validate()?;
        let config = Arc::clone(&ctx.config);

        let state = Arc::new(SharedState::default());
        let buffer = Arc::new(Mutex::new(TypedBuffer::new(config.max_buffer_len)));
        let table = Arc::new(ReplacementTable::new(&config));
        let events = Arc::new(EventBus::new(config.notification_workers)?);
        let substitution = Substitution::new(
            &ctx,
            Arc::clone(&state),
            Arc::clone(&buffer),
            Arc::clone(&events),
        );
        let supervisor = HealthSupervisor::new(
            &config,
            Arc::clone(&state),
            Arc::clone(&buffer),
            Arc::clone(&table),
        );

        Ok(Self {
            inner: Arc::new(Inner {
                ctx,
                state,
                table,
                substitution,
                supervisor,
                buffer,
                events,
                lifecycle: Mutex::new(Lifecycle::default()),
                injector_thread: Mutex::new(None),
                attached: Mutex::new(None),
            }),
        })
    }

    /// Load the definitions, spawn the worker and supervisor and hook the
    /// keyboard. A no-op when already running.
    pub fn start(&self) -> Result<()> {
        self.inner.start()
    }

    /// Tear everything down. Safe to call repeatedly; only the call that
    /// actually stops the pipeline notifies observers.
    pub fn stop(&self) {
        self.inner.stop()
    }

    /// Re-read the definitions from the store. With `restart`, a running
    /// pipeline is stopped and started around the reload.
    pub fn reload_replacements(&self, restart: bool) -> Result<()> {
        if restart && self.is_running() {
            self.inner.stop();
            return self.inner.start();
        }
        self.inner.table.load(self.inner.ctx.store.as_ref())?;
        Ok(())
    }

    /// Run a recovery pass now, escalating to a restart if it fails.
    pub fn recover(&self) -> Result<()> {
        let run = lock(&self.inner.lifecycle).run.clone();
        match run {
            Some(run) => self.inner.recover_or_restart(&run),
            None => {
                debug!("Pipeline not running, nothing to recover");
                Ok(())
            }
        }
    }

    pub fn state(&self) -> PipelineState {
        self.inner.state.snapshot()
    }

    pub fn phase(&self) -> PipelinePhase {
        self.inner.state.phase()
    }

    pub fn is_running(&self) -> bool {
        self.inner.state.is_running()
    }

    pub fn on_event(&self, observer: impl Fn(&PipelineEvent) + Send + Sync + 'static) {
        self.inner.events.on_event(observer);
    }

    pub fn subscribe(&self) -> Receiver<PipelineEvent> {
        self.inner.events.subscribe()
    }

    pub fn context(&self) -> &AppContext {
        &self.inner.ctx
    }

    /// Hand out the next credential for a service keyword.
    pub fn next_credential(&self, keyword: &str) -> Result<Option<String>> {
        self.inner.ctx.store.get_next_credential(keyword)
    }

    pub fn save_shortcut(&self, keyword: &str, replacement: &str) -> Result<()> {
        self.inner.ctx.store.save_shortcut(keyword, replacement)?;
        self.refresh_after_edit()
    }

    pub fn delete_shortcut(&self, keyword: &str) -> Result<()> {
        self.inner.ctx.store.delete_shortcut(keyword)?;
        self.refresh_after_edit()
    }

    fn refresh_after_edit(&self) -> Result<()> {
        if self.is_running() {
            self.reload_replacements(false)
        } else {
            Ok(())
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.inner.stop();
    }
}

impl Inner {
    fn start(self: &Arc<Self>) -> Result<()> {
        let mut life = lock(&self.lifecycle);
        if life.run.is_some() {
            debug!("Pipeline already running");
            return Ok(());
        }

        info!("Starting text replacement pipeline");
        self.state.set_phase(PipelinePhase::Starting);
        match self.launch(&mut life) {
            Ok(()) => {
                self.state.set_phase(PipelinePhase::Running);
                drop(life);
                info!("Text replacement pipeline started");
                self.events
                    .emit(PipelineEvent::StatusChanged { running: true });
                Ok(())
            }
            Err(err) => {
                self.teardown(&mut life);
                self.state.set_phase(PipelinePhase::Stopped);
                error!("Failed to start pipeline: {}", err);
                Err(err)
            }
        }
    }

    fn launch(self: &Arc<Self>, life: &mut Lifecycle) -> Result<()> {
        let loaded = self
            .table
            .load(self.ctx.store.as_ref())
            .map_err(|e| TypeswapError::Startup(format!("failed to load replacements: {}", e)))?;
        if loaded == 0 {
            return Err(TypeswapError::Startup(
                "no shortcut definitions available".to_string(),
            ));
        }

        lock(&self.buffer).clear();
        self.state.set_healthy(true);
        self.state.touch_liveness();
        self.state.set_running(true);

        let run = Arc::new(Run::new(self.ctx.config.queue_capacity));
        life.run = Some(Arc::clone(&run));

        let spawn_error =
            |e: std::io::Error| TypeswapError::Startup(format!("failed to spawn thread: {}", e));
        let inner = Arc::clone(self);
        let supervised = Arc::clone(&run);
        life.supervisor = Some(
            thread::Builder::new()
                .name("typeswap-health".to_string())
                .spawn(move || supervisor::supervise(&inner, &supervised))
                .map_err(spawn_error)?,
        );
        life.worker = Some(
            worker::spawn_worker(Arc::clone(self), Arc::clone(&run)).map_err(spawn_error)?,
        );

        let dispatcher = Arc::new(KeystrokeDispatcher::new(
            Arc::clone(&self.buffer),
            Arc::clone(&self.table),
            Arc::clone(&self.state),
            run.queue.clone(),
            Arc::clone(&run.active),
        ));
        start_keyboard_listener(self.ctx.platform.as_ref(), dispatcher).map_err(|e| {
            TypeswapError::Startup(format!("failed to acquire keyboard hook: {}", e))
        })?;
        Ok(())
    }

    fn stop(&self) {
        let life = lock(&self.lifecycle);
        if life.run.is_none() {
            debug!("Pipeline already stopped");
            return;
        }

        info!("Stopping text replacement pipeline");
        self.state.set_phase(PipelinePhase::Stopping);
        self.shut_down(life);
    }

    /// Stop the pipeline only while `run` is still the current one. Returns
    /// false when it was already stopped or replaced by a newer run.
    fn stop_run(&self, run: &Run) -> bool {
        let life = lock(&self.lifecycle);
        match &life.run {
            Some(current) if ptr::eq(Arc::as_ptr(current), run) => {}
            _ => return false,
        }

        self.state.set_phase(PipelinePhase::Restarting);
        self.shut_down(life);
        true
    }

    fn shut_down(&self, mut life: MutexGuard<'_, Lifecycle>) {
        self.teardown(&mut life);
        self.state.set_phase(PipelinePhase::Stopped);
        drop(life);

        info!("Text replacement pipeline stopped");
        self.events
            .emit(PipelineEvent::StatusChanged { running: false });
    }

    /// Release everything a (possibly partial) start acquired. Each step
    /// runs regardless of the others.
    fn teardown(&self, life: &mut Lifecycle) {
        self.state.set_running(false);
        self.state.set_healthy(false);
        if let Some(run) = life.run.take() {
            run.cancel();
        }

        let timeout = self.ctx.config.join_timeout();
        join_with_timeout("health supervisor", life.supervisor.take(), timeout);
        join_with_timeout("replacement worker", life.worker.take(), timeout);

        self.table.clear_caches();
        self.events.cancel_pending();
        if let Err(err) = self.ctx.platform.unhook_keyboard() {
            error!("Failed to unhook keyboard: {}", err);
        }
        self.detach_input();
        *lock(&self.injector_thread) = None;
        lock(&self.buffer).clear();
    }

    /// Clear transient state, reload the definitions and re-attach input.
    fn recover(&self, run: &Run) -> Result<()> {
        info!("Starting service recovery");
        self.set_phase_if_active(run, PipelinePhase::Recovering);

        lock(&self.buffer).clear();
        let dropped = run.queue.drain();
        debug!(dropped, "Replacement queue cleared");

        let result = self.table.load(self.ctx.store.as_ref()).map(|_| {
            self.detach_input();
            self.attach_input();
        });
        self.set_phase_if_active(run, PipelinePhase::Running);
        result?;

        self.state.touch_liveness();
        self.state.set_healthy(true);
        info!("Service recovery completed");
        Ok(())
    }

    pub(crate) fn recover_or_restart(self: &Arc<Self>, run: &Run) -> Result<()> {
        if !run.is_active() {
            return Ok(());
        }
        match self.recover(run) {
            Ok(()) => Ok(()),
            Err(err) => {
                error!("Service recovery failed: {}", err);
                self.restart(run)
            }
        }
    }

    /// Stop and start again. Only the run that asked for it is torn down;
    /// a run started by someone else in the meantime is left alone. A
    /// failed start leaves the pipeline stopped, which observers already
    /// heard about from the stop.
    fn restart(self: &Arc<Self>, run: &Run) -> Result<()> {
        warn!("Restarting text replacement pipeline");
        if !self.stop_run(run) {
            debug!("Run already superseded, skipping restart");
            return Ok(());
        }
        thread::sleep(self.ctx.config.restart_pause());

        match self.start() {
            Ok(()) => {
                info!("Service restarted successfully");
                Ok(())
            }
            Err(err) => {
                error!("Service restart failed: {}", err);
                Err(err)
            }
        }
    }

    fn set_phase_if_active(&self, run: &Run, phase: PipelinePhase) {
        if run.is_active() {
            self.state.set_phase(phase);
        }
    }

    /// Called on the worker thread before it takes any work.
    pub(crate) fn bind_injector_thread(&self, run: &Run) {
        let thread = self.ctx.platform.current_thread_id();
        *lock(&self.injector_thread) = Some(thread);
        if run.is_active() {
            self.attach_input();
        }
    }

    /// Attach the injecting thread to the foreground input queue. Thread ids
    /// are explicit, so any thread may call this.
    fn attach_input(&self) {
        let Some(thread) = *lock(&self.injector_thread) else {
            return;
        };
        let Some(target) = self.ctx.platform.foreground_input_thread() else {
            return;
        };
        if thread == target {
            return;
        }
        match self.ctx.platform.attach_input(thread, target, true) {
            Ok(()) => *lock(&self.attached) = Some(Attachment { thread, target }),
            Err(err) => warn!("Failed to attach thread input: {}", err),
        }
    }

    fn detach_input(&self) {
        let Some(Attachment { thread, target }) = lock(&self.attached).take() else {
            return;
        };
        if let Err(err) = self.ctx.platform.attach_input(thread, target, false) {
            error!("Failed to detach thread input: {}", err);
        }
    }
}

/// Join `handle`, giving up after `timeout`. A thread never joins itself:
/// stop and restart may be called from the worker or the supervisor.
fn join_with_timeout(name: &str, handle: Option<JoinHandle<()>>, timeout: Duration) {
    let Some(handle) = handle else {
        return;
    };
    if handle.thread().id() == thread::current().id() {
        debug!(thread = name, "Not joining the current thread");
        return;
    }

    let deadline = Instant::now() + timeout;
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            warn!(thread = name, "Thread did not stop in time, detaching");
            return;
        }
        thread::sleep(JOIN_POLL);
    }
    if handle.join().is_err() {
        error!(thread = name, "Thread panicked");
    }
}
