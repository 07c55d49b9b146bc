pub mod buffer;
pub mod context;
pub mod engine;
pub mod events;
pub mod keyboard_listener;
pub mod queue;
pub mod replacements;
pub mod state;
pub mod substitution;
pub mod supervisor;
mod worker;

pub use context::AppContext;
pub use engine::Engine;
pub use events::{EventBus, PipelineEvent};
pub use state::{PipelinePhase, PipelineState};
pub use substitution::SubstitutionOutcome;

use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

// Everything behind these locks is plain state that stays consistent even if
// a holder panicked, so poisoning is ignored.

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub(crate) fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub(crate) fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}
