//! The pending-word queue between the keyboard hook and the worker.

use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Job {
    /// A completed word with a known replacement.
    Word(String),
    /// Wakes the worker so it exits without waiting for its poll timeout.
    Stop,
}

/// Result of waiting for the next job.
#[derive(Debug, PartialEq, Eq)]
pub enum Next {
    Job(Job),
    Timeout,
    Closed,
}

/// Bounded FIFO. Producers never block: a full queue drops the word.
#[derive(Debug, Clone)]
pub struct WorkQueue {
    tx: Sender<Job>,
    rx: Receiver<Job>,
}

impl WorkQueue {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity);
        Self { tx, rx }
    }

    /// Enqueue `word`, returning false when it had to be dropped.
    pub fn push(&self, word: String) -> bool {
        match self.tx.try_send(Job::Word(word)) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(pending = self.len(), "Replacement queue full, dropping word");
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                warn!("Replacement queue closed, dropping word");
                false
            }
        }
    }

    /// Ask the consumer to stop. Best-effort when the queue is full; the
    /// worker also watches its run flag.
    pub fn push_stop(&self) {
        if self.tx.try_send(Job::Stop).is_err() {
            debug!("Could not queue stop marker");
        }
    }

    pub fn next(&self, timeout: Duration) -> Next {
        match self.rx.recv_timeout(timeout) {
            Ok(job) => Next::Job(job),
            Err(RecvTimeoutError::Timeout) => Next::Timeout,
            Err(RecvTimeoutError::Disconnected) => Next::Closed,
        }
    }

    /// Discard everything pending. Returns the number of dropped jobs.
    pub fn drain(&self) -> usize {
        self.rx.try_iter().count()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
