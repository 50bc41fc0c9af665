//! Single-flight lock for pipeline runs.
//!
//! One `PipelineLock` is built at process start and cloned into the
//! scheduler and the HTTP layer; every clone shares the same state.

use std::sync::{Arc, Mutex, MutexGuard};

use uuid::Uuid;

#[derive(Debug, Clone, Default)]
pub struct PipelineLock {
    holder: Arc<Mutex<Option<Uuid>>>,
}

impl PipelineLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lock for `run_id` if it is free. Never blocks.
    pub fn try_acquire(&self, run_id: Uuid) -> bool {
        let mut holder = self.state();
        if holder.is_some() {
            return false;
        }
        *holder = Some(run_id);
        true
    }

    /// Like `try_acquire`, but returns a guard that releases on drop.
    pub fn try_hold(&self, run_id: Uuid) -> Option<HeldPipelineLock> {
        self.try_acquire(run_id).then(|| HeldPipelineLock {
            lock: self.clone(),
            run_id,
        })
    }

    /// Free the lock. Idempotent.
    pub fn release(&self) {
        *self.state() = None;
    }

    pub fn current_holder(&self) -> Option<Uuid> {
        *self.state()
    }

    pub fn is_running(&self) -> bool {
        self.current_holder().is_some()
    }

    // A panic while holding the std mutex only ever interrupts a plain
    // assignment, so a poisoned state is still consistent.
    fn state(&self) -> MutexGuard<'_, Option<Uuid>> {
        self.holder.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Proof of holding the pipeline lock. Releases when dropped, including
/// during unwinding.
#[derive(Debug)]
pub struct HeldPipelineLock {
    lock: PipelineLock,
    run_id: Uuid,
}

impl HeldPipelineLock {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }
}

impl Drop for HeldPipelineLock {
    fn drop(&mut self) {
        self.lock.release();
        tracing::debug!(run_id = %self.run_id, "Pipeline lock released");
    }
}
