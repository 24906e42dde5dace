//! Counting completion gate between stages.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

/// Barrier gating stage-to-stage progression.
///
/// Armed once per stage with the number of steps; every task signals
/// exactly once; [`StageGate::wait`] returns when the count is back to
/// zero. This is the sole ordering mechanism between stages.
#[derive(Debug, Default)]
pub struct StageGate {
    pending: Mutex<usize>,
    drained: Condvar,
}

impl StageGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the expected completion count for the next stage.
    ///
    /// May only be called while the gate is drained; arming a gate that is
    /// still counting down would merge two stages' accounting.
    pub fn arm(&self, count: usize) {
        let mut pending = self.lock();
        assert_eq!(*pending, 0, "gate armed while still pending");
        *pending = count;
    }

    /// Record one task completion.
    pub fn done(&self) {
        let mut pending = self.lock();
        *pending = pending.saturating_sub(1);
        if *pending == 0 {
            self.drained.notify_all();
        }
    }

    /// Block until every armed task has signaled.
    pub fn wait(&self) {
        let mut pending = self.lock();
        while *pending > 0 {
            pending = self
                .drained
                .wait(pending)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// RAII completion signal: calls [`StageGate::done`] exactly once on
    /// drop, so a panicking task worker still releases the stage.
    pub fn guard(self: &Arc<Self>) -> CompletionGuard {
        CompletionGuard {
            gate: Arc::clone(self),
        }
    }

    fn lock(&self) -> MutexGuard<'_, usize> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Signals its gate once when dropped.
pub struct CompletionGuard {
    gate: Arc<StageGate>,
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        self.gate.done();
    }
}
