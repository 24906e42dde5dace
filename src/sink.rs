//! Asynchronous collection of task failures.
//!
//! Tasks in a stage run to completion regardless of sibling outcomes, so
//! failures are never raised synchronously: they are pushed into this sink
//! and logged by a background consumer. The sink is diagnostic only — it
//! does not alter control flow or exit codes.

use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle};

use anyhow::Error;
use tracing::warn;

/// One task failure, reported without interrupting sibling tasks.
#[derive(Debug)]
pub struct TaskFailure {
    pub task: String,
    pub error: Error,
}

/// Cheap clonable handle for reporting failures into the sink.
#[derive(Clone)]
pub struct FailureReporter {
    tx: Sender<TaskFailure>,
}

impl FailureReporter {
    /// Report a failure. Never blocks; reports after shutdown are dropped.
    pub fn report(&self, task: &str, error: Error) {
        let _ = self.tx.send(TaskFailure {
            task: task.to_string(),
            error,
        });
    }
}

/// Unbounded channel of task failures with a supervised logging consumer.
///
/// The consumer's lifetime is tied to one `Play::run`: started at the top,
/// drained explicitly via [`ErrorSink::shutdown`] after the last stage, so
/// a failure raised by the very last task is never lost.
pub struct ErrorSink {
    tx: Sender<TaskFailure>,
    consumer: JoinHandle<usize>,
}

impl ErrorSink {
    /// Start the sink and its consumer thread.
    pub fn start() -> Self {
        let (tx, rx) = mpsc::channel::<TaskFailure>();
        let consumer = thread::spawn(move || {
            let mut seen = 0usize;
            for failure in rx {
                warn!(task = %failure.task, error = %failure.error, "task failed");
                seen += 1;
            }
            seen
        });
        Self { tx, consumer }
    }

    /// Handle for task workers to report through.
    pub fn reporter(&self) -> FailureReporter {
        FailureReporter {
            tx: self.tx.clone(),
        }
    }

    /// Close the sending side and wait for the consumer to drain.
    ///
    /// Returns the number of failures logged.
    pub fn shutdown(self) -> usize {
        let Self { tx, consumer } = self;
        drop(tx);
        match consumer.join() {
            Ok(seen) => seen,
            Err(_) => {
                warn!("error sink consumer panicked");
                0
            }
        }
    }
}
