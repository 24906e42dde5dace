//! Best-effort notifications for failed or long-running commands.

use std::time::Duration;

use tracing::info;

/// Successful tasks running longer than this trigger a completion
/// notification.
pub const LONG_RUNNING_THRESHOLD: Duration = Duration::from_secs(5 * 60);

/// Capability for surfacing out-of-band notifications.
///
/// Injected into the engine so tests can swap in a no-op without touching
/// the task logic. Calls are best-effort: implementations must not block,
/// and the engine ignores their outcome.
pub trait Notifier: Send + Sync {
    fn notify(&self, title: &str, message: &str);

    /// How long a successful command may run before it warrants a
    /// completion notification. Overridable so the duration branch can be
    /// exercised without a five-minute command.
    fn long_running_threshold(&self) -> Duration {
        LONG_RUNNING_THRESHOLD
    }
}

/// Default notifier: records the notification in the diagnostic log.
/// Desktop delivery is a collaborator concern outside the engine.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, title: &str, message: &str) {
        info!(title, message, "notification");
    }
}

/// Notifier that discards everything.
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, _title: &str, _message: &str) {}
}
