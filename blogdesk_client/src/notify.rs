/// User-facing outcome reporting (the toast/message area of a UI).
pub trait Notifier: Send + Sync {
    fn success(&self, message: &str);
    fn error(&self, message: &str);
}

/// Routes notifications into the log. Used by the CLI and as a default.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn success(&self, message: &str) {
        tracing::info!(target: "blogdesk::notify", "{message}");
    }

    fn error(&self, message: &str) {
        tracing::error!(target: "blogdesk::notify", "{message}");
    }
}
