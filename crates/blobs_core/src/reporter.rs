/// Sink for the human-readable status lines of a run.
pub trait StatusReporter: Send + Sync {
    fn step(&self, msg: &str);
    fn ok(&self, msg: &str);
    fn warn(&self, msg: &str);
    fn err(&self, msg: &str);
}

pub struct SilentReporter;

impl StatusReporter for SilentReporter {
    fn step(&self, _msg: &str) {}
    fn ok(&self, _msg: &str) {}
    fn warn(&self, _msg: &str) {}
    fn err(&self, _msg: &str) {}
}

/// Forwards status lines to `tracing`, for embedding without a console.
pub struct TracingReporter;

impl StatusReporter for TracingReporter {
    fn step(&self, msg: &str) {
        tracing::info!("{}", msg);
    }

    fn ok(&self, msg: &str) {
        tracing::info!("{}", msg);
    }

    fn warn(&self, msg: &str) {
        tracing::warn!("{}", msg);
    }

    fn err(&self, msg: &str) {
        tracing::error!("{}", msg);
    }
}
