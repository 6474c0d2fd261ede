//! Logger handles injected into subsystems.
//!
//! Subsystems never reach for a global logger; the runner hands each
//! `Loggable` subsystem a [`SharedLogger`]. The default is [`NoOpLogger`], so
//! a runner built without a logger is silent. [`TracingLogger`] forwards to
//! `tracing` with a `subsystem` field so events line up with spans.

use std::fmt;
use std::sync::Arc;

use tracing::Level;

/// Leveled, structured-enough logging contract.
pub trait Logger: Send + Sync {
    /// Emit one message at `level`.
    fn log(&self, level: Level, message: &str);

    fn debug(&self, message: &str) {
        self.log(Level::DEBUG, message);
    }

    fn info(&self, message: &str) {
        self.log(Level::INFO, message);
    }

    fn warn(&self, message: &str) {
        self.log(Level::WARN, message);
    }

    fn error(&self, message: &str) {
        self.log(Level::ERROR, message);
    }
}

/// Logger shared between the runner and every subsystem it wires.
pub type SharedLogger = Arc<dyn Logger>;

/// Logger that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpLogger;

impl Logger for NoOpLogger {
    fn log(&self, _level: Level, _message: &str) {}
}

/// A fresh [`NoOpLogger`] behind a [`SharedLogger`].
pub fn noop_logger() -> SharedLogger {
    Arc::new(NoOpLogger)
}

/// Logger that emits `tracing` events tagged with a subsystem name.
#[derive(Clone)]
pub struct TracingLogger {
    subsystem: Arc<str>,
}

impl TracingLogger {
    pub fn new(subsystem: impl Into<Arc<str>>) -> Self {
        Self {
            subsystem: subsystem.into(),
        }
    }

    /// Same as [`TracingLogger::new`], already wrapped for injection.
    pub fn shared(subsystem: impl Into<Arc<str>>) -> SharedLogger {
        Arc::new(Self::new(subsystem))
    }

    pub fn subsystem(&self) -> &str {
        &self.subsystem
    }
}

impl fmt::Debug for TracingLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TracingLogger")
            .field("subsystem", &self.subsystem)
            .finish()
    }
}

impl Logger for TracingLogger {
    fn log(&self, level: Level, message: &str) {
        let subsystem = &*self.subsystem;
        // tracing macros need the level as a constant
        match level {
            Level::TRACE => tracing::trace!(subsystem, "{message}"),
            Level::DEBUG => tracing::debug!(subsystem, "{message}"),
            Level::INFO => tracing::info!(subsystem, "{message}"),
            Level::WARN => tracing::warn!(subsystem, "{message}"),
            _ => tracing::error!(subsystem, "{message}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        lines: Mutex<Vec<(Level, String)>>,
    }

    impl Logger for Recorder {
        fn log(&self, level: Level, message: &str) {
            self.lines.lock().unwrap().push((level, message.to_string()));
        }
    }

    #[test]
    fn test_default_methods_route_to_log() {
        let recorder = Recorder::default();
        recorder.info("started");
        recorder.warn("slow");
        recorder.error("failed");
        recorder.debug("detail");

        let lines = recorder.lines.lock().unwrap();
        let levels: Vec<Level> = lines.iter().map(|(l, _)| *l).collect();
        assert_eq!(levels, vec![Level::INFO, Level::WARN, Level::ERROR, Level::DEBUG]);
        assert_eq!(lines[0].1, "started");
    }

    #[test]
    fn test_noop_logger_is_silent() {
        let logger = noop_logger();
        logger.info("nothing happens");
        logger.error("still nothing");
    }

    #[test]
    fn test_tracing_logger_keeps_subsystem() {
        let logger = TracingLogger::new("apprunner");
        assert_eq!(logger.subsystem(), "apprunner");
        // No subscriber installed: events are dropped without panicking.
        logger.info("hello");
        logger.log(Level::TRACE, "fine grained");
    }
}
