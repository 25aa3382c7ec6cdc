//! Logging collaborator.
//!
//! The boundary and the request-log middleware report through a [`Logger`]
//! instead of calling `tracing` directly, so an application can route
//! pipeline events wherever it wants. [`TracingLogger`] is the default.

use std::panic::{AssertUnwindSafe, catch_unwind};

use serde_json::Value;

pub use tracing::Level;

/// Sink for pipeline log events.
///
/// Implementations must not block and must not panic; a call is
/// fire-and-forget from the pipeline's point of view.
pub trait Logger: Send + Sync + 'static {
    fn log(&self, level: Level, message: &str, context: Option<&Value>);
}

/// Calls `logger`, swallowing any panic it raises.
pub(crate) fn emit(logger: &dyn Logger, level: Level, message: &str, context: Option<&Value>) {
    let _ = catch_unwind(AssertUnwindSafe(|| logger.log(level, message, context)));
}

/// Forwards events to the active `tracing` subscriber.
///
/// The context, when present, is attached as the `context` field.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, level: Level, message: &str, context: Option<&Value>) {
        let context = context.map(Value::to_string).unwrap_or_default();
        // `tracing` needs the level at compile time.
        match level {
            Level::ERROR => tracing::error!(%context, "{message}"),
            Level::WARN => tracing::warn!(%context, "{message}"),
            Level::INFO => tracing::info!(%context, "{message}"),
            Level::DEBUG => tracing::debug!(%context, "{message}"),
            _ => tracing::trace!(%context, "{message}"),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::*;

    /// Records every event for later assertions.
    #[derive(Debug, Default)]
    pub(crate) struct RecordingLogger {
        events: Mutex<Vec<(Level, String, Option<Value>)>>,
    }

    impl RecordingLogger {
        pub(crate) fn events(&self) -> Vec<(Level, String, Option<Value>)> {
            self.events.lock().unwrap().clone()
        }
    }

    impl Logger for RecordingLogger {
        fn log(&self, level: Level, message: &str, context: Option<&Value>) {
            self.events
                .lock()
                .unwrap()
                .push((level, message.to_owned(), context.cloned()));
        }
    }
}
