//! Diagnostic handler that only logs the events it receives.

use async_trait::async_trait;

use crate::watcher::{ChangeEvent, CompletionSignal, DispatchContext, Handler, HandlerError};

/// Logs every event. No side effects.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogHandler;

impl LogHandler {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Handler for LogHandler {
    async fn handle(
        &self,
        _ctx: &DispatchContext,
        event: &ChangeEvent,
        done: CompletionSignal,
    ) -> Result<(), HandlerError> {
        crate::log_event!(
            "stub",
            "event",
            "'{}' at path '{}' received at {}",
            event.op(),
            event.path().display(),
            event.timestamp().format("%Y-%m-%d %H:%M:%S%.3f")
        );
        done.done();
        Ok(())
    }
}
