//! Handler trait and the per-invocation plumbing handed to it.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tokio_util::task::task_tracker::TaskTrackerToken;

use super::error::HandlerError;
use super::event::ChangeEvent;

/// Cancellation handle shared by all invocations triggered by one event.
///
/// Cancellation is advisory: handlers check it before starting expensive
/// work, nothing is interrupted.
#[derive(Debug, Clone, Default)]
pub struct DispatchContext {
    token: CancellationToken,
}

impl DispatchContext {
    /// A context not tied to any engine.
    pub fn new() -> Self {
        Self::default()
    }

    /// A context cancelled together with `parent`.
    pub(crate) fn child_of(parent: &CancellationToken) -> Self {
        Self {
            token: parent.child_token(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the context is cancelled.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }
}

/// Counts in-flight handler invocations across the engine's lifetime.
#[derive(Debug, Clone, Default)]
pub struct CompletionTracker {
    tracker: TaskTracker,
}

impl CompletionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve a slot for one invocation.
    ///
    /// The slot is held until the returned signal is completed or dropped.
    pub fn signal(&self) -> CompletionSignal {
        CompletionSignal {
            _token: self.tracker.token(),
        }
    }

    /// Invocations that have not signalled completion yet.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Wait until every reserved slot is released.
    pub async fn wait(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }
}

/// Completion signal for one handler invocation.
///
/// Consumed by [`CompletionSignal::done`]. Dropping it has the same effect,
/// so a handler that returns early or panics still releases its slot.
#[must_use = "handlers must signal completion"]
#[derive(Debug)]
pub struct CompletionSignal {
    _token: TaskTrackerToken,
}

impl CompletionSignal {
    pub fn done(self) {}
}

/// Unit of work invoked once per dispatched change event.
///
/// Contract:
/// - `done` must be completed exactly once, whatever the outcome.
/// - If `ctx` is already cancelled when the invocation begins, skip the
///   work, still complete `done`, and return `Ok(())`.
/// - Neither `ctx` nor `event` outlives the invocation.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(
        &self,
        ctx: &DispatchContext,
        event: &ChangeEvent,
        done: CompletionSignal,
    ) -> Result<(), HandlerError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_tracker_counts_signals() {
        let tracker = CompletionTracker::new();
        assert_eq!(tracker.in_flight(), 0);

        let first = tracker.signal();
        let second = tracker.signal();
        assert_eq!(tracker.in_flight(), 2);

        first.done();
        assert_eq!(tracker.in_flight(), 1);

        drop(second);
        assert_eq!(tracker.in_flight(), 0);

        tokio::time::timeout(Duration::from_secs(1), tracker.wait())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_tracker_wait_blocks_until_done() {
        let tracker = CompletionTracker::new();
        let signal = tracker.signal();

        let pending = tokio::time::timeout(Duration::from_millis(50), tracker.wait()).await;
        assert!(pending.is_err());

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            signal.done();
        });

        tokio::time::timeout(Duration::from_secs(1), tracker.wait())
            .await
            .unwrap();
    }

    #[test]
    fn test_child_contexts_follow_parent() {
        let root = CancellationToken::new();
        let first = DispatchContext::child_of(&root);
        let second = DispatchContext::child_of(&root);

        first.cancel();
        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());
        assert!(!root.is_cancelled());

        root.cancel();
        assert!(second.is_cancelled());

        // Created after the parent was cancelled
        assert!(DispatchContext::child_of(&root).is_cancelled());
    }
}
