//! Dispatch engine: watch lifecycle plus fan-out of each change event to
//! every registered handler.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use super::error::{EngineError, WatchError};
use super::event::ChangeEvent;
use super::handler::{CompletionTracker, DispatchContext, Handler};
use super::registry::HandlerRegistry;
use super::session::{EventInjector, WatchSession, WatchStreams};

/// Watches a root directory and fans every change out to all handlers.
///
/// Lifecycle: `new` → `register`* → `start` → `stop`. Each event gets one
/// fresh [`DispatchContext`] shared by the invocations it triggers, and each
/// invocation runs on its own task. Overlapping events are not serialized.
pub struct DispatchEngine {
    session: WatchSession,
    registry: HandlerRegistry,
    /// Parent of every dispatch context; cancelled by `stop`.
    root_ctx: CancellationToken,
    /// Outstanding completion signals.
    completions: CompletionTracker,
    /// Spawned invocation tasks, so their outcome is recorded before `stop` returns.
    tasks: TaskTracker,
    last_errors: Arc<DashMap<String, String>>,
    invocations: Arc<AtomicU64>,
    dispatch: Option<JoinHandle<Result<(), WatchError>>>,
    started: bool,
}

impl DispatchEngine {
    /// Create an engine with a recursive watch on `root`.
    ///
    /// Fails with [`WatchError::EmptyRoot`] for an empty path and
    /// [`WatchError::SetupFailed`] when the watch cannot be established.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, WatchError> {
        let session = WatchSession::open(root.as_ref())?;

        Ok(Self {
            session,
            registry: HandlerRegistry::new(),
            root_ctx: CancellationToken::new(),
            completions: CompletionTracker::new(),
            tasks: TaskTracker::new(),
            last_errors: Arc::new(DashMap::new()),
            invocations: Arc::new(AtomicU64::new(0)),
            dispatch: None,
            started: false,
        })
    }

    pub fn root(&self) -> &Path {
        self.session.root()
    }

    /// Register a handler, replacing any handler with the same name.
    ///
    /// Returns the replaced handler. Registration is closed once the engine
    /// has started.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        handler: impl Handler + 'static,
    ) -> Result<Option<Arc<dyn Handler>>, EngineError> {
        self.register_arc(name, Arc::new(handler))
    }

    /// Register a shared handler.
    pub fn register_arc(
        &mut self,
        name: impl Into<String>,
        handler: Arc<dyn Handler>,
    ) -> Result<Option<Arc<dyn Handler>>, EngineError> {
        if self.started {
            return Err(EngineError::AlreadyStarted);
        }

        let name = name.into();
        let replaced = self.registry.insert(name.clone(), handler);
        if replaced.is_some() {
            tracing::warn!("[engine] handler '{name}' replaced");
        } else {
            crate::debug_event!("engine", "registered", "{name}");
        }
        Ok(replaced)
    }

    /// Names of the registered handlers, sorted.
    pub fn list_handlers(&self) -> Vec<String> {
        self.registry.names()
    }

    /// Start polling for events every `polling_interval`.
    ///
    /// Returns immediately; the dispatch loop runs on its own task. Must be
    /// called from within a tokio runtime.
    pub fn start(&mut self, polling_interval: Duration) -> Result<(), EngineError> {
        if self.started {
            return Err(EngineError::AlreadyStarted);
        }

        let streams = self.session.start(polling_interval)?;
        self.started = true;

        if self.registry.is_empty() {
            tracing::warn!("[engine] no handlers registered - events will be ignored");
        }

        let dispatcher = Dispatcher {
            registry: Arc::new(self.registry.clone()),
            root_ctx: self.root_ctx.clone(),
            completions: self.completions.clone(),
            tasks: self.tasks.clone(),
            last_errors: Arc::clone(&self.last_errors),
            invocations: Arc::clone(&self.invocations),
        };
        self.dispatch = Some(tokio::spawn(dispatcher.run(streams)));

        crate::log_event!(
            "engine",
            "started",
            "watching {} every {:?} with {} handlers",
            self.session.root().display(),
            polling_interval,
            self.registry.len()
        );
        Ok(())
    }

    /// Wait for the dispatch loop to exit.
    ///
    /// Resolves with the fatal watch error if that is what ended the loop.
    /// A broken watch is unrecoverable; callers are expected to terminate.
    pub async fn wait(&mut self) -> Result<(), EngineError> {
        if !self.started {
            return Err(EngineError::NotStarted);
        }
        let Some(handle) = self.dispatch.as_mut() else {
            return Ok(());
        };

        let result = handle.await;
        self.dispatch = None;

        match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(EngineError::Watch(e)),
            Err(e) => Err(EngineError::DispatchLoop {
                reason: e.to_string(),
            }),
        }
    }

    /// Cancel every dispatch context, close the watch and wait for all
    /// in-flight invocations to complete.
    ///
    /// Cancellation is cooperative: a handler that ignores its context
    /// delays this call until it finishes.
    pub async fn stop(&mut self) {
        crate::log_event!(
            "engine",
            "stopping",
            "{} invocations in flight",
            self.completions.in_flight()
        );

        self.root_ctx.cancel();
        self.session.close().await;

        if let Some(handle) = self.dispatch.take() {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!("[engine] dispatch loop ended with: {e}"),
                Err(e) => tracing::warn!("[engine] dispatch loop panicked: {e}"),
            }
        }

        self.completions.wait().await;
        self.tasks.close();
        self.tasks.wait().await;

        crate::log_event!("engine", "stopped");
    }

    /// Handle for feeding raw notify events into this engine's watch.
    pub fn injector(&self) -> EventInjector {
        self.session.injector()
    }

    /// Most recent error reported by the named handler.
    pub fn last_error(&self, name: &str) -> Option<String> {
        self.last_errors.get(name).map(|e| e.value().clone())
    }

    /// Total handler invocations spawned so far.
    pub fn invocation_count(&self) -> u64 {
        self.invocations.load(Ordering::Relaxed)
    }

    /// Invocations that have not signalled completion yet.
    pub fn in_flight(&self) -> usize {
        self.completions.in_flight()
    }

    /// Every path currently under the watch root.
    pub fn watched_paths(&self) -> Vec<PathBuf> {
        self.session.watched_paths()
    }
}

impl Drop for DispatchEngine {
    fn drop(&mut self) {
        self.root_ctx.cancel();
    }
}

/// State moved into the dispatch loop task.
struct Dispatcher {
    registry: Arc<HandlerRegistry>,
    root_ctx: CancellationToken,
    completions: CompletionTracker,
    tasks: TaskTracker,
    last_errors: Arc<DashMap<String, String>>,
    invocations: Arc<AtomicU64>,
}

impl Dispatcher {
    async fn run(self, mut streams: WatchStreams) -> Result<(), WatchError> {
        loop {
            tokio::select! {
                biased;

                _ = streams.closed.cancelled() => {
                    crate::debug_event!("engine", "watch closed");
                    return Ok(());
                }

                Some(err) = streams.errors.recv() => {
                    tracing::error!("[engine] fatal watch error: {err}");
                    return Err(err);
                }

                event = streams.events.recv() => match event {
                    Some(event) => self.dispatch(event),
                    None => return Ok(()),
                }
            }
        }
    }

    fn dispatch(&self, event: ChangeEvent) {
        let ctx = DispatchContext::child_of(&self.root_ctx);
        let event = Arc::new(event);

        crate::debug_event!(
            "engine",
            "dispatch",
            "{event} -> {} handlers",
            self.registry.len()
        );

        for (name, handler) in self.registry.iter() {
            let done = self.completions.signal();
            self.invocations.fetch_add(1, Ordering::Relaxed);

            let name = name.to_string();
            let handler = Arc::clone(handler);
            let ctx = ctx.clone();
            let event = Arc::clone(&event);
            let last_errors = Arc::clone(&self.last_errors);

            self.tasks.spawn(async move {
                if let Err(e) = handler.handle(&ctx, &event, done).await {
                    tracing::error!("[{name}] handler error: {e}");
                    last_errors.insert(name, e.to_string());
                }
            });
        }
    }
}
