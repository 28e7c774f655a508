//! Recursive watch over one root directory.
//!
//! A `WatchSession` owns the notify watcher and a pump task that turns raw
//! notify results into three streams for the dispatch loop: change events
//! (at most one per polling cycle), fatal errors, and a closed signal.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::coalescer::Coalescer;
use super::error::WatchError;
use super::event::ChangeEvent;

type RawEvent = notify::Result<notify::Event>;

/// Streams consumed by the dispatch loop.
#[derive(Debug)]
pub struct WatchStreams {
    pub events: mpsc::Receiver<ChangeEvent>,
    pub errors: mpsc::Receiver<WatchError>,
    pub closed: CancellationToken,
}

/// Feeds raw notify results into a session, exactly like the OS watcher.
///
/// Useful to trigger a dispatch without touching the filesystem.
#[derive(Debug, Clone)]
pub struct EventInjector {
    tx: mpsc::UnboundedSender<RawEvent>,
}

impl EventInjector {
    pub fn send(&self, event: notify::Event) -> Result<(), WatchError> {
        self.tx.send(Ok(event)).map_err(|_| WatchError::Closed)
    }

    pub fn send_error(&self, error: notify::Error) -> Result<(), WatchError> {
        self.tx.send(Err(error)).map_err(|_| WatchError::Closed)
    }
}

/// One active recursive watch.
pub struct WatchSession {
    root: PathBuf,
    /// The underlying file watcher, dropped on close.
    watcher: Option<RecommendedWatcher>,
    raw_tx: mpsc::UnboundedSender<RawEvent>,
    /// Taken by `start`.
    raw_rx: Option<mpsc::UnboundedReceiver<RawEvent>>,
    closed: CancellationToken,
    pump: Option<JoinHandle<()>>,
}

impl WatchSession {
    /// Establish a recursive watch on `root`.
    ///
    /// Events are buffered but not forwarded until `start` is called.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, WatchError> {
        let root = root.into();
        if root.as_os_str().is_empty() {
            return Err(WatchError::EmptyRoot);
        }

        // notify rejects missing paths but happily watches unreadable ones
        std::fs::read_dir(&root).map_err(|e| WatchError::SetupFailed {
            path: root.clone(),
            reason: e.to_string(),
        })?;

        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let tx = raw_tx.clone();
        let mut watcher = notify::recommended_watcher(move |res: RawEvent| {
            let _ = tx.send(res);
        })
        .map_err(|e| WatchError::SetupFailed {
            path: root.clone(),
            reason: e.to_string(),
        })?;

        watcher
            .watch(&root, RecursiveMode::Recursive)
            .map_err(|e| WatchError::SetupFailed {
                path: root.clone(),
                reason: e.to_string(),
            })?;

        crate::debug_event!("watch", "opened", "{}", root.display());

        Ok(Self {
            root,
            watcher: Some(watcher),
            raw_tx,
            raw_rx: Some(raw_rx),
            closed: CancellationToken::new(),
            pump: None,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_open(&self) -> bool {
        self.watcher.is_some() && !self.closed.is_cancelled()
    }

    pub fn injector(&self) -> EventInjector {
        EventInjector {
            tx: self.raw_tx.clone(),
        }
    }

    /// Start forwarding events, one per `polling_interval` at most.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&mut self, polling_interval: Duration) -> Result<WatchStreams, WatchError> {
        if !self.is_open() {
            return Err(WatchError::Closed);
        }
        let raw_rx = self.raw_rx.take().ok_or(WatchError::AlreadyStarted)?;

        // tokio::time::interval panics on a zero period
        let polling_interval = polling_interval.max(Duration::from_millis(1));

        let (events_tx, events) = mpsc::channel(1);
        let (errors_tx, errors) = mpsc::channel(1);
        let closed = self.closed.clone();

        self.pump = Some(tokio::spawn(pump(
            raw_rx,
            events_tx,
            errors_tx,
            closed.clone(),
            polling_interval,
        )));

        Ok(WatchStreams {
            events,
            errors,
            closed,
        })
    }

    /// Stop watching and signal the dispatch loop to exit.
    pub async fn close(&mut self) {
        self.closed.cancel();
        self.watcher = None;

        if let Some(pump) = self.pump.take() {
            if let Err(e) = pump.await {
                tracing::warn!("[watch] pump task failed: {e}");
            }
        }

        crate::debug_event!("watch", "closed", "{}", self.root.display());
    }

    /// Every path currently under the watch root, root included.
    pub fn watched_paths(&self) -> Vec<PathBuf> {
        walkdir::WalkDir::new(&self.root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_map(Result::ok)
            .map(walkdir::DirEntry::into_path)
            .collect()
    }
}

impl Drop for WatchSession {
    fn drop(&mut self) {
        self.closed.cancel();
    }
}

async fn pump(
    mut raw_rx: mpsc::UnboundedReceiver<RawEvent>,
    events_tx: mpsc::Sender<ChangeEvent>,
    errors_tx: mpsc::Sender<WatchError>,
    closed: CancellationToken,
    polling_interval: Duration,
) {
    let mut coalescer = Coalescer::new();
    let mut ticker = tokio::time::interval(polling_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            _ = closed.cancelled() => break,

            Some(res) = raw_rx.recv() => match res {
                Ok(event) => {
                    if let Some(change) = ChangeEvent::from_notify(&event) {
                        if !coalescer.record(change) {
                            crate::debug_event!("watch", "coalesced", "{:?}", event.kind);
                        }
                    }
                }
                Err(e) => {
                    if errors_tx.try_send(WatchError::from(e)).is_err() {
                        crate::debug_event!("watch", "error already pending");
                    }
                }
            },

            _ = ticker.tick() => {
                if let Some(change) = coalescer.take_ready() {
                    match events_tx.try_send(change) {
                        Ok(()) => {}
                        Err(TrySendError::Full(change)) => {
                            crate::debug_event!("watch", "dropped", "{change}");
                        }
                        Err(TrySendError::Closed(_)) => break,
                    }
                }
            }
        }
    }

    crate::debug_event!(
        "watch",
        "pump stopped",
        "{} events coalesced",
        coalescer.coalesced_count()
    );
}
