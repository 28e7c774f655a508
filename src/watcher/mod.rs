//! Watch-and-dispatch engine.
//!
//! This module watches one root directory and fans each change event out to
//! every registered handler, concurrently.
//!
//! # Architecture
//!
//! ```text
//! notify watcher
//!   -> WatchSession (pump + Coalescer, one event per polling cycle)
//!   -> DispatchEngine (one DispatchContext per event)
//!         |
//!    +---------+---------+
//!    |         |         |
//! SyncHandler LogHandler  ...   (one task per handler, tracked by
//!                                CompletionTracker until done)
//! ```

mod coalescer;
mod engine;
mod error;
mod event;
mod handler;
pub mod handlers;
mod registry;
mod session;

pub use coalescer::Coalescer;
pub use engine::DispatchEngine;
pub use error::{EngineError, HandlerError, WatchError};
pub use event::{ChangeEvent, Op};
pub use handler::{CompletionSignal, CompletionTracker, DispatchContext, Handler};
pub use registry::HandlerRegistry;
pub use session::{EventInjector, WatchSession, WatchStreams};
