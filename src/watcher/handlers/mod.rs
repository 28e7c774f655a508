//! Handler implementations for the dispatch engine.

mod log;
mod sync;

pub use log::LogHandler;
pub use sync::SyncHandler;
