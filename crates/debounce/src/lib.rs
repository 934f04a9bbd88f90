//! Debounce State Tracking
//!
//! Records when a fault condition was first observed true, so rules can
//! require a condition to hold continuously for a minimum span before it
//! counts. State survives process restarts through a pluggable store;
//! every mutation is flushed before the caller proceeds.

mod store;
mod tracker;

pub use store::{DebounceStore, FileStore, MemoryStore, StoreError};
pub use tracker::{DebounceKey, DebounceTracker};
