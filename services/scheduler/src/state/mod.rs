//! Task lifecycle state and its persistence.
//!
//! This module provides:
//! - The task store: task records plus the five lifecycle sets
//! - The durable blob seam the store snapshots into after every mutation
//!
//! The snapshot write is best-effort. A failure is logged and the in-memory
//! state stays authoritative; the next mutation tries again.

mod lifecycle;
mod store;

pub use lifecycle::TaskLifecycleStore;
pub use store::{MemoryStateStore, StateStore, StoreError};
