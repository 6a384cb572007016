//! Task state snapshot format.
//!
//! The whole task store is written as one binary blob so it can be restored
//! after a failover. Every length and count prefix is a little-endian `u32`.
//!
//! # Layout
//!
//! ```text
//! [len | framework id utf8]
//! [count] ([len | task id])*
//! [count] ([len | task record])*
//! [count] ([len | task id])*      pending
//! [count] ([len | task id])*      staging
//! [count] ([len | task id])*      active
//! [count] ([len | task id])*      lost
//! [count] ([len | task id])*      killable
//! ```
//!
//! Records are paired with IDs by position. A record is a fixed sequence of
//! length-prefixed slots:
//!
//! ```text
//! [len | profile json]
//! [constraint tag u32] [len | constraint json]
//! [len | hostname]
//! [len | agent id]
//! [len | status blob]
//! [len | executor blob]
//! [len | task type]
//! ```
//!
//! Every slot is always written, zero-length when absent, so the read order
//! never drifts. An empty input decodes to an empty snapshot.

mod codec;
mod error;
mod snapshot;

pub use error::StateFormatError;
pub use snapshot::StateSnapshot;
