//! # flex-id
//!
//! Typed identifiers for the flex scheduler.
//!
//! ## Design Principles
//!
//! - Identifiers handed to us by the offer source (offers, agents, the
//!   framework, executors) are opaque: we never parse their contents
//! - Identifiers are typed so an `OfferId` can never be passed where an
//!   `AgentId` is expected
//! - Task identifiers are generated locally and carry their task type
//!
//! ## Task ID Format
//!
//! Task IDs use a dotted format: `{task_type}.{profile}.{uuid}`
//!
//! Examples:
//! - `nm.medium.2f6c9b0e-8a51-4d3f-9a57-1f0c2a4d8e11`
//! - `jobhistory.small.7b1e02f4-33c1-4f1e-b1f4-9d5d0c7a6e2a`
//!
//! The leading segment groups tasks by type, which placement uses to keep
//! at most one task of a type per host.

mod error;
mod macros;
mod types;

pub use error::IdError;
pub use types::*;
