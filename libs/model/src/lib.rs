//! # flex-model
//!
//! Shared types for the flex scheduler.
//!
//! ## Offers
//!
//! A [`ResourceOffer`] is a time-bounded grant of one host's resources. Each
//! [`Resource`] entry is either a scalar (`cpus`, `mem`) or a list of ranges
//! (`ports`), optionally tagged with the reservation role it belongs to.
//!
//! ## Tasks
//!
//! A [`Task`] records what to launch ([`ResourceProfile`], [`Constraint`]) and
//! where it ended up (host, agent, executor). Lifecycle membership is tracked
//! by the scheduler's task store, not by the record itself.
//!
//! ## Constraints
//!
//! A [`Constraint`] is a closed set of placement predicates. Today only
//! `LIKE` exists: `<attribute> LIKE <regex>`, matched against the offer's
//! hostname or one of its agent attributes.

mod constraint;
mod error;
mod launch;
mod offer;
mod profile;
mod signal;
mod task;

pub use constraint::*;
pub use error::ModelError;
pub use launch::*;
pub use offer::*;
pub use profile::*;
pub use signal::*;
pub use task::*;
