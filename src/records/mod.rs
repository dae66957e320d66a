//! Ticket persistence.
//!
//! Tickets live in an in-memory index rebuilt on open from an append-only
//! log of mutations.

mod index;
mod log;

pub use index::RecordIndex;
pub use log::{LogEntry, Mutation, RecordLog};
