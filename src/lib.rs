//! # Ticketbook
//!
//! A durable store for a personal collection of ticket stubs: films, shows,
//! exhibitions, trains, flights and scenic spots.
//!
//! ## Core Concepts
//!
//! - **Tickets**: Owner-scoped records, unique per client-supplied id
//! - **Recycle bin**: Delete trashes a ticket; restore or purge it later
//! - **Quota**: Each owner may keep a bounded number of tickets with photos
//! - **Pages**: Newest-first lists walked with opaque cursors
//!
//! ## Example
//!
//! ```ignore
//! use ticketbook::{Category, ListFilter, ListQuery, NewTicket, OwnerId, Store, StoreConfig};
//!
//! let store = Store::open_or_create(StoreConfig {
//!     path: "./tickets".into(),
//!     ..Default::default()
//! })?;
//!
//! let owner = OwnerId(7);
//! let ticket = store.create_ticket(
//!     owner,
//!     NewTicket::new("c-001", "Dune: Part Two", Category::Movie)
//!         .with_occurs_at("2024-03-08T19:30:00Z")
//!         .with_tags(["imax"]),
//! )?;
//!
//! let page = store.list_tickets(owner, &ListQuery::new(ListFilter::active()))?;
//! store.delete_ticket(owner, ticket.id)?;
//! ```

pub mod error;
pub mod lifecycle;
pub mod pagination;
pub mod patch;
pub mod quota;
pub mod records;
pub mod store;
pub mod tags;
pub mod types;

// Re-exports
pub use error::{ErrorKind, Result, TicketError};
pub use lifecycle::{LifecycleState, Transition};
pub use pagination::{effective_limit, Cursor, ListFilter, ListQuery, Page, DEFAULT_LIMIT, MAX_LIMIT};
pub use patch::{Patch, TicketPatch};
pub use quota::{QuotaTracker, DEFAULT_PHOTO_QUOTA};
pub use records::{LogEntry, Mutation, RecordIndex, RecordLog};
pub use store::{Store, StoreConfig};
pub use tags::{TagSet, MAX_TAG_LEN};
pub use types::*;
