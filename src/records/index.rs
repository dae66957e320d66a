//! In-memory ticket tables.
//!
//! Holds the current value of every non-purged ticket plus two secondary
//! structures: the unique `client_id` index and, per owner, the set of
//! `(sort_key, id)` positions that backs ordered range scans.

use crate::error::{Result, TicketError};
use crate::pagination::{ListFilter, SortPosition};
use crate::types::{OwnerId, Ticket, TicketId};
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};
use std::ops::Bound;

#[derive(Default)]
struct Tables {
    /// Ticket ID to ticket.
    tickets: HashMap<TicketId, Ticket>,

    /// Client id to ticket ID. Spans all owners.
    client_ids: HashMap<String, TicketId>,

    /// Owner to positions of that owner's tickets.
    by_owner: HashMap<OwnerId, BTreeSet<SortPosition>>,

    /// Next ticket ID to assign.
    next_id: u64,
}

/// Index over live tickets.
pub struct RecordIndex {
    tables: RwLock<Tables>,
}

impl Default for RecordIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables {
                next_id: 1,
                ..Tables::default()
            }),
        }
    }

    /// ID the next created ticket will get.
    pub fn next_id(&self) -> TicketId {
        TicketId(self.tables.read().next_id)
    }

    /// Raise the id watermark. Never lowers it.
    pub fn raise_watermark(&self, next_id: u64) {
        let mut tables = self.tables.write();
        tables.next_id = tables.next_id.max(next_id);
    }

    /// Fail with `Conflict` if `client_id` is taken.
    pub fn check_unique(&self, client_id: &str) -> Result<()> {
        if self.tables.read().client_ids.contains_key(client_id) {
            return Err(TicketError::Conflict {
                client_id: client_id.to_string(),
            });
        }
        Ok(())
    }

    /// Insert a new ticket, enforcing id and client id uniqueness.
    pub fn create(&self, ticket: Ticket) -> Result<()> {
        let mut tables = self.tables.write();

        if tables.client_ids.contains_key(&ticket.client_id) {
            return Err(TicketError::Conflict {
                client_id: ticket.client_id,
            });
        }
        if tables.tickets.contains_key(&ticket.id) {
            return Err(TicketError::Corruption(format!(
                "duplicate ticket id {}",
                ticket.id
            )));
        }

        tables.next_id = tables.next_id.max(ticket.id.0 + 1);
        tables.client_ids.insert(ticket.client_id.clone(), ticket.id);
        tables
            .by_owner
            .entry(ticket.owner)
            .or_default()
            .insert(SortPosition::of(&ticket));
        tables.tickets.insert(ticket.id, ticket);
        Ok(())
    }

    /// Get a ticket by ID regardless of owner.
    pub fn get(&self, id: TicketId) -> Option<Ticket> {
        self.tables.read().tickets.get(&id).cloned()
    }

    /// Get a ticket only if `owner` owns it.
    pub fn get_for_owner(&self, id: TicketId, owner: OwnerId) -> Option<Ticket> {
        self.tables
            .read()
            .tickets
            .get(&id)
            .filter(|t| t.owner == owner)
            .cloned()
    }

    /// Replace the stored fields of an existing ticket.
    ///
    /// `owner`, `client_id` and `created_at` are kept from the stored copy.
    /// Returns the previous value.
    pub fn update_fields(&self, mut ticket: Ticket) -> Result<Ticket> {
        let mut tables = self.tables.write();

        let previous = tables
            .tickets
            .get(&ticket.id)
            .cloned()
            .ok_or(TicketError::NotFound(ticket.id))?;

        ticket.owner = previous.owner;
        ticket.client_id = previous.client_id.clone();
        ticket.created_at = previous.created_at;

        let old_pos = SortPosition::of(&previous);
        let new_pos = SortPosition::of(&ticket);
        if old_pos != new_pos {
            if let Some(positions) = tables.by_owner.get_mut(&ticket.owner) {
                positions.remove(&old_pos);
                positions.insert(new_pos);
            }
        }

        tables.tickets.insert(ticket.id, ticket);
        Ok(previous)
    }

    /// Modify a ticket in place. Must not change its sort position.
    pub fn modify<F>(&self, id: TicketId, f: F) -> Result<Ticket>
    where
        F: FnOnce(&mut Ticket),
    {
        let mut tables = self.tables.write();
        let ticket = tables
            .tickets
            .get_mut(&id)
            .ok_or(TicketError::NotFound(id))?;
        let before = SortPosition::of(ticket);
        f(ticket);
        debug_assert_eq!(before, SortPosition::of(ticket));
        Ok(ticket.clone())
    }

    /// Physically remove a ticket. Its client id is released.
    pub fn hard_delete(&self, id: TicketId) -> Option<Ticket> {
        let mut tables = self.tables.write();
        let ticket = tables.tickets.remove(&id)?;
        tables.client_ids.remove(&ticket.client_id);
        if let Some(positions) = tables.by_owner.get_mut(&ticket.owner) {
            positions.remove(&SortPosition::of(&ticket));
            if positions.is_empty() {
                tables.by_owner.remove(&ticket.owner);
            }
        }
        Some(ticket)
    }

    /// Up to `limit` of `owner`'s tickets matching `filter`, in
    /// `(sort_key DESC, id DESC)` order, strictly after `after` when given.
    pub fn range_query(
        &self,
        owner: OwnerId,
        filter: &ListFilter,
        after: Option<SortPosition>,
        limit: usize,
    ) -> Vec<Ticket> {
        let tables = self.tables.read();
        let Some(positions) = tables.by_owner.get(&owner) else {
            return Vec::new();
        };

        let upper = match after {
            Some(pos) => Bound::Excluded(pos),
            None => Bound::Unbounded,
        };

        positions
            .range((Bound::Unbounded, upper))
            .rev()
            .filter_map(|pos| tables.tickets.get(&pos.id))
            .filter(|t| filter.matches(t))
            .take(limit)
            .cloned()
            .collect()
    }

    /// Number of `owner`'s tickets matching `filter`.
    pub fn count_matching(&self, owner: OwnerId, filter: &ListFilter) -> u64 {
        let tables = self.tables.read();
        tables.by_owner.get(&owner).map_or(0, |positions| {
            positions
                .iter()
                .filter_map(|pos| tables.tickets.get(&pos.id))
                .filter(|t| filter.matches(t))
                .count() as u64
        })
    }

    /// All tickets, ordered by ID.
    pub fn all(&self) -> Vec<Ticket> {
        let tables = self.tables.read();
        let mut tickets: Vec<_> = tables.tickets.values().cloned().collect();
        tickets.sort_by_key(|t| t.id);
        tickets
    }

    /// Get count of tickets.
    pub fn count(&self) -> usize {
        self.tables.read().tickets.len()
    }
}
