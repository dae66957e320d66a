//! Ticket lifecycle: active, trashed (recycle bin) and purged.
//!
//! ```text
//!   create ──▶ Active ──delete──▶ Trashed ──purge──▶ (removed)
//!                ▲                   │
//!                └─────restore───────┘
//! ```
//!
//! Purged tickets are physically removed, so `LifecycleState` only names the
//! two queryable states. A transition whose guard fails is reported as
//! `NotFound` by the store, the same as a missing ticket.

use crate::types::{Ticket, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Queryable lifecycle state of a stored ticket.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    #[default]
    Active,
    Trashed,
}

impl LifecycleState {
    /// The state a `trashed` list filter selects.
    pub fn for_trash_filter(trashed: bool) -> Self {
        if trashed {
            LifecycleState::Trashed
        } else {
            LifecycleState::Active
        }
    }

    pub fn is_trashed(&self) -> bool {
        matches!(self, LifecycleState::Trashed)
    }
}

/// State-changing events.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Transition {
    /// Move an active ticket to the recycle bin.
    Delete,
    /// Bring a trashed ticket back.
    Restore,
    /// Permanently remove a trashed ticket.
    Purge,
}

impl Transition {
    /// State the ticket must be in for this transition.
    pub fn required_state(&self) -> LifecycleState {
        match self {
            Transition::Delete => LifecycleState::Active,
            Transition::Restore | Transition::Purge => LifecycleState::Trashed,
        }
    }

    /// Resulting state, or `None` when the ticket leaves the store.
    pub fn target_state(&self) -> Option<LifecycleState> {
        match self {
            Transition::Delete => Some(LifecycleState::Trashed),
            Transition::Restore => Some(LifecycleState::Active),
            Transition::Purge => None,
        }
    }

    /// Guard: whether the transition may fire from `state`.
    pub fn permits(&self, state: LifecycleState) -> bool {
        state == self.required_state()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Transition::Delete => "delete",
            Transition::Restore => "restore",
            Transition::Purge => "purge",
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Move a ticket to the recycle bin.
pub(crate) fn mark_trashed(ticket: &mut Ticket, at: Timestamp) {
    ticket.state = LifecycleState::Trashed;
    ticket.trashed_at = Some(at);
    ticket.updated_at = at;
}

/// Bring a ticket back from the recycle bin.
pub(crate) fn mark_restored(ticket: &mut Ticket, at: Timestamp) {
    ticket.state = LifecycleState::Active;
    ticket.trashed_at = None;
    ticket.updated_at = at;
}
