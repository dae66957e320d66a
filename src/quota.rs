//! Per-owner ticket and photo counters.
//!
//! `total` is informational. Only `with_photo` against `photo_quota` gates
//! creation, and only for requests that carry a photo.

use crate::types::{OwnerId, QuotaUsage};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Default cap on tickets with a photo, per owner.
pub const DEFAULT_PHOTO_QUOTA: u32 = 100;

#[derive(Clone, Copy, Debug, Default)]
struct Counters {
    total: u64,
    with_photo: u64,
    /// Owner-specific override of the default quota.
    photo_quota: Option<u32>,
}

/// Tracks quota counters for every owner.
///
/// Counters are derived from the mutation log: the store applies the same
/// counter changes when writing a mutation and when replaying it.
pub struct QuotaTracker {
    default_photo_quota: u32,
    owners: RwLock<HashMap<OwnerId, Counters>>,
}

impl QuotaTracker {
    pub fn new(default_photo_quota: u32) -> Self {
        Self {
            default_photo_quota,
            owners: RwLock::new(HashMap::new()),
        }
    }

    /// Whether `owner` may add one more ticket with a photo.
    pub fn check_can_add_photo(&self, owner: OwnerId) -> bool {
        let usage = self.usage(owner);
        usage.with_photo < u64::from(usage.photo_quota)
    }

    /// Account for a newly created ticket.
    pub fn on_create(&self, owner: OwnerId, has_photo: bool) {
        let mut owners = self.owners.write();
        let counters = owners.entry(owner).or_default();
        counters.total += 1;
        if has_photo {
            counters.with_photo += 1;
        }
    }

    /// Account for a purged ticket. Counters never go below zero.
    pub fn on_purge(&self, owner: OwnerId, had_photo: bool) {
        let mut owners = self.owners.write();
        let counters = owners.entry(owner).or_default();
        counters.total = counters.total.saturating_sub(1);
        if had_photo {
            counters.with_photo = counters.with_photo.saturating_sub(1);
        }
    }

    /// Account for a photo being attached to or removed from a ticket.
    pub fn on_photo_change(&self, owner: OwnerId, had_photo: bool, has_photo: bool) {
        if had_photo == has_photo {
            return;
        }
        let mut owners = self.owners.write();
        let counters = owners.entry(owner).or_default();
        if has_photo {
            counters.with_photo += 1;
        } else {
            counters.with_photo = counters.with_photo.saturating_sub(1);
        }
    }

    /// Override the photo quota for one owner.
    pub fn set_photo_quota(&self, owner: OwnerId, quota: u32) {
        self.owners.write().entry(owner).or_default().photo_quota = Some(quota);
    }

    /// Current counters for `owner`.
    pub fn usage(&self, owner: OwnerId) -> QuotaUsage {
        let counters = self.owners.read().get(&owner).copied().unwrap_or_default();
        QuotaUsage {
            total: counters.total,
            with_photo: counters.with_photo,
            photo_quota: counters.photo_quota.unwrap_or(self.default_photo_quota),
        }
    }

    /// Owners with an explicit quota override.
    pub fn quota_overrides(&self) -> Vec<(OwnerId, u32)> {
        let mut overrides: Vec<_> = self
            .owners
            .read()
            .iter()
            .filter_map(|(owner, c)| c.photo_quota.map(|q| (*owner, q)))
            .collect();
        overrides.sort();
        overrides
    }

    /// Number of owners with any counter state.
    pub fn owner_count(&self) -> usize {
        self.owners.read().len()
    }
}
