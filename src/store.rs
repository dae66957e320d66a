//! Main Store struct tying all components together.

use crate::error::{Result, TicketError};
use crate::lifecycle::{mark_restored, mark_trashed, Transition};
use crate::pagination::{assemble_page, effective_limit, ListQuery, Page};
use crate::patch::TicketPatch;
use crate::quota::{QuotaTracker, DEFAULT_PHOTO_QUOTA};
use crate::records::{Mutation, RecordIndex, RecordLog};
use crate::tags::TagSet;
use crate::types::{
    has_photo_ref, NewTicket, OwnerId, QuotaUsage, StoreStats, Ticket, TicketId, Timestamp,
};
use fs2::FileExt;
use parking_lot::Mutex;
use serde::Deserialize;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Store configuration.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Base path for the store.
    pub path: PathBuf,

    /// Whether to create the store if it doesn't exist.
    pub create_if_missing: bool,

    /// Photo quota for owners without an explicit override.
    pub default_photo_quota: u32,

    /// Sync the log to disk every N mutations.
    pub sync_interval: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./tickets"),
            create_if_missing: true,
            default_photo_quota: DEFAULT_PHOTO_QUOTA,
            sync_interval: RecordLog::DEFAULT_SYNC_INTERVAL,
        }
    }
}

impl StoreConfig {
    /// Load a configuration from a JSON file. Missing keys take defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        serde_json::from_str(&text)
            .map_err(|e| TicketError::InvalidFormat(format!("store config: {e}")))
    }
}

/// Magic bytes for store manifest.
const STORE_MAGIC: &[u8; 4] = b"TKS\0";

/// Current store format version.
const STORE_VERSION: u8 = 1;

/// Log file name inside the store directory.
const LOG_FILE: &str = "tickets.log";

/// The ticket store.
///
/// Provides a unified interface for:
/// - Creating, reading and editing tickets
/// - Moving tickets through the recycle bin
/// - Listing tickets page by page
/// - Per-owner photo quotas
///
/// `Store` is `Sync`; share it between request threads with `Arc`.
/// Mutations are serialized by a single write lock. Each one is validated,
/// appended to the log and applied to the in-memory tables inside that
/// lock, so guards and writes never race.
pub struct Store {
    /// Store configuration.
    config: StoreConfig,

    /// Lock file for exclusive access.
    _lock_file: File,

    /// Mutation log.
    log: RecordLog,

    /// Live tickets.
    index: RecordIndex,

    /// Per-owner counters.
    quota: QuotaTracker,

    /// Lock for write operations to ensure atomicity.
    write_lock: Mutex<()>,
}

impl Store {
    /// Open an existing store or create a new one.
    pub fn open_or_create(config: StoreConfig) -> Result<Self> {
        if config.path.join("MANIFEST").exists() {
            Self::open(config)
        } else if config.create_if_missing {
            Self::create(config)
        } else {
            Err(TicketError::NotInitialized)
        }
    }

    /// Create a new store.
    pub fn create(config: StoreConfig) -> Result<Self> {
        fs::create_dir_all(&config.path)?;
        let lock_file = Self::acquire_lock(&config.path)?;

        // The manifest is written last: a refused create leaves none behind
        let (log, entries) = RecordLog::open(config.path.join(LOG_FILE), config.sync_interval)?;
        if !entries.is_empty() {
            return Err(TicketError::InvalidFormat(
                "refusing to create a store over an existing log".into(),
            ));
        }
        Self::write_manifest(&config.path)?;

        info!(path = %config.path.display(), "created ticket store");

        Ok(Self {
            quota: QuotaTracker::new(config.default_photo_quota),
            config,
            _lock_file: lock_file,
            log,
            index: RecordIndex::new(),
            write_lock: Mutex::new(()),
        })
    }

    /// Open an existing store, replaying its log.
    pub fn open(config: StoreConfig) -> Result<Self> {
        if !config.path.join("MANIFEST").exists() {
            return Err(TicketError::NotInitialized);
        }
        Self::verify_manifest(&config.path)?;
        let lock_file = Self::acquire_lock(&config.path)?;

        let (log, entries) = RecordLog::open(config.path.join(LOG_FILE), config.sync_interval)?;

        let store = Self {
            quota: QuotaTracker::new(config.default_photo_quota),
            config,
            _lock_file: lock_file,
            log,
            index: RecordIndex::new(),
            write_lock: Mutex::new(()),
        };

        for entry in &entries {
            store.apply(&entry.mutation).map_err(|e| {
                TicketError::Corruption(format!("log entry {} does not replay: {e}", entry.seq))
            })?;
        }

        info!(
            path = %store.config.path.display(),
            entries = entries.len(),
            tickets = store.index.count(),
            "opened ticket store"
        );

        Ok(store)
    }

    // --- Ticket Operations ---

    /// Create a ticket for `owner`.
    ///
    /// Fails with `Conflict` if the client id exists anywhere in the store,
    /// and with `QuotaExceeded` if the ticket has a photo and the owner's
    /// photo quota is used up. A failed create changes nothing.
    pub fn create_ticket(&self, owner: OwnerId, input: NewTicket) -> Result<Ticket> {
        input.validate()?;
        let tags = TagSet::from_labels(&input.tags)?;
        let client_id = input.client_id.trim().to_string();

        let _lock = self.write_lock.lock();

        self.index.check_unique(&client_id)?;

        let has_photo = has_photo_ref(input.photo.as_deref());
        if has_photo && !self.quota.check_can_add_photo(owner) {
            return Err(TicketError::QuotaExceeded {
                owner,
                quota: self.quota.usage(owner).photo_quota,
            });
        }

        let now = Timestamp::now();
        let occurs_at = input.occurs_at.as_deref().and_then(|raw| {
            let parsed = Timestamp::parse_rfc3339(raw);
            if parsed.is_none() && !raw.trim().is_empty() {
                warn!(%owner, client_id = %client_id, date = %raw, "ignoring unparseable date");
            }
            parsed
        });

        let mut ticket = Ticket {
            id: self.index.next_id(),
            client_id,
            owner,
            name: input.name,
            category: input.category,
            trip_number: input.trip_number,
            seat: input.seat,
            hall: input.hall,
            edition: input.edition,
            showtime: input.showtime,
            price: input.price,
            photo: input.photo.filter(|p| !p.is_empty()),
            tags,
            occurs_at,
            sort_key: now,
            location: input.location,
            note: input.note,
            privacy: input.privacy.unwrap_or_default(),
            state: Default::default(),
            trashed_at: None,
            created_at: now,
            updated_at: now,
        };
        ticket.refresh_sort_key();

        self.commit(Mutation::Created(ticket.clone()))?;
        debug!(%owner, ticket_id = %ticket.id, has_photo, "created ticket");
        Ok(ticket)
    }

    /// Get one of `owner`'s tickets, active or trashed.
    pub fn get_ticket(&self, owner: OwnerId, id: TicketId) -> Result<Ticket> {
        self.index
            .get_for_owner(id, owner)
            .ok_or(TicketError::NotFound(id))
    }

    /// Edit fields of an active or trashed ticket.
    ///
    /// Attaching a photo to a ticket that had none is subject to the photo
    /// quota; removing one frees a slot.
    pub fn update_ticket(&self, owner: OwnerId, id: TicketId, patch: TicketPatch) -> Result<Ticket> {
        patch.validate()?;

        let _lock = self.write_lock.lock();

        let current = self
            .index
            .get_for_owner(id, owner)
            .ok_or(TicketError::NotFound(id))?;

        let had_photo = current.has_photo();
        let has_photo = patch.photo_after(&current);
        if has_photo && !had_photo && !self.quota.check_can_add_photo(owner) {
            return Err(TicketError::QuotaExceeded {
                owner,
                quota: self.quota.usage(owner).photo_quota,
            });
        }

        let mut updated = current;
        patch.apply(&mut updated)?;
        updated.updated_at = Timestamp::now();

        self.commit(Mutation::Updated(updated.clone()))?;
        debug!(%owner, ticket_id = %id, "updated ticket");
        Ok(updated)
    }

    /// Move an active ticket to the recycle bin.
    pub fn delete_ticket(&self, owner: OwnerId, id: TicketId) -> Result<Ticket> {
        self.transition(owner, id, Transition::Delete)
    }

    /// Bring a trashed ticket back to the active collection.
    pub fn restore_ticket(&self, owner: OwnerId, id: TicketId) -> Result<Ticket> {
        self.transition(owner, id, Transition::Restore)
    }

    /// Permanently remove a trashed ticket. Returns the removed ticket.
    pub fn purge_ticket(&self, owner: OwnerId, id: TicketId) -> Result<Ticket> {
        self.transition(owner, id, Transition::Purge)
    }

    /// Apply a lifecycle transition if its guard holds.
    ///
    /// Missing ticket, foreign owner and wrong state all yield `NotFound`.
    fn transition(&self, owner: OwnerId, id: TicketId, transition: Transition) -> Result<Ticket> {
        let _lock = self.write_lock.lock();

        let current = self
            .index
            .get_for_owner(id, owner)
            .filter(|t| transition.permits(t.state))
            .ok_or(TicketError::NotFound(id))?;

        let now = Timestamp::now();
        let mutation = match transition {
            Transition::Delete => Mutation::Trashed { id, at: now },
            Transition::Restore => Mutation::Restored { id, at: now },
            Transition::Purge => Mutation::Purged { id },
        };
        self.commit(mutation)?;

        debug!(%owner, ticket_id = %id, %transition, "ticket transition");

        match transition.target_state() {
            Some(_) => self.index.get(id).ok_or(TicketError::NotFound(id)),
            None => Ok(current),
        }
    }

    /// List one page of `owner`'s tickets.
    pub fn list_tickets(&self, owner: OwnerId, query: &ListQuery) -> Result<Page> {
        let limit = effective_limit(query.limit);
        let total = self.index.count_matching(owner, &query.filter);
        let rows = self.index.range_query(
            owner,
            &query.filter,
            query.cursor.map(|c| c.position()),
            limit + 1,
        );
        Ok(assemble_page(rows, limit, total))
    }

    // --- Quota Operations ---

    /// Current counters and photo quota of `owner`.
    pub fn quota_usage(&self, owner: OwnerId) -> QuotaUsage {
        self.quota.usage(owner)
    }

    /// Override the photo quota of one owner.
    pub fn set_photo_quota(&self, owner: OwnerId, quota: u32) -> Result<()> {
        let _lock = self.write_lock.lock();
        self.commit(Mutation::PhotoQuotaSet { owner, quota })?;
        info!(%owner, quota, "photo quota changed");
        Ok(())
    }

    // --- Store Operations ---

    /// Rewrite the log so it holds only live state.
    ///
    /// History of purged and superseded tickets is dropped. The id
    /// watermark is kept so ids are never reused.
    pub fn compact(&self) -> Result<()> {
        let _lock = self.write_lock.lock();

        let before = self.log.size();
        let mut mutations = vec![Mutation::Watermark {
            next_id: self.index.next_id().0,
        }];
        mutations.extend(
            self.quota
                .quota_overrides()
                .into_iter()
                .map(|(owner, quota)| Mutation::PhotoQuotaSet { owner, quota }),
        );
        mutations.extend(self.index.all().into_iter().map(Mutation::Created));

        self.log.rewrite(&mutations)?;
        info!(
            before_bytes = before,
            after_bytes = self.log.size(),
            entries = mutations.len(),
            "compacted ticket log"
        );
        Ok(())
    }

    /// Get store statistics.
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            ticket_count: self.index.count() as u64,
            owner_count: self.quota.owner_count() as u64,
            log_entries: self.log.entry_count(),
            log_size_bytes: self.log.size(),
        }
    }

    /// Sync all data to disk.
    pub fn sync(&self) -> Result<()> {
        self.log.sync()
    }

    /// Get the store path.
    pub fn path(&self) -> &Path {
        &self.config.path
    }

    // --- Private Helpers ---

    /// Make a mutation durable, then apply it. Caller holds the write lock.
    fn commit(&self, mutation: Mutation) -> Result<()> {
        self.log.append(&mutation)?;
        self.apply(&mutation)
    }

    /// Apply a mutation to the index and quota counters.
    ///
    /// Shared by live writes and log replay, so counters always follow the
    /// tickets they count.
    fn apply(&self, mutation: &Mutation) -> Result<()> {
        match mutation {
            Mutation::Created(ticket) => {
                self.index.create(ticket.clone())?;
                self.quota.on_create(ticket.owner, ticket.has_photo());
            }
            Mutation::Updated(ticket) => {
                let previous = self.index.update_fields(ticket.clone())?;
                self.quota
                    .on_photo_change(previous.owner, previous.has_photo(), ticket.has_photo());
            }
            Mutation::Trashed { id, at } => {
                self.index.modify(*id, |t| mark_trashed(t, *at))?;
            }
            Mutation::Restored { id, at } => {
                self.index.modify(*id, |t| mark_restored(t, *at))?;
            }
            Mutation::Purged { id } => {
                let removed = self
                    .index
                    .hard_delete(*id)
                    .ok_or(TicketError::NotFound(*id))?;
                self.quota.on_purge(removed.owner, removed.has_photo());
            }
            Mutation::PhotoQuotaSet { owner, quota } => {
                self.quota.set_photo_quota(*owner, *quota);
            }
            Mutation::Watermark { next_id } => {
                self.index.raise_watermark(*next_id);
            }
        }
        Ok(())
    }

    fn write_manifest(path: &Path) -> Result<()> {
        use std::io::Write;

        let manifest_path = path.join("MANIFEST");
        let mut file = File::create(manifest_path)?;

        file.write_all(STORE_MAGIC)?;
        file.write_all(&[STORE_VERSION])?;
        file.sync_all()?;

        Ok(())
    }

    fn verify_manifest(path: &Path) -> Result<()> {
        use std::io::Read;

        let manifest_path = path.join("MANIFEST");
        let mut file = File::open(manifest_path)?;

        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)?;
        if &magic != STORE_MAGIC {
            return Err(TicketError::InvalidFormat("Invalid store magic".into()));
        }

        let mut version = [0u8; 1];
        file.read_exact(&mut version)?;
        if version[0] != STORE_VERSION {
            return Err(TicketError::InvalidFormat(format!(
                "Unsupported store version: {}",
                version[0]
            )));
        }

        Ok(())
    }

    fn acquire_lock(path: &Path) -> Result<File> {
        let lock_path = path.join("LOCK");
        let lock_file = File::create(lock_path)?;

        lock_file
            .try_lock_exclusive()
            .map_err(|_| TicketError::Locked)?;

        Ok(lock_file)
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        // Best-effort sync on drop
        let _ = self.sync();
    }
}
