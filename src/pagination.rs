//! Cursor pagination over an owner's tickets.
//!
//! Lists are ordered by `(sort_key DESC, id DESC)`. Since ids are unique the
//! order is total, and a cursor naming the last `(sort_key, id)` of a page
//! identifies exactly where the next page starts.

use crate::error::{Result, TicketError};
use crate::lifecycle::LifecycleState;
use crate::types::{Category, Ticket, TicketId, Timestamp};
use std::fmt;
use std::str::FromStr;

/// Page size when the caller gives none or an out-of-range value.
pub const DEFAULT_LIMIT: usize = 20;

/// Largest accepted page size.
pub const MAX_LIMIT: usize = 100;

const CURSOR_VERSION: u8 = 1;

/// version + sort_key + id + crc32.
const CURSOR_LEN: usize = 1 + 8 + 8 + 4;

/// Position of a ticket in list order.
///
/// `Ord` is ascending on `(sort_key, id)`; lists walk it in reverse.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SortPosition {
    pub sort_key: Timestamp,
    pub id: TicketId,
}

impl SortPosition {
    pub fn of(ticket: &Ticket) -> Self {
        Self {
            sort_key: ticket.sort_key,
            id: ticket.id,
        }
    }
}

/// Opaque pagination token.
///
/// Self-contained: it carries the position of the last ticket of the page
/// that produced it and nothing about the filter. Reusing a cursor with a
/// different filter is unsupported.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Cursor(SortPosition);

impl Cursor {
    pub(crate) fn after(position: SortPosition) -> Self {
        Cursor(position)
    }

    pub(crate) fn position(&self) -> SortPosition {
        self.0
    }

    /// Encode as a transport-safe token.
    pub fn encode(&self) -> String {
        let mut buf = Vec::with_capacity(CURSOR_LEN);
        buf.push(CURSOR_VERSION);
        buf.extend_from_slice(&self.0.sort_key.0.to_be_bytes());
        buf.extend_from_slice(&self.0.id.0.to_be_bytes());
        let checksum = crc32fast::hash(&buf);
        buf.extend_from_slice(&checksum.to_le_bytes());
        hex::encode(buf)
    }

    /// Decode a token produced by [`Cursor::encode`].
    pub fn decode(token: &str) -> Result<Self> {
        let invalid = || TicketError::validation("invalid cursor");

        let bytes = hex::decode(token.trim()).map_err(|_| invalid())?;
        if bytes.len() != CURSOR_LEN || bytes[0] != CURSOR_VERSION {
            return Err(invalid());
        }

        let (body, checksum) = bytes.split_at(CURSOR_LEN - 4);
        let stored = u32::from_le_bytes(checksum.try_into().map_err(|_| invalid())?);
        if crc32fast::hash(body) != stored {
            return Err(invalid());
        }

        let sort_key = i64::from_be_bytes(body[1..9].try_into().map_err(|_| invalid())?);
        let id = u64::from_be_bytes(body[9..17].try_into().map_err(|_| invalid())?);

        Ok(Cursor(SortPosition {
            sort_key: Timestamp(sort_key),
            id: TicketId(id),
        }))
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for Cursor {
    type Err = TicketError;

    fn from_str(s: &str) -> Result<Self> {
        Cursor::decode(s)
    }
}

/// Which tickets a list request selects.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListFilter {
    pub category: Option<Category>,
    /// Exact tag label. An empty label means no tag filter.
    pub tag: Option<String>,
    /// `true` lists the recycle bin, `false` the active collection.
    pub trashed: bool,
}

impl ListFilter {
    pub fn active() -> Self {
        Self::default()
    }

    pub fn trashed() -> Self {
        Self {
            trashed: true,
            ..Self::default()
        }
    }

    pub fn with_category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Whether `ticket` is selected. Owner scoping is done by the index.
    pub fn matches(&self, ticket: &Ticket) -> bool {
        if ticket.state != LifecycleState::for_trash_filter(self.trashed) {
            return false;
        }
        if let Some(category) = self.category {
            if ticket.category != category {
                return false;
            }
        }
        match self.tag.as_deref() {
            Some(tag) if !tag.is_empty() => ticket.tags.contains(tag),
            _ => true,
        }
    }
}

/// A list request.
#[derive(Clone, Debug, Default)]
pub struct ListQuery {
    pub filter: ListFilter,
    pub cursor: Option<Cursor>,
    /// Requested page size; see [`effective_limit`].
    pub limit: Option<i64>,
}

impl ListQuery {
    pub fn new(filter: ListFilter) -> Self {
        Self {
            filter,
            cursor: None,
            limit: None,
        }
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_cursor(mut self, cursor: Cursor) -> Self {
        self.cursor = Some(cursor);
        self
    }

    /// Set the cursor from its token form, rejecting malformed tokens.
    /// An empty token means the first page.
    pub fn with_cursor_token(mut self, token: &str) -> Result<Self> {
        self.cursor = if token.trim().is_empty() {
            None
        } else {
            Some(Cursor::decode(token)?)
        };
        Ok(self)
    }
}

/// One page of tickets.
#[derive(Clone, Debug)]
pub struct Page {
    pub items: Vec<Ticket>,
    /// Present only when `has_more`.
    pub next_cursor: Option<Cursor>,
    pub has_more: bool,
    /// Matches of the filter, ignoring the cursor.
    pub total: u64,
}

/// Page size actually used: `DEFAULT_LIMIT` unless `requested` is in
/// `1..=MAX_LIMIT`.
pub fn effective_limit(requested: Option<i64>) -> usize {
    match requested {
        Some(n) if n >= 1 && n <= MAX_LIMIT as i64 => n as usize,
        _ => DEFAULT_LIMIT,
    }
}

/// Assemble a page from `limit + 1` over-fetched rows.
///
/// The extra row only signals `has_more`; the cursor comes from the last
/// row that is actually returned.
pub(crate) fn assemble_page(mut rows: Vec<Ticket>, limit: usize, total: u64) -> Page {
    let has_more = rows.len() > limit;
    if has_more {
        rows.truncate(limit);
    }
    let next_cursor = if has_more {
        rows.last().map(|t| Cursor::after(SortPosition::of(t)))
    } else {
        None
    };
    Page {
        items: rows,
        next_cursor,
        has_more,
        total,
    }
}
