//! Core types for the ticket store.

use crate::error::{Result, TicketError};
use crate::lifecycle::LifecycleState;
use crate::tags::TagSet;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

/// Maximum length of a client-supplied idempotency key.
pub const MAX_CLIENT_ID_LEN: usize = 64;

/// Maximum length of a ticket name.
pub const MAX_NAME_LEN: usize = 128;

/// Maximum length of the short descriptive fields (trip number, seat, ...).
pub const MAX_DETAIL_LEN: usize = 64;

/// Maximum length of a photo reference.
pub const MAX_PHOTO_REF_LEN: usize = 512;

/// Store-assigned ticket identifier.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TicketId(pub u64);

impl fmt::Debug for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TicketId({})", self.0)
    }
}

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of the authenticated principal a ticket belongs to.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OwnerId(pub u64);

impl fmt::Debug for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OwnerId({})", self.0)
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Microseconds since Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current time.
    pub fn now() -> Self {
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Timestamp(duration.as_micros() as i64)
    }

    /// Parse an RFC 3339 date-time. Returns `None` when the text does not parse.
    pub fn parse_rfc3339(s: &str) -> Option<Self> {
        DateTime::parse_from_rfc3339(s.trim())
            .ok()
            .map(|dt| Timestamp(dt.timestamp_micros()))
    }

    /// Format as RFC 3339 in UTC.
    pub fn to_rfc3339(&self) -> String {
        let secs = self.0.div_euclid(1_000_000);
        let nanos = (self.0.rem_euclid(1_000_000) * 1_000) as u32;
        match DateTime::<Utc>::from_timestamp(secs, nanos) {
            Some(dt) => dt.to_rfc3339_opts(SecondsFormat::Micros, true),
            None => self.0.to_string(),
        }
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_rfc3339())
    }
}

/// Kind of event a ticket records.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Movie,
    Show,
    Exhibition,
    Train,
    Flight,
    Scenic,
    Other,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Category::Movie,
        Category::Show,
        Category::Exhibition,
        Category::Train,
        Category::Flight,
        Category::Scenic,
        Category::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Movie => "movie",
            Category::Show => "show",
            Category::Exhibition => "exhibition",
            Category::Train => "train",
            Category::Flight => "flight",
            Category::Scenic => "scenic",
            Category::Other => "other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = TicketError;

    fn from_str(s: &str) -> Result<Self> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| TicketError::validation(format!("unknown category: {s:?}")))
    }
}

/// Who may see a ticket when it is shared.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Privacy {
    #[default]
    Public,
    Private,
    Masked,
}

impl Privacy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Privacy::Public => "public",
            Privacy::Private => "private",
            Privacy::Masked => "masked",
        }
    }
}

impl FromStr for Privacy {
    type Err = TicketError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "public" => Ok(Privacy::Public),
            "private" => Ok(Privacy::Private),
            "masked" => Ok(Privacy::Masked),
            other => Err(TicketError::validation(format!("unknown privacy level: {other:?}"))),
        }
    }
}

/// Geographic coordinate in decimal degrees.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

/// A single venue.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Place {
    pub city: Option<String>,
    pub address: Option<String>,
    pub coordinate: Option<Coordinate>,
}

/// One end of a journey.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RoutePoint {
    pub city: String,
    pub station: Option<String>,
    pub coordinate: Option<Coordinate>,
}

/// Where a ticketed event happened.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Location {
    /// A venue (cinema, theatre, museum, park).
    Single(Place),
    /// A journey (train, flight).
    Route {
        departure: RoutePoint,
        arrival: RoutePoint,
    },
}

/// A stored ticket.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    /// Unique identifier (assigned by store).
    pub id: TicketId,

    /// Client-supplied idempotency key, unique across the store.
    pub client_id: String,

    pub owner: OwnerId,
    pub name: String,
    pub category: Category,

    /// Flight or train number.
    pub trip_number: Option<String>,
    pub seat: Option<String>,
    /// Cinema hall.
    pub hall: Option<String>,
    /// Film edition (IMAX, 3D, original language, ...).
    pub edition: Option<String>,
    pub showtime: Option<String>,

    pub price: Option<f64>,

    /// Opaque object-storage reference.
    pub photo: Option<String>,

    pub tags: TagSet,

    /// Nominal date of the event, if the client supplied one.
    pub occurs_at: Option<Timestamp>,

    /// Ordering key: `occurs_at` when present, otherwise `created_at`.
    pub sort_key: Timestamp,

    pub location: Option<Location>,
    pub note: Option<String>,
    pub privacy: Privacy,

    pub state: LifecycleState,
    pub trashed_at: Option<Timestamp>,

    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Ticket {
    /// Whether the ticket carries a photo (drives quota accounting).
    pub fn has_photo(&self) -> bool {
        has_photo_ref(self.photo.as_deref())
    }

    /// Recompute `sort_key` from `occurs_at` and `created_at`.
    pub(crate) fn refresh_sort_key(&mut self) {
        self.sort_key = self.occurs_at.unwrap_or(self.created_at);
    }
}

pub(crate) fn has_photo_ref(photo: Option<&str>) -> bool {
    photo.map_or(false, |p| !p.is_empty())
}

/// Input for creating a new ticket (before id and timestamps are assigned).
#[derive(Clone, Debug)]
pub struct NewTicket {
    pub client_id: String,
    pub name: String,
    pub category: Category,
    pub trip_number: Option<String>,
    pub seat: Option<String>,
    pub hall: Option<String>,
    pub edition: Option<String>,
    pub showtime: Option<String>,
    pub price: Option<f64>,
    pub photo: Option<String>,
    pub tags: Vec<String>,
    /// RFC 3339 date of the event. Unparseable text is ignored.
    pub occurs_at: Option<String>,
    pub location: Option<Location>,
    pub note: Option<String>,
    pub privacy: Option<Privacy>,
}

impl NewTicket {
    /// Create a ticket input with the required fields.
    pub fn new(client_id: impl Into<String>, name: impl Into<String>, category: Category) -> Self {
        Self {
            client_id: client_id.into(),
            name: name.into(),
            category,
            trip_number: None,
            seat: None,
            hall: None,
            edition: None,
            showtime: None,
            price: None,
            photo: None,
            tags: Vec::new(),
            occurs_at: None,
            location: None,
            note: None,
            privacy: None,
        }
    }

    /// Attach a photo reference.
    pub fn with_photo(mut self, photo: impl Into<String>) -> Self {
        self.photo = Some(photo.into());
        self
    }

    /// Set the tag labels.
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Set the nominal event date (RFC 3339).
    pub fn with_occurs_at(mut self, date: impl Into<String>) -> Self {
        self.occurs_at = Some(date.into());
        self
    }

    pub fn with_location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    pub fn with_privacy(mut self, privacy: Privacy) -> Self {
        self.privacy = Some(privacy);
        self
    }

    pub fn with_price(mut self, price: f64) -> Self {
        self.price = Some(price);
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn with_trip_number(mut self, trip_number: impl Into<String>) -> Self {
        self.trip_number = Some(trip_number.into());
        self
    }

    pub fn with_seat(mut self, seat: impl Into<String>) -> Self {
        self.seat = Some(seat.into());
        self
    }

    /// Check field limits. Does not touch the store.
    pub(crate) fn validate(&self) -> Result<()> {
        let client_id = self.client_id.trim();
        if client_id.is_empty() {
            return Err(TicketError::validation("client id is required"));
        }
        check_len("client id", client_id, MAX_CLIENT_ID_LEN)?;
        validate_name(&self.name)?;
        for (field, value) in [
            ("trip number", &self.trip_number),
            ("seat", &self.seat),
            ("hall", &self.hall),
            ("edition", &self.edition),
            ("showtime", &self.showtime),
        ] {
            if let Some(value) = value {
                check_len(field, value, MAX_DETAIL_LEN)?;
            }
        }
        if let Some(photo) = &self.photo {
            check_len("photo", photo, MAX_PHOTO_REF_LEN)?;
        }
        if let Some(price) = self.price {
            validate_price(price)?;
        }
        Ok(())
    }
}

pub(crate) fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(TicketError::validation("name is required"));
    }
    check_len("name", name, MAX_NAME_LEN)
}

pub(crate) fn validate_price(price: f64) -> Result<()> {
    if !price.is_finite() || price < 0.0 {
        return Err(TicketError::validation(format!("invalid price: {price}")));
    }
    Ok(())
}

pub(crate) fn check_len(field: &str, value: &str, max: usize) -> Result<()> {
    let len = value.chars().count();
    if len > max {
        return Err(TicketError::validation(format!(
            "{field} too long ({len} > {max} characters)"
        )));
    }
    Ok(())
}

/// Per-owner quota counters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaUsage {
    /// Non-purged tickets.
    pub total: u64,
    /// Non-purged tickets carrying a photo.
    pub with_photo: u64,
    /// Cap on `with_photo`.
    pub photo_quota: u32,
}

/// Store statistics.
#[derive(Clone, Debug, Default)]
pub struct StoreStats {
    pub ticket_count: u64,
    pub owner_count: u64,
    pub log_entries: u64,
    pub log_size_bytes: u64,
}
