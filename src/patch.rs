//! Partial updates of ticket fields.
//!
//! Nullable fields use [`Patch`], which distinguishes "leave as is" from
//! "clear". Non-nullable fields use plain `Option` where `None` means
//! "leave as is".

use crate::error::{Result, TicketError};
use crate::tags::TagSet;
use crate::types::{
    check_len, has_photo_ref, validate_name, validate_price, Category, Location, Privacy, Ticket,
    Timestamp, MAX_DETAIL_LEN, MAX_PHOTO_REF_LEN,
};
use tracing::warn;

/// Change to a nullable field.
#[derive(Clone, Debug, PartialEq)]
pub enum Patch<T> {
    /// Field omitted from the request.
    Keep,
    /// Field set to a new value.
    Set(T),
    /// Field explicitly cleared.
    Clear,
}

impl<T> Default for Patch<T> {
    fn default() -> Self {
        Patch::Keep
    }
}

impl<T> Patch<T> {
    pub fn is_keep(&self) -> bool {
        matches!(self, Patch::Keep)
    }

    fn apply_to(self, slot: &mut Option<T>) {
        match self {
            Patch::Keep => {}
            Patch::Set(value) => *slot = Some(value),
            Patch::Clear => *slot = None,
        }
    }
}

impl<T> From<Option<T>> for Patch<T> {
    /// `Some` sets, `None` clears.
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Patch::Set(v),
            None => Patch::Clear,
        }
    }
}

/// Field changes for an existing ticket.
///
/// `id`, `client_id`, `owner` and `created_at` are not represented: they
/// never change.
#[derive(Clone, Debug, Default)]
pub struct TicketPatch {
    pub name: Option<String>,
    pub category: Option<Category>,
    pub trip_number: Patch<String>,
    pub seat: Patch<String>,
    pub hall: Patch<String>,
    pub edition: Patch<String>,
    pub showtime: Patch<String>,
    pub price: Patch<f64>,
    /// Setting an empty reference is the same as clearing.
    pub photo: Patch<String>,
    /// Replaces the whole tag set.
    pub tags: Option<Vec<String>>,
    /// RFC 3339 date. Clearing reverts the sort key to the creation time.
    pub occurs_at: Patch<String>,
    pub location: Patch<Location>,
    pub note: Patch<String>,
    pub privacy: Option<Privacy>,
}

impl TicketPatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether no field is touched.
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.category.is_none()
            && self.trip_number.is_keep()
            && self.seat.is_keep()
            && self.hall.is_keep()
            && self.edition.is_keep()
            && self.showtime.is_keep()
            && self.price.is_keep()
            && self.photo.is_keep()
            && self.tags.is_none()
            && self.occurs_at.is_keep()
            && self.location.is_keep()
            && self.note.is_keep()
            && self.privacy.is_none()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }

    pub fn photo(mut self, photo: Patch<String>) -> Self {
        self.photo = photo;
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = Some(tags.into_iter().map(Into::into).collect());
        self
    }

    pub fn occurs_at(mut self, occurs_at: Patch<String>) -> Self {
        self.occurs_at = occurs_at;
        self
    }

    pub fn note(mut self, note: Patch<String>) -> Self {
        self.note = note;
        self
    }

    pub fn privacy(mut self, privacy: Privacy) -> Self {
        self.privacy = Some(privacy);
        self
    }

    pub fn location(mut self, location: Patch<Location>) -> Self {
        self.location = location;
        self
    }

    /// Reject patches that touch nothing or break field limits.
    pub(crate) fn validate(&self) -> Result<()> {
        if self.is_empty() || self.only_sets_unparseable_date() {
            return Err(TicketError::validation("no fields to update"));
        }
        if let Some(name) = &self.name {
            validate_name(name)?;
        }
        for (field, patch) in [
            ("trip number", &self.trip_number),
            ("seat", &self.seat),
            ("hall", &self.hall),
            ("edition", &self.edition),
            ("showtime", &self.showtime),
        ] {
            if let Patch::Set(value) = patch {
                check_len(field, value, MAX_DETAIL_LEN)?;
            }
        }
        if let Patch::Set(photo) = &self.photo {
            check_len("photo", photo, MAX_PHOTO_REF_LEN)?;
        }
        if let Patch::Set(price) = self.price {
            validate_price(price)?;
        }
        Ok(())
    }

    /// An unparseable date is ignored on apply, so a patch carrying nothing
    /// else changes nothing.
    fn only_sets_unparseable_date(&self) -> bool {
        match &self.occurs_at {
            Patch::Set(raw) if !raw.trim().is_empty() && Timestamp::parse_rfc3339(raw).is_none() => {
                TicketPatch {
                    occurs_at: Patch::Keep,
                    ..self.clone()
                }
                .is_empty()
            }
            _ => false,
        }
    }

    /// Whether applying this patch to `ticket` leaves it with a photo.
    pub(crate) fn photo_after(&self, ticket: &Ticket) -> bool {
        match &self.photo {
            Patch::Keep => ticket.has_photo(),
            Patch::Set(photo) => has_photo_ref(Some(photo)),
            Patch::Clear => false,
        }
    }

    /// Apply to a copy of the ticket. The caller stamps `updated_at`.
    pub(crate) fn apply(self, ticket: &mut Ticket) -> Result<()> {
        let tags = self.tags.map(TagSet::from_labels).transpose()?;

        if let Some(name) = self.name {
            ticket.name = name;
        }
        if let Some(category) = self.category {
            ticket.category = category;
        }
        self.trip_number.apply_to(&mut ticket.trip_number);
        self.seat.apply_to(&mut ticket.seat);
        self.hall.apply_to(&mut ticket.hall);
        self.edition.apply_to(&mut ticket.edition);
        self.showtime.apply_to(&mut ticket.showtime);
        self.price.apply_to(&mut ticket.price);

        let photo = match self.photo {
            Patch::Set(photo) if photo.is_empty() => Patch::Clear,
            other => other,
        };
        photo.apply_to(&mut ticket.photo);

        if let Some(tags) = tags {
            ticket.tags = tags;
        }

        match self.occurs_at {
            Patch::Keep => {}
            Patch::Clear => ticket.occurs_at = None,
            Patch::Set(raw) if raw.trim().is_empty() => ticket.occurs_at = None,
            Patch::Set(raw) => match Timestamp::parse_rfc3339(&raw) {
                Some(ts) => ticket.occurs_at = Some(ts),
                None => warn!(ticket_id = %ticket.id, date = %raw, "ignoring unparseable date"),
            },
        }
        ticket.refresh_sort_key();

        self.location.apply_to(&mut ticket.location);
        self.note.apply_to(&mut ticket.note);
        if let Some(privacy) = self.privacy {
            ticket.privacy = privacy;
        }
        Ok(())
    }
}
