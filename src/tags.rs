//! Tag labels embedded in a ticket.
//!
//! Labels reference entries of an external tag catalog; the store treats
//! them as opaque strings and only guarantees order and uniqueness.

use crate::error::Result;
use crate::types::check_len;
use serde::{Deserialize, Serialize};

/// Maximum length of a single tag label.
pub const MAX_TAG_LEN: usize = 32;

/// Ordered, duplicate-free set of tag labels.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagSet(Vec<String>);

impl TagSet {
    /// Empty set.
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Build a set from labels, keeping the first occurrence of each.
    ///
    /// Labels are trimmed; blank labels are dropped.
    pub fn from_labels<I, S>(labels: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Vec::new();
        for label in labels {
            let label = label.as_ref().trim();
            if label.is_empty() {
                continue;
            }
            check_len("tag", label, MAX_TAG_LEN)?;
            if !set.iter().any(|existing: &String| existing == label) {
                set.push(label.to_string());
            }
        }
        Ok(Self(set))
    }

    /// Exact-element membership test.
    pub fn contains(&self, label: &str) -> bool {
        self.0.iter().any(|t| t == label)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

impl<'a> IntoIterator for &'a TagSet {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
