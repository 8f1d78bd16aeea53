//! Roster of attendees for an event.
//!
//! The roster is an ordered list of [`Entry`] values. It serializes as a
//! plain JSON array with camelCase keys, which is the form persisted under
//! the roster storage key.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// One attendee record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    /// Full name.
    pub name: String,
    /// Company.
    pub company: String,
    /// License number; the roster dedup key.
    pub license: String,
    /// Bib assigned at sign-in.
    pub bib: String,
    /// Event the entry was signed in to.
    pub event: String,
    /// When the attendee signed in.
    pub start_time: DateTime<Utc>,
    /// When the attendee signed out, if they have.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_time: Option<DateTime<Utc>>,
}

impl Entry {
    /// Whether the attendee is still signed in.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.finish_time.is_none()
    }

    /// Time between sign-in and sign-out, once signed out.
    #[must_use]
    pub fn duration(&self) -> Option<Duration> {
        self.finish_time.map(|finish| finish - self.start_time)
    }

    /// Case-insensitive substring match over name, company and license.
    ///
    /// `needle` must already be lowercase.
    fn matches(&self, needle: &str) -> bool {
        [&self.name, &self.company, &self.license]
            .iter()
            .any(|field| field.to_lowercase().contains(needle))
    }
}

/// Aggregate counts over a roster.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RosterStats {
    /// Number of entries.
    pub total: usize,
    /// Entries still signed in.
    pub active: usize,
    /// Entries that have signed out.
    pub finished: usize,
}

/// Ordered attendee list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Roster {
    entries: Vec<Entry>,
}

impl Roster {
    /// Create an empty roster.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a roster from existing entries, keeping their order.
    #[must_use]
    pub fn from_entries(entries: Vec<Entry>) -> Self {
        Self { entries }
    }

    /// All entries in roster order.
    #[must_use]
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the roster has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First entry whose license equals `license` exactly.
    #[must_use]
    pub fn find_by_license(&self, license: &str) -> Option<&Entry> {
        self.entries.iter().find(|e| e.license == license)
    }

    pub(crate) fn find_by_license_mut(&mut self, license: &str) -> Option<&mut Entry> {
        self.entries.iter_mut().find(|e| e.license == license)
    }

    /// Whether an active entry exists for `license`.
    #[must_use]
    pub fn has_active(&self, license: &str) -> bool {
        self.entries
            .iter()
            .any(|e| e.license == license && e.is_active())
    }

    pub(crate) fn push(&mut self, entry: Entry) -> &Entry {
        self.entries.push(entry);
        &self.entries[self.entries.len() - 1]
    }

    /// Remove the first entry with the given license.
    pub fn remove(&mut self, license: &str) -> Option<Entry> {
        let index = self.entries.iter().position(|e| e.license == license)?;
        Some(self.entries.remove(index))
    }

    /// Remove every entry, returning how many were removed.
    pub fn clear(&mut self) -> usize {
        let removed = self.entries.len();
        self.entries.clear();
        removed
    }

    /// Entries whose name, company or license contains `query`, ignoring case.
    ///
    /// An empty query matches everything.
    #[must_use]
    pub fn filter(&self, query: &str) -> Vec<&Entry> {
        let needle = query.trim().to_lowercase();
        self.entries
            .iter()
            .filter(|e| needle.is_empty() || e.matches(&needle))
            .collect()
    }

    /// Suggest the next bib: one past the largest numeric bib, or `start`.
    #[must_use]
    pub fn suggest_bib(&self, start: u32) -> String {
        self.entries
            .iter()
            .filter_map(|e| e.bib.trim().parse::<u32>().ok())
            .max()
            .map_or(start, |max| max.saturating_add(1).max(start))
            .to_string()
    }

    /// Count total, active and finished entries.
    #[must_use]
    pub fn stats(&self) -> RosterStats {
        let active = self.entries.iter().filter(|e| e.is_active()).count();
        RosterStats {
            total: self.entries.len(),
            active,
            finished: self.entries.len() - active,
        }
    }
}
