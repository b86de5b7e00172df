//! Item model - The unit of knowledge metadata exchanged between connectors,
//! the index store and the remote service.
//!
//! Only metadata is tracked (title, link, tags, timestamps). Content stays in
//! the source application.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Knowledge source an item came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    /// Local markdown vault
    Vault,
    /// Cloud workspace tool (OAuth)
    Workspace,
    /// Reading highlights
    Highlights,
    /// Platform notes app
    Notes,
    /// Memory assistant
    Memory,
}

impl Source {
    /// All sources, in the order the orchestrator runs them.
    pub const ALL: [Source; 5] = [
        Source::Vault,
        Source::Workspace,
        Source::Highlights,
        Source::Notes,
        Source::Memory,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vault => "vault",
            Self::Workspace => "workspace",
            Self::Highlights => "highlights",
            Self::Notes => "notes",
            Self::Memory => "memory",
        }
    }

    /// Human readable name.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Vault => "Markdown Vault",
            Self::Workspace => "Workspace",
            Self::Highlights => "Highlights",
            Self::Notes => "Notes",
            Self::Memory => "Memory",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Source {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Source::ALL
            .into_iter()
            .find(|source| source.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| crate::Error::UnknownSource(s.to_string()))
    }
}

/// Metadata of one note, page or highlight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    /// Opaque unique identifier
    pub id: Uuid,
    /// Title
    pub title: String,
    /// Link back to the item in its source (if any)
    #[serde(default)]
    pub link: Option<String>,
    /// Tags (set semantics)
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Where the item came from
    pub source: Source,
    /// Last modification time reported by the source
    pub updated_at: DateTime<Utc>,
}

impl Item {
    /// Create a new item with a fresh id and no tags.
    pub fn new(title: impl Into<String>, source: Source, updated_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            link: None,
            tags: BTreeSet::new(),
            source,
            updated_at,
        }
    }

    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    /// Dedup key: same source and same link (or title when there is no link)
    /// means the same logical item.
    pub fn key(&self) -> ItemKey {
        ItemKey {
            source: self.source,
            locator: self.link.clone().unwrap_or_else(|| self.title.clone()),
        }
    }
}

/// Composite identity of an item across syncs.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ItemKey {
    pub source: Source,
    pub locator: String,
}

/// Aggregated index of all sources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Index {
    /// Items ordered by key, no two sharing a key
    pub items: Vec<Item>,
    /// Time of the last successful merge (`None` = never merged)
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Counts produced by a merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    /// Keys not seen before
    pub inserted: usize,
    /// Existing entries replaced by a newer version
    pub updated: usize,
    /// Incoming items that were already known (same or older)
    pub unchanged: usize,
}

impl Index {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Merge freshly fetched items and stamp the merge time.
    ///
    /// On a key collision the entry with the newer `updated_at` wins; the id
    /// of the entry already in the index is kept.
    pub fn merge<I>(&mut self, incoming: I, now: DateTime<Utc>) -> MergeStats
    where
        I: IntoIterator<Item = Item>,
    {
        let mut stats = MergeStats::default();
        let mut by_key: BTreeMap<ItemKey, Item> = std::mem::take(&mut self.items)
            .into_iter()
            .map(|item| (item.key(), item))
            .collect();

        for item in incoming {
            match by_key.get_mut(&item.key()) {
                Some(existing) if item.updated_at > existing.updated_at => {
                    let id = existing.id;
                    *existing = Item { id, ..item };
                    stats.updated += 1;
                }
                Some(_) => stats.unchanged += 1,
                None => {
                    by_key.insert(item.key(), item);
                    stats.inserted += 1;
                }
            }
        }

        self.items = by_key.into_values().collect();
        self.updated_at = Some(now);
        stats
    }

    /// Reset to the empty index.
    pub fn clear(&mut self) {
        *self = Self::empty();
    }

    /// Items contributed by one source.
    pub fn by_source(&self, source: Source) -> impl Iterator<Item = &Item> {
        self.items.iter().filter(move |item| item.source == source)
    }
}
