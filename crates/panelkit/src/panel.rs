#![forbid(unsafe_code)]

//! Persisted representation of individual panels.
//!
//! A [`PanelMap`] is the `panelsJSON` payload: a JSON object keyed by panel
//! id. Unlike a plain map it remembers insertion order, which breaks ties
//! between panels that share an `order` value (or have none).

use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// Stable, collection-unique panel identifier.
pub type PanelId = String;

/// Opaque, type-specific configuration of a panel.
pub type ExplicitInput = Map<String, Value>;

/// Width bucket of a control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlWidth {
    Small,
    Medium,
    Large,
}

/// Grid placement, carried opaquely by the engine except for placement of
/// incoming panels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridData {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
    /// Panel id mirrored into the layout record.
    #[serde(default)]
    pub i: String,
}

/// One child panel's persisted representation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PanelEntry {
    /// Map key; not serialized inside the entry itself.
    #[serde(skip)]
    pub id: PanelId,
    #[serde(rename = "type")]
    pub panel_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<ControlWidth>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grow: Option<bool>,
    #[serde(default)]
    pub explicit_input: ExplicitInput,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grid_data: Option<GridData>,
}

impl PanelEntry {
    /// Entry with the given id, type, and input; no order or layout.
    #[must_use]
    pub fn new(id: impl Into<PanelId>, panel_type: impl Into<String>, explicit_input: ExplicitInput) -> Self {
        Self {
            id: id.into(),
            panel_type: panel_type.into(),
            order: None,
            width: None,
            grow: None,
            explicit_input,
            grid_data: None,
        }
    }

    #[must_use]
    pub fn with_order(mut self, order: i64) -> Self {
        self.order = Some(order);
        self
    }

    #[must_use]
    pub fn with_grid(mut self, grid: GridData) -> Self {
        self.grid_data = Some(grid);
        self
    }
}

/// External reference reported by a panel when it serializes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Reference {
    pub name: String,
    #[serde(rename = "type")]
    pub ref_type: String,
    pub id: String,
}

/// Insertion-ordered panel collection keyed by id.
///
/// # Invariants
///
/// 1. Ids are unique; inserting an existing id replaces that entry in place.
/// 2. Every entry's `id` equals its key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PanelMap {
    entries: Vec<PanelEntry>,
}

impl PanelMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&PanelEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut PanelEntry> {
        self.entries.iter_mut().find(|e| e.id == id)
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Insert or replace; returns the previous entry for that id.
    pub fn insert(&mut self, entry: PanelEntry) -> Option<PanelEntry> {
        match self.entries.iter_mut().find(|e| e.id == entry.id) {
            Some(slot) => Some(std::mem::replace(slot, entry)),
            None => {
                self.entries.push(entry);
                None
            }
        }
    }

    pub fn remove(&mut self, id: &str) -> Option<PanelEntry> {
        let index = self.entries.iter().position(|e| e.id == id)?;
        Some(self.entries.remove(index))
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &PanelEntry> {
        self.entries.iter()
    }

    /// Ids in insertion order.
    #[must_use]
    pub fn ids(&self) -> Vec<PanelId> {
        self.entries.iter().map(|e| e.id.clone()).collect()
    }

    /// Entries sorted by `order`; ties (and missing orders, which sort last)
    /// keep insertion order.
    #[must_use]
    pub fn in_order(&self) -> Vec<&PanelEntry> {
        let mut sorted: Vec<&PanelEntry> = self.entries.iter().collect();
        sorted.sort_by_key(|e| e.order.unwrap_or(i64::MAX));
        sorted
    }
}

impl FromIterator<PanelEntry> for PanelMap {
    fn from_iter<I: IntoIterator<Item = PanelEntry>>(iter: I) -> Self {
        let mut map = Self::new();
        for entry in iter {
            map.insert(entry);
        }
        map
    }
}

impl IntoIterator for PanelMap {
    type Item = PanelEntry;
    type IntoIter = std::vec::IntoIter<PanelEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl Serialize for PanelMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for entry in &self.entries {
            map.serialize_entry(&entry.id, entry)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for PanelMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct PanelMapVisitor;

        impl<'de> Visitor<'de> for PanelMapVisitor {
            type Value = PanelMap;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of panel id to panel state")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<PanelMap, A::Error> {
                let mut panels = PanelMap::new();
                while let Some((id, mut entry)) = access.next_entry::<PanelId, PanelEntry>()? {
                    entry.id = id;
                    panels.insert(entry);
                }
                Ok(panels)
            }
        }

        deserializer.deserialize_map(PanelMapVisitor)
    }
}
