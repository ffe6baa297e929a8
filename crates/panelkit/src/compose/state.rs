#![forbid(unsafe_code)]

//! Container state and the partial layers it is assembled from.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::context::{Filter, Query, TimeRange};
use crate::group::{PartialGroupState, PersistableGroupState};
use crate::panel::{ExplicitInput, PanelId, PanelMap, Reference};

/// Per-panel runtime state waiting to be handed to a live child.
pub type RuntimeStateMap = BTreeMap<PanelId, ExplicitInput>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    #[default]
    View,
    Edit,
}

/// Fully resolved container input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ContainerState {
    pub id: Option<String>,
    pub title: String,
    pub view_mode: ViewMode,
    pub panels: PanelMap,
    pub filters: Vec<Filter>,
    pub query: Query,
    pub time_range: Option<TimeRange>,
    pub time_restore: bool,
}

impl Default for ContainerState {
    fn default() -> Self {
        Self {
            id: None,
            title: String::new(),
            view_mode: ViewMode::View,
            panels: PanelMap::new(),
            filters: Vec::new(),
            query: Query::default(),
            time_range: None,
            time_restore: false,
        }
    }
}

/// One override layer. Unset fields leave the layer below untouched.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ContainerOverrides {
    pub title: Option<String>,
    pub view_mode: Option<ViewMode>,
    pub panels: Option<PanelMap>,
    pub filters: Option<Vec<Filter>>,
    pub query: Option<Query>,
    pub time_range: Option<TimeRange>,
    pub time_restore: Option<bool>,
    pub control_group: Option<PartialGroupState>,
}

/// What a load of a persisted container produced.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LoadedContainer {
    /// `None` for a container that was never saved.
    pub id: Option<String>,
    /// Managed containers are always opened read-only.
    pub managed: bool,
    pub new_container_created: bool,
    pub state: ContainerOverrides,
    /// Decoded control group; `None` when the container has none saved.
    pub control_group: Option<PersistableGroupState>,
    pub references: Vec<Reference>,
}

/// Session-local backup of edits that were never saved.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SessionBackup {
    pub state: ContainerOverrides,
    pub runtime_panels: RuntimeStateMap,
}

/// A single panel handed over from elsewhere.
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingTransfer {
    pub panel_type: String,
    pub input: ExplicitInput,
    /// Existing panel to update; a fresh id is generated when unset.
    pub embeddable_id: Option<PanelId>,
    /// Explicit `(width, height)`; either may be missing.
    pub size: Option<(Option<u32>, Option<u32>)>,
}

impl IncomingTransfer {
    #[must_use]
    pub fn new(panel_type: impl Into<String>, input: ExplicitInput) -> Self {
        Self {
            panel_type: panel_type.into(),
            input,
            embeddable_id: None,
            size: None,
        }
    }

    #[must_use]
    pub fn targeting(mut self, id: impl Into<PanelId>) -> Self {
        self.embeddable_id = Some(id.into());
        self
    }

    #[must_use]
    pub fn with_size(mut self, width: Option<u32>, height: Option<u32>) -> Self {
        self.size = Some((width, height));
        self
    }
}
