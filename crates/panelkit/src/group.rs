#![forbid(unsafe_code)]

//! Group-level state of a control group in its persisted, raw, and runtime
//! shapes.

use serde::{Deserialize, Serialize};

use crate::panel::{ControlWidth, PanelMap};

pub const DEFAULT_CONTROL_WIDTH: ControlWidth = ControlWidth::Medium;
pub const DEFAULT_CONTROL_GROW: bool = true;
pub const DEFAULT_CONTROL_STYLE: ControlStyle = ControlStyle::OneLine;

/// Whether a control's filter output feeds the controls after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChainingSystem {
    #[default]
    Hierarchical,
    None,
}

/// Label position of the controls in a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ControlStyle {
    #[default]
    OneLine,
    TwoLine,
}

/// Which parts of the parent's fetch context a group ignores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct IgnoreParentSettings {
    pub ignore_filters: bool,
    pub ignore_query: bool,
    pub ignore_timerange: bool,
    pub ignore_validations: bool,
}

/// Serializable aggregate of a control group.
///
/// `default_control_width` and `default_control_grow` size a new control
/// when the group has no control to copy them from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PersistableGroupState {
    pub panels: PanelMap,
    pub default_control_width: ControlWidth,
    pub default_control_grow: bool,
    pub chaining_system: ChainingSystem,
    pub control_style: ControlStyle,
    pub show_apply_selections: bool,
    pub ignore_parent_settings: IgnoreParentSettings,
}

impl Default for PersistableGroupState {
    fn default() -> Self {
        Self {
            panels: PanelMap::default(),
            default_control_width: DEFAULT_CONTROL_WIDTH,
            default_control_grow: DEFAULT_CONTROL_GROW,
            chaining_system: ChainingSystem::default(),
            control_style: DEFAULT_CONTROL_STYLE,
            show_apply_selections: false,
            ignore_parent_settings: IgnoreParentSettings::default(),
        }
    }
}

/// Partial group state supplied by a later merge layer; `None` keeps the
/// earlier layer's value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PartialGroupState {
    pub panels: Option<PanelMap>,
    pub default_control_width: Option<ControlWidth>,
    pub default_control_grow: Option<bool>,
    pub chaining_system: Option<ChainingSystem>,
    pub control_style: Option<ControlStyle>,
    pub show_apply_selections: Option<bool>,
    pub ignore_parent_settings: Option<IgnoreParentSettings>,
}

impl PartialGroupState {
    /// Apply every field that is set onto `base`.
    pub fn apply_to(&self, base: &mut PersistableGroupState) {
        if let Some(panels) = &self.panels {
            base.panels = panels.clone();
        }
        if let Some(width) = self.default_control_width {
            base.default_control_width = width;
        }
        if let Some(grow) = self.default_control_grow {
            base.default_control_grow = grow;
        }
        if let Some(chaining) = self.chaining_system {
            base.chaining_system = chaining;
        }
        if let Some(style) = self.control_style {
            base.control_style = style;
        }
        if let Some(show) = self.show_apply_selections {
            base.show_apply_selections = show;
        }
        if let Some(ignore) = self.ignore_parent_settings {
            base.ignore_parent_settings = ignore;
        }
    }

    /// Field-wise merge where `later` wins.
    #[must_use]
    pub fn merged_with(&self, later: &PartialGroupState) -> PartialGroupState {
        PartialGroupState {
            panels: later.panels.clone().or_else(|| self.panels.clone()),
            default_control_width: later.default_control_width.or(self.default_control_width),
            default_control_grow: later.default_control_grow.or(self.default_control_grow),
            chaining_system: later.chaining_system.or(self.chaining_system),
            control_style: later.control_style.or(self.control_style),
            show_apply_selections: later.show_apply_selections.or(self.show_apply_selections),
            ignore_parent_settings: later.ignore_parent_settings.or(self.ignore_parent_settings),
        }
    }
}

/// Persisted attribute record. Both JSON fields are strings that may hold
/// anything, including malformed JSON.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RawGroupAttributes {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chaining_system: Option<ChainingSystem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub control_style: Option<ControlStyle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_apply_selections: Option<bool>,
    #[serde(rename = "panelsJSON")]
    pub panels_json: String,
    #[serde(rename = "ignoreParentSettingsJSON")]
    pub ignore_parent_settings_json: String,
}

/// Structured form of [`RawGroupAttributes`] with the JSON fields parsed.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SerializableGroupRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chaining_system: Option<ChainingSystem>,
    pub control_style: ControlStyle,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_apply_selections: Option<bool>,
    pub ignore_parent_settings: IgnoreParentSettings,
    pub panels: PanelMap,
}

/// Live configuration of a group, as handed to the group at build time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GroupRuntimeState {
    pub initial_child_control_state: PanelMap,
    pub default_control_width: ControlWidth,
    pub default_control_grow: bool,
    pub label_position: ControlStyle,
    pub chaining_system: ChainingSystem,
    pub auto_apply_selections: bool,
    pub ignore_parent_settings: IgnoreParentSettings,
}

impl Default for GroupRuntimeState {
    fn default() -> Self {
        Self::from(&PersistableGroupState::default())
    }
}

impl From<&PersistableGroupState> for GroupRuntimeState {
    fn from(state: &PersistableGroupState) -> Self {
        Self {
            initial_child_control_state: state.panels.clone(),
            default_control_width: state.default_control_width,
            default_control_grow: state.default_control_grow,
            label_position: state.control_style,
            chaining_system: state.chaining_system,
            auto_apply_selections: !state.show_apply_selections,
            ignore_parent_settings: state.ignore_parent_settings,
        }
    }
}

impl From<&GroupRuntimeState> for PersistableGroupState {
    fn from(state: &GroupRuntimeState) -> Self {
        Self {
            panels: state.initial_child_control_state.clone(),
            default_control_width: state.default_control_width,
            default_control_grow: state.default_control_grow,
            chaining_system: state.chaining_system,
            control_style: state.label_position,
            show_apply_selections: !state.auto_apply_selections,
            ignore_parent_settings: state.ignore_parent_settings,
        }
    }
}
