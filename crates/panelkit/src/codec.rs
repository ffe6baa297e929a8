#![forbid(unsafe_code)]

//! Conversion between persisted group attributes and [`PersistableGroupState`].
//!
//! # Failure Modes
//!
//! - **Malformed `panelsJSON` / `ignoreParentSettingsJSON`**: the field is
//!   treated as absent and its default is used. Decoding never fails.
//! - **Unserializable state on encode**: cannot happen for these types; if
//!   it ever did, the field is written as `{}` and a warning is logged.

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::diff::DiffRegistry;
use crate::group::{
    IgnoreParentSettings, PersistableGroupState, RawGroupAttributes, SerializableGroupRecord,
    DEFAULT_CONTROL_STYLE,
};
use crate::panel::{PanelEntry, PanelMap};

/// The fixed default group state.
#[must_use]
pub fn default_state() -> PersistableGroupState {
    PersistableGroupState::default()
}

/// Decode raw attributes, substituting defaults for anything missing or
/// unparseable.
#[must_use]
pub fn decode(raw: &RawGroupAttributes) -> PersistableGroupState {
    let defaults = default_state();
    PersistableGroupState {
        panels: parse_field(&raw.panels_json, "panelsJSON").unwrap_or(defaults.panels),
        default_control_width: defaults.default_control_width,
        default_control_grow: defaults.default_control_grow,
        chaining_system: raw.chaining_system.unwrap_or(defaults.chaining_system),
        control_style: raw.control_style.unwrap_or(defaults.control_style),
        show_apply_selections: raw
            .show_apply_selections
            .unwrap_or(defaults.show_apply_selections),
        ignore_parent_settings: parse_field(&raw.ignore_parent_settings_json, "ignoreParentSettingsJSON")
            .unwrap_or(defaults.ignore_parent_settings),
    }
}

/// Encode a state into raw attributes.
#[must_use]
pub fn encode(state: &PersistableGroupState) -> RawGroupAttributes {
    RawGroupAttributes {
        chaining_system: Some(state.chaining_system),
        control_style: Some(state.control_style),
        show_apply_selections: Some(state.show_apply_selections),
        panels_json: to_json_string(&state.panels, "panelsJSON"),
        ignore_parent_settings_json: to_json_string(
            &state.ignore_parent_settings,
            "ignoreParentSettingsJSON",
        ),
    }
}

/// Give every panel a fresh id, mirrored into `explicitInput.id`.
///
/// Panel order and all other fields are kept.
#[must_use]
pub fn regenerate_ids(state: &PersistableGroupState) -> PersistableGroupState {
    let panels: PanelMap = state
        .panels
        .iter()
        .map(|entry| {
            let id = Uuid::new_v4().to_string();
            let mut fresh = entry.clone();
            fresh.explicit_input
                .insert("id".to_owned(), serde_json::Value::String(id.clone()));
            if let Some(grid) = fresh.grid_data.as_mut() {
                grid.i.clone_from(&id);
            }
            fresh.id = id;
            fresh
        })
        .collect();
    PersistableGroupState {
        panels,
        ..state.clone()
    }
}

/// Whether two (possibly absent) states are equivalent.
///
/// Absent sides are replaced by the default state. Panels are compared by
/// id set first, then per panel through `diffs`.
#[must_use]
pub fn is_equal(
    a: Option<&PersistableGroupState>,
    b: Option<&PersistableGroupState>,
    include_selections: bool,
    diffs: &DiffRegistry,
) -> bool {
    let defaults = default_state();
    let a = a.unwrap_or(&defaults);
    let b = b.unwrap_or(&defaults);

    if a.default_control_width != b.default_control_width
        || a.default_control_grow != b.default_control_grow
        || a.chaining_system != b.chaining_system
        || a.control_style != b.control_style
        || a.show_apply_selections != b.show_apply_selections
        || a.ignore_parent_settings != b.ignore_parent_settings
    {
        return false;
    }
    panel_maps_equal(&a.panels, &b.panels, include_selections, diffs)
}

/// Id-set equality followed by per-panel strategy dispatch.
#[must_use]
pub fn panel_maps_equal(
    a: &PanelMap,
    b: &PanelMap,
    include_selections: bool,
    diffs: &DiffRegistry,
) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().all(|old: &PanelEntry| {
        b.get(&old.id)
            .is_some_and(|new| diffs.panels_equal(old, new, include_selections))
    })
}

/// Raw attributes to their structured record form.
#[must_use]
pub fn to_serializable(raw: &RawGroupAttributes) -> SerializableGroupRecord {
    SerializableGroupRecord {
        chaining_system: raw.chaining_system,
        control_style: raw.control_style.unwrap_or(DEFAULT_CONTROL_STYLE),
        show_apply_selections: raw.show_apply_selections,
        ignore_parent_settings: parse_field::<IgnoreParentSettings>(
            &raw.ignore_parent_settings_json,
            "ignoreParentSettingsJSON",
        )
        .unwrap_or_default(),
        panels: parse_field(&raw.panels_json, "panelsJSON").unwrap_or_default(),
    }
}

/// Structured record back to raw attributes.
#[must_use]
pub fn from_serializable(record: &SerializableGroupRecord) -> RawGroupAttributes {
    RawGroupAttributes {
        chaining_system: record.chaining_system,
        control_style: Some(record.control_style),
        show_apply_selections: Some(record.show_apply_selections.unwrap_or(false)),
        panels_json: to_json_string(&record.panels, "panelsJSON"),
        ignore_parent_settings_json: to_json_string(
            &record.ignore_parent_settings,
            "ignoreParentSettingsJSON",
        ),
    }
}

fn parse_field<T: DeserializeOwned>(raw: &str, field: &'static str) -> Option<T> {
    match serde_json::from_str(raw) {
        Ok(value) => Some(value),
        Err(error) => {
            debug!(target: "panelkit.codec", field, %error, "unparseable field, using default");
            None
        }
    }
}

fn to_json_string<T: Serialize>(value: &T, field: &'static str) -> String {
    serde_json::to_string(value).unwrap_or_else(|error| {
        warn!(target: "panelkit.codec", field, %error, "failed to encode field");
        String::from("{}")
    })
}
