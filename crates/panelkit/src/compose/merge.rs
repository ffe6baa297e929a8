#![forbid(unsafe_code)]

//! Layered merge of container input.
//!
//! Layers apply left to right: defaults, loaded state, session backup,
//! caller overrides. Scalar fields are replaced by the latest layer that
//! sets them. Panel maps merge by id.
//!
//! # Invariants
//!
//! 1. A panel whose type keeps runtime state separately retains the shell
//!    it already had; the incoming input goes to the runtime state map and
//!    is applied once the live child exists.
//! 2. An unset field in a layer never clears a value from a lower layer.

use std::collections::HashSet;

use serde_json::Value;

use super::state::{ContainerOverrides, ContainerState, IncomingTransfer, RuntimeStateMap, ViewMode};
use crate::codec;
use crate::group::{PartialGroupState, PersistableGroupState};
use crate::panel::{ExplicitInput, PanelEntry, PanelMap};

/// Input key preserved across an incoming transfer onto an existing panel.
pub const HIDE_PANEL_TITLES: &str = "hidePanelTitles";

/// Result of merging every layer.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MergedInput {
    pub state: ContainerState,
    pub control_group: PersistableGroupState,
    pub runtime_state: RuntimeStateMap,
}

/// Apply the scalar fields of `layer` onto `state`, and merge its panels by
/// id.
pub fn apply_layer(state: &mut ContainerState, layer: &ContainerOverrides) {
    if let Some(title) = &layer.title {
        state.title = title.clone();
    }
    if let Some(view_mode) = layer.view_mode {
        state.view_mode = view_mode;
    }
    if let Some(panels) = &layer.panels {
        merge_panels(&mut state.panels, panels.iter().cloned());
    }
    if let Some(filters) = &layer.filters {
        state.filters = filters.clone();
    }
    if let Some(query) = &layer.query {
        state.query = query.clone();
    }
    if let Some(range) = &layer.time_range {
        state.time_range = Some(range.clone());
    }
    if let Some(restore) = layer.time_restore {
        state.time_restore = restore;
    }
}

fn merge_panels(base: &mut PanelMap, incoming: impl IntoIterator<Item = PanelEntry>) {
    for entry in incoming {
        base.insert(entry);
    }
}

/// Rewrite the override layer's panels so runtime-state panels keep the
/// shell from `existing`. Their inputs are recorded in `runtime_state`.
#[must_use]
pub fn split_runtime_panels(
    overrides: &PanelMap,
    existing: &PanelMap,
    runtime_types: &HashSet<String>,
    runtime_state: &mut RuntimeStateMap,
) -> PanelMap {
    overrides
        .iter()
        .map(|panel| {
            if !runtime_types.contains(&panel.panel_type) {
                return panel.clone();
            }
            runtime_state.insert(panel.id.clone(), panel.explicit_input.clone());
            existing.get(&panel.id).cloned().unwrap_or_else(|| panel.clone())
        })
        .collect()
}

/// Merge every layer into the initial container input.
///
/// `initial_view_mode` sits between the session layer and the caller
/// overrides, so an override's view mode still wins.
#[must_use]
pub fn merge_layers(
    loaded: &ContainerOverrides,
    loaded_group: Option<&PersistableGroupState>,
    session: Option<&ContainerOverrides>,
    session_runtime: Option<&RuntimeStateMap>,
    initial_view_mode: ViewMode,
    overrides: Option<&ContainerOverrides>,
    runtime_types: &HashSet<String>,
) -> MergedInput {
    let mut state = ContainerState::default();
    let mut runtime_state = session_runtime.cloned().unwrap_or_default();

    apply_layer(&mut state, loaded);
    if let Some(session) = session {
        apply_layer(&mut state, session);
    }
    state.view_mode = initial_view_mode;

    if let Some(overrides) = overrides {
        let mut layer = overrides.clone();
        if let Some(panels) = &overrides.panels {
            layer.panels = Some(split_runtime_panels(
                panels,
                &state.panels,
                runtime_types,
                &mut runtime_state,
            ));
        }
        apply_layer(&mut state, &layer);
    }

    let mut control_group = loaded_group.cloned().unwrap_or_else(codec::default_state);
    let group_layers = [session, overrides]
        .into_iter()
        .flatten()
        .filter_map(|layer| layer.control_group.as_ref())
        .fold(PartialGroupState::default(), |acc, layer| acc.merged_with(layer));
    group_layers.apply_to(&mut control_group);

    MergedInput {
        state,
        control_group,
        runtime_state,
    }
}

/// Merge an incoming transfer onto the panel it targets.
///
/// Returns `false` when the transfer has no target id or the target does
/// not exist; the caller then places it as a new panel. A same-type
/// transfer keeps the old input as a base. The `id` and
/// `hidePanelTitles` keys always come from the existing panel.
pub fn merge_incoming_into_existing(
    state: &mut ContainerState,
    incoming: &IncomingTransfer,
    runtime_types: &HashSet<String>,
    runtime_state: &mut RuntimeStateMap,
) -> bool {
    let Some(id) = incoming.embeddable_id.as_deref() else {
        return false;
    };
    let Some(panel) = state.panels.get_mut(id) else {
        return false;
    };

    let same_type = panel.panel_type == incoming.panel_type;
    let mut next: ExplicitInput = if same_type {
        panel.explicit_input.clone()
    } else {
        ExplicitInput::new()
    };
    next.extend(incoming.input.clone());
    next.insert("id".into(), Value::String(id.to_owned()));
    match panel.explicit_input.get(HIDE_PANEL_TITLES) {
        Some(hide) => {
            next.insert(HIDE_PANEL_TITLES.into(), hide.clone());
        }
        None => {
            next.remove(HIDE_PANEL_TITLES);
        }
    }

    panel.panel_type = incoming.panel_type.clone();
    if runtime_types.contains(&incoming.panel_type) {
        let mut shell = ExplicitInput::new();
        shell.insert("id".into(), Value::String(id.to_owned()));
        panel.explicit_input = shell;
        runtime_state.insert(id.to_owned(), next);
    } else {
        panel.explicit_input = next;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::ChainingSystem;
    use crate::panel::GridData;
    use serde_json::json;

    fn input(value: Value) -> ExplicitInput {
        value.as_object().cloned().unwrap_or_default()
    }

    fn panels(entries: Vec<PanelEntry>) -> PanelMap {
        entries.into_iter().collect()
    }

    fn runtime_types() -> HashSet<String> {
        HashSet::from(["lens".to_owned()])
    }

    #[test]
    fn later_layers_win_per_field() {
        let loaded = ContainerOverrides {
            title: Some("saved".into()),
            time_restore: Some(true),
            ..ContainerOverrides::default()
        };
        let session = ContainerOverrides {
            title: Some("edited".into()),
            ..ContainerOverrides::default()
        };
        let merged = merge_layers(&loaded, None, Some(&session), None, ViewMode::Edit, None, &runtime_types());
        assert_eq!(merged.state.title, "edited");
        assert!(merged.state.time_restore);
        assert_eq!(merged.state.view_mode, ViewMode::Edit);
    }

    #[test]
    fn override_view_mode_beats_initial() {
        let overrides = ContainerOverrides {
            view_mode: Some(ViewMode::View),
            ..ContainerOverrides::default()
        };
        let merged = merge_layers(
            &ContainerOverrides::default(),
            None,
            None,
            None,
            ViewMode::Edit,
            Some(&overrides),
            &runtime_types(),
        );
        assert_eq!(merged.state.view_mode, ViewMode::View);
    }

    #[test]
    fn panels_merge_by_id() {
        let loaded = ContainerOverrides {
            panels: Some(panels(vec![
                PanelEntry::new("a", "viz", input(json!({"title": "A"}))),
                PanelEntry::new("b", "viz", ExplicitInput::new()),
            ])),
            ..ContainerOverrides::default()
        };
        let session = ContainerOverrides {
            panels: Some(panels(vec![
                PanelEntry::new("a", "viz", input(json!({"title": "A2"}))),
                PanelEntry::new("c", "viz", ExplicitInput::new()),
            ])),
            ..ContainerOverrides::default()
        };
        let merged = merge_layers(&loaded, None, Some(&session), None, ViewMode::View, None, &runtime_types());
        assert_eq!(merged.state.panels.ids(), vec!["a", "b", "c"]);
        assert_eq!(merged.state.panels.get("a").unwrap().explicit_input["title"], json!("A2"));
    }

    #[test]
    fn runtime_panels_keep_existing_shell() {
        let grid = GridData {
            x: 4,
            y: 2,
            w: 10,
            h: 8,
            i: "a".into(),
        };
        let loaded = ContainerOverrides {
            panels: Some(panels(vec![
                PanelEntry::new("a", "lens", input(json!({"id": "a"}))).with_grid(grid.clone()),
            ])),
            ..ContainerOverrides::default()
        };
        let overrides = ContainerOverrides {
            panels: Some(panels(vec![
                PanelEntry::new("a", "lens", input(json!({"id": "a", "query": "x"}))),
                PanelEntry::new("n", "lens", input(json!({"id": "n"}))),
            ])),
            ..ContainerOverrides::default()
        };
        let merged = merge_layers(&loaded, None, None, None, ViewMode::Edit, Some(&overrides), &runtime_types());
        let kept = merged.state.panels.get("a").unwrap();
        assert_eq!(kept.grid_data.as_ref(), Some(&grid));
        assert_eq!(kept.explicit_input, input(json!({"id": "a"})));
        assert_eq!(merged.runtime_state["a"], input(json!({"id": "a", "query": "x"})));
        assert!(merged.state.panels.contains("n"));
        assert!(merged.runtime_state.contains_key("n"));
    }

    #[test]
    fn other_override_panels_replace_entry() {
        let loaded = ContainerOverrides {
            panels: Some(panels(vec![PanelEntry::new("a", "viz", input(json!({"old": true})))])),
            ..ContainerOverrides::default()
        };
        let overrides = ContainerOverrides {
            panels: Some(panels(vec![PanelEntry::new("a", "viz", input(json!({"new": true})))])),
            ..ContainerOverrides::default()
        };
        let merged = merge_layers(&loaded, None, None, None, ViewMode::Edit, Some(&overrides), &runtime_types());
        assert_eq!(merged.state.panels.get("a").unwrap().explicit_input, input(json!({"new": true})));
        assert!(merged.runtime_state.is_empty());
    }

    #[test]
    fn control_group_layers_override_loaded_group() {
        let loaded_group = PersistableGroupState {
            show_apply_selections: true,
            ..PersistableGroupState::default()
        };
        let overrides = ContainerOverrides {
            control_group: Some(PartialGroupState {
                chaining_system: Some(ChainingSystem::None),
                ..PartialGroupState::default()
            }),
            ..ContainerOverrides::default()
        };
        let merged = merge_layers(
            &ContainerOverrides::default(),
            Some(&loaded_group),
            None,
            None,
            ViewMode::View,
            Some(&overrides),
            &runtime_types(),
        );
        assert!(merged.control_group.show_apply_selections);
        assert_eq!(merged.control_group.chaining_system, ChainingSystem::None);
    }

    #[test]
    fn incoming_same_type_spreads_old_input() {
        let mut state = ContainerState {
            panels: panels(vec![PanelEntry::new(
                "a",
                "viz",
                input(json!({"id": "a", "title": "old", "color": "red", "hidePanelTitles": true})),
            )]),
            ..ContainerState::default()
        };
        let incoming = IncomingTransfer::new("viz", input(json!({"title": "new", "hidePanelTitles": false}))).targeting("a");
        let mut runtime = RuntimeStateMap::new();
        assert!(merge_incoming_into_existing(&mut state, &incoming, &runtime_types(), &mut runtime));
        assert_eq!(
            state.panels.get("a").unwrap().explicit_input,
            input(json!({"id": "a", "title": "new", "color": "red", "hidePanelTitles": true}))
        );
    }

    #[test]
    fn incoming_new_type_drops_old_input() {
        let mut state = ContainerState {
            panels: panels(vec![PanelEntry::new("a", "viz", input(json!({"color": "red"})))]),
            ..ContainerState::default()
        };
        let incoming = IncomingTransfer::new("lens", input(json!({"query": "q"}))).targeting("a");
        let mut runtime = RuntimeStateMap::new();
        assert!(merge_incoming_into_existing(&mut state, &incoming, &runtime_types(), &mut runtime));
        let panel = state.panels.get("a").unwrap();
        assert_eq!(panel.panel_type, "lens");
        assert_eq!(panel.explicit_input, input(json!({"id": "a"})));
        assert_eq!(runtime["a"], input(json!({"id": "a", "query": "q"})));
    }

    #[test]
    fn incoming_unknown_target_is_not_merged() {
        let mut state = ContainerState::default();
        let incoming = IncomingTransfer::new("viz", ExplicitInput::new()).targeting("missing");
        assert!(!merge_incoming_into_existing(&mut state, &incoming, &runtime_types(), &mut RuntimeStateMap::new()));
        let untargeted = IncomingTransfer::new("viz", ExplicitInput::new());
        assert!(!merge_incoming_into_existing(&mut state, &untargeted, &runtime_types(), &mut RuntimeStateMap::new()));
    }
}
