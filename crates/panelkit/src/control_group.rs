#![forbid(unsafe_code)]

//! A control group: controls, selections, and unsaved-changes tracking wired
//! to one set of group-level settings.

use std::cell::Cell;
use std::rc::Rc;

use futures_util::future::LocalBoxFuture;
use panelkit_runtime::Observable;
use tracing::{debug, info, warn};

use crate::chaining;
use crate::child::FactoryRegistry;
use crate::codec;
use crate::context::{FetchContext, Filter, ParentContext};
use crate::controls::{ControlsManager, NewControlState};
use crate::error::{CapabilityFetchError, Result};
use crate::group::{
    ChainingSystem, ControlStyle, GroupRuntimeState, IgnoreParentSettings, PersistableGroupState,
    RawGroupAttributes,
};
use crate::panel::{ExplicitInput, PanelId, Reference};
use crate::selections::SelectionsManager;
use crate::unsaved::{UnsavedChanges, UnsavedChangesTracker, group_comparators};

/// Source of the optional "expensive queries allowed" capability.
pub trait CapabilityFetcher {
    fn allow_expensive_queries(&self) -> LocalBoxFuture<'_, std::result::Result<bool, CapabilityFetchError>>;
}

/// What [`ControlGroup::serialize_state`] returns.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SerializedGroup {
    pub raw: RawGroupAttributes,
    pub references: Vec<Reference>,
}

struct GroupInner {
    id: String,
    controls: ControlsManager,
    selections: SelectionsManager,
    unsaved: UnsavedChangesTracker,
    auto_apply: Observable<bool>,
    chaining_system: Observable<ChainingSystem>,
    ignore_parent_settings: Observable<IgnoreParentSettings>,
    label_position: Observable<ControlStyle>,
    allow_expensive_queries: Observable<bool>,
    parent: Observable<ParentContext>,
    destroyed: Cell<bool>,
}

/// Shared handle to a running control group.
#[derive(Clone)]
pub struct ControlGroup {
    inner: Rc<GroupInner>,
}

impl std::fmt::Debug for ControlGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlGroup")
            .field("id", &self.inner.id)
            .field("controls", &self.inner.controls.ids())
            .finish_non_exhaustive()
    }
}

impl ControlGroup {
    /// Build a group and consult `capabilities` once for the expensive
    /// queries setting. A failed fetch leaves it at `true`.
    pub async fn build(
        id: impl Into<String>,
        initial: &GroupRuntimeState,
        last_saved: GroupRuntimeState,
        factories: FactoryRegistry,
        capabilities: &dyn CapabilityFetcher,
    ) -> Self {
        let group = Self::new(id, initial, last_saved, factories);
        match capabilities.allow_expensive_queries().await {
            Ok(allowed) => {
                group.inner.allow_expensive_queries.set(allowed);
            }
            Err(error) => {
                warn!(target: "panelkit.compose", group = %group.inner.id, %error, "capability fetch failed, allowing expensive queries");
            }
        }
        group
    }

    /// Build a group without consulting any capability source.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        initial: &GroupRuntimeState,
        last_saved: GroupRuntimeState,
        factories: FactoryRegistry,
    ) -> Self {
        let id = id.into();
        let defaults = NewControlState {
            width: initial.default_control_width,
            grow: initial.default_control_grow,
        };
        let controls =
            ControlsManager::with_defaults(&initial.initial_child_control_state, factories, defaults);
        let auto_apply = Observable::new(initial.auto_apply_selections);
        let chaining_system = Observable::new(initial.chaining_system);
        let ignore_parent_settings = Observable::new(initial.ignore_parent_settings);
        let label_position = Observable::new(initial.label_position);
        let selections = SelectionsManager::new(&controls, auto_apply.clone());
        let comparators = group_comparators(
            &controls,
            &auto_apply,
            &chaining_system,
            &ignore_parent_settings,
            &label_position,
        );
        let unsaved =
            UnsavedChangesTracker::new(&controls, &selections, &auto_apply, comparators, last_saved);
        info!(target: "panelkit.compose", group = %id, controls = controls.len(), "control group built");

        Self {
            inner: Rc::new(GroupInner {
                id,
                controls,
                selections,
                unsaved,
                auto_apply,
                chaining_system,
                ignore_parent_settings,
                label_position,
                allow_expensive_queries: Observable::new(true),
                parent: Observable::new(ParentContext::default()),
                destroyed: Cell::new(false),
            }),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    #[must_use]
    pub fn controls(&self) -> &ControlsManager {
        &self.inner.controls
    }

    #[must_use]
    pub fn selections(&self) -> &SelectionsManager {
        &self.inner.selections
    }

    #[must_use]
    pub fn unsaved(&self) -> &UnsavedChangesTracker {
        &self.inner.unsaved
    }

    #[must_use]
    pub fn auto_apply_selections(&self) -> Observable<bool> {
        self.inner.auto_apply.clone()
    }

    #[must_use]
    pub fn chaining_system(&self) -> Observable<ChainingSystem> {
        self.inner.chaining_system.clone()
    }

    #[must_use]
    pub fn ignore_parent_settings(&self) -> Observable<IgnoreParentSettings> {
        self.inner.ignore_parent_settings.clone()
    }

    #[must_use]
    pub fn label_position(&self) -> Observable<ControlStyle> {
        self.inner.label_position.clone()
    }

    #[must_use]
    pub fn allow_expensive_queries(&self) -> Observable<bool> {
        self.inner.allow_expensive_queries.clone()
    }

    /// Context supplied by the owning container.
    #[must_use]
    pub fn parent_context(&self) -> Observable<ParentContext> {
        self.inner.parent.clone()
    }

    #[must_use]
    pub fn unsaved_changes(&self) -> Observable<Option<UnsavedChanges>> {
        self.inner.unsaved.unsaved_changes()
    }

    #[must_use]
    pub fn published_filters(&self) -> Observable<Vec<Filter>> {
        self.inner.selections.published_filters()
    }

    #[must_use]
    pub fn has_unapplied_selections(&self) -> Observable<bool> {
        self.inner.selections.has_unapplied_selections()
    }

    pub fn apply_selections(&self) {
        self.inner.selections.apply_selections();
    }

    /// Add a control of `panel_type` at the end of the group.
    pub fn add_new_panel(&self, panel_type: &str, initial: ExplicitInput) -> Result<PanelId> {
        self.inner.controls.add_panel(panel_type, initial, None)
    }

    pub fn reset_unsaved_changes(&self) -> LocalBoxFuture<'static, ()> {
        self.inner.unsaved.reset_unsaved_changes()
    }

    /// Last-saved input of a control; empty when the control is new.
    #[must_use]
    pub fn last_saved_control_state(&self, id: &str) -> ExplicitInput {
        self.inner.unsaved.baseline().control_state(id)
    }

    /// Filters control `id` receives from the controls before it.
    #[must_use]
    pub fn chained_filters(&self, id: &str) -> Vec<Filter> {
        chaining::chained_filters(
            id,
            self.inner.chaining_system.get(),
            &self.inner.controls.controls_in_order().get(),
            &self.inner.controls.children().get(),
        )
    }

    /// Everything control `id` needs to fetch its data.
    #[must_use]
    pub fn control_fetch_context(&self, id: &str) -> FetchContext {
        chaining::control_fetch_context(
            id,
            self.inner.chaining_system.get(),
            &self.inner.controls.controls_in_order().get(),
            &self.inner.controls.children().get(),
            &self.inner.parent.get(),
            &self.inner.ignore_parent_settings.get(),
        )
    }

    /// Current state in runtime shape, with children snapshotted live.
    #[must_use]
    pub fn runtime_state(&self) -> GroupRuntimeState {
        let defaults = self.inner.controls.defaults();
        GroupRuntimeState {
            initial_child_control_state: self.inner.controls.snapshot().panels,
            default_control_width: defaults.width,
            default_control_grow: defaults.grow,
            label_position: self.inner.label_position.get(),
            chaining_system: self.inner.chaining_system.get(),
            auto_apply_selections: self.inner.auto_apply.get(),
            ignore_parent_settings: self.inner.ignore_parent_settings.get(),
        }
    }

    /// Persisted attributes plus the references the children report.
    #[must_use]
    pub fn serialize_state(&self) -> SerializedGroup {
        let snapshot = self.inner.controls.snapshot();
        let defaults = self.inner.controls.defaults();
        let state = PersistableGroupState {
            panels: snapshot.panels,
            default_control_width: defaults.width,
            default_control_grow: defaults.grow,
            chaining_system: self.inner.chaining_system.get(),
            control_style: self.inner.label_position.get(),
            show_apply_selections: !self.inner.auto_apply.get(),
            ignore_parent_settings: self.inner.ignore_parent_settings.get(),
        };
        SerializedGroup {
            raw: codec::encode(&state),
            references: snapshot.references,
        }
    }

    /// Make the current state the new last-saved baseline.
    pub fn save_baseline(&self) {
        self.inner.unsaved.replace_baseline(self.runtime_state());
    }

    /// Tear the group down. Only the first call has any effect.
    pub fn destroy(&self) -> bool {
        if self.inner.destroyed.replace(true) {
            return false;
        }
        self.inner.selections.cleanup();
        self.inner.controls.teardown_all();
        debug!(target: "panelkit.compose", group = %self.inner.id, "control group destroyed");
        true
    }
}
