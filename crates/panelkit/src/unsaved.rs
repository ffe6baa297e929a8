#![forbid(unsafe_code)]

//! Unsaved-changes tracking against an immutable last-saved baseline.
//!
//! Group-level settings are compared field by field through
//! [`FieldComparator`]s. Child-level differences are collapsed: if any child
//! reports unsaved changes, or the set, order, width, or grow of children
//! differs from the baseline, the whole current child state is captured under
//! `initial_child_control_state`.
//!
//! # Invariants
//!
//! 1. The baseline is an `Arc` that is replaced wholesale, never mutated.
//! 2. `unsaved_changes` is `None` exactly when no comparator differs and no
//!    child reports changes.
//! 3. A reset issued twice performs no child mutations the second time.
//!
//! # Failure Modes
//!
//! - **Child filters never settle**: the reset future never completes and
//!   selections are not re-applied; the synchronous part of the reset has
//!   already happened.

use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::LocalBoxFuture;
use panelkit_runtime::{BatchScope, Observable, Subscription, join_all_local};
use serde::Serialize;
use tracing::{debug, info};

use crate::controls::{
    ControlLayout, ControlOrder, ControlsManager, controls_in_order, controls_layout,
};
use crate::group::{ChainingSystem, ControlStyle, GroupRuntimeState, IgnoreParentSettings};
use crate::panel::{ExplicitInput, PanelMap};
use crate::selections::SelectionsManager;

/// Tracked group-level field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComparatorKey {
    AutoApplySelections,
    ChainingSystem,
    IgnoreParentSettings,
    LabelPosition,
    ControlsInOrder,
    ControlsLayout,
}

/// Immutable last-saved state.
#[derive(Debug, Clone, PartialEq)]
pub struct LastSavedBaseline {
    state: GroupRuntimeState,
    controls_in_order: Vec<ControlOrder>,
    controls_layout: Vec<ControlLayout>,
}

impl LastSavedBaseline {
    #[must_use]
    pub fn capture(state: GroupRuntimeState) -> Arc<Self> {
        let controls_in_order = controls_in_order(&state.initial_child_control_state);
        let controls_layout = controls_layout(&state.initial_child_control_state);
        Arc::new(Self {
            state,
            controls_in_order,
            controls_layout,
        })
    }

    #[must_use]
    pub fn state(&self) -> &GroupRuntimeState {
        &self.state
    }

    #[must_use]
    pub fn controls_in_order(&self) -> &[ControlOrder] {
        &self.controls_in_order
    }

    #[must_use]
    pub fn controls_layout(&self) -> &[ControlLayout] {
        &self.controls_layout
    }

    /// Last-saved input of one control; empty when the control is unknown.
    #[must_use]
    pub fn control_state(&self, id: &str) -> ExplicitInput {
        self.state
            .initial_child_control_state
            .get(id)
            .map(|entry| entry.explicit_input.clone())
            .unwrap_or_default()
    }
}

/// The differing group-level fields, plus a full child snapshot when any
/// child differs.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnsavedChanges {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_apply_selections: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chaining_system: Option<ChainingSystem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ignore_parent_settings: Option<IgnoreParentSettings>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label_position: Option<ControlStyle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_child_control_state: Option<PanelMap>,
}

type Record = Rc<dyn Fn(&mut UnsavedChanges)>;

/// One tracked field: where its current value lives, how to read the
/// baseline's value, and how to compare them.
pub struct FieldComparator {
    key: ComparatorKey,
    differs: Box<dyn Fn(&LastSavedBaseline) -> bool>,
    reset: Option<Box<dyn Fn(&LastSavedBaseline)>>,
    record: Option<Record>,
    watch: Box<dyn Fn(Box<dyn Fn()>) -> Subscription>,
}

impl std::fmt::Debug for FieldComparator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldComparator")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

impl FieldComparator {
    /// Field compared by `PartialEq`.
    pub fn new<T: Clone + PartialEq + 'static>(
        key: ComparatorKey,
        current: Observable<T>,
        baseline: impl Fn(&LastSavedBaseline) -> T + 'static,
        record: impl Fn(&mut UnsavedChanges, T) + 'static,
    ) -> Self {
        Self::with_equality(key, current, baseline, |a: &T, b: &T| a == b, record)
    }

    /// Field compared by a caller-supplied equality.
    pub fn with_equality<T: Clone + PartialEq + 'static>(
        key: ComparatorKey,
        current: Observable<T>,
        baseline: impl Fn(&LastSavedBaseline) -> T + 'static,
        eq: impl Fn(&T, &T) -> bool + 'static,
        record: impl Fn(&mut UnsavedChanges, T) + 'static,
    ) -> Self {
        let baseline = Rc::new(baseline);
        let eq = Rc::new(eq);

        let (cur, base, cmp) = (current.clone(), Rc::clone(&baseline), Rc::clone(&eq));
        let differs: Box<dyn Fn(&LastSavedBaseline) -> bool> = Box::new(move |saved: &LastSavedBaseline| {
            let saved_value = base(saved);
            !cur.with(|value| cmp(value, &saved_value))
        });

        let (cur, base, cmp) = (current.clone(), Rc::clone(&baseline), Rc::clone(&eq));
        let reset: Box<dyn Fn(&LastSavedBaseline)> = Box::new(move |saved: &LastSavedBaseline| {
            cur.set_with_eq(base(saved), |a, b| cmp(a, b));
        });

        let cur = current.clone();
        let record: Record = Rc::new(move |changes: &mut UnsavedChanges| record(changes, cur.get()));

        Self {
            key,
            differs,
            reset: Some(reset),
            record: Some(record),
            watch: watcher(current),
        }
    }

    /// Read-only field derived from other state. It marks children as
    /// changed when it differs and is restored structurally, not by a setter.
    pub fn derived<T: Clone + PartialEq + 'static>(
        key: ComparatorKey,
        current: Observable<T>,
        baseline: impl Fn(&LastSavedBaseline) -> T + 'static,
    ) -> Self {
        let cur = current.clone();
        Self {
            key,
            differs: Box::new(move |saved: &LastSavedBaseline| {
                cur.with(|value| *value != baseline(saved))
            }),
            reset: None,
            record: None,
            watch: watcher(current),
        }
    }

    #[must_use]
    pub fn key(&self) -> ComparatorKey {
        self.key
    }
}

fn watcher<T: Clone + PartialEq + 'static>(
    current: Observable<T>,
) -> Box<dyn Fn(Box<dyn Fn()>) -> Subscription> {
    Box::new(move |on_change: Box<dyn Fn()>| current.subscribe(move |_| on_change()))
}

/// The comparators every control group tracks.
#[must_use]
pub fn group_comparators(
    controls: &ControlsManager,
    auto_apply: &Observable<bool>,
    chaining: &Observable<ChainingSystem>,
    ignore_parent: &Observable<IgnoreParentSettings>,
    label_position: &Observable<ControlStyle>,
) -> Vec<FieldComparator> {
    vec![
        FieldComparator::new(
            ComparatorKey::AutoApplySelections,
            auto_apply.clone(),
            |saved| saved.state().auto_apply_selections,
            |changes, value| changes.auto_apply_selections = Some(value),
        ),
        FieldComparator::new(
            ComparatorKey::ChainingSystem,
            chaining.clone(),
            |saved| saved.state().chaining_system,
            |changes, value| changes.chaining_system = Some(value),
        ),
        FieldComparator::new(
            ComparatorKey::IgnoreParentSettings,
            ignore_parent.clone(),
            |saved| saved.state().ignore_parent_settings,
            |changes, value| changes.ignore_parent_settings = Some(value),
        ),
        FieldComparator::new(
            ComparatorKey::LabelPosition,
            label_position.clone(),
            |saved| saved.state().label_position,
            |changes, value| changes.label_position = Some(value),
        ),
        FieldComparator::derived(
            ComparatorKey::ControlsInOrder,
            controls.controls_in_order(),
            |saved| saved.controls_in_order().to_vec(),
        ),
        FieldComparator::derived(
            ComparatorKey::ControlsLayout,
            controls.controls_layout(),
            |saved| saved.controls_layout().to_vec(),
        ),
    ]
}

struct TrackerInner {
    controls: ControlsManager,
    selections: SelectionsManager,
    auto_apply: Observable<bool>,
    comparators: Vec<FieldComparator>,
    baseline: RefCell<Arc<LastSavedBaseline>>,
    unsaved: Observable<Option<UnsavedChanges>>,
    child_subs: RefCell<Vec<Subscription>>,
    own_subs: RefCell<Vec<Subscription>>,
}

/// Shared handle to a group's unsaved-changes state.
#[derive(Clone)]
pub struct UnsavedChangesTracker {
    inner: Rc<TrackerInner>,
}

impl std::fmt::Debug for UnsavedChangesTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnsavedChangesTracker")
            .field("unsaved", &self.inner.unsaved.get())
            .finish_non_exhaustive()
    }
}

impl UnsavedChangesTracker {
    #[must_use]
    pub fn new(
        controls: &ControlsManager,
        selections: &SelectionsManager,
        auto_apply: &Observable<bool>,
        comparators: Vec<FieldComparator>,
        last_saved: GroupRuntimeState,
    ) -> Self {
        let inner = Rc::new(TrackerInner {
            controls: controls.clone(),
            selections: selections.clone(),
            auto_apply: auto_apply.clone(),
            comparators,
            baseline: RefCell::new(LastSavedBaseline::capture(last_saved)),
            unsaved: Observable::new(None),
            child_subs: RefCell::new(Vec::new()),
            own_subs: RefCell::new(Vec::new()),
        });

        let mut subs: Vec<Subscription> = inner
            .comparators
            .iter()
            .map(|comparator| {
                let weak = Rc::downgrade(&inner);
                (comparator.watch)(Box::new(move || {
                    if let Some(inner) = weak.upgrade() {
                        recompute(&inner);
                    }
                }))
            })
            .collect();
        let weak = Rc::downgrade(&inner);
        subs.push(controls.children().subscribe(move |_| {
            if let Some(inner) = weak.upgrade() {
                resubscribe_children(&inner);
                recompute(&inner);
            }
        }));
        *inner.own_subs.borrow_mut() = subs;

        resubscribe_children(&inner);
        recompute(&inner);
        Self { inner }
    }

    /// `None` while nothing differs from the baseline.
    #[must_use]
    pub fn unsaved_changes(&self) -> Observable<Option<UnsavedChanges>> {
        self.inner.unsaved.clone()
    }

    #[must_use]
    pub fn has_unsaved_changes(&self) -> bool {
        self.inner.unsaved.with(Option::is_some)
    }

    #[must_use]
    pub fn baseline(&self) -> Arc<LastSavedBaseline> {
        self.inner.baseline.borrow().clone()
    }

    /// Replace the baseline wholesale and recompute.
    pub fn replace_baseline(&self, state: GroupRuntimeState) {
        *self.inner.baseline.borrow_mut() = LastSavedBaseline::capture(state);
        info!(target: "panelkit.unsaved", "baseline replaced");
        recompute(&self.inner);
    }

    /// Return to the baseline.
    ///
    /// Synchronously: every resettable field is set back, the children's
    /// structure is restored, and each child that reports unsaved changes
    /// is reset. The returned future then waits for the filters of the
    /// children live at that moment to settle and, unless auto-apply is on,
    /// applies selections.
    pub fn reset_unsaved_changes(&self) -> LocalBoxFuture<'static, ()> {
        let baseline = self.baseline();
        {
            let _batch = BatchScope::new();
            for comparator in &self.inner.comparators {
                if let Some(reset) = &comparator.reset {
                    reset(&baseline);
                }
            }
            self.inner
                .controls
                .restore_structure(&baseline.state().initial_child_control_state);
        }

        let children = self.inner.controls.children().get();
        let mut reset_children = 0_usize;
        let mut waits = Vec::new();
        for child in children.iter() {
            if child.has_unsaved_changes() {
                child.panel().reset_unsaved_changes();
                reset_children += 1;
            }
            if let Some(ready) = child.panel().until_filters_ready() {
                waits.push(ready);
            }
        }
        debug!(
            target: "panelkit.unsaved",
            reset_children,
            waiting = waits.len(),
            "unsaved changes reset"
        );

        let selections = self.inner.selections.clone();
        let auto_apply = self.inner.auto_apply.clone();
        async move {
            join_all_local(waits).await;
            if !auto_apply.get() {
                selections.apply_selections();
            }
        }
        .boxed_local()
    }
}

fn resubscribe_children(inner: &Rc<TrackerInner>) {
    let children = inner.controls.children().get();
    let subs: Vec<Subscription> = children
        .iter()
        .filter_map(|child| child.panel().unsaved_changes())
        .map(|changes| {
            let weak: Weak<TrackerInner> = Rc::downgrade(inner);
            changes.subscribe(move |_| {
                if let Some(inner) = weak.upgrade() {
                    recompute(&inner);
                }
            })
        })
        .collect();
    *inner.child_subs.borrow_mut() = subs;
}

fn recompute(inner: &TrackerInner) {
    let baseline = inner.baseline.borrow().clone();
    let mut changes = UnsavedChanges::default();
    let mut any = false;
    let mut children_differ = false;

    for comparator in &inner.comparators {
        if !(comparator.differs)(&baseline) {
            continue;
        }
        match &comparator.record {
            Some(record) => {
                record(&mut changes);
                any = true;
            }
            None => children_differ = true,
        }
    }

    children_differ |= inner
        .controls
        .children()
        .with(|children| children.iter().any(|child| child.has_unsaved_changes()));
    if children_differ {
        changes.initial_child_control_state = Some(inner.controls.snapshot().panels);
        any = true;
    }

    let next = any.then_some(changes);
    if inner.unsaved.set(next) {
        debug!(
            target: "panelkit.unsaved",
            unsaved = inner.unsaved.with(Option::is_some),
            "unsaved changes recomputed"
        );
    }
}
