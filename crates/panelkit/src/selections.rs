#![forbid(unsafe_code)]

//! Pending versus applied selections across a group's children.
//!
//! Children publish their output filters; the manager concatenates them in
//! control order into the *unpublished* filters. In auto-apply mode those
//! are published immediately. Otherwise they wait for
//! [`SelectionsManager::apply_selections`].
//!
//! # Invariants
//!
//! 1. `has_unapplied_selections` is `false` whenever auto-apply is on.
//! 2. Child subscriptions are rebuilt on every children emission, so added
//!    and removed children are tracked without extra calls.
//! 3. [`cleanup`](SelectionsManager::cleanup) releases everything exactly
//!    once; later calls do nothing.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use panelkit_runtime::{Observable, Subscription};
use tracing::{debug, info, warn};

use crate::child::Children;
use crate::context::Filter;
use crate::controls::ControlsManager;

struct SelectionsInner {
    children: Observable<Children>,
    auto_apply: Observable<bool>,
    has_unapplied: Observable<bool>,
    unpublished: Observable<Vec<Filter>>,
    published: Observable<Vec<Filter>>,
    child_subs: RefCell<Vec<Subscription>>,
    own_subs: RefCell<Vec<Subscription>>,
    cleaned_up: Cell<bool>,
}

/// Shared handle to a group's selection state.
#[derive(Clone)]
pub struct SelectionsManager {
    inner: Rc<SelectionsInner>,
}

impl std::fmt::Debug for SelectionsManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectionsManager")
            .field("has_unapplied", &self.inner.has_unapplied.get())
            .field("cleaned_up", &self.inner.cleaned_up.get())
            .finish_non_exhaustive()
    }
}

impl SelectionsManager {
    #[must_use]
    pub fn new(controls: &ControlsManager, auto_apply: Observable<bool>) -> Self {
        let children = controls.children();
        let unpublished = combined_output_filters(&children.get());
        let inner = Rc::new(SelectionsInner {
            children: children.clone(),
            auto_apply: auto_apply.clone(),
            has_unapplied: Observable::new(false),
            published: Observable::new(unpublished.clone()),
            unpublished: Observable::new(unpublished),
            child_subs: RefCell::new(Vec::new()),
            own_subs: RefCell::new(Vec::new()),
            cleaned_up: Cell::new(false),
        });

        let weak = Rc::downgrade(&inner);
        let on_children = children.subscribe(move |_| {
            if let Some(inner) = weak.upgrade() {
                resubscribe(&inner);
                recompute(&inner);
            }
        });
        let weak = Rc::downgrade(&inner);
        let on_auto_apply = auto_apply.subscribe(move |auto| {
            if let Some(inner) = weak.upgrade() {
                if *auto {
                    inner.published.set(inner.unpublished.get());
                }
                recompute(&inner);
            }
        });
        inner.own_subs.borrow_mut().extend([on_children, on_auto_apply]);

        resubscribe(&inner);
        recompute(&inner);
        Self { inner }
    }

    /// `true` when some child holds a pending selection or the filters the
    /// children produce differ from the published ones.
    #[must_use]
    pub fn has_unapplied_selections(&self) -> Observable<bool> {
        self.inner.has_unapplied.clone()
    }

    /// Filters currently in effect for the group.
    #[must_use]
    pub fn published_filters(&self) -> Observable<Vec<Filter>> {
        self.inner.published.clone()
    }

    /// Filters the children currently produce, applied or not.
    #[must_use]
    pub fn unpublished_filters(&self) -> Observable<Vec<Filter>> {
        self.inner.unpublished.clone()
    }

    /// Commit every child's pending selection and publish the result.
    /// Does nothing in auto-apply mode.
    pub fn apply_selections(&self) {
        if self.inner.auto_apply.get() {
            debug!(target: "panelkit.selections", "apply ignored in auto-apply mode");
            return;
        }
        let children = self.inner.children.get();
        for child in children.iter() {
            child.panel().commit_pending_selections();
        }
        // Committing may have changed child filters; read them fresh.
        let filters = combined_output_filters(&children);
        self.inner.unpublished.set(filters.clone());
        self.inner.published.set(filters);
        recompute(&self.inner);
        info!(target: "panelkit.selections", children = children.len(), "selections applied");
    }

    /// Release all child subscriptions. Returns `false` if already done.
    pub fn cleanup(&self) -> bool {
        if self.inner.cleaned_up.replace(true) {
            warn!(target: "panelkit.selections", "cleanup called more than once");
            return false;
        }
        self.inner.child_subs.borrow_mut().clear();
        self.inner.own_subs.borrow_mut().clear();
        debug!(target: "panelkit.selections", "selection subscriptions released");
        true
    }
}

fn combined_output_filters(children: &Children) -> Vec<Filter> {
    children
        .iter()
        .filter_map(|child| child.panel().output_filters())
        .flat_map(|filters| filters.get())
        .collect()
}

fn resubscribe(inner: &Rc<SelectionsInner>) {
    if inner.cleaned_up.get() {
        return;
    }
    let children = inner.children.get();
    let mut subs = Vec::new();
    for child in children.iter() {
        let panel = child.panel();
        if let Some(pending) = panel.pending_selections() {
            let weak: Weak<SelectionsInner> = Rc::downgrade(inner);
            subs.push(pending.subscribe(move |_| {
                if let Some(inner) = weak.upgrade() {
                    recompute(&inner);
                }
            }));
        }
        if let Some(filters) = panel.output_filters() {
            let weak: Weak<SelectionsInner> = Rc::downgrade(inner);
            subs.push(filters.subscribe(move |_| {
                if let Some(inner) = weak.upgrade() {
                    recompute(&inner);
                }
            }));
        }
    }
    *inner.child_subs.borrow_mut() = subs;
}

fn recompute(inner: &SelectionsInner) {
    let children = inner.children.get();
    let unpublished = combined_output_filters(&children);
    inner.unpublished.set(unpublished.clone());

    if inner.auto_apply.get() {
        inner.published.set(unpublished);
        inner.has_unapplied.set(false);
        return;
    }

    let any_pending = children.iter().any(|child| {
        child
            .panel()
            .pending_selections()
            .is_some_and(|pending| pending.get())
    });
    let differs = inner.published.with(|published| *published != unpublished);
    inner.has_unapplied.set(any_pending || differs);
}
