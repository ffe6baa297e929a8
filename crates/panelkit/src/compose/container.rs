#![forbid(unsafe_code)]

//! A live container: resolved input plus the integrations attached to it.
//!
//! The container holds panel shells and the runtime state waiting for each
//! panel's live child. It owns the optional embedded [`ControlGroup`] and
//! the subscriptions its integrations registered.
//!
//! # Invariants
//!
//! 1. The ready signal fires once, after construction completes. Waiters
//!    registered before or after it fires are each resolved once.
//! 2. [`Container::destroy`] releases every integration subscription and
//!    destroys the control group exactly once.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::rc::Rc;

use panelkit_runtime::{Observable, ReadySignal, Subscription, UntilReady};
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::placement::find_top_left_most_open_space;
use super::state::{ContainerState, RuntimeStateMap, ViewMode};
use crate::config::GridConfig;
use crate::context::{Filter, ParentContext, Query};
use crate::control_group::ControlGroup;
use crate::panel::{ExplicitInput, PanelEntry, PanelId, Reference};

pub(crate) struct ContainerInner {
    state: Observable<ContainerState>,
    filters: Observable<Vec<Filter>>,
    query: Observable<Query>,
    references: RefCell<Vec<Reference>>,
    runtime_state: RefCell<RuntimeStateMap>,
    scroll_to_panel: Observable<Option<PanelId>>,
    highlight_panel: Observable<Option<PanelId>>,
    animate_panel_transforms: Observable<bool>,
    control_group: Option<ControlGroup>,
    subscriptions: RefCell<Vec<Subscription>>,
    ready: ReadySignal<()>,
    destroyed: Cell<bool>,
    grid: GridConfig,
    runtime_panel_types: HashSet<String>,
}

/// Shared handle to a live container.
#[derive(Clone)]
pub struct Container {
    inner: Rc<ContainerInner>,
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("id", &self.inner.state.with(|s| s.id.clone()))
            .field("ready", &self.inner.ready.is_ready())
            .field("control_group", &self.inner.control_group.as_ref().map(ControlGroup::id))
            .finish_non_exhaustive()
    }
}

impl Container {
    /// A container that is not ready yet.
    #[must_use]
    pub fn new(
        state: ContainerState,
        control_group: Option<ControlGroup>,
        grid: GridConfig,
        runtime_panel_types: HashSet<String>,
    ) -> Self {
        let filters = state.filters.clone();
        let query = state.query.clone();
        Self {
            inner: Rc::new(ContainerInner {
                state: Observable::new(state),
                filters: Observable::new(filters),
                query: Observable::new(query),
                references: RefCell::new(Vec::new()),
                runtime_state: RefCell::new(RuntimeStateMap::new()),
                scroll_to_panel: Observable::new(None),
                highlight_panel: Observable::new(None),
                animate_panel_transforms: Observable::new(false),
                control_group,
                subscriptions: RefCell::new(Vec::new()),
                ready: ReadySignal::new(),
                destroyed: Cell::new(false),
                grid,
                runtime_panel_types,
            }),
        }
    }

    pub(crate) fn downgrade(&self) -> std::rc::Weak<ContainerInner> {
        Rc::downgrade(&self.inner)
    }

    pub(crate) fn upgrade(weak: &std::rc::Weak<ContainerInner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    #[must_use]
    pub fn id(&self) -> Option<String> {
        self.inner.state.with(|s| s.id.clone())
    }

    /// Resolved container input.
    #[must_use]
    pub fn state(&self) -> Observable<ContainerState> {
        self.inner.state.clone()
    }

    #[must_use]
    pub fn input(&self) -> ContainerState {
        self.inner.state.get()
    }

    pub fn update_input(&self, f: impl FnOnce(&mut ContainerState)) -> bool {
        self.inner.state.update(f)
    }

    #[must_use]
    pub fn view_mode(&self) -> ViewMode {
        self.inner.state.with(|s| s.view_mode)
    }

    pub fn set_view_mode(&self, view_mode: ViewMode) {
        self.update_input(|s| s.view_mode = view_mode);
    }

    /// The container's own filters.
    pub fn set_filters(&self, filters: Vec<Filter>) {
        self.update_input(|s| s.filters = filters);
    }

    pub fn set_query(&self, query: Query) {
        self.update_input(|s| s.query = query);
    }

    /// Filters children should see: the container's own followed by those
    /// the control group publishes, once integrations have started.
    #[must_use]
    pub fn filters(&self) -> Observable<Vec<Filter>> {
        self.inner.filters.clone()
    }

    /// The container's query; only emits when the value changes.
    #[must_use]
    pub fn query(&self) -> Observable<Query> {
        self.inner.query.clone()
    }

    #[must_use]
    pub fn references(&self) -> Vec<Reference> {
        self.inner.references.borrow().clone()
    }

    pub fn set_references(&self, references: Vec<Reference>) {
        *self.inner.references.borrow_mut() = references;
    }

    pub fn set_runtime_state_for_child(&self, id: impl Into<PanelId>, state: ExplicitInput) {
        self.inner.runtime_state.borrow_mut().insert(id.into(), state);
    }

    /// Runtime state recorded for child `id`.
    #[must_use]
    pub fn runtime_state_for_child(&self, id: &str) -> Option<ExplicitInput> {
        self.inner.runtime_state.borrow().get(id).cloned()
    }

    #[must_use]
    pub fn scroll_to_panel(&self) -> Observable<Option<PanelId>> {
        self.inner.scroll_to_panel.clone()
    }

    #[must_use]
    pub fn highlight_panel(&self) -> Observable<Option<PanelId>> {
        self.inner.highlight_panel.clone()
    }

    /// Scroll to and highlight panel `id`.
    pub fn focus_panel(&self, id: &str) {
        self.inner.scroll_to_panel.set(Some(id.to_owned()));
        self.inner.highlight_panel.set(Some(id.to_owned()));
    }

    #[must_use]
    pub fn animate_panel_transforms(&self) -> Observable<bool> {
        self.inner.animate_panel_transforms.clone()
    }

    #[must_use]
    pub fn control_group(&self) -> Option<&ControlGroup> {
        self.inner.control_group.as_ref()
    }

    /// Context handed to the control group.
    #[must_use]
    pub fn parent_context(&self) -> ParentContext {
        self.inner.state.with(parent_context_of)
    }

    /// Keep `subscription` alive until the container is destroyed.
    pub fn add_subscription(&self, subscription: Subscription) {
        if self.inner.destroyed.get() {
            return;
        }
        self.inner.subscriptions.borrow_mut().push(subscription);
    }

    /// Add a panel at the default size in the first open space.
    pub fn add_new_panel(&self, panel_type: &str, initial: ExplicitInput) -> PanelId {
        let id = Uuid::new_v4().to_string();
        let (width, height) = (self.inner.grid.default_panel_width, self.inner.grid.default_panel_height);
        self.place_panel(&id, panel_type, initial, width, height);
        id
    }

    /// Insert panel `id` with an explicit size in the first open space.
    ///
    /// Runtime-state panel types get an id-only shell and their input is
    /// recorded as runtime state.
    pub fn place_panel(&self, id: &str, panel_type: &str, initial: ExplicitInput, width: u32, height: u32) {
        let mut grid = self
            .inner
            .state
            .with(|s| find_top_left_most_open_space(width, height, &s.panels, self.inner.grid.columns));
        grid.i = id.to_owned();

        let mut shell = ExplicitInput::new();
        shell.insert("id".into(), Value::String(id.to_owned()));
        let explicit_input = if self.inner.runtime_panel_types.contains(panel_type) {
            self.set_runtime_state_for_child(id, initial);
            shell
        } else {
            let mut input = initial;
            input.extend(shell);
            input
        };
        debug!(target: "panelkit.compose", id, panel_type, x = grid.x, y = grid.y, "panel placed");
        let entry = PanelEntry::new(id, panel_type, explicit_input).with_grid(grid);
        self.update_input(|s| {
            s.panels.insert(entry);
        });
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.inner.ready.is_ready()
    }

    /// Run `callback` once the container is ready.
    pub fn when_ready(&self, callback: impl FnOnce() + 'static) {
        self.inner.ready.when_ready(move |_: &()| callback());
    }

    pub fn until_ready(&self) -> UntilReady<()> {
        self.inner.ready.until_ready()
    }

    pub(crate) fn mark_ready(&self) -> bool {
        self.inner.ready.fire(())
    }

    /// Release every integration and destroy the control group. Returns
    /// `false` if already destroyed.
    pub fn destroy(&self) -> bool {
        if self.inner.destroyed.replace(true) {
            warn!(target: "panelkit.compose", "container destroyed twice");
            return false;
        }
        let released = std::mem::take(&mut *self.inner.subscriptions.borrow_mut());
        let count = released.len();
        drop(released);
        if let Some(group) = &self.inner.control_group {
            group.destroy();
        }
        info!(target: "panelkit.compose", id = ?self.id(), subscriptions = count, "container destroyed");
        true
    }
}

pub(crate) fn parent_context_of(state: &ContainerState) -> ParentContext {
    ParentContext {
        filters: state.filters.clone(),
        query: Some(state.query.clone()),
        time_range: state.time_range.clone(),
    }
}
