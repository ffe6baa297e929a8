#![allow(dead_code)]

//! Shared fixtures for the panelkit integration tests.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::rc::Rc;
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::LocalBoxFuture;
use panelkit::compose::{
    BackupStore, ContainerServices, ContextSync, PerformanceObserver, Scheduler, SessionBackup,
    ViewMode, ViewTracker,
};
use panelkit::runtime::{IntegrationError, Observable, ReadySignal, Subscription};
use panelkit::{
    CapabilityFetchError, CapabilityFetcher, ChildPanel, Container, ExplicitInput, FactoryRegistry,
    Filter, PanelEntry, PanelMap, SerializedPanel, TimeRange,
};
use serde_json::json;

pub const TEST_CONTROL: &str = "testControl";

// ----------------------------------------------------------------------------
// Child controls
// ----------------------------------------------------------------------------

/// A control holding one integer. A non-zero value produces one filter.
pub struct TestControl {
    pub id: String,
    pub value: Observable<i64>,
    saved: i64,
    unsaved: Observable<Option<ExplicitInput>>,
    pub filters: Observable<Vec<Filter>>,
    pub pending: Observable<bool>,
    pub filters_ready: RefCell<Option<ReadySignal<()>>>,
    pub resets: Cell<usize>,
    pub commits: Cell<usize>,
    pub torn_down: Cell<bool>,
    _link: Subscription,
}

impl TestControl {
    pub fn new(id: &str, input: &ExplicitInput) -> Rc<Self> {
        let saved = input.get("value").and_then(serde_json::Value::as_i64).unwrap_or(0);
        let value = Observable::new(saved);
        let unsaved = Observable::new(None);
        let filters = Observable::new(filters_for(id, saved));
        let link = {
            let unsaved = unsaved.clone();
            let filters = filters.clone();
            let id = id.to_owned();
            value.subscribe(move |v: &i64| {
                let mut diff = ExplicitInput::new();
                diff.insert("value".into(), json!(*v));
                unsaved.set((*v != saved).then_some(diff));
                filters.set(filters_for(&id, *v));
            })
        };
        Rc::new(Self {
            id: id.to_owned(),
            value,
            saved,
            unsaved,
            filters,
            pending: Observable::new(false),
            filters_ready: RefCell::new(None),
            resets: Cell::new(0),
            commits: Cell::new(0),
            torn_down: Cell::new(false),
            _link: link,
        })
    }
}

fn filters_for(id: &str, value: i64) -> Vec<Filter> {
    if value == 0 {
        Vec::new()
    } else {
        vec![Filter::phrase(id, value)]
    }
}

impl ChildPanel for TestControl {
    fn serialize_state(&self) -> SerializedPanel {
        let mut input = ExplicitInput::new();
        input.insert("value".into(), json!(self.value.get()));
        SerializedPanel {
            explicit_input: input,
            references: Vec::new(),
        }
    }

    fn unsaved_changes(&self) -> Option<Observable<Option<ExplicitInput>>> {
        Some(self.unsaved.clone())
    }

    fn reset_unsaved_changes(&self) {
        self.resets.set(self.resets.get() + 1);
        self.value.set(self.saved);
    }

    fn until_filters_ready(&self) -> Option<LocalBoxFuture<'static, ()>> {
        self.filters_ready
            .borrow()
            .as_ref()
            .map(|signal| signal.until_ready().boxed_local())
    }

    fn pending_selections(&self) -> Option<Observable<bool>> {
        Some(self.pending.clone())
    }

    fn commit_pending_selections(&self) {
        self.commits.set(self.commits.get() + 1);
        self.pending.set(false);
    }

    fn output_filters(&self) -> Option<Observable<Vec<Filter>>> {
        Some(self.filters.clone())
    }

    fn teardown(&self) {
        self.torn_down.set(true);
    }
}

pub type Built = Rc<RefCell<Vec<Rc<TestControl>>>>;

/// A registry that builds [`TestControl`]s and records every one it built.
pub fn control_factories() -> (FactoryRegistry, Built) {
    let built: Built = Rc::default();
    let sink = Rc::clone(&built);
    let mut factories = FactoryRegistry::new();
    factories.register(TEST_CONTROL, move |id: &str, input: &ExplicitInput| {
        let control = TestControl::new(id, input);
        sink.borrow_mut().push(Rc::clone(&control));
        Ok::<_, String>(control as Rc<dyn ChildPanel>)
    });
    (factories, built)
}

pub fn built_control(built: &Built, id: &str) -> Rc<TestControl> {
    built
        .borrow()
        .iter()
        .rev()
        .find(|c| c.id == id)
        .cloned()
        .unwrap_or_else(|| panic!("control {id} was never built"))
}

/// Controls `ids`, in order, each starting at `value`.
pub fn control_panels(ids: &[&str], value: i64) -> PanelMap {
    ids.iter()
        .enumerate()
        .map(|(i, id)| {
            let mut input = ExplicitInput::new();
            input.insert("value".into(), json!(value));
            PanelEntry::new(*id, TEST_CONTROL, input).with_order(i as i64)
        })
        .collect()
}

pub fn input(value: serde_json::Value) -> ExplicitInput {
    value.as_object().cloned().unwrap_or_default()
}

// ----------------------------------------------------------------------------
// Host services
// ----------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryBackup {
    pub unsaved_edits: Cell<bool>,
    pub session: RefCell<Option<SessionBackup>>,
    pub remembered: Cell<ViewMode>,
    pub stored: RefCell<Vec<ViewMode>>,
}

impl BackupStore for MemoryBackup {
    fn has_unsaved_edits(&self, _: Option<&str>) -> bool {
        self.unsaved_edits.get()
    }

    fn session_state(&self, _: Option<&str>) -> Option<SessionBackup> {
        self.session.borrow().clone()
    }

    fn view_mode(&self) -> ViewMode {
        self.remembered.get()
    }

    fn store_view_mode(&self, view_mode: ViewMode) {
        self.remembered.set(view_mode);
        self.stored.borrow_mut().push(view_mode);
    }
}

type Task = (Duration, Box<dyn FnOnce()>);

/// Holds scheduled tasks until [`ManualScheduler::run_all`].
#[derive(Default)]
pub struct ManualScheduler {
    tasks: RefCell<Vec<Task>>,
}

impl ManualScheduler {
    pub fn delays(&self) -> Vec<Duration> {
        self.tasks.borrow().iter().map(|(d, _)| *d).collect()
    }

    pub fn run_all(&self) {
        let tasks = std::mem::take(&mut *self.tasks.borrow_mut());
        for (_, task) in tasks {
            task();
        }
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, task: Box<dyn FnOnce()>) {
        self.tasks.borrow_mut().push((delay, task));
    }
}

#[derive(Default)]
pub struct RecordingTracker {
    pub views: RefCell<Vec<String>>,
}

impl ViewTracker for RecordingTracker {
    fn track_view(&self, id: &str) {
        self.views.borrow_mut().push(id.to_owned());
    }
}

pub struct FixedCapability(pub Result<bool, CapabilityFetchError>);

impl CapabilityFetcher for FixedCapability {
    fn allow_expensive_queries(&self) -> LocalBoxFuture<'_, Result<bool, CapabilityFetchError>> {
        let answer = self.0.clone();
        async move { answer }.boxed_local()
    }
}

pub struct RecordingSync {
    pub current: TimeRange,
    pub url: Option<TimeRange>,
    pub started: Cell<usize>,
    pub fail: bool,
}

impl ContextSync for RecordingSync {
    fn current_time_range(&self) -> TimeRange {
        self.current.clone()
    }

    fn url_time_range(&self) -> Option<TimeRange> {
        self.url.clone()
    }

    fn start(&self, _: &Container) -> Result<Subscription, IntegrationError> {
        if self.fail {
            return Err(IntegrationError::failed("sync backend offline"));
        }
        self.started.set(self.started.get() + 1);
        Ok(Subscription::from_guard(()))
    }
}

/// Observer that panics when started.
pub struct PanickingObserver;

impl PerformanceObserver for PanickingObserver {
    fn label(&self) -> &'static str {
        "panicking observer"
    }

    fn observe(&self, _: &Container) -> Result<Subscription, IntegrationError> {
        panic!("observer exploded");
    }
}

#[derive(Default)]
pub struct CountingObserver {
    pub observed: Cell<usize>,
}

impl PerformanceObserver for CountingObserver {
    fn label(&self) -> &'static str {
        "counting observer"
    }

    fn observe(&self, _: &Container) -> Result<Subscription, IntegrationError> {
        self.observed.set(self.observed.get() + 1);
        Ok(Subscription::from_guard(()))
    }
}

/// Concrete handles behind a [`ContainerServices`].
pub struct Host {
    pub backup: Rc<MemoryBackup>,
    pub scheduler: Rc<ManualScheduler>,
    pub tracker: Rc<RecordingTracker>,
    pub services: ContainerServices,
}

pub fn host() -> Host {
    host_with(Ok(true))
}

pub fn host_with(capability: Result<bool, CapabilityFetchError>) -> Host {
    let backup = Rc::new(MemoryBackup::default());
    let scheduler = Rc::new(ManualScheduler::default());
    let tracker = Rc::new(RecordingTracker::default());
    let services = ContainerServices {
        show_write_controls: true,
        runtime_panel_types: HashSet::from(["lens".to_owned()]),
        backup: backup.clone(),
        scheduler: scheduler.clone(),
        capabilities: Rc::new(FixedCapability(capability)),
        view_tracker: Some(tracker.clone()),
        context_sync: None,
        performance: Vec::new(),
    };
    Host {
        backup,
        scheduler,
        tracker,
        services,
    }
}
