#![forbid(unsafe_code)]

//! Collaborators the composition engine talks to.
//!
//! Everything outside the engine's own state sits behind one of these
//! traits so hosts (and tests) can plug in their own.

use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use panelkit_runtime::{IntegrationError, Subscription};

use super::container::Container;
use super::state::{LoadedContainer, SessionBackup, ViewMode};
use crate::child::FactoryRegistry;
use crate::context::TimeRange;
use crate::control_group::CapabilityFetcher;

/// Session-local storage of unsaved edits and the last view mode.
pub trait BackupStore {
    fn has_unsaved_edits(&self, id: Option<&str>) -> bool;
    fn session_state(&self, id: Option<&str>) -> Option<SessionBackup>;
    fn view_mode(&self) -> ViewMode;
    fn store_view_mode(&self, view_mode: ViewMode);
}

/// Runs a task after a delay on the host's event loop.
pub trait Scheduler {
    fn schedule(&self, delay: Duration, task: Box<dyn FnOnce()>);
}

/// Counts opens of saved containers.
pub trait ViewTracker {
    fn track_view(&self, id: &str);
}

/// Keeps the container's query, filters, and time in step with the
/// surrounding context.
pub trait ContextSync {
    /// Time range currently in effect outside the container.
    fn current_time_range(&self) -> TimeRange;
    /// Time range carried in the address, if any. It beats everything else.
    fn url_time_range(&self) -> Option<TimeRange> {
        None
    }
    fn start(&self, container: &Container) -> Result<Subscription, IntegrationError>;
}

/// A telemetry hook started once the container is live.
pub trait PerformanceObserver {
    fn label(&self) -> &'static str;
    fn observe(&self, container: &Container) -> Result<Subscription, IntegrationError>;
}

/// Outcome of validating a loaded container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    Valid,
    Invalid(String),
    /// Control moved elsewhere; stop without an error.
    Redirected,
}

/// Checks a loaded container before anything is built from it.
pub trait LoadValidator {
    fn validate(&self, loaded: &LoadedContainer) -> ValidationOutcome;
}

impl<F> LoadValidator for F
where
    F: Fn(&LoadedContainer) -> ValidationOutcome,
{
    fn validate(&self, loaded: &LoadedContainer) -> ValidationOutcome {
        self(loaded)
    }
}

/// Host services shared by every container the host creates.
#[derive(Clone)]
pub struct ContainerServices {
    pub show_write_controls: bool,
    /// Panel types whose state lives apart from the persisted shell.
    pub runtime_panel_types: HashSet<String>,
    pub backup: Rc<dyn BackupStore>,
    pub scheduler: Rc<dyn Scheduler>,
    pub capabilities: Rc<dyn CapabilityFetcher>,
    pub view_tracker: Option<Rc<dyn ViewTracker>>,
    pub context_sync: Option<Rc<dyn ContextSync>>,
    pub performance: Vec<Rc<dyn PerformanceObserver>>,
}

impl fmt::Debug for ContainerServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContainerServices")
            .field("show_write_controls", &self.show_write_controls)
            .field("runtime_panel_types", &self.runtime_panel_types)
            .field("context_sync", &self.context_sync.is_some())
            .field("performance", &self.performance.len())
            .finish_non_exhaustive()
    }
}

/// Per-creation switches and inputs.
#[derive(Default)]
pub struct CreationOptions {
    pub use_session_storage: bool,
    pub use_control_group: bool,
    pub use_context_sync: bool,
    pub overrides: Option<super::state::ContainerOverrides>,
    pub incoming: Option<super::state::IncomingTransfer>,
    pub validator: Option<Box<dyn LoadValidator>>,
    /// Factories for the embedded control group's children.
    pub control_factories: FactoryRegistry,
}

impl fmt::Debug for CreationOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreationOptions")
            .field("use_session_storage", &self.use_session_storage)
            .field("use_control_group", &self.use_control_group)
            .field("use_context_sync", &self.use_context_sync)
            .field("overrides", &self.overrides)
            .field("incoming", &self.incoming)
            .field("validator", &self.validator.is_some())
            .finish_non_exhaustive()
    }
}
