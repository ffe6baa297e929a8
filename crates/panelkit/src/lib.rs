#![forbid(unsafe_code)]

//! panelkit
//!
//! State reconciliation, diffing, and runtime composition for dashboards
//! built from panels and control groups.
//!
//! # Key Components
//!
//! - [`PanelMap`] / [`PanelEntry`] - persisted panel collection
//! - [`DiffRegistry`] - per-type panel equality with a generic fallback
//! - [`codec`] - raw attribute encode/decode, id regeneration, equality
//! - [`ControlsManager`] - the live, ordered set of child controls
//! - [`SelectionsManager`] - pending versus applied selections
//! - [`UnsavedChangesTracker`] - diff against the last-saved baseline
//! - [`ControlGroup`] - all of the above wired to one group's settings
//! - [`compose`] - turns a loaded container and its overrides into a live
//!   [`Container`]
//!
//! # How it fits together
//! A host loads a persisted container, hands it to
//! [`create_container`] together with any session backup and overrides,
//! and gets back a live container. The embedded control group decodes its
//! raw attributes through [`codec`], builds its children through a
//! [`FactoryRegistry`], and reports unsaved changes against the baseline it
//! was created with.
//!
//! Execution is single-threaded and cooperative; see
//! [`panelkit_runtime`] for the reactive primitives underneath.

pub mod chaining;
pub mod child;
pub mod codec;
pub mod compose;
pub mod config;
pub mod context;
pub mod control_group;
pub mod controls;
pub mod diff;
pub mod error;
pub mod group;
pub mod panel;
pub mod selections;
pub mod unsaved;

pub use child::{ChildPanel, Children, FactoryRegistry, PanelFactory, RuntimeChildHandle, SerializedPanel};
pub use compose::{Container, ContainerServices, CreationOptions, create_container};
pub use config::{ConfigError, EngineConfig, GridConfig};
pub use context::{FetchContext, Filter, ParentContext, Query, TimeRange};
pub use control_group::{CapabilityFetcher, ControlGroup, SerializedGroup};
pub use controls::{
    ControlLayout, ControlOrder, ControlsManager, NewControlState, controls_in_order, controls_layout,
};
pub use diff::{DiffRegistry, GenericDiff, PanelDiffStrategy, SelectionFieldsDiff};
pub use error::{CapabilityFetchError, InitError, PanelError, Result};
pub use group::{
    ChainingSystem, ControlStyle, GroupRuntimeState, IgnoreParentSettings, PartialGroupState,
    PersistableGroupState, RawGroupAttributes, SerializableGroupRecord,
};
pub use panel::{ControlWidth, ExplicitInput, GridData, PanelEntry, PanelId, PanelMap, Reference};
pub use selections::SelectionsManager;
pub use unsaved::{UnsavedChanges, UnsavedChangesTracker};

pub use panelkit_runtime as runtime;
