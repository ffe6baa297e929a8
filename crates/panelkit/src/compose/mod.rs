#![forbid(unsafe_code)]

//! Runtime composition: from a persisted container and its override layers
//! to a live [`Container`] with its integrations running.
//!
//! | Piece | Role |
//! |-------|------|
//! | [`merge`] | layered merge of container and group input |
//! | [`placement`] | first-open-space grid placement |
//! | [`services`] | host collaborators and creation options |
//! | [`container`] | the live container handle |
//! | [`create`] | the initialization sequence |

pub mod container;
pub mod create;
pub mod merge;
pub mod placement;
pub mod services;
pub mod state;

pub use container::Container;
pub use create::{combined_filters, create_container, resolve_initial_time_range, resolve_initial_view_mode};
pub use merge::{MergedInput, merge_incoming_into_existing, merge_layers};
pub use placement::find_top_left_most_open_space;
pub use services::{
    BackupStore, ContainerServices, ContextSync, CreationOptions, LoadValidator, PerformanceObserver,
    Scheduler, ValidationOutcome, ViewTracker,
};
pub use state::{
    ContainerOverrides, ContainerState, IncomingTransfer, LoadedContainer, RuntimeStateMap,
    SessionBackup, ViewMode,
};
