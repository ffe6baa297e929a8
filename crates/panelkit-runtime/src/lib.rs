#![forbid(unsafe_code)]

//! panelkit runtime
//!
//! Single-threaded building blocks shared by the panelkit engine.
//!
//! # Key Components
//!
//! - [`Observable`] - shared value cell with synchronous change notification
//! - [`BatchScope`] - defers notifications so multi-step edits look atomic
//! - [`Computed`] - derived value recomputed from its sources
//! - [`ReadySignal`] - one-shot, multi-waiter completion signal
//! - [`DeferredQueue`] - labelled actions drained once, failures isolated
//! - [`join_all_local`] - fan-in over a fixed batch of futures
//!
//! All of it assumes cooperative, single-threaded execution: state lives in
//! `Rc<RefCell<..>>` and nothing here is `Send`.

pub mod deferred;
pub mod join;
pub mod reactive;
pub mod ready;

pub use deferred::{DeferredAction, DeferredQueue, DrainReport, IntegrationError};
pub use join::join_all_local;
pub use reactive::{BatchScope, Computed, Observable, Subscription};
pub use ready::{ReadySignal, UntilReady};
