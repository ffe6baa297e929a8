#![forbid(unsafe_code)]

//! Reactive primitives: observable cells, batch coalescing, derived values.

pub mod batch;
pub mod computed;
pub mod observable;

pub use batch::BatchScope;
pub use computed::Computed;
pub use observable::{Observable, Subscription};
