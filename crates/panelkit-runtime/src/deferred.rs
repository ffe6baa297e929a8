#![forbid(unsafe_code)]

//! Isolated queue of deferred actions.
//!
//! Work that must wait for some context to exist (a container that is still
//! being constructed, for example) is pushed onto a [`DeferredQueue`] and run
//! later with [`DeferredQueue::drain`]. Every action is isolated: an `Err`
//! or a panic from one action is logged and recorded in the
//! [`DrainReport`], and draining continues with the next action.

use std::fmt;

use tracing::{debug, debug_span, warn};
use web_time::Instant;

/// Failure of a single deferred action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrationError {
    /// A collaborator the action depends on is unavailable.
    Unavailable(String),
    /// The action ran and failed.
    Failed(String),
    /// The action panicked; the payload message if it was a string.
    Panicked(String),
}

impl IntegrationError {
    /// Shorthand for [`IntegrationError::Failed`].
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

impl fmt::Display for IntegrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable(what) => write!(f, "collaborator unavailable: {what}"),
            Self::Failed(msg) => write!(f, "integration failed: {msg}"),
            Self::Panicked(msg) => write!(f, "integration panicked: {msg}"),
        }
    }
}

impl std::error::Error for IntegrationError {}

/// A boxed deferred action over context `C`.
pub type DeferredAction<C> = Box<dyn FnOnce(&C) -> Result<(), IntegrationError>>;

/// Outcome of draining a queue.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Labels of actions that completed, in run order.
    pub completed: Vec<&'static str>,
    /// Labels and errors of actions that failed, in run order.
    pub failed: Vec<(&'static str, IntegrationError)>,
}

impl DrainReport {
    /// True when every action completed.
    #[must_use]
    pub fn all_completed(&self) -> bool {
        self.failed.is_empty()
    }
}

/// FIFO queue of labelled actions that run once against a context.
pub struct DeferredQueue<C> {
    actions: Vec<(&'static str, DeferredAction<C>)>,
}

impl<C> Default for DeferredQueue<C> {
    fn default() -> Self {
        Self {
            actions: Vec::new(),
        }
    }
}

impl<C> fmt::Debug for DeferredQueue<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredQueue")
            .field(
                "labels",
                &self.actions.iter().map(|(l, _)| *l).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl<C> DeferredQueue<C> {
    /// An empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an action.
    pub fn push(
        &mut self,
        label: &'static str,
        action: impl FnOnce(&C) -> Result<(), IntegrationError> + 'static,
    ) {
        self.actions.push((label, Box::new(action)));
    }

    /// Number of queued actions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Whether the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Labels of queued actions, in run order.
    #[must_use]
    pub fn labels(&self) -> Vec<&'static str> {
        self.actions.iter().map(|(label, _)| *label).collect()
    }

    /// Run every action in order against `ctx`, isolating failures.
    pub fn drain(self, ctx: &C) -> DrainReport {
        let mut report = DrainReport::default();
        for (label, action) in self.actions {
            let started = Instant::now();
            let _span = debug_span!(
                "deferred.action",
                label,
                duration_us = tracing::field::Empty
            )
            .entered();

            let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| action(ctx)))
                .unwrap_or_else(|payload| Err(IntegrationError::Panicked(panic_message(&*payload))));

            let duration_us = started.elapsed().as_micros() as u64;
            tracing::Span::current().record("duration_us", duration_us);
            match outcome {
                Ok(()) => {
                    debug!(target: "panelkit.runtime", label, duration_us, "deferred action completed");
                    report.completed.push(label);
                }
                Err(error) => {
                    warn!(target: "panelkit.runtime", label, %error, "deferred action failed");
                    report.failed.push((label, error));
                }
            }
        }
        report
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        String::from("non-string panic payload")
    }
}
