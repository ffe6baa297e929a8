use thiserror::Error;

use crate::panel::PanelId;

pub type Result<T> = std::result::Result<T, PanelError>;

/// Failure of a single structural operation on a panel collection.
///
/// None of these leave the collection partially modified.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PanelError {
    #[error("no factory registered for panel type `{panel_type}`")]
    PanelTypeUnregistered { panel_type: String },

    #[error("reorder ids do not match the live collection (expected {expected:?}, found {found:?})")]
    OrderMismatch {
        expected: Vec<PanelId>,
        found: Vec<PanelId>,
    },

    #[error("panel id `{id}` is already in use")]
    DuplicatePanelId { id: PanelId },

    #[error("factory for `{panel_type}` failed to build the panel: {reason}")]
    PanelBuild { panel_type: String, reason: String },
}

impl PanelError {
    #[must_use]
    pub fn unregistered(panel_type: impl Into<String>) -> Self {
        Self::PanelTypeUnregistered {
            panel_type: panel_type.into(),
        }
    }
}

/// Fatal outcome of a container initialization attempt.
///
/// A redirected load is not an error; initialization returns `Ok(None)`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InitError {
    #[error("loaded container failed validation: {reason}")]
    ValidationFailure { reason: String },

    #[error(transparent)]
    Panel(#[from] PanelError),
}

/// The optional "expensive queries" capability could not be fetched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("capability fetch failed: {message}")]
pub struct CapabilityFetchError {
    pub message: String,
}

impl CapabilityFetchError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
