#![forbid(unsafe_code)]

//! The contract child panels implement, and the handles that own them.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use futures_util::future::LocalBoxFuture;
use panelkit_runtime::Observable;

use crate::context::Filter;
use crate::error::PanelError;
use crate::panel::{ExplicitInput, PanelId, Reference};

/// What a child produces when asked for its persistable form.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SerializedPanel {
    pub explicit_input: ExplicitInput,
    pub references: Vec<Reference>,
}

/// A live child panel.
///
/// Only [`serialize_state`](ChildPanel::serialize_state) is required. The
/// other capabilities default to "not supported", and the engine skips
/// children that do not provide them.
pub trait ChildPanel {
    /// Current persistable state. Must reflect live state, not a cache.
    fn serialize_state(&self) -> SerializedPanel;

    /// `Some(diff)` while the child differs from its own last-saved state.
    fn unsaved_changes(&self) -> Option<Observable<Option<ExplicitInput>>> {
        None
    }

    /// Restore the child's last-saved state.
    fn reset_unsaved_changes(&self) {}

    /// Resolves once the child's output filters have settled.
    fn until_filters_ready(&self) -> Option<LocalBoxFuture<'static, ()>> {
        None
    }

    /// `true` while the child holds a selection that is not yet applied.
    fn pending_selections(&self) -> Option<Observable<bool>> {
        None
    }

    /// Apply the pending selection, if any.
    fn commit_pending_selections(&self) {}

    /// Filters this child contributes to its group.
    fn output_filters(&self) -> Option<Observable<Vec<Filter>>> {
        None
    }

    /// Release anything the child holds. Called exactly once on removal.
    fn teardown(&self) {}
}

/// Builds children of one panel type.
pub trait PanelFactory {
    fn build(&self, id: &str, initial: &ExplicitInput) -> Result<Rc<dyn ChildPanel>, String>;
}

impl<F> PanelFactory for F
where
    F: Fn(&str, &ExplicitInput) -> Result<Rc<dyn ChildPanel>, String>,
{
    fn build(&self, id: &str, initial: &ExplicitInput) -> Result<Rc<dyn ChildPanel>, String> {
        self(id, initial)
    }
}

/// Panel type tag to factory lookup. Unknown tags are an error; there is
/// no fallback factory.
#[derive(Clone, Default)]
pub struct FactoryRegistry {
    factories: HashMap<String, Rc<dyn PanelFactory>>,
}

impl fmt::Debug for FactoryRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<&String> = self.factories.keys().collect();
        types.sort();
        f.debug_struct("FactoryRegistry").field("types", &types).finish()
    }
}

impl FactoryRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, panel_type: impl Into<String>, factory: impl PanelFactory + 'static) {
        self.factories.insert(panel_type.into(), Rc::new(factory));
    }

    #[must_use]
    pub fn is_registered(&self, panel_type: &str) -> bool {
        self.factories.contains_key(panel_type)
    }

    /// Build a child, failing with a named error for unknown types.
    pub fn build(
        &self,
        panel_type: &str,
        id: &str,
        initial: &ExplicitInput,
    ) -> crate::error::Result<Rc<dyn ChildPanel>> {
        let factory = self
            .factories
            .get(panel_type)
            .ok_or_else(|| PanelError::unregistered(panel_type))?;
        factory
            .build(id, initial)
            .map_err(|reason| PanelError::PanelBuild {
                panel_type: panel_type.to_owned(),
                reason,
            })
    }
}

/// Live handle to an instantiated child, owned by the controls manager.
#[derive(Clone)]
pub struct RuntimeChildHandle {
    id: PanelId,
    panel_type: String,
    panel: Rc<dyn ChildPanel>,
}

impl fmt::Debug for RuntimeChildHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeChildHandle")
            .field("id", &self.id)
            .field("panel_type", &self.panel_type)
            .finish_non_exhaustive()
    }
}

impl PartialEq for RuntimeChildHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && Rc::ptr_eq(&self.panel, &other.panel)
    }
}

impl RuntimeChildHandle {
    pub(crate) fn new(id: PanelId, panel_type: String, panel: Rc<dyn ChildPanel>) -> Self {
        Self {
            id,
            panel_type,
            panel,
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn panel_type(&self) -> &str {
        &self.panel_type
    }

    #[must_use]
    pub fn panel(&self) -> &Rc<dyn ChildPanel> {
        &self.panel
    }

    #[must_use]
    pub fn serialize(&self) -> SerializedPanel {
        self.panel.serialize_state()
    }

    /// Whether the child currently reports its own unsaved changes.
    #[must_use]
    pub fn has_unsaved_changes(&self) -> bool {
        self.panel
            .unsaved_changes()
            .is_some_and(|changes| changes.with(Option::is_some))
    }
}

/// Ordered view of the live children.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Children(Vec<RuntimeChildHandle>);

impl Children {
    pub(crate) fn new(handles: Vec<RuntimeChildHandle>) -> Self {
        Self(handles)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RuntimeChildHandle> {
        self.0.iter()
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&RuntimeChildHandle> {
        self.0.iter().find(|h| h.id == id)
    }

    #[must_use]
    pub fn ids(&self) -> Vec<PanelId> {
        self.0.iter().map(|h| h.id.clone()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
