#![forbid(unsafe_code)]

//! Owner of the live, ordered control collection.
//!
//! [`ControlsManager`] keeps one slot per control: the control's persisted
//! shell plus, when the factory succeeded, its [`RuntimeChildHandle`]. Every
//! mutation, including width and grow edits, republishes the [`Children`],
//! control-order, and control-layout observables inside a single batch, so
//! observers never see one updated without the others.
//!
//! # Invariants
//!
//! 1. Slot ids are unique.
//! 2. A failed mutation leaves the collection untouched.
//! 3. A control whose factory failed keeps its slot (so it is still
//!    snapshotted and saved) but has no handle and is not in [`Children`].
//!
//! # Failure Modes
//!
//! - **Factory failure at startup**: logged at `warn!`, the other controls
//!   are built normally.
//! - **Factory failure in `add_panel`**: returned as
//!   [`PanelError::PanelBuild`]; nothing is inserted.

use std::cell::RefCell;
use std::rc::Rc;

use panelkit_runtime::{BatchScope, Observable};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::child::{Children, FactoryRegistry, RuntimeChildHandle};
use crate::error::{PanelError, Result};
use crate::group::{DEFAULT_CONTROL_GROW, DEFAULT_CONTROL_WIDTH};
use crate::panel::{ControlWidth, ExplicitInput, PanelEntry, PanelId, PanelMap, Reference};

/// One position in the control order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlOrder {
    pub id: PanelId,
    #[serde(rename = "type")]
    pub panel_type: String,
}

/// Ids and types of `panels`, sorted by `order` (ties by insertion).
#[must_use]
pub fn controls_in_order(panels: &PanelMap) -> Vec<ControlOrder> {
    panels
        .in_order()
        .into_iter()
        .map(|entry| ControlOrder {
            id: entry.id.clone(),
            panel_type: entry.panel_type.clone(),
        })
        .collect()
}

/// Width and grow of one control, in display order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlLayout {
    pub id: PanelId,
    pub width: Option<ControlWidth>,
    pub grow: Option<bool>,
}

/// Width and grow of `panels`, sorted like [`controls_in_order`].
#[must_use]
pub fn controls_layout(panels: &PanelMap) -> Vec<ControlLayout> {
    panels.in_order().into_iter().map(layout_of).collect()
}

fn layout_of(entry: &PanelEntry) -> ControlLayout {
    ControlLayout {
        id: entry.id.clone(),
        width: entry.width,
        grow: entry.grow,
    }
}

/// Layout defaults offered to a control about to be created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewControlState {
    pub width: ControlWidth,
    pub grow: bool,
}

impl Default for NewControlState {
    fn default() -> Self {
        Self {
            width: DEFAULT_CONTROL_WIDTH,
            grow: DEFAULT_CONTROL_GROW,
        }
    }
}

/// Result of [`ControlsManager::snapshot`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PanelSnapshot {
    pub panels: PanelMap,
    pub references: Vec<Reference>,
}

struct ControlSlot {
    entry: PanelEntry,
    handle: Option<RuntimeChildHandle>,
}

struct ManagerInner {
    slots: RefCell<Vec<ControlSlot>>,
    factories: FactoryRegistry,
    defaults: NewControlState,
    children: Observable<Children>,
    order: Observable<Vec<ControlOrder>>,
    layout: Observable<Vec<ControlLayout>>,
}

/// Shared handle to the control collection.
#[derive(Clone)]
pub struct ControlsManager {
    inner: Rc<ManagerInner>,
}

impl std::fmt::Debug for ControlsManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlsManager")
            .field("order", &self.inner.order.get())
            .finish_non_exhaustive()
    }
}

impl ControlsManager {
    /// Build every control in `initial`, in order, with the fixed layout
    /// defaults.
    #[must_use]
    pub fn new(initial: &PanelMap, factories: FactoryRegistry) -> Self {
        Self::with_defaults(initial, factories, NewControlState::default())
    }

    /// Like [`ControlsManager::new`], with the group's own layout defaults
    /// for controls added to an empty collection.
    #[must_use]
    pub fn with_defaults(
        initial: &PanelMap,
        factories: FactoryRegistry,
        defaults: NewControlState,
    ) -> Self {
        let slots: Vec<ControlSlot> = initial
            .in_order()
            .into_iter()
            .map(|entry| ControlSlot {
                handle: build_handle(&factories, entry),
                entry: entry.clone(),
            })
            .collect();
        let (children, order, layout) = views(&slots);
        debug!(target: "panelkit.controls", controls = slots.len(), live = children.len(), "controls initialized");
        Self {
            inner: Rc::new(ManagerInner {
                slots: RefCell::new(slots),
                factories,
                defaults,
                children: Observable::new(children),
                order: Observable::new(order),
                layout: Observable::new(layout),
            }),
        }
    }

    /// The live children, republished on every add, remove, and reorder.
    #[must_use]
    pub fn children(&self) -> Observable<Children> {
        self.inner.children.clone()
    }

    /// Ids and types in display order, including controls that failed to
    /// build.
    #[must_use]
    pub fn controls_in_order(&self) -> Observable<Vec<ControlOrder>> {
        self.inner.order.clone()
    }

    /// Width and grow per control in display order, republished on every
    /// mutation.
    #[must_use]
    pub fn controls_layout(&self) -> Observable<Vec<ControlLayout>> {
        self.inner.layout.clone()
    }

    /// Layout used by [`ControlsManager::new_control_state`] when there is
    /// no control to copy from.
    #[must_use]
    pub fn defaults(&self) -> NewControlState {
        self.inner.defaults
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<RuntimeChildHandle> {
        self.inner
            .slots
            .borrow()
            .iter()
            .find(|slot| slot.entry.id == id)
            .and_then(|slot| slot.handle.clone())
    }

    #[must_use]
    pub fn ids(&self) -> Vec<PanelId> {
        self.inner
            .slots
            .borrow()
            .iter()
            .map(|slot| slot.entry.id.clone())
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.slots.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Create a control with a fresh id at `position` (default: the end).
    pub fn add_panel(
        &self,
        panel_type: &str,
        initial: ExplicitInput,
        position: Option<usize>,
    ) -> Result<PanelId> {
        let defaults = self.new_control_state();
        let id = Uuid::new_v4().to_string();
        let mut entry = PanelEntry::new(id.clone(), panel_type, initial);
        entry.width = Some(defaults.width);
        entry.grow = Some(defaults.grow);
        self.insert_entry(entry, position)?;
        Ok(id)
    }

    /// Insert a control with a caller-chosen id.
    pub fn insert_entry(&self, entry: PanelEntry, position: Option<usize>) -> Result<()> {
        if self.inner.slots.borrow().iter().any(|s| s.entry.id == entry.id) {
            return Err(PanelError::DuplicatePanelId { id: entry.id });
        }
        let panel = self
            .inner
            .factories
            .build(&entry.panel_type, &entry.id, &entry.explicit_input)?;
        let handle = RuntimeChildHandle::new(entry.id.clone(), entry.panel_type.clone(), panel);
        let (id, panel_type) = (entry.id.clone(), entry.panel_type.clone());
        {
            let mut slots = self.inner.slots.borrow_mut();
            let index = position.unwrap_or(slots.len()).min(slots.len());
            slots.insert(
                index,
                ControlSlot {
                    entry,
                    handle: Some(handle),
                },
            );
        }
        info!(target: "panelkit.controls", %id, %panel_type, "control added");
        self.publish();
        Ok(())
    }

    /// Tear down and remove a control. Unknown ids are ignored.
    pub fn remove_panel(&self, id: &str) -> bool {
        let removed = {
            let mut slots = self.inner.slots.borrow_mut();
            let Some(index) = slots.iter().position(|s| s.entry.id == id) else {
                debug!(target: "panelkit.controls", %id, "remove of unknown control ignored");
                return false;
            };
            slots.remove(index)
        };
        if let Some(handle) = removed.handle {
            handle.panel().teardown();
        }
        info!(target: "panelkit.controls", %id, "control removed");
        self.publish();
        true
    }

    /// Replace the ordering. `new_order` must name exactly the current ids.
    pub fn reorder(&self, new_order: &[PanelId]) -> Result<()> {
        {
            let mut slots = self.inner.slots.borrow_mut();
            let expected: Vec<PanelId> = slots.iter().map(|s| s.entry.id.clone()).collect();
            if !same_id_set(&expected, new_order) {
                return Err(PanelError::OrderMismatch {
                    expected,
                    found: new_order.to_vec(),
                });
            }
            slots.sort_by_key(|slot| new_order.iter().position(|id| *id == slot.entry.id));
        }
        debug!(target: "panelkit.controls", order = ?new_order, "controls reordered");
        self.publish();
        Ok(())
    }

    /// Serialize every control's current state.
    ///
    /// Live children are asked for their state; controls without a handle
    /// contribute their stored shell. `order` is the display position.
    #[must_use]
    pub fn snapshot(&self) -> PanelSnapshot {
        let slots = self.inner.slots.borrow();
        let mut snapshot = PanelSnapshot::default();
        for (position, slot) in slots.iter().enumerate() {
            let mut entry = slot.entry.clone();
            entry.order = Some(position as i64);
            if let Some(handle) = &slot.handle {
                let serialized = handle.serialize();
                entry.explicit_input = serialized.explicit_input;
                snapshot.references.extend(serialized.references);
            }
            snapshot.panels.insert(entry);
        }
        snapshot
    }

    /// Width and grow of the last control, or the group defaults.
    #[must_use]
    pub fn new_control_state(&self) -> NewControlState {
        let slots = self.inner.slots.borrow();
        let last = slots.last().map(|slot| &slot.entry);
        NewControlState {
            width: last.and_then(|e| e.width).unwrap_or(self.inner.defaults.width),
            grow: last.and_then(|e| e.grow).unwrap_or(self.inner.defaults.grow),
        }
    }

    pub fn set_control_width(&self, id: &str, width: ControlWidth) -> bool {
        self.with_entry(id, |entry| entry.width = Some(width))
    }

    pub fn set_control_grow(&self, id: &str, grow: bool) -> bool {
        self.with_entry(id, |entry| entry.grow = Some(grow))
    }

    /// Make the collection's structure match `baseline`: controls added
    /// since are removed, removed ones are rebuilt from their baseline
    /// entry, the baseline order is restored, and surviving controls get
    /// their baseline width and grow back. Surviving children are not
    /// rebuilt.
    ///
    /// Returns whether anything changed.
    pub fn restore_structure(&self, baseline: &PanelMap) -> bool {
        let target = controls_in_order(baseline);
        let target_layout = controls_layout(baseline);
        if self.inner.order.with(|order| *order == target)
            && self.inner.layout.with(|layout| *layout == target_layout)
        {
            return false;
        }

        let removed: Vec<ControlSlot> = {
            let mut slots = self.inner.slots.borrow_mut();
            let (mut keep, gone): (Vec<ControlSlot>, Vec<ControlSlot>) =
                std::mem::take(&mut *slots)
                    .into_iter()
                    .partition(|slot| baseline.contains(&slot.entry.id));
            for slot in &mut keep {
                if let Some(saved) = baseline.get(&slot.entry.id) {
                    slot.entry.width = saved.width;
                    slot.entry.grow = saved.grow;
                }
            }
            *slots = keep;
            gone
        };
        for slot in &removed {
            if let Some(handle) = &slot.handle {
                handle.panel().teardown();
            }
        }

        let missing: Vec<&PanelEntry> = baseline
            .in_order()
            .into_iter()
            .filter(|entry| !self.inner.slots.borrow().iter().any(|s| s.entry.id == entry.id))
            .collect();
        let rebuilt: Vec<ControlSlot> = missing
            .into_iter()
            .map(|entry| ControlSlot {
                handle: build_handle(&self.inner.factories, entry),
                entry: entry.clone(),
            })
            .collect();

        {
            let mut slots = self.inner.slots.borrow_mut();
            slots.extend(rebuilt);
            slots.sort_by_key(|slot| target.iter().position(|o| o.id == slot.entry.id));
        }
        info!(
            target: "panelkit.controls",
            removed = removed.len(),
            controls = target.len(),
            "control structure restored"
        );
        self.publish();
        true
    }

    /// Tear down every child and empty the collection.
    pub fn teardown_all(&self) {
        let slots = std::mem::take(&mut *self.inner.slots.borrow_mut());
        for handle in slots.iter().filter_map(|slot| slot.handle.as_ref()) {
            handle.panel().teardown();
        }
        debug!(target: "panelkit.controls", controls = slots.len(), "controls torn down");
        self.publish();
    }

    fn with_entry(&self, id: &str, f: impl FnOnce(&mut PanelEntry)) -> bool {
        let found = {
            let mut slots = self.inner.slots.borrow_mut();
            match slots.iter_mut().find(|slot| slot.entry.id == id) {
                Some(slot) => {
                    f(&mut slot.entry);
                    true
                }
                None => false,
            }
        };
        if found {
            debug!(target: "panelkit.controls", %id, "control layout edited");
            self.publish();
        }
        found
    }

    fn publish(&self) {
        let (children, order, layout) = views(&self.inner.slots.borrow());
        let _batch = BatchScope::new();
        self.inner.children.set(children);
        self.inner.order.set(order);
        self.inner.layout.set(layout);
    }
}

fn build_handle(factories: &FactoryRegistry, entry: &PanelEntry) -> Option<RuntimeChildHandle> {
    match factories.build(&entry.panel_type, &entry.id, &entry.explicit_input) {
        Ok(panel) => Some(RuntimeChildHandle::new(
            entry.id.clone(),
            entry.panel_type.clone(),
            panel,
        )),
        Err(error) => {
            warn!(target: "panelkit.controls", id = %entry.id, %error, "control failed to build");
            None
        }
    }
}

fn views(slots: &[ControlSlot]) -> (Children, Vec<ControlOrder>, Vec<ControlLayout>) {
    let children = Children::new(slots.iter().filter_map(|s| s.handle.clone()).collect());
    let order = slots
        .iter()
        .map(|slot| ControlOrder {
            id: slot.entry.id.clone(),
            panel_type: slot.entry.panel_type.clone(),
        })
        .collect();
    let layout = slots.iter().map(|slot| layout_of(&slot.entry)).collect();
    (children, order, layout)
}

fn same_id_set(current: &[PanelId], proposed: &[PanelId]) -> bool {
    let mut a = current.to_vec();
    let mut b = proposed.to_vec();
    a.sort();
    b.sort();
    a == b
}
