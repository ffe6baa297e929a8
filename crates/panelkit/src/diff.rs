#![forbid(unsafe_code)]

//! Per-panel-type equality strategies.
//!
//! [`DiffRegistry::panels_equal`] dispatches on the newer entry's type. Types
//! without a registered strategy use [`GenericDiff`], which compares
//! everything except the generated `explicitInput.id`.
//!
//! # Invariants
//!
//! 1. Every strategy is symmetric: `eq(a, b, x) == eq(b, a, x)`.
//! 2. Strategies are pure; they never mutate or log.

use std::collections::HashMap;
use std::rc::Rc;

use serde_json::Value;

use crate::panel::{ExplicitInput, PanelEntry};

pub const OPTIONS_LIST_CONTROL: &str = "optionsListControl";
pub const RANGE_SLIDER_CONTROL: &str = "rangeSliderControl";
pub const TIME_SLIDER_CONTROL: &str = "timeSlider";

/// Equality between two versions of one panel's persistable state.
pub trait PanelDiffStrategy {
    /// `include_selections = false` asks the strategy to disregard the
    /// type's notion of user selections.
    fn is_equal(&self, old: &PanelEntry, new: &PanelEntry, include_selections: bool) -> bool;
}

/// Structural equality that ignores `explicitInput.id`.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenericDiff;

impl PanelDiffStrategy for GenericDiff {
    fn is_equal(&self, old: &PanelEntry, new: &PanelEntry, _include_selections: bool) -> bool {
        shells_equal(old, new) && inputs_equal(&old.explicit_input, &new.explicit_input, &[])
    }
}

/// Strategy for controls whose input carries user selections.
///
/// Selection fields are skipped entirely when selections are excluded.
/// When included, a missing field, `null`, `false`, and `[]` are all
/// treated as "no selection", and `unordered` fields compare as multisets.
#[derive(Debug, Clone, Copy)]
pub struct SelectionFieldsDiff {
    pub selection_fields: &'static [&'static str],
    pub unordered: &'static [&'static str],
}

impl SelectionFieldsDiff {
    #[must_use]
    pub const fn options_list() -> Self {
        Self {
            selection_fields: &["selectedOptions", "existsSelected", "exclude"],
            unordered: &["selectedOptions"],
        }
    }

    #[must_use]
    pub const fn range_slider() -> Self {
        Self {
            selection_fields: &["value"],
            unordered: &[],
        }
    }

    #[must_use]
    pub const fn time_slider() -> Self {
        Self {
            selection_fields: &[
                "timesliceStartAsPercentageOfTimeRange",
                "timesliceEndAsPercentageOfTimeRange",
            ],
            unordered: &[],
        }
    }
}

impl PanelDiffStrategy for SelectionFieldsDiff {
    fn is_equal(&self, old: &PanelEntry, new: &PanelEntry, include_selections: bool) -> bool {
        if !shells_equal(old, new)
            || !inputs_equal(&old.explicit_input, &new.explicit_input, self.selection_fields)
        {
            return false;
        }
        if !include_selections {
            return true;
        }
        self.selection_fields.iter().all(|field| {
            let a = selection_value(&old.explicit_input, field);
            let b = selection_value(&new.explicit_input, field);
            if self.unordered.contains(field) {
                same_members(a, b)
            } else {
                a == b
            }
        })
    }
}

/// Type tag to strategy lookup with a generic fallback.
#[derive(Clone)]
pub struct DiffRegistry {
    strategies: HashMap<String, Rc<dyn PanelDiffStrategy>>,
    fallback: Rc<dyn PanelDiffStrategy>,
}

impl std::fmt::Debug for DiffRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut types: Vec<&String> = self.strategies.keys().collect();
        types.sort();
        f.debug_struct("DiffRegistry").field("types", &types).finish()
    }
}

impl Default for DiffRegistry {
    fn default() -> Self {
        Self::with_builtin_controls()
    }
}

impl DiffRegistry {
    /// A registry with no type-specific strategies.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            strategies: HashMap::new(),
            fallback: Rc::new(GenericDiff),
        }
    }

    /// A registry with the options list, range slider, and time slider
    /// strategies registered.
    #[must_use]
    pub fn with_builtin_controls() -> Self {
        let mut registry = Self::empty();
        registry.register(OPTIONS_LIST_CONTROL, SelectionFieldsDiff::options_list());
        registry.register(RANGE_SLIDER_CONTROL, SelectionFieldsDiff::range_slider());
        registry.register(TIME_SLIDER_CONTROL, SelectionFieldsDiff::time_slider());
        registry
    }

    pub fn register(&mut self, panel_type: impl Into<String>, strategy: impl PanelDiffStrategy + 'static) {
        self.strategies.insert(panel_type.into(), Rc::new(strategy));
    }

    #[must_use]
    pub fn has_strategy(&self, panel_type: &str) -> bool {
        self.strategies.contains_key(panel_type)
    }

    /// Compare two versions of a panel using the strategy for `new`'s type.
    #[must_use]
    pub fn panels_equal(&self, old: &PanelEntry, new: &PanelEntry, include_selections: bool) -> bool {
        // Dispatch must not depend on argument order.
        if old.panel_type != new.panel_type {
            return false;
        }
        self.strategies
            .get(&new.panel_type)
            .unwrap_or(&self.fallback)
            .is_equal(old, new, include_selections)
    }
}

fn shells_equal(a: &PanelEntry, b: &PanelEntry) -> bool {
    a.panel_type == b.panel_type
        && a.order == b.order
        && a.width == b.width
        && a.grow == b.grow
        && a.grid_data == b.grid_data
}

fn inputs_equal(a: &ExplicitInput, b: &ExplicitInput, skip: &[&str]) -> bool {
    let considered = |key: &String| key != "id" && !skip.contains(&key.as_str());
    let left = a.iter().filter(|(k, _)| considered(k));
    let right_len = b.keys().filter(|k| considered(k)).count();
    let mut left_len = 0;
    for (key, value) in left {
        left_len += 1;
        if b.get(key) != Some(value) {
            return false;
        }
    }
    left_len == right_len
}

fn selection_value<'a>(input: &'a ExplicitInput, field: &str) -> Option<&'a Value> {
    match input.get(field) {
        None | Some(Value::Null) | Some(Value::Bool(false)) => None,
        Some(Value::Array(items)) if items.is_empty() => None,
        Some(value) => Some(value),
    }
}

fn same_members(a: Option<&Value>, b: Option<&Value>) -> bool {
    match (a, b) {
        (Some(Value::Array(left)), Some(Value::Array(right))) => {
            let count = |items: &[Value], item: &Value| {
                items.iter().filter(|v| *v == item).count()
            };
            left.len() == right.len()
                && left
                    .iter()
                    .all(|item| count(left.as_slice(), item) == count(right.as_slice(), item))
        }
        (a, b) => a == b,
    }
}
