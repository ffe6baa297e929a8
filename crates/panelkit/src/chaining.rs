#![forbid(unsafe_code)]

//! Filter chaining between controls and per-control fetch context.

use crate::child::Children;
use crate::context::{FetchContext, Filter, ParentContext};
use crate::controls::ControlOrder;
use crate::group::{ChainingSystem, IgnoreParentSettings};

/// Filters that flow into control `id` from the controls before it.
///
/// Hierarchical chaining collects the output filters of every earlier
/// control in order; `None` chaining (or an unknown id) yields nothing.
///
/// The filters are read from each control as they are now, not from the
/// group's published filters, so a staged selection narrows later controls
/// before it is applied to the parent.
#[must_use]
pub fn chained_filters(
    id: &str,
    chaining: ChainingSystem,
    order: &[ControlOrder],
    children: &Children,
) -> Vec<Filter> {
    if chaining == ChainingSystem::None {
        return Vec::new();
    }
    let Some(position) = order.iter().position(|o| o.id == id) else {
        return Vec::new();
    };
    order[..position]
        .iter()
        .filter_map(|o| children.get(&o.id))
        .filter_map(|child| child.panel().output_filters())
        .flat_map(|filters| filters.get())
        .collect()
}

/// Context control `id` fetches with: its chained filters followed by the
/// parent's filters, plus the parent's query and time range, each dropped
/// when the group ignores it.
#[must_use]
pub fn control_fetch_context(
    id: &str,
    chaining: ChainingSystem,
    order: &[ControlOrder],
    children: &Children,
    parent: &ParentContext,
    ignore: &IgnoreParentSettings,
) -> FetchContext {
    let kept = parent.without_ignored(ignore);
    let mut filters = chained_filters(id, chaining, order, children);
    filters.extend(kept.filters);
    FetchContext {
        filters,
        query: kept.query,
        time_range: kept.time_range,
    }
}
