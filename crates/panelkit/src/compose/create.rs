#![forbid(unsafe_code)]

//! Turn a loaded container plus its override sources into a live
//! [`Container`].
//!
//! Everything that needs the live container is queued and runs once it is
//! ready, in this order: references, restored runtime state, the incoming
//! panel, the control group link, context sync, performance observers, the
//! animation timer, aggregate filters, and the query output.
//!
//! # Failure Modes
//!
//! - An invalid load is returned as [`InitError::ValidationFailure`]; a
//!   redirected load returns `Ok(None)`.
//! - A failing integration is logged inside its `compose.integration` span
//!   and the remaining integrations still start.
//! - A failed capability fetch leaves expensive queries allowed.

use std::rc::Rc;

use panelkit_runtime::{Computed, DeferredQueue, IntegrationError, Observable, Subscription};
use tracing::{debug, info, info_span, warn};
use uuid::Uuid;

use super::container::{Container, parent_context_of};
use super::merge::{merge_incoming_into_existing, merge_layers};
use super::services::{BackupStore, ContainerServices, CreationOptions, ValidationOutcome};
use super::state::{ContainerState, IncomingTransfer, LoadedContainer, ViewMode};
use crate::codec;
use crate::config::EngineConfig;
use crate::context::{Filter, TimeRange};
use crate::control_group::ControlGroup;
use crate::error::InitError;
use crate::group::GroupRuntimeState;

/// View mode a container opens in.
///
/// Managed containers and hosts without write access always open
/// read-only. New containers and ones with backed-up edits open in edit
/// mode. Otherwise the remembered view mode is used.
#[must_use]
pub fn resolve_initial_view_mode(
    loaded: &LoadedContainer,
    show_write_controls: bool,
    backup: &dyn BackupStore,
) -> ViewMode {
    if loaded.managed || !show_write_controls {
        return ViewMode::View;
    }
    if loaded.new_container_created || backup.has_unsaved_edits(loaded.id.as_deref()) {
        return ViewMode::Edit;
    }
    backup.view_mode()
}

/// Time range in effect at startup: the address wins, then the saved range
/// when the container restores time, then the surrounding context's.
#[must_use]
pub fn resolve_initial_time_range(
    url: Option<TimeRange>,
    time_restore: bool,
    saved: Option<TimeRange>,
    current: TimeRange,
) -> TimeRange {
    if let Some(url) = url {
        return url;
    }
    match saved {
        Some(saved) if time_restore => saved,
        _ => current,
    }
}

/// The container's own filters followed by the group's published ones.
/// Duplicates are kept.
#[must_use]
pub fn combined_filters(container: &[Filter], group: &[Filter]) -> Vec<Filter> {
    container.iter().chain(group).cloned().collect()
}

/// Build a container from `loaded` and the layers in `options`.
///
/// The container is ready when this returns; queued integrations have
/// already run.
pub async fn create_container(
    config: &EngineConfig,
    services: &ContainerServices,
    loaded: LoadedContainer,
    options: CreationOptions,
) -> Result<Option<Container>, InitError> {
    let CreationOptions {
        use_session_storage,
        use_control_group,
        use_context_sync,
        overrides,
        incoming,
        validator,
        control_factories,
    } = options;

    if let Some(validator) = &validator {
        match validator.validate(&loaded) {
            ValidationOutcome::Valid => {}
            ValidationOutcome::Invalid(reason) => {
                warn!(target: "panelkit.compose", id = ?loaded.id, %reason, "loaded container failed validation");
                return Err(InitError::ValidationFailure { reason });
            }
            ValidationOutcome::Redirected => {
                info!(target: "panelkit.compose", id = ?loaded.id, "load redirected; not building container");
                return Ok(None);
            }
        }
    }

    let backup = if use_session_storage {
        services.backup.session_state(loaded.id.as_deref())
    } else {
        None
    };
    let initial_view_mode =
        resolve_initial_view_mode(&loaded, services.show_write_controls, &*services.backup);

    let merged = merge_layers(
        &loaded.state,
        loaded.control_group.as_ref(),
        backup.as_ref().map(|b| &b.state),
        backup.as_ref().map(|b| &b.runtime_panels),
        initial_view_mode,
        overrides.as_ref(),
        &services.runtime_panel_types,
    );
    let mut state: ContainerState = merged.state;
    let mut runtime_state = merged.runtime_state;
    state.id.clone_from(&loaded.id);

    if let Some(view_mode) = overrides.as_ref().and_then(|o| o.view_mode) {
        services.backup.store_view_mode(view_mode);
    }

    if use_context_sync {
        if let Some(sync) = &services.context_sync {
            let range = resolve_initial_time_range(
                sync.url_time_range(),
                state.time_restore,
                state.time_range.clone(),
                sync.current_time_range(),
            );
            state.time_range = Some(range);
        }
    }

    let mut focus_existing = None;
    let mut pending_placement = None;
    if let Some(incoming) = &incoming {
        state.view_mode = ViewMode::Edit;
        if merge_incoming_into_existing(
            &mut state,
            incoming,
            &services.runtime_panel_types,
            &mut runtime_state,
        ) {
            focus_existing = incoming.embeddable_id.clone();
        } else {
            pending_placement = Some(incoming.clone());
        }
    }

    if let (Some(id), None, Some(tracker)) = (&loaded.id, &incoming, &services.view_tracker) {
        tracker.track_view(id);
    }

    let control_group = if use_control_group {
        let initial = GroupRuntimeState::from(&merged.control_group);
        let saved = loaded.control_group.clone().unwrap_or_else(codec::default_state);
        let group = ControlGroup::build(
            config.control_group_id(loaded.id.as_deref()),
            &initial,
            GroupRuntimeState::from(&saved),
            control_factories,
            &*services.capabilities,
        )
        .await;
        Some(group)
    } else {
        None
    };

    let container = Container::new(
        state,
        control_group,
        config.grid,
        services.runtime_panel_types.clone(),
    );

    let mut queue = DeferredQueue::new();
    let references = loaded.references;
    push_integration(&mut queue, "references", move |c| {
        c.set_references(references);
        Ok(())
    });
    push_integration(&mut queue, "runtime state", move |c| {
        for (id, state) in runtime_state {
            c.set_runtime_state_for_child(id, state);
        }
        Ok(())
    });
    if let Some(id) = focus_existing {
        push_integration(&mut queue, "incoming panel", move |c| {
            c.focus_panel(&id);
            Ok(())
        });
    }
    if let Some(incoming) = pending_placement {
        let grid = config.grid;
        push_integration(&mut queue, "incoming panel", move |c| {
            let id = place_incoming(c, incoming, grid.default_panel_width, grid.default_panel_height);
            c.focus_panel(&id);
            Ok(())
        });
    }
    if use_control_group {
        push_integration(&mut queue, "control group", start_control_group_link);
    }
    if use_context_sync {
        let sync = services.context_sync.clone();
        push_integration(&mut queue, "context sync", move |c| {
            let sync = sync.ok_or_else(|| IntegrationError::Unavailable("context sync".into()))?;
            c.add_subscription(sync.start(c)?);
            Ok(())
        });
    }
    for observer in &services.performance {
        let observer = Rc::clone(observer);
        push_integration(&mut queue, observer.label(), move |c| {
            c.add_subscription(observer.observe(c)?);
            Ok(())
        });
    }
    let scheduler = Rc::clone(&services.scheduler);
    let delay = config.animation_delay();
    push_integration(&mut queue, "animation timer", move |c| {
        let animate = c.animate_panel_transforms();
        scheduler.schedule(delay, Box::new(move || {
            animate.set(true);
        }));
        Ok(())
    });
    push_integration(&mut queue, "aggregate filters", start_aggregate_filters);
    push_integration(&mut queue, "query", start_query_output);

    let weak = container.downgrade();
    container.when_ready(move || {
        let Some(container) = Container::upgrade(&weak) else {
            return;
        };
        let report = queue.drain(&container);
        info!(
            target: "panelkit.compose",
            started = report.completed.len(),
            failed = report.failed.len(),
            "container integrations started"
        );
    });
    container.mark_ready();
    Ok(Some(container))
}

fn push_integration(
    queue: &mut DeferredQueue<Container>,
    label: &'static str,
    action: impl FnOnce(&Container) -> Result<(), IntegrationError> + 'static,
) {
    queue.push(label, move |container| {
        let span = info_span!("compose.integration", label, outcome = tracing::field::Empty);
        let _guard = span.enter();
        let result = action(container);
        match &result {
            Ok(()) => {
                span.record("outcome", "started");
                debug!(target: "panelkit.compose", label, "integration started");
            }
            Err(error) => {
                span.record("outcome", "failed");
                warn!(target: "panelkit.compose", label, %error, "integration failed to start");
            }
        }
        result
    });
}

fn place_incoming(container: &Container, incoming: IncomingTransfer, default_width: u32, default_height: u32) -> String {
    let IncomingTransfer {
        panel_type,
        input,
        embeddable_id,
        size,
    } = incoming;
    match size {
        Some((width, height)) => {
            let id = embeddable_id.unwrap_or_else(|| Uuid::new_v4().to_string());
            container.place_panel(
                &id,
                &panel_type,
                input,
                width.unwrap_or(default_width),
                height.unwrap_or(default_height),
            );
            id
        }
        None => container.add_new_panel(&panel_type, input),
    }
}

fn start_control_group_link(container: &Container) -> Result<(), IntegrationError> {
    let group = container
        .control_group()
        .ok_or_else(|| IntegrationError::Unavailable("control group".into()))?;
    let parent = group.parent_context();
    parent.set(container.parent_context());
    let subscription = container.state().subscribe(move |state| {
        parent.set(parent_context_of(state));
    });
    container.add_subscription(subscription);
    Ok(())
}

fn start_aggregate_filters(container: &Container) -> Result<(), IntegrationError> {
    let state = container.state();
    let combined = match container.control_group() {
        Some(group) => Computed::from2(&state, &group.published_filters(), |s, published| {
            combined_filters(&s.filters, published)
        }),
        None => Computed::from_observable(&state, |s| s.filters.clone()),
    };
    forward(container, combined, container.filters());
    Ok(())
}

fn start_query_output(container: &Container) -> Result<(), IntegrationError> {
    let query = Computed::from_observable(&container.state(), |s| s.query.clone());
    forward(container, query, container.query());
    Ok(())
}

/// Mirror `derived` into `out` for as long as the container lives.
fn forward<T: Clone + PartialEq + 'static>(
    container: &Container,
    derived: Computed<T>,
    out: Observable<T>,
) {
    out.set(derived.get());
    let mirror = derived.subscribe(move |value| {
        out.set(value.clone());
    });
    container.add_subscription(Subscription::merge(vec![
        mirror,
        Subscription::from_guard(derived),
    ]));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    use crate::compose::state::SessionBackup;

    #[derive(Default)]
    struct Backup {
        unsaved: bool,
        remembered: Cell<Option<ViewMode>>,
    }

    impl BackupStore for Backup {
        fn has_unsaved_edits(&self, _: Option<&str>) -> bool {
            self.unsaved
        }

        fn session_state(&self, _: Option<&str>) -> Option<SessionBackup> {
            None
        }

        fn view_mode(&self) -> ViewMode {
            self.remembered.get().unwrap_or_default()
        }

        fn store_view_mode(&self, view_mode: ViewMode) {
            self.remembered.set(Some(view_mode));
        }
    }

    fn loaded(managed: bool, new: bool) -> LoadedContainer {
        LoadedContainer {
            id: Some("c1".into()),
            managed,
            new_container_created: new,
            ..LoadedContainer::default()
        }
    }

    #[test]
    fn managed_or_read_only_host_forces_view() {
        let backup = Backup {
            unsaved: true,
            ..Backup::default()
        };
        assert_eq!(resolve_initial_view_mode(&loaded(true, true), true, &backup), ViewMode::View);
        assert_eq!(resolve_initial_view_mode(&loaded(false, true), false, &backup), ViewMode::View);
    }

    #[test]
    fn new_or_edited_containers_open_in_edit() {
        let clean = Backup::default();
        assert_eq!(resolve_initial_view_mode(&loaded(false, true), true, &clean), ViewMode::Edit);
        let edited = Backup {
            unsaved: true,
            ..Backup::default()
        };
        assert_eq!(resolve_initial_view_mode(&loaded(false, false), true, &edited), ViewMode::Edit);
    }

    #[test]
    fn otherwise_remembered_view_mode_is_used() {
        let backup = Backup::default();
        backup.store_view_mode(ViewMode::Edit);
        assert_eq!(resolve_initial_view_mode(&loaded(false, false), true, &backup), ViewMode::Edit);
    }

    #[test]
    fn time_range_precedence() {
        let url = TimeRange::new("now-1d", "now");
        let saved = TimeRange::new("now-7d", "now");
        let current = TimeRange::new("now-15m", "now");
        assert_eq!(
            resolve_initial_time_range(Some(url.clone()), true, Some(saved.clone()), current.clone()),
            url
        );
        assert_eq!(
            resolve_initial_time_range(None, true, Some(saved.clone()), current.clone()),
            saved
        );
        assert_eq!(
            resolve_initial_time_range(None, false, Some(saved), current.clone()),
            current
        );
        assert_eq!(resolve_initial_time_range(None, true, None, current.clone()), current);
    }

    #[test]
    fn combined_filters_keep_order_and_duplicates() {
        let a = Filter::phrase("f", 1);
        let b = Filter::phrase("g", 2);
        assert_eq!(
            combined_filters(&[a.clone(), b.clone()], &[a.clone()]),
            vec![a.clone(), b, a]
        );
        assert!(combined_filters(&[], &[]).is_empty());
    }
}
