#![forbid(unsafe_code)]

//! Container creation: layer precedence, incoming transfers, deferred
//! integrations, and teardown.
//!
//! Run:
//!   cargo test -p panelkit --test composition

mod common;

use std::rc::Rc;
use std::time::Duration;

use common::{
    CountingObserver, PanickingObserver, RecordingSync, TEST_CONTROL, built_control,
    control_factories, control_panels, host, host_with, input,
};
use panelkit::compose::{
    ContainerOverrides, CreationOptions, IncomingTransfer, LoadedContainer, PerformanceObserver,
    SessionBackup, ValidationOutcome, ViewMode,
};
use panelkit::{
    CapabilityFetchError, ChainingSystem, EngineConfig, Filter, GridData, InitError, PanelEntry,
    PanelMap, PartialGroupState, PersistableGroupState, Query, Reference, TimeRange,
    create_container,
};
use serde_json::json;

fn saved_container() -> LoadedContainer {
    let panels: PanelMap = [
        PanelEntry::new("viz-1", "viz", input(json!({"id": "viz-1", "title": "Errors"}))).with_grid(GridData {
            x: 0,
            y: 0,
            w: 24,
            h: 15,
            i: "viz-1".into(),
        }),
        PanelEntry::new("lens-1", "lens", input(json!({"id": "lens-1"}))).with_grid(GridData {
            x: 24,
            y: 0,
            w: 24,
            h: 15,
            i: "lens-1".into(),
        }),
    ]
    .into_iter()
    .collect();
    LoadedContainer {
        id: Some("dash-1".into()),
        state: ContainerOverrides {
            title: Some("Saved".into()),
            panels: Some(panels),
            filters: Some(vec![Filter::phrase("env", "prod")]),
            time_range: Some(TimeRange::new("now-7d", "now")),
            time_restore: Some(true),
            ..ContainerOverrides::default()
        },
        control_group: Some(PersistableGroupState {
            panels: control_panels(&["c1", "c2"], 1),
            ..PersistableGroupState::default()
        }),
        references: vec![Reference {
            name: "panel_viz-1".into(),
            ref_type: "visualization".into(),
            id: "abc".into(),
        }],
        ..LoadedContainer::default()
    }
}

fn with_group() -> (CreationOptions, common::Built) {
    let (factories, built) = control_factories();
    let options = CreationOptions {
        use_control_group: true,
        control_factories: factories,
        ..CreationOptions::default()
    };
    (options, built)
}

#[test]
fn builds_ready_container_with_integrations() {
    let host = host();
    let (options, _) = with_group();
    let container = pollster::block_on(create_container(
        &EngineConfig::default(),
        &host.services,
        saved_container(),
        options,
    ))
    .unwrap()
    .expect("not redirected");

    assert!(container.is_ready());
    assert_eq!(container.input().title, "Saved");
    assert_eq!(container.view_mode(), ViewMode::View);
    assert_eq!(container.references().len(), 1);
    assert_eq!(host.tracker.views.borrow().as_slice(), ["dash-1"]);

    let group = container.control_group().expect("control group enabled");
    assert_eq!(group.id(), "control_group_dash-1");
    assert_eq!(group.controls().ids(), vec!["c1", "c2"]);
    assert_eq!(group.parent_context().get().filters, vec![Filter::phrase("env", "prod")]);
    assert_eq!(group.unsaved_changes().get(), None);

    assert_eq!(host.scheduler.delays(), vec![Duration::from_millis(500)]);
    assert!(!container.animate_panel_transforms().get());
    host.scheduler.run_all();
    assert!(container.animate_panel_transforms().get());
}

#[test]
fn aggregate_filters_concatenate_and_follow_changes() {
    let host = host();
    let (options, built) = with_group();
    let container = pollster::block_on(create_container(
        &EngineConfig::default(),
        &host.services,
        saved_container(),
        options,
    ))
    .unwrap()
    .unwrap();

    let own = Filter::phrase("env", "prod");
    assert_eq!(
        container.filters().get(),
        vec![own.clone(), Filter::phrase("c1", 1), Filter::phrase("c2", 1)]
    );

    built_control(&built, "c2").value.set(7);
    assert_eq!(
        container.filters().get(),
        vec![own.clone(), Filter::phrase("c1", 1), Filter::phrase("c2", 7)]
    );

    container.set_filters(vec![Filter::phrase("c1", 1)]);
    assert_eq!(
        container.filters().get(),
        vec![Filter::phrase("c1", 1), Filter::phrase("c1", 1), Filter::phrase("c2", 7)]
    );

    let group = container.control_group().unwrap();
    assert_eq!(group.parent_context().get().filters, vec![Filter::phrase("c1", 1)]);
}

#[test]
fn query_output_skips_unchanged_values() {
    let host = host();
    let container = pollster::block_on(create_container(
        &EngineConfig::default(),
        &host.services,
        saved_container(),
        CreationOptions::default(),
    ))
    .unwrap()
    .unwrap();

    let query = container.query();
    let before = query.version();
    container.set_filters(Vec::new());
    assert_eq!(query.version(), before);

    container.set_query(Query {
        language: "kuery".into(),
        query: "status:500".into(),
    });
    assert_eq!(query.version(), before + 1);
    assert_eq!(query.get().query, "status:500");
    assert_eq!(container.filters().get(), Vec::new());
}

#[test]
fn invalid_load_is_an_error_and_redirect_is_not() {
    let host = host();
    let invalid = CreationOptions {
        validator: Some(Box::new(|_: &LoadedContainer| ValidationOutcome::Invalid("bad schema".into()))),
        ..CreationOptions::default()
    };
    let error = pollster::block_on(create_container(
        &EngineConfig::default(),
        &host.services,
        saved_container(),
        invalid,
    ))
    .unwrap_err();
    assert!(matches!(error, InitError::ValidationFailure { ref reason } if reason == "bad schema"));

    let redirected = CreationOptions {
        validator: Some(Box::new(|_: &LoadedContainer| ValidationOutcome::Redirected)),
        ..CreationOptions::default()
    };
    let outcome = pollster::block_on(create_container(
        &EngineConfig::default(),
        &host.services,
        saved_container(),
        redirected,
    ))
    .unwrap();
    assert!(outcome.is_none());
    assert!(host.tracker.views.borrow().is_empty());
}

#[test]
fn layers_apply_in_order_and_view_mode_is_backed_up() {
    let host = host();
    host.backup.unsaved_edits.set(true);
    *host.backup.session.borrow_mut() = Some(SessionBackup {
        state: ContainerOverrides {
            title: Some("Session".into()),
            control_group: Some(PartialGroupState {
                chaining_system: Some(ChainingSystem::None),
                ..PartialGroupState::default()
            }),
            ..ContainerOverrides::default()
        },
        runtime_panels: [("lens-1".to_owned(), input(json!({"id": "lens-1", "query": "from session"})))]
            .into_iter()
            .collect(),
    });
    let (mut options, _) = with_group();
    options.use_session_storage = true;
    options.overrides = Some(ContainerOverrides {
        view_mode: Some(ViewMode::View),
        query: Some(Query {
            language: "kuery".into(),
            query: "override".into(),
        }),
        ..ContainerOverrides::default()
    });

    let container = pollster::block_on(create_container(
        &EngineConfig::default(),
        &host.services,
        saved_container(),
        options,
    ))
    .unwrap()
    .unwrap();

    let state = container.input();
    assert_eq!(state.title, "Session");
    assert_eq!(state.query.query, "override");
    assert_eq!(state.view_mode, ViewMode::View);
    assert_eq!(host.backup.stored.borrow().as_slice(), [ViewMode::View]);
    assert_eq!(
        container.control_group().unwrap().chaining_system().get(),
        ChainingSystem::None
    );
    assert_eq!(
        container.runtime_state_for_child("lens-1"),
        Some(input(json!({"id": "lens-1", "query": "from session"})))
    );
}

#[test]
fn session_layer_is_ignored_when_disabled() {
    let host = host();
    *host.backup.session.borrow_mut() = Some(SessionBackup {
        state: ContainerOverrides {
            title: Some("Session".into()),
            ..ContainerOverrides::default()
        },
        ..SessionBackup::default()
    });
    let container = pollster::block_on(create_container(
        &EngineConfig::default(),
        &host.services,
        saved_container(),
        CreationOptions::default(),
    ))
    .unwrap()
    .unwrap();
    assert_eq!(container.input().title, "Saved");
    assert!(container.control_group().is_none());
}

#[test]
fn incoming_transfer_onto_existing_panel() {
    let host = host();
    let options = CreationOptions {
        incoming: Some(IncomingTransfer::new("lens", input(json!({"query": "edited"}))).targeting("lens-1")),
        ..CreationOptions::default()
    };
    let container = pollster::block_on(create_container(
        &EngineConfig::default(),
        &host.services,
        saved_container(),
        options,
    ))
    .unwrap()
    .unwrap();

    assert_eq!(container.view_mode(), ViewMode::Edit);
    let shell = container.input().panels.get("lens-1").cloned().unwrap();
    assert_eq!(shell.explicit_input, input(json!({"id": "lens-1"})));
    assert_eq!(
        container.runtime_state_for_child("lens-1"),
        Some(input(json!({"id": "lens-1", "query": "edited"})))
    );
    assert_eq!(container.scroll_to_panel().get().as_deref(), Some("lens-1"));
    assert_eq!(container.highlight_panel().get().as_deref(), Some("lens-1"));
    assert!(host.tracker.views.borrow().is_empty(), "transfers are not counted as views");
}

#[test]
fn incoming_transfer_with_size_is_placed_in_open_space() {
    let host = host();
    let options = CreationOptions {
        incoming: Some(
            IncomingTransfer::new("viz", input(json!({"title": "New"})))
                .targeting("viz-2")
                .with_size(Some(12), None),
        ),
        ..CreationOptions::default()
    };
    let container = pollster::block_on(create_container(
        &EngineConfig::default(),
        &host.services,
        saved_container(),
        options,
    ))
    .unwrap()
    .unwrap();

    let panel = container.input().panels.get("viz-2").cloned().unwrap();
    let grid = panel.grid_data.unwrap();
    assert_eq!((grid.x, grid.y, grid.w, grid.h), (0, 15, 12, 15));
    assert_eq!(grid.i, "viz-2");
    assert_eq!(panel.explicit_input, input(json!({"title": "New", "id": "viz-2"})));
    assert_eq!(container.scroll_to_panel().get().as_deref(), Some("viz-2"));
}

#[test]
fn incoming_transfer_without_size_gets_fresh_id() {
    let host = host();
    let options = CreationOptions {
        incoming: Some(IncomingTransfer::new("viz", input(json!({"title": "New"})))),
        ..CreationOptions::default()
    };
    let container = pollster::block_on(create_container(
        &EngineConfig::default(),
        &host.services,
        saved_container(),
        options,
    ))
    .unwrap()
    .unwrap();

    assert_eq!(container.input().panels.len(), 3);
    let focused = container.scroll_to_panel().get().expect("new panel focused");
    assert!(container.input().panels.contains(&focused));
}

#[test]
fn time_range_follows_precedence_when_synced() {
    let mut host = host();
    host.services.context_sync = Some(Rc::new(RecordingSync {
        current: TimeRange::new("now-15m", "now"),
        url: None,
        started: Default::default(),
        fail: false,
    }));
    let options = CreationOptions {
        use_context_sync: true,
        ..CreationOptions::default()
    };
    let container = pollster::block_on(create_container(
        &EngineConfig::default(),
        &host.services,
        saved_container(),
        options,
    ))
    .unwrap()
    .unwrap();
    assert_eq!(container.input().time_range, Some(TimeRange::new("now-7d", "now")));
}

#[test]
fn failing_integrations_do_not_block_others() {
    let mut host = host_with(Err(CapabilityFetchError::new("timeout")));
    let counting = Rc::new(CountingObserver::default());
    host.services.context_sync = Some(Rc::new(RecordingSync {
        current: TimeRange::new("now-15m", "now"),
        url: None,
        started: Default::default(),
        fail: true,
    }));
    let panicking: Rc<dyn PerformanceObserver> = Rc::new(PanickingObserver);
    host.services.performance = vec![panicking, counting.clone() as Rc<dyn PerformanceObserver>];
    let (mut options, _) = with_group();
    options.use_context_sync = true;

    let container = pollster::block_on(create_container(
        &EngineConfig::default(),
        &host.services,
        saved_container(),
        options,
    ))
    .unwrap()
    .unwrap();

    assert_eq!(counting.observed.get(), 1);
    assert_eq!(host.scheduler.delays().len(), 1);
    assert_eq!(container.filters().get().len(), 3);
    assert!(container.control_group().unwrap().allow_expensive_queries().get());
}

#[test]
fn managed_container_opens_read_only() {
    let host = host();
    let mut loaded = saved_container();
    loaded.managed = true;
    host.backup.unsaved_edits.set(true);
    let container = pollster::block_on(create_container(
        &EngineConfig::default(),
        &host.services,
        loaded,
        CreationOptions::default(),
    ))
    .unwrap()
    .unwrap();
    assert_eq!(container.view_mode(), ViewMode::View);
}

#[test]
fn unsaved_container_uses_fallback_group_id() {
    let host = host();
    let loaded = LoadedContainer {
        new_container_created: true,
        ..LoadedContainer::default()
    };
    let (options, _) = with_group();
    let container = pollster::block_on(create_container(
        &EngineConfig::default(),
        &host.services,
        loaded,
        options,
    ))
    .unwrap()
    .unwrap();
    assert_eq!(container.view_mode(), ViewMode::Edit);
    assert_eq!(container.control_group().unwrap().id(), "control_group_new_dashboard");
    assert!(container.control_group().unwrap().controls().is_empty());
    assert!(host.tracker.views.borrow().is_empty());
}

#[test]
fn destroy_tears_down_group_once() {
    let host = host();
    let (options, built) = with_group();
    let container = pollster::block_on(create_container(
        &EngineConfig::default(),
        &host.services,
        saved_container(),
        options,
    ))
    .unwrap()
    .unwrap();

    assert!(container.destroy());
    assert!(!container.destroy());
    assert!(built_control(&built, "c1").torn_down.get());

    let before = container.filters().get();
    built_control(&built, "c2").value.set(42);
    assert_eq!(container.filters().get(), before);
}

#[test]
fn added_group_control_reaches_aggregate_filters() {
    let host = host();
    let (options, _) = with_group();
    let container = pollster::block_on(create_container(
        &EngineConfig::default(),
        &host.services,
        saved_container(),
        options,
    ))
    .unwrap()
    .unwrap();
    let group = container.control_group().unwrap();
    let id = group
        .add_new_panel(TEST_CONTROL, input(json!({"value": 3})))
        .unwrap();
    assert_eq!(container.filters().get().last(), Some(&Filter::phrase(&id, 3)));
}
