//! Start, stop and reload behavior of the resource manager.

mod common;

use common::{Fixture, stored};
use keystone_resources::prelude::*;

// ─────────────────────────────────────────────────────────────────────────────
// Registration
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn duplicate_load_fails_and_leaves_registry_unchanged() {
    let mut fx = Fixture::new(&[("race", &[]), ("scores", &[])]);
    fx.storage.insert("RACE", stored(&["scores"]));

    let err = fx.manager.load("RACE").unwrap_err();
    assert_eq!(err.code(), ErrorCode::DuplicateName);
    assert_eq!(fx.manager.registry().len(), 2);
    assert!(
        fx.manager
            .resource("race")
            .is_some_and(|r| r.manifest().dependencies.is_empty())
    );
}

#[test]
fn load_of_unknown_resource_is_a_storage_error() {
    let mut fx = Fixture::new(&[]);
    let err = fx.manager.load("ghost").unwrap_err();
    assert_eq!(
        err,
        ResourceError::Storage(StorageError::NotFound("ghost".into()))
    );
}

#[test]
fn load_all_skips_registered_resources() {
    let mut fx = Fixture::new(&[("race", &[])]);
    fx.storage.insert("scores", stored(&[]));

    let report = fx.manager.load_all();
    assert_eq!(report.succeeded, vec!["scores"]);
    assert_eq!(fx.manager.registry().names(), vec!["race", "scores"]);
    assert_eq!(fx.manager.total_stored_size(), 200);
}

#[test]
fn started_resources_have_unique_sync_ids() {
    let mut fx = Fixture::new(&[("a", &[]), ("b", &[]), ("c", &[])]);
    let report = fx.manager.start_all(StartFlags::ALL);
    assert!(report.is_success());

    let mut ids: Vec<u16> = fx
        .manager
        .client_snapshot()
        .iter()
        .map(|info| info.sync_id.get())
        .collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 3);
    assert_eq!(fx.manager.sync_ids_in_use(), 3);
}

// ─────────────────────────────────────────────────────────────────────────────
// Start
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn start_brings_up_dependencies_first() {
    let mut fx = Fixture::new(&[("race", &["mapmanager"]), ("mapmanager", &[])]);

    let started = fx.manager.start("race", &StartOptions::manual()).unwrap();
    assert_eq!(started, vec!["mapmanager", "race"]);
    assert_eq!(fx.host.created(), vec!["mapmanager", "race"]);

    let race = fx.manager.resource("race").unwrap();
    assert!(race.started_manually());
    assert!(!fx.manager.resource("mapmanager").unwrap().started_manually());
    assert_eq!(fx.manager.counters(), StatusCounters { loaded: 2, failed: 0 });
}

#[test]
fn starting_a_running_resource_is_a_noop() {
    let mut fx = Fixture::new(&[("race", &[])]);
    fx.manager.start("race", &StartOptions::default()).unwrap();

    let started = fx.manager.start("race", &StartOptions::default()).unwrap();
    assert!(started.is_empty());
    assert_eq!(fx.host.created().len(), 1);
    assert_eq!(fx.manager.counters().loaded, 1);
}

#[test]
fn failed_dependency_fails_dependent_without_leaking_sync_ids() {
    let mut fx = Fixture::new(&[("race", &["mapmanager"]), ("mapmanager", &[])]);
    fx.host.fail("mapmanager");

    let err = fx.manager.start("race", &StartOptions::default()).unwrap_err();
    assert_eq!(
        err,
        ResourceError::UnsatisfiedDependency {
            resource: "race".into(),
            missing: vec!["mapmanager".into()],
        }
    );

    for name in ["race", "mapmanager"] {
        let resource = fx.manager.resource(name).unwrap();
        assert!(!resource.is_started());
        assert_eq!(resource.sync_id(), None);
        assert!(resource.failure().is_some());
    }
    assert_eq!(fx.manager.sync_ids_in_use(), 0);
    assert_eq!(fx.manager.counters(), StatusCounters { loaded: 0, failed: 2 });
}

#[test]
fn failed_start_rolls_back_started_dependencies() {
    let mut fx = Fixture::new(&[
        ("race", &["mapmanager", "scoreboard"]),
        ("mapmanager", &[]),
        ("scoreboard", &[]),
    ]);
    fx.host.fail("scoreboard");

    fx.manager.start("race", &StartOptions::default()).unwrap_err();
    assert!(!fx.is_started("mapmanager"));
    assert_eq!(fx.host.live(), 0);
    assert_eq!(fx.manager.sync_ids_in_use(), 0);
}

#[test]
fn failed_context_leaves_resource_stopped_with_reason() {
    let mut fx = Fixture::new(&[("race", &[])]);
    fx.host.fail("race");

    let err = fx.manager.start("race", &StartOptions::default()).unwrap_err();
    assert_eq!(err.code(), ErrorCode::ExecutionContextFailure);
    assert_eq!(fx.state("race"), ResourceState::Stopped);

    let failed = fx.manager.list(ListFilter::Failed);
    assert_eq!(failed.len(), 1);
    assert!(failed[0].failure.as_deref().unwrap().contains("script error"));

    fx.host.heal("race");
    fx.manager.start("race", &StartOptions::default()).unwrap();
    assert!(fx.manager.resource("race").unwrap().failure().is_none());
}

#[test]
fn missing_dependency_defers_start_unless_partial_start_allowed() {
    let mut fx = Fixture::new(&[("race", &["ghost"])]);

    let err = fx.manager.start("race", &StartOptions::default()).unwrap_err();
    assert_eq!(
        err,
        ResourceError::UnsatisfiedDependency {
            resource: "race".into(),
            missing: vec!["ghost".into()],
        }
    );
    let race = fx.manager.resource("race").unwrap();
    assert!(race.start_deferred());
    assert_eq!(race.missing_dependencies(), ["ghost".to_string()]);
    assert_eq!(fx.manager.counters().failed, 1);

    let options = StartOptions::default().allow_missing(true);
    fx.manager.start("race", &options).unwrap();
    assert!(fx.is_started("race"));
}

#[test]
fn stopped_dependency_fails_when_dependencies_are_not_started() {
    let mut fx = Fixture::new(&[("race", &["mapmanager"]), ("mapmanager", &[])]);
    let options = StartOptions {
        start_dependencies: false,
        ..StartOptions::default()
    };

    let err = fx.manager.start("race", &options).unwrap_err();
    assert_eq!(err.code(), ErrorCode::UnsatisfiedDependency);
    assert!(fx.host.created().is_empty());
    assert!(!fx.manager.resource("race").unwrap().start_deferred());
}

#[test]
fn dependency_cycle_fails_every_participant_once() {
    let mut fx = Fixture::new(&[("a", &["b"]), ("b", &["a"]), ("c", &[])]);

    let err = fx.manager.start("a", &StartOptions::default()).unwrap_err();
    assert_eq!(err.code(), ErrorCode::DependencyCycle);
    assert_eq!(fx.state("a"), ResourceState::Stopped);
    assert_eq!(fx.state("b"), ResourceState::Stopped);
    assert_eq!(fx.manager.sync_ids_in_use(), 0);
    assert_eq!(fx.manager.counters().failed, 1);

    let report = fx.manager.start_all(StartFlags::ALL);
    assert_eq!(report.succeeded, vec!["c"]);
    let mut failed: Vec<_> = report.failed.iter().map(|f| f.name.as_str()).collect();
    failed.sort_unstable();
    assert_eq!(failed, vec!["a", "b"]);
    assert!(
        report
            .failed
            .iter()
            .all(|f| f.code == ErrorCode::DependencyCycle)
    );
    assert_eq!(fx.manager.counters().failed, 2);
}

#[test]
fn start_flags_limit_activated_parts() {
    let mut fx = Fixture::new(&[("race", &[])]);
    let flags = StartFlags {
        maps: false,
        client_files: false,
        ..StartFlags::ALL
    };

    fx.manager
        .start("race", &StartOptions::default().with_flags(flags))
        .unwrap();

    let request = &fx.host.requests()[0];
    assert!(!request.parts.maps);
    assert!(request.parts.scripts);

    let snapshot = fx.manager.client_snapshot();
    assert_eq!(snapshot.len(), 1);
    assert!(!snapshot[0].parts.client_files);
    assert!(snapshot[0].parts.client_scripts);
    assert!(!snapshot[0].parts.scripts);
}

// ─────────────────────────────────────────────────────────────────────────────
// Stop / reload / unload
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn stop_is_idempotent() {
    let mut fx = Fixture::new(&[("race", &[])]);
    fx.manager.start("race", &StartOptions::default()).unwrap();

    assert_eq!(fx.manager.stop("race").unwrap(), vec!["race"]);
    let counters = fx.manager.counters();
    assert!(fx.manager.stop("race").unwrap().is_empty());

    assert_eq!(fx.manager.counters(), counters);
    assert_eq!(fx.host.destroyed().len(), 1);
    assert_eq!(fx.manager.sync_ids_in_use(), 0);
    assert_eq!(fx.state("race"), ResourceState::Stopped);
}

#[test]
fn stop_cascades_to_running_dependents() {
    let mut fx = Fixture::new(&[
        ("base", &[]),
        ("mid", &["base"]),
        ("top", &["mid"]),
        ("other", &[]),
    ]);
    fx.manager.start_all(StartFlags::ALL);

    let stopped = fx.manager.stop("base").unwrap();
    assert_eq!(stopped, vec!["top", "mid", "base"]);
    assert_eq!(fx.running(), vec!["other"]);
    assert_eq!(fx.host.live(), 1);
}

#[test]
fn reload_restarts_dependents_with_fresh_contexts() {
    let mut fx = Fixture::new(&[("base", &[]), ("mid", &["base"]), ("top", &["mid"])]);
    fx.manager.start("top", &StartOptions::default()).unwrap();
    let old_context = fx.manager.resource("top").and_then(Resource::context);

    let started = fx.manager.reload("base").unwrap();
    assert_eq!(started, vec!["base", "mid", "top"]);
    assert_eq!(fx.running(), vec!["base", "mid", "top"]);
    assert_ne!(
        fx.manager.resource("top").and_then(Resource::context),
        old_context
    );
    assert_eq!(fx.manager.sync_ids_in_use(), 3);
}

#[test]
fn reload_keeps_flags_and_manual_marker() {
    let mut fx = Fixture::new(&[("race", &[])]);
    let flags = StartFlags {
        html: false,
        ..StartFlags::ALL
    };
    fx.manager
        .start("race", &StartOptions::manual().with_flags(flags))
        .unwrap();

    fx.manager.reload("race").unwrap();
    let race = fx.manager.resource("race").unwrap();
    assert!(race.started_manually());
    assert!(!race.active_parts().html);
}

#[test]
fn unload_stops_and_unregisters() {
    let mut fx = Fixture::new(&[("base", &[]), ("race", &["base"])]);
    fx.manager.start("race", &StartOptions::default()).unwrap();
    fx.manager.enqueue(QueuedOperation::stop("base"));

    fx.manager.unload("base").unwrap();
    assert!(fx.manager.resource("base").is_none());
    assert!(fx.manager.queue().is_empty());
    assert!(!fx.is_started("race"));
    assert_eq!(
        fx.manager.resource("race").unwrap().missing_dependencies(),
        ["base".to_string()]
    );

    let err = fx.manager.unload("base").unwrap_err();
    assert_eq!(err, ResourceError::NotFound("base".into()));
}

#[test]
fn stop_all_stops_everything() {
    let mut fx = Fixture::new(&[("a", &[]), ("b", &["a"]), ("c", &[])]);
    fx.manager.start_all(StartFlags::ALL);

    let report = fx.manager.stop_all();
    assert_eq!(report.succeeded.len(), 3);
    assert!(fx.running().is_empty());
    assert_eq!(fx.host.live(), 0);
}

// ─────────────────────────────────────────────────────────────────────────────
// Requirement propagation
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn dependent_min_client_requirement_flows_to_base() {
    let mut fx = Fixture::new(&[("base", &[])]);
    fx.storage.insert(
        "gamemode",
        StoredResource::new(
            ResourceManifest::default()
                .with_dependency("base")
                .with_min_client_version("1.5"),
            0,
        ),
    );
    fx.manager.load("gamemode").unwrap();

    fx.manager.start("gamemode", &StartOptions::default()).unwrap();
    let base = fx.manager.resource("base").unwrap();
    assert_eq!(base.effective_min_client(), Some(&ClientVersion::new("1.5")));
    assert_eq!(
        fx.manager.min_client_requirement(),
        Some(ClientVersion::new("1.5"))
    );

    fx.manager.stop("gamemode").unwrap();
    let base = fx.manager.resource("base").unwrap();
    assert_eq!(base.effective_min_client(), None);
    assert_eq!(fx.manager.min_client_requirement(), None);
}

#[test]
fn sync_option_is_forced_on_dependencies() {
    let mut fx = Fixture::new(&[("base", &[])]);
    fx.storage.insert(
        "editor",
        StoredResource::new(
            ResourceManifest::default()
                .with_dependency("base")
                .with_sync_map_element_data(true),
            0,
        ),
    );
    fx.manager.load("editor").unwrap();

    fx.manager.start("editor", &StartOptions::default()).unwrap();
    assert!(fx.manager.resource("base").unwrap().effective_sync_element_data());

    fx.manager.stop("editor").unwrap();
    assert!(!fx.manager.resource("base").unwrap().effective_sync_element_data());
}

// ─────────────────────────────────────────────────────────────────────────────
// Lookups
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn lookups_follow_sync_id_and_context() {
    let mut fx = Fixture::new(&[("Race", &[])]);
    fx.manager.start("race", &StartOptions::default()).unwrap();
    let race = fx.manager.resource("RACE").unwrap().clone();

    let id = race.sync_id().unwrap();
    let handle = race.context().unwrap();
    assert_eq!(fx.manager.resource_by_sync_id(id).map(Resource::name), Some("Race"));
    assert_eq!(
        fx.manager.resource_by_context(handle).map(Resource::name),
        Some("Race")
    );

    fx.manager.stop("race").unwrap();
    assert!(fx.manager.resource_by_sync_id(id).is_none());
    assert!(fx.manager.resource_by_context(handle).is_none());
}

#[test]
fn resolve_path_uses_registered_spelling() {
    let fx = Fixture::new(&[("Race", &[])]);

    let path = fx.manager.resolve_path(":race/maps/a.map", None).unwrap();
    assert_eq!(path.resource, "Race");
    assert_eq!(path.path, "maps/a.map");

    assert_eq!(
        fx.manager.resolve_path(":race/../x", None).unwrap_err().code(),
        ErrorCode::InvalidPath
    );
    assert_eq!(
        fx.manager.resolve_path(":ghost/x", None).unwrap_err(),
        ResourceError::NotFound("ghost".into())
    );
}

#[test]
fn listing_reports_uptime_for_running_resources() {
    let mut fx = Fixture::new(&[("a", &[]), ("b", &[])]);
    fx.manager.start("a", &StartOptions::default()).unwrap();

    let all = fx.manager.list(ListFilter::All);
    assert_eq!(all.len(), 2);
    assert!(all[0].uptime.is_some());
    assert!(all[1].uptime.is_none());

    let stopped = fx.manager.list(ListFilter::NotRunning);
    assert_eq!(stopped.len(), 1);
    assert_eq!(stopped[0].name, "b");
    assert_eq!(stopped[0].state, ResourceState::Loaded);
}

#[test]
fn failed_reload_leaves_dependents_deferred_with_reason() {
    let mut fx = Fixture::new(&[("base", &[]), ("race", &["base"])]);
    fx.manager.start("race", &StartOptions::default()).unwrap();
    fx.host.fail("base");

    let err = fx.manager.reload("base").unwrap_err();
    assert_eq!(err.code(), ErrorCode::ExecutionContextFailure);
    assert!(fx.running().is_empty());
    assert_eq!(fx.host.live(), 0);
    assert_eq!(fx.manager.sync_ids_in_use(), 0);

    let race = fx.manager.resource("race").unwrap();
    assert_eq!(race.state(), ResourceState::Stopped);
    assert!(race.start_deferred());
    assert!(race.failure().unwrap().contains("'base' failed to reload"));

    fx.host.heal("base");
    fx.manager.start("race", &StartOptions::default()).unwrap();
    assert_eq!(fx.running(), vec!["base", "race"]);
}
