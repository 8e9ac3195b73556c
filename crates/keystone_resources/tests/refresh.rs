//! Reconciling the registry with storage.

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use common::{Fixture, RecordingHost, stored};
use keystone_core::{Clock, MockClock};
use keystone_resources::prelude::*;
use parking_lot::Mutex;

/// Storage whose reads and listing can be corrupted after the fact.
#[derive(Default)]
struct TamperedStorage {
    inner: MemoryStorage,
    unreadable: Mutex<Vec<String>>,
    listed_twice: Mutex<Vec<String>>,
}

impl ResourceStorage for TamperedStorage {
    fn open(&self, name: &str) -> Result<StoredResource, StorageError> {
        if self.unreadable.lock().iter().any(|n| n.eq_ignore_ascii_case(name)) {
            return Err(StorageError::InvalidManifest {
                name: name.to_string(),
                reason: "expected value at line 1 column 1".into(),
            });
        }
        self.inner.open(name)
    }

    fn enumerate(&self) -> Result<Vec<String>, StorageError> {
        let mut names = self.inner.enumerate()?;
        names.extend(self.listed_twice.lock().iter().cloned());
        Ok(names)
    }
}

fn failures(report: &RefreshReport) -> Vec<(&str, ErrorCode)> {
    report
        .failed
        .iter()
        .map(|failure| (failure.name.as_str(), failure.code))
        .collect()
}

#[test]
fn refresh_all_handles_removed_and_added() {
    let mut fx = Fixture::new(&[("old", &[]), ("keep", &[])]);
    fx.manager.start_all(StartFlags::ALL);
    fx.storage.remove("old");
    fx.storage.insert("new", stored(&[]));

    let report = fx.manager.refresh(RefreshTarget::All).unwrap();
    assert_eq!(report.removed, vec!["old"]);
    assert_eq!(report.added, vec!["new"]);
    assert!(report.changed.is_empty());

    assert!(fx.manager.resource("old").is_none());
    assert_eq!(fx.state("new"), ResourceState::Loaded);
    assert_eq!(fx.running(), vec!["keep"]);
    assert_eq!(fx.host.live(), 1);
    assert_eq!(fx.manager.sync_ids_in_use(), 1);
}

#[test]
fn refresh_without_changes_is_a_noop() {
    let mut fx = Fixture::new(&[("a", &[]), ("b", &["a"])]);
    fx.manager.start_all(StartFlags::ALL);

    let report = fx.manager.refresh(RefreshTarget::All).unwrap();
    assert!(report.is_noop());
    assert_eq!(fx.host.created().len(), 2);
}

#[test]
fn removed_dependency_stops_dependents_and_they_come_back() {
    let mut fx = Fixture::new(&[("base", &[]), ("race", &["base"])]);
    fx.manager.start("race", &StartOptions::default()).unwrap();

    let removed = fx.storage.remove("base").unwrap();
    let report = fx.manager.refresh(RefreshTarget::All).unwrap();
    assert_eq!(report.stopped, vec!["race"]);
    assert_eq!(report.dependencies.now_missing, vec!["race"]);
    assert!(fx.manager.resource("race").unwrap().start_deferred());

    fx.storage.insert("base", removed);
    let report = fx.manager.refresh(RefreshTarget::All).unwrap();
    assert_eq!(report.added, vec!["base"]);
    assert_eq!(report.dependencies.now_satisfied, vec!["race"]);
    assert_eq!(report.restarted, vec!["base", "race"]);
    assert_eq!(fx.running(), vec!["race", "base"]);
}

#[test]
fn deferred_start_waits_when_auto_start_disabled() {
    let config = ManagerConfig {
        auto_start_deferred: false,
        ..ManagerConfig::default()
    };
    let mut fx = Fixture::with_config(&[("race", &["base"])], config);
    fx.manager
        .start("race", &StartOptions::default())
        .unwrap_err();

    fx.storage.insert("base", stored(&[]));
    let report = fx.manager.refresh(RefreshTarget::All).unwrap();
    assert_eq!(report.dependencies.now_satisfied, vec!["race"]);
    assert!(report.restarted.is_empty());
    assert!(fx.running().is_empty());
}

#[test]
fn changed_running_resource_is_restarted_with_dependents() {
    let mut fx = Fixture::new(&[("base", &[]), ("race", &["base"]), ("idle", &[])]);
    fx.manager.start("race", &StartOptions::manual()).unwrap();
    fx.storage.insert(
        "base",
        StoredResource::new(ResourceManifest::default(), 999).with_path("[core]"),
    );
    fx.storage
        .insert("idle", StoredResource::new(ResourceManifest::default(), 1));

    let report = fx.manager.refresh(RefreshTarget::All).unwrap();
    assert_eq!(report.changed, vec!["base", "idle"]);
    assert_eq!(report.restarted, vec!["base", "race"]);

    let base = fx.manager.resource("base").unwrap();
    assert_eq!(base.organizational_path(), "[core]");
    assert_eq!(base.size(), 999);
    assert!(fx.manager.resource("race").unwrap().started_manually());
    assert_eq!(fx.running(), vec!["base", "race"]);
}

#[test]
fn changed_resource_that_fails_is_reported() {
    let mut fx = Fixture::new(&[("race", &[])]);
    fx.manager.start("race", &StartOptions::default()).unwrap();
    fx.storage
        .insert("race", StoredResource::new(ResourceManifest::default(), 1));
    fx.host.fail("race");

    let report = fx.manager.refresh(RefreshTarget::One("race".into())).unwrap();
    assert_eq!(report.changed, vec!["race"]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].code, ErrorCode::ExecutionContextFailure);
    assert_eq!(fx.state("race"), ResourceState::Stopped);
}

#[test]
fn refresh_one_registers_or_unregisters_single_resource() {
    let mut fx = Fixture::new(&[("race", &[]), ("scores", &[])]);
    fx.storage.insert("new", stored(&[]));
    fx.storage.remove("scores");

    let report = fx.manager.refresh(RefreshTarget::One("new".into())).unwrap();
    assert_eq!(report.added, vec!["new"]);
    assert!(fx.manager.resource("scores").is_some());

    let report = fx
        .manager
        .refresh(RefreshTarget::One("scores".into()))
        .unwrap();
    assert_eq!(report.removed, vec!["scores"]);

    let err = fx
        .manager
        .refresh(RefreshTarget::One("ghost".into()))
        .unwrap_err();
    assert_eq!(err, ResourceError::NotFound("ghost".into()));
}

#[test]
fn removed_resource_drops_its_queued_operations() {
    let mut fx = Fixture::new(&[("race", &[])]);
    fx.manager
        .enqueue(QueuedOperation::start("race", StartFlags::ALL));
    fx.storage.remove("race");

    fx.manager.refresh(RefreshTarget::All).unwrap();
    assert!(fx.manager.queue().is_empty());
}

#[test]
fn refresh_timing_uses_the_host_clock() {
    let mock = Arc::new(MockClock::new(Instant::now()));
    let storage = Arc::new(MemoryStorage::new());
    let config = ManagerConfig {
        show_refresh_timing: true,
        ..ManagerConfig::default()
    };
    let mut manager = ResourceManager::new(storage.clone(), RecordingHost::new())
        .with_config(config)
        .with_clock(Clock::with_provider(mock.clone()));

    storage.insert("race", stored(&[]));
    let report = manager.refresh(RefreshTarget::All).unwrap();
    assert_eq!(report.added, vec!["race"]);
    assert_eq!(report.elapsed, Some(Duration::ZERO));

    manager.start("race", &StartOptions::default()).unwrap();
    mock.advance(Duration::from_secs(30));
    let info = manager.list(ListFilter::Running);
    assert_eq!(info[0].uptime, Some(Duration::from_secs(30)));
}

#[test]
fn queued_refresh_all_runs_on_drain() {
    let mut fx = Fixture::new(&[("race", &[])]);
    fx.storage.insert("scores", stored(&[]));

    fx.manager.enqueue(QueuedOperation::refresh_all());
    fx.manager.process_queue();
    assert!(fx.manager.resource("scores").is_some());
}

#[test]
fn unreadable_resource_does_not_abort_refresh_all() {
    let storage = Arc::new(TamperedStorage::default());
    storage.inner.insert("broken", stored(&[]));
    let mut manager = ResourceManager::new(storage.clone(), RecordingHost::new());
    assert!(manager.load_all().is_success());

    storage.inner.insert("fresh", stored(&[]));
    storage.unreadable.lock().push("broken".into());
    let report = manager.refresh(RefreshTarget::All).unwrap();

    assert_eq!(report.added, vec!["fresh"]);
    assert!(report.removed.is_empty());
    assert_eq!(failures(&report), vec![("broken", ErrorCode::Storage)]);
    assert!(manager.resource("fresh").is_some());
    assert!(manager.resource("broken").is_some());
}

#[test]
fn failed_registration_still_restarts_changed_resources() {
    let storage = Arc::new(TamperedStorage::default());
    storage.inner.insert("base", stored(&[]));
    storage.inner.insert("top", stored(&["base"]));
    let mut manager = ResourceManager::new(storage.clone(), RecordingHost::new());
    assert!(manager.load_all().is_success());
    manager.start("top", &StartOptions::default()).unwrap();

    storage.inner.insert("base", StoredResource::new(ResourceManifest::default(), 200));
    storage.inner.insert("map", stored(&[]));
    storage.listed_twice.lock().push("MAP".into());
    let report = manager.refresh(RefreshTarget::All).unwrap();

    assert_eq!(report.added, vec!["map"]);
    assert_eq!(report.changed, vec!["base"]);
    assert_eq!(failures(&report), vec![("MAP", ErrorCode::DuplicateName)]);
    assert_eq!(report.restarted, vec!["base", "top"]);
    assert!(manager.resource("base").unwrap().is_started());
    assert!(manager.resource("top").unwrap().is_started());
    assert_eq!(manager.resource("base").unwrap().size(), 200);
}

#[test]
fn deferred_start_resumes_when_an_indirect_dependency_appears() {
    let mut fx = Fixture::new(&[("top", &["mid"]), ("mid", &["leaf"])]);
    fx.manager
        .start("top", &StartOptions::default())
        .unwrap_err();
    assert!(fx.manager.resource("top").unwrap().start_deferred());
    assert!(!fx.manager.resource("mid").unwrap().start_deferred());

    fx.storage.insert("leaf", stored(&[]));
    let report = fx.manager.refresh(RefreshTarget::All).unwrap();

    assert_eq!(report.dependencies.now_satisfied, vec!["mid"]);
    assert_eq!(report.restarted, vec!["leaf", "mid", "top"]);
    assert!(report.failed.is_empty());
    assert!(fx.is_started("top"));
    assert!(!fx.manager.resource("top").unwrap().start_deferred());
}

#[test]
fn resource_loaded_with_missing_dependencies_is_not_reported_as_lost() {
    let mut fx = Fixture::new(&[]);
    fx.storage.insert("race", stored(&["base"]));

    let report = fx.manager.refresh(RefreshTarget::All).unwrap();
    assert_eq!(report.added, vec!["race"]);
    assert!(report.dependencies.now_missing.is_empty());
    assert_eq!(report.dependencies.missing_at_load, vec!["race"]);
}
