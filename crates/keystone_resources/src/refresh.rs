//! Reconciling the registry with storage.
//!
//! A refresh compares what storage holds now with what is registered:
//! resources that disappeared are stopped and unregistered, new ones are
//! registered, and changed ones are stopped, updated and brought back up
//! together with the dependents their stop took down.

use std::time::Duration;

use hashbrown::HashSet;
use serde::Serialize;

use crate::controller::{BulkFailure, StartOptions};
use crate::error::{ResourceError, ResourceResult};
use crate::manager::ResourceManager;
use crate::resolver::DependencyReport;
use crate::resource::{Resource, StoredResource, key_of};

/// What a refresh covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshTarget {
    /// Every resource in storage or in the registry.
    All,
    /// A single resource.
    One(String),
}

/// What a refresh changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RefreshReport {
    /// Newly registered resources.
    pub added: Vec<String>,
    /// Unregistered resources.
    pub removed: Vec<String>,
    /// Resources whose stored metadata changed.
    pub changed: Vec<String>,
    /// Resources started again, or started because their dependencies appeared.
    pub restarted: Vec<String>,
    /// Running resources stopped because something they need was removed.
    pub stopped: Vec<String>,
    /// Starts that failed during the refresh.
    pub failed: Vec<BulkFailure>,
    /// Dependency transitions observed afterwards.
    #[serde(skip)]
    pub dependencies: DependencyReport,
    /// Wall time, when refresh timing is enabled.
    pub elapsed: Option<Duration>,
}

impl RefreshReport {
    /// Returns true if the refresh changed nothing.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.added.is_empty()
            && self.removed.is_empty()
            && self.changed.is_empty()
            && self.restarted.is_empty()
            && self.stopped.is_empty()
    }
}

enum Change {
    Added(String, StoredResource),
    Removed(String),
    Changed(String, StoredResource),
}

fn differs(resource: &Resource, stored: &StoredResource) -> bool {
    resource.manifest() != &stored.manifest
        || resource.organizational_path() != stored.organizational_path
        || resource.size() != stored.size
}

impl ResourceManager {
    /// Reconciles the registry with storage.
    ///
    /// A resource that cannot be read, registered or updated is recorded in
    /// [`RefreshReport::failed`] and skipped; the rest of the refresh still
    /// applies, and changed resources that were running are always brought
    /// back up.
    ///
    /// # Errors
    ///
    /// - [`ResourceError::NotFound`] if a single target is neither in
    ///   storage nor registered
    /// - [`ResourceError::Storage`] if storage cannot be listed, or a single
    ///   target cannot be read
    pub fn refresh(&mut self, target: RefreshTarget) -> ResourceResult<RefreshReport> {
        let began = self.clock.now();
        let mut report = RefreshReport::default();
        let changes = self.collect_changes(&target, &mut report)?;

        let mut pending_restart: Vec<(String, Vec<String>, StartOptions)> = Vec::new();

        // Removals first so that their dependents stop before anything is
        // registered under a name that was just freed.
        for change in &changes {
            if let Change::Removed(name) = change
                && let Err(err) = self.refresh_removed(name, &mut report)
            {
                report.failed.push(BulkFailure::new(name, &err));
            }
        }

        for change in changes {
            match change {
                Change::Added(name, stored) => {
                    let resource = Resource::new(&*name, stored, self.clock.now());
                    match self.registry.register(resource) {
                        Ok(()) => {
                            tracing::info!(resource = %name, "resource added");
                            report.added.push(name);
                        }
                        Err(err) => {
                            tracing::warn!(resource = %name, error = %err, "resource not added");
                            report.failed.push(BulkFailure::new(&name, &err));
                        }
                    }
                }
                Change::Changed(name, stored) => {
                    if let Some(restart) = self.refresh_changed(&name, stored, &mut report) {
                        pending_restart.push(restart);
                    }
                }
                Change::Removed(_) => {}
            }
        }

        report.dependencies = self.resolver.check_all(&mut self.registry);
        self.resolver.reevaluate(&mut self.registry);

        // Changed resources come back after every addition is registered,
        // since a new manifest may depend on a new resource.
        for (name, cascaded, options) in pending_restart {
            match self.start(&name, &options) {
                Ok(started) => {
                    report.restarted.extend(started);
                    let dependents = self.controller.restart_all(
                        &mut self.registry,
                        &mut self.resolver,
                        &cascaded,
                    );
                    report.restarted.extend(dependents);
                }
                Err(err) => report.failed.push(BulkFailure::new(&name, &err)),
            }
        }

        if self.config.auto_start_deferred {
            self.start_deferred(&mut report);
        }

        if self.config.show_refresh_timing {
            let elapsed = self.clock.elapsed_since(began);
            tracing::info!(elapsed_ms = elapsed.as_millis(), "refresh timing");
            report.elapsed = Some(elapsed);
        }
        tracing::info!(
            added = report.added.len(),
            removed = report.removed.len(),
            changed = report.changed.len(),
            restarted = report.restarted.len(),
            failed = report.failed.len(),
            "refresh finished"
        );
        Ok(report)
    }

    fn collect_changes(
        &self,
        target: &RefreshTarget,
        report: &mut RefreshReport,
    ) -> ResourceResult<Vec<Change>> {
        let mut changes = Vec::new();
        match target {
            RefreshTarget::One(name) => match (self.open_stored(name)?, self.registry.get(name)) {
                (Some(stored), Some(resource)) => {
                    if differs(resource, &stored) {
                        changes.push(Change::Changed(resource.name().to_string(), stored));
                    }
                }
                (Some(stored), None) => changes.push(Change::Added(name.clone(), stored)),
                (None, Some(resource)) => changes.push(Change::Removed(resource.name().to_string())),
                (None, None) => return Err(ResourceError::not_found(name)),
            },
            RefreshTarget::All => {
                let in_storage = self.storage.enumerate()?;
                let storage_keys: HashSet<String> = in_storage.iter().map(|name| key_of(name)).collect();

                for resource in self.registry.iter() {
                    if !storage_keys.contains(&resource.key()) {
                        changes.push(Change::Removed(resource.name().to_string()));
                    }
                }

                let mut seen: HashSet<String> = HashSet::new();
                for name in in_storage {
                    if !seen.insert(key_of(&name)) {
                        let err = ResourceError::DuplicateName(name.clone());
                        tracing::warn!(resource = %name, error = %err, "storage lists the name twice");
                        report.failed.push(BulkFailure::new(&name, &err));
                        continue;
                    }
                    let stored = match self.open_stored(&name) {
                        Ok(Some(stored)) => stored,
                        Ok(None) => continue,
                        Err(err) => {
                            let err = ResourceError::from(err);
                            tracing::warn!(resource = %name, error = %err, "resource not readable");
                            report.failed.push(BulkFailure::new(&name, &err));
                            continue;
                        }
                    };
                    match self.registry.get(&name) {
                        Some(resource) if differs(resource, &stored) => {
                            changes.push(Change::Changed(resource.name().to_string(), stored));
                        }
                        Some(_) => {}
                        None => changes.push(Change::Added(name, stored)),
                    }
                }
            }
        }
        Ok(changes)
    }

    /// Stops and updates a changed resource. Returns what to restart once
    /// every addition is registered, if it was running.
    fn refresh_changed(
        &mut self,
        name: &str,
        stored: StoredResource,
        report: &mut RefreshReport,
    ) -> Option<(String, Vec<String>, StartOptions)> {
        let resource = self.registry.get(name)?;
        let was_started = resource.is_started();
        let options = StartOptions {
            flags: resource.requested_flags(),
            manual: resource.started_manually(),
            allow_missing: self.config.allow_partial_start,
            ..StartOptions::default()
        };

        let mut cascaded = match self.stop(name) {
            Ok(stopped) => stopped,
            Err(err) => {
                report.failed.push(BulkFailure::new(name, &err));
                return None;
            }
        };
        cascaded.pop();

        match self.registry.update(name, stored) {
            Ok(()) => {
                tracing::info!(resource = %name, "resource changed");
                report.changed.push(name.to_string());
            }
            Err(err) => {
                tracing::warn!(resource = %name, error = %err, "resource not updated");
                report.failed.push(BulkFailure::new(name, &err));
            }
        }
        was_started.then(|| (name.to_string(), cascaded, options))
    }

    fn refresh_removed(&mut self, name: &str, report: &mut RefreshReport) -> ResourceResult<()> {
        let mut stopped = self.stop(name)?;
        stopped.pop();
        for dependent in &stopped {
            if let Some(resource) = self.registry.get_mut(dependent) {
                resource.start_deferred = true;
            }
        }
        report.stopped.extend(stopped);

        self.queue.dequeue(name);
        let removed = self.registry.unregister(name)?;
        tracing::info!(resource = %removed.name(), "resource removed");
        report.removed.push(removed.name().to_string());
        Ok(())
    }

    /// Starts deferred resources once nothing below them is missing.
    fn start_deferred(&mut self, report: &mut RefreshReport) {
        let candidates: Vec<String> = self
            .registry
            .iter()
            .filter(|resource| resource.start_deferred() && !resource.is_started())
            .filter(|resource| {
                self.resolver
                    .transitively_missing(&self.registry, resource.name())
                    .is_empty()
            })
            .map(|resource| resource.name().to_string())
            .collect();

        for name in candidates {
            // An earlier candidate may have started it as a dependency.
            let Some(resource) = self.registry.get(&name).filter(|r| !r.is_started()) else {
                continue;
            };
            let options = StartOptions {
                flags: resource.requested_flags(),
                manual: resource.started_manually(),
                ..StartOptions::default()
            };
            match self.start(&name, &options) {
                Ok(started) => {
                    tracing::info!(resource = %name, "deferred start completed");
                    for started in started {
                        if !report.restarted.contains(&started) {
                            report.restarted.push(started);
                        }
                    }
                }
                Err(err) => report.failed.push(BulkFailure::new(&name, &err)),
            }
        }
    }
}
