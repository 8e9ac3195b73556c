//! The lifecycle controller.
//!
//! Performs the actual start and stop transitions. Every call runs to
//! completion on the tick thread: it validates dependencies, allocates sync
//! ids, asks the [`ExecutionHost`] for a context, records the outcome on the
//! registry and updates the host-wide counters.

use std::sync::Arc;

use hashbrown::HashSet;
use keystone_core::Clock;
use serde::Serialize;

use crate::context::{ContextRequest, ExecutionHost};
use crate::error::{ErrorCode, ResourceError, ResourceResult};
use crate::registry::Registry;
use crate::resolver::DependencyResolver;
use crate::resource::{Resource, ResourceState, StartFlags, key_of};
use crate::sync_id::SyncIdAllocator;

// ─────────────────────────────────────────────────────────────────────────────
// Options and reports
// ─────────────────────────────────────────────────────────────────────────────

/// How a start should behave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartOptions {
    /// Parts to activate. Intersected with the parts the manifest declares.
    pub flags: StartFlags,
    /// Whether an administrator asked for this start.
    pub manual: bool,
    /// Start dependencies that are not running. When false, a stopped
    /// dependency fails the start.
    pub start_dependencies: bool,
    /// Start even if declared dependencies are not registered.
    pub allow_missing: bool,
}

impl Default for StartOptions {
    fn default() -> Self {
        Self {
            flags: StartFlags::ALL,
            manual: false,
            start_dependencies: true,
            allow_missing: false,
        }
    }
}

impl StartOptions {
    /// Options for an administrator-triggered start.
    #[must_use]
    pub fn manual() -> Self {
        Self {
            manual: true,
            ..Self::default()
        }
    }

    /// Sets the parts to activate.
    #[must_use]
    pub fn with_flags(mut self, flags: StartFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Allows starting with unregistered dependencies.
    #[must_use]
    pub fn allow_missing(mut self, allow: bool) -> Self {
        self.allow_missing = allow;
        self
    }
}

/// Host-wide start outcome counters. Never decremented.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounters {
    /// Successful starts.
    pub loaded: u32,
    /// Failed start attempts.
    pub failed: u32,
}

/// One failure inside a bulk operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulkFailure {
    /// Resource name.
    pub name: String,
    /// Error kind.
    pub code: ErrorCode,
    /// Human-readable reason.
    pub reason: String,
}

/// Result of an operation over many resources.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BulkReport {
    /// Resources the operation succeeded for.
    pub succeeded: Vec<String>,
    /// Resources it failed for.
    pub failed: Vec<BulkFailure>,
}

impl BulkFailure {
    pub(crate) fn new(name: &str, err: &ResourceError) -> Self {
        Self {
            name: name.to_string(),
            code: err.code(),
            reason: err.to_string(),
        }
    }
}

impl BulkReport {
    pub(crate) fn fail(&mut self, name: &str, err: &ResourceError) {
        self.failed.push(BulkFailure::new(name, err));
    }

    /// Returns true if nothing failed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Start planning
// ─────────────────────────────────────────────────────────────────────────────

/// Depth-first walk producing a dependencies-first start order.
struct StartPlanner<'a> {
    registry: &'a Registry,
    resolver: &'a DependencyResolver,
    options: &'a StartOptions,
    path: Vec<String>,
    visited: HashSet<String>,
    order: Vec<String>,
}

impl<'a> StartPlanner<'a> {
    fn plan(
        registry: &'a Registry,
        resolver: &'a DependencyResolver,
        options: &'a StartOptions,
        target: &str,
    ) -> ResourceResult<Vec<String>> {
        let mut planner = Self {
            registry,
            resolver,
            options,
            path: Vec::new(),
            visited: HashSet::new(),
            order: Vec::new(),
        };
        planner.visit(target)?;
        Ok(planner.order)
    }

    fn visit(&mut self, name: &str) -> ResourceResult<()> {
        let key = key_of(name);
        if let Some(pos) = self.path.iter().position(|on_path| key_of(on_path) == key) {
            let mut cycle = self.path[pos..].to_vec();
            cycle.push(name.to_string());
            return Err(ResourceError::DependencyCycle { cycle });
        }
        if !self.visited.insert(key) {
            return Ok(());
        }

        let deps = self.resolver.compute_dependencies(self.registry, name);
        if !deps.missing.is_empty() && !self.options.allow_missing {
            return Err(ResourceError::UnsatisfiedDependency {
                resource: name.to_string(),
                missing: deps.missing,
            });
        }

        self.path.push(name.to_string());
        for dep in deps.resolved {
            if self.registry.get(&dep).is_some_and(Resource::is_started) {
                continue;
            }
            if !self.options.start_dependencies {
                return Err(ResourceError::UnsatisfiedDependency {
                    resource: name.to_string(),
                    missing: vec![dep],
                });
            }
            self.visit(&dep)?;
        }
        self.path.pop();

        self.order.push(name.to_string());
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// LifecycleController
// ─────────────────────────────────────────────────────────────────────────────

/// Drives start and stop transitions.
pub struct LifecycleController {
    allocator: SyncIdAllocator,
    counters: StatusCounters,
    contexts: Arc<dyn ExecutionHost>,
    clock: Clock,
}

impl core::fmt::Debug for LifecycleController {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LifecycleController")
            .field("allocator", &self.allocator)
            .field("counters", &self.counters)
            .finish_non_exhaustive()
    }
}

impl LifecycleController {
    /// Creates a controller that creates contexts through `contexts`.
    #[must_use]
    pub fn new(contexts: Arc<dyn ExecutionHost>, clock: Clock) -> Self {
        Self {
            allocator: SyncIdAllocator::new(),
            counters: StatusCounters::default(),
            contexts,
            clock,
        }
    }

    /// Start outcome counters.
    #[must_use]
    pub fn counters(&self) -> StatusCounters {
        self.counters
    }

    /// Number of sync ids currently allocated.
    #[must_use]
    pub fn sync_ids_in_use(&self) -> usize {
        self.allocator.in_use_count()
    }

    /// The clock used for start timestamps.
    #[must_use]
    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    pub(crate) fn set_clock(&mut self, clock: Clock) {
        self.clock = clock;
    }

    /// Starts `name`, and first any dependency that is not running.
    ///
    /// Returns the resources this call started, dependencies first. Starting
    /// a running resource is a no-op. A failed attempt rolls back the
    /// dependencies it started and leaves the target stopped with its
    /// failure reason recorded.
    ///
    /// # Errors
    ///
    /// - [`ResourceError::NotFound`] if `name` is not registered
    /// - [`ResourceError::UnsatisfiedDependency`] if a dependency is missing or failed
    /// - [`ResourceError::DependencyCycle`] if the dependencies loop
    /// - [`ResourceError::ExecutionContextFailure`] if the context could not be created
    /// - [`ResourceError::SyncIdsExhausted`] if no sync id is free
    pub fn start(
        &mut self,
        registry: &mut Registry,
        resolver: &mut DependencyResolver,
        name: &str,
        options: &StartOptions,
    ) -> ResourceResult<Vec<String>> {
        let target = registry
            .get(name)
            .ok_or_else(|| ResourceError::not_found(name))?;
        let target_name = target.name().to_string();
        if target.is_started() {
            tracing::debug!(resource = %target_name, "already started");
            return Ok(Vec::new());
        }

        let plan = match StartPlanner::plan(registry, resolver, options, &target_name) {
            Ok(plan) => plan,
            Err(err) => {
                self.reject_plan(registry, resolver, &target_name, &err);
                return Err(err);
            }
        };

        let target_key = key_of(&target_name);
        let mut started: Vec<String> = Vec::new();
        for entry in &plan {
            let is_target = key_of(entry) == target_key;
            let (flags, manual) = if is_target {
                (options.flags, options.manual)
            } else {
                let flags = registry
                    .get(entry)
                    .map_or(StartFlags::ALL, Resource::requested_flags);
                (flags, false)
            };

            if let Err(err) = self.start_one(registry, resolver, entry, flags, manual) {
                self.roll_back(registry, resolver, &started);
                if is_target {
                    return Err(err);
                }

                let failure = ResourceError::UnsatisfiedDependency {
                    resource: target_name.clone(),
                    missing: vec![entry.clone()],
                };
                self.record_failure(
                    registry,
                    &target_name,
                    &format!("dependency '{entry}' failed to start: {err}"),
                );
                return Err(failure);
            }
            started.push(entry.clone());
        }
        Ok(started)
    }

    fn reject_plan(
        &mut self,
        registry: &mut Registry,
        resolver: &DependencyResolver,
        target: &str,
        err: &ResourceError,
    ) {
        self.counters.failed += 1;
        let reason = err.to_string();
        tracing::warn!(resource = %target, error = %reason, "resource failed to start");

        if let ResourceError::DependencyCycle { cycle } = err {
            for participant in cycle {
                if let Some(resource) = registry.get_mut(participant)
                    && !resource.is_started()
                {
                    resource.mark_failed(reason.clone());
                }
            }
        }
        // Deferred only while something below the target is unregistered.
        let deferred = matches!(err, ResourceError::UnsatisfiedDependency { .. })
            && !resolver.transitively_missing(registry, target).is_empty();
        if let Some(resource) = registry.get_mut(target) {
            resource.mark_failed(reason);
            resource.start_deferred = deferred;
        }
    }

    fn record_failure(&mut self, registry: &mut Registry, name: &str, reason: &str) {
        self.counters.failed += 1;
        tracing::warn!(resource = %name, error = %reason, "resource failed to start");
        if let Some(resource) = registry.get_mut(name) {
            resource.mark_failed(reason);
        }
    }

    fn roll_back(
        &mut self,
        registry: &mut Registry,
        resolver: &mut DependencyResolver,
        started: &[String],
    ) {
        for name in started.iter().rev() {
            tracing::debug!(resource = %name, "rolling back start");
            self.stop_one(registry, resolver, name);
        }
    }

    fn start_one(
        &mut self,
        registry: &mut Registry,
        resolver: &mut DependencyResolver,
        name: &str,
        flags: StartFlags,
        manual: bool,
    ) -> ResourceResult<()> {
        let resource = registry
            .get(name)
            .ok_or_else(|| ResourceError::not_found(name))?;
        let resource_name = resource.name().to_string();
        let manifest = resource.manifest().clone();

        let sync_id = match resource.sync_id() {
            Some(id) => id,
            None => {
                let id = match self.allocator.allocate() {
                    Ok(id) => id,
                    Err(err) => {
                        self.record_failure(registry, &resource_name, &err.to_string());
                        return Err(err);
                    }
                };
                if let Err(err) = registry.assign_sync_id(&resource_name, id) {
                    self.allocator.release(id);
                    return Err(err);
                }
                id
            }
        };

        let parts = flags.intersect(manifest.parts);
        let request = ContextRequest {
            name: resource_name.clone(),
            sync_id,
            parts,
        };

        let handle = match self.contexts.create(&request) {
            Ok(handle) => handle,
            Err(err) => {
                if let Some(id) = registry.clear_sync_id(&resource_name) {
                    self.allocator.release(id);
                }
                let err = ResourceError::ExecutionContextFailure {
                    resource: resource_name.clone(),
                    reason: err.to_string(),
                };
                self.record_failure(registry, &resource_name, &err.to_string());
                return Err(err);
            }
        };
        if let Err(err) = registry.associate_context(&resource_name, handle) {
            self.contexts.destroy(handle);
            if let Some(id) = registry.clear_sync_id(&resource_name) {
                self.allocator.release(id);
            }
            return Err(err);
        }

        let now = self.clock.now();
        if let Some(resource) = registry.get_mut(&resource_name) {
            resource.state = ResourceState::Started;
            resource.active_parts = parts;
            resource.requested_flags = flags;
            resource.started_manually = manual;
            resource.start_deferred = false;
            resource.failure = None;
            resource.started_at = Some(now);
        }

        if let Some(version) = manifest.min_client_version {
            resolver.apply_min_requirement(registry, &resource_name, version);
        }
        if let Some(enabled) = manifest.sync_map_element_data {
            resolver.apply_sync_option(registry, &resource_name, enabled);
        }

        self.counters.loaded += 1;
        tracing::info!(
            resource = %resource_name,
            sync_id = %sync_id,
            context = %handle,
            manual,
            "resource started"
        );
        Ok(())
    }

    /// Stops `name` and every running resource that depends on it.
    ///
    /// Returns the resources stopped, dependents first and `name` last.
    /// Stopping a resource that is not running is a no-op.
    ///
    /// # Errors
    ///
    /// [`ResourceError::NotFound`] if `name` is not registered.
    pub fn stop(
        &mut self,
        registry: &mut Registry,
        resolver: &mut DependencyResolver,
        name: &str,
    ) -> ResourceResult<Vec<String>> {
        let resource = registry
            .get(name)
            .ok_or_else(|| ResourceError::not_found(name))?;
        let resource_name = resource.name().to_string();
        if !resource.is_started() {
            tracing::debug!(resource = %resource_name, "already stopped");
            return Ok(Vec::new());
        }

        let mut stopped = Vec::new();
        for dependent in resolver.transitive_dependents(registry, &resource_name) {
            if registry.get(&dependent).is_some_and(Resource::is_started) {
                self.stop_one(registry, resolver, &dependent);
                stopped.push(dependent);
            }
        }
        self.stop_one(registry, resolver, &resource_name);
        stopped.push(resource_name);
        Ok(stopped)
    }

    fn stop_one(&mut self, registry: &mut Registry, resolver: &mut DependencyResolver, name: &str) {
        if let Some(handle) = registry.dissociate_context(name) {
            self.contexts.destroy(handle);
        }
        if let Some(id) = registry.clear_sync_id(name) {
            self.allocator.release(id);
        }
        resolver.remove_min_requirement(registry, name);
        resolver.remove_sync_option(registry, name);

        if let Some(resource) = registry.get_mut(name) {
            resource.state = ResourceState::Stopped;
            resource.active_parts = StartFlags::NONE;
            resource.started_at = None;
        }
        tracing::info!(resource = %name, "resource stopped");
    }

    /// Stops `name` and starts it again with the flags it last ran with,
    /// then restarts the dependents the stop took down.
    ///
    /// Returns every resource started. A resource that was not running is
    /// simply started.
    ///
    /// # Errors
    ///
    /// The error of the target's start. The dependents the stop took down
    /// are then left stopped, deferred, with the reload failure as reason.
    /// Dependents that fail to come back are logged and keep their failure
    /// reason.
    pub fn reload(
        &mut self,
        registry: &mut Registry,
        resolver: &mut DependencyResolver,
        name: &str,
    ) -> ResourceResult<Vec<String>> {
        let resource = registry
            .get(name)
            .ok_or_else(|| ResourceError::not_found(name))?;
        let resource_name = resource.name().to_string();
        let options = StartOptions {
            flags: resource.requested_flags(),
            manual: resource.started_manually(),
            ..StartOptions::default()
        };

        let mut cascaded = self.stop(registry, resolver, &resource_name)?;
        cascaded.pop();

        let mut started = match self.start(registry, resolver, &resource_name, &options) {
            Ok(started) => started,
            Err(err) => {
                let reason = format!("dependency '{resource_name}' failed to reload: {err}");
                for dependent in &cascaded {
                    tracing::warn!(resource = %dependent, error = %reason, "dependent left stopped");
                    if let Some(resource) = registry.get_mut(dependent) {
                        resource.mark_failed(reason.clone());
                        resource.start_deferred = true;
                    }
                }
                return Err(err);
            }
        };
        started.extend(self.restart_all(registry, resolver, &cascaded));
        tracing::info!(resource = %resource_name, restarted = started.len(), "resource reloaded");
        Ok(started)
    }

    /// Starts previously running resources again, dependencies first.
    ///
    /// `names` is in stop order (dependents first). Returns the resources
    /// started; failures are logged and recorded on the resource.
    pub(crate) fn restart_all(
        &mut self,
        registry: &mut Registry,
        resolver: &mut DependencyResolver,
        names: &[String],
    ) -> Vec<String> {
        let mut started = Vec::new();
        for name in names.iter().rev() {
            let Some(resource) = registry.get(name) else {
                continue;
            };
            let options = StartOptions {
                flags: resource.requested_flags(),
                manual: resource.started_manually(),
                ..StartOptions::default()
            };
            match self.start(registry, resolver, name, &options) {
                Ok(names) => started.extend(names),
                Err(err) => {
                    tracing::warn!(resource = %name, error = %err, "dependent did not come back");
                }
            }
        }
        started
    }

    /// Starts every registered resource that is not running.
    ///
    /// Failures never abort the batch. A dependency cycle is reported once
    /// for all of its participants.
    pub fn start_all(
        &mut self,
        registry: &mut Registry,
        resolver: &mut DependencyResolver,
        flags: StartFlags,
        allow_missing: bool,
    ) -> BulkReport {
        let mut report = BulkReport::default();
        let mut reported: HashSet<String> = HashSet::new();
        let options = StartOptions {
            flags,
            allow_missing,
            ..StartOptions::default()
        };

        for name in registry.names() {
            if reported.contains(&key_of(&name))
                || registry.get(&name).is_some_and(Resource::is_started)
            {
                continue;
            }
            match self.start(registry, resolver, &name, &options) {
                Ok(started) => report.succeeded.extend(started),
                Err(err) => {
                    if let ResourceError::DependencyCycle { cycle } = &err {
                        for participant in cycle {
                            if reported.insert(key_of(participant)) && key_of(participant) != key_of(&name) {
                                report.fail(participant, &err);
                            }
                        }
                    }
                    reported.insert(key_of(&name));
                    report.fail(&name, &err);
                }
            }
        }

        tracing::info!(
            started = report.succeeded.len(),
            failed = report.failed.len(),
            "start all finished"
        );
        report
    }

    /// Stops every running resource, most recently registered first.
    pub fn stop_all(&mut self, registry: &mut Registry, resolver: &mut DependencyResolver) -> BulkReport {
        let mut report = BulkReport::default();
        for name in registry.names().into_iter().rev() {
            if !registry.get(&name).is_some_and(Resource::is_started) {
                continue;
            }
            match self.stop(registry, resolver, &name) {
                Ok(stopped) => report.succeeded.extend(stopped),
                Err(err) => report.fail(&name, &err),
            }
        }
        tracing::info!(stopped = report.succeeded.len(), "stop all finished");
        report
    }
}
