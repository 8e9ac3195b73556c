//! The resource manager facade.
//!
//! [`ResourceManager`] owns the registry, resolver, controller and queue and
//! is the only way the rest of the host touches them. It lives in host state
//! and is mutated on the tick thread; other threads hold a
//! [`LifecycleQueue`] handle obtained from [`ResourceManager::queue`].
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicU64, Ordering};
//!
//! use keystone_resources::prelude::*;
//!
//! struct Contexts(AtomicU64);
//!
//! impl ExecutionHost for Contexts {
//!     fn create(&self, _request: &ContextRequest) -> Result<ContextHandle, ContextError> {
//!         Ok(ContextHandle(self.0.fetch_add(1, Ordering::SeqCst)))
//!     }
//!
//!     fn destroy(&self, _handle: ContextHandle) {}
//! }
//!
//! let storage = Arc::new(MemoryStorage::new());
//! storage.insert("mapmanager", StoredResource::default());
//! storage.insert(
//!     "race",
//!     StoredResource::new(ResourceManifest::default().with_dependency("mapmanager"), 0),
//! );
//!
//! let mut manager = ResourceManager::new(storage, Arc::new(Contexts(AtomicU64::new(1))));
//! manager.load_all();
//!
//! let started = manager.start("race", &StartOptions::manual()).unwrap();
//! assert_eq!(started, vec!["mapmanager", "race"]);
//! ```

use std::sync::Arc;

use keystone_core::Clock;
use keystone_host::state::HostState;

use crate::config::ManagerConfig;
use crate::context::ExecutionHost;
use crate::controller::{BulkReport, LifecycleController, StartOptions, StatusCounters};
use crate::error::{ResourceError, ResourceResult};
use crate::path::{ResourcePath, parse_resource_path};
use crate::queue::{LifecycleQueue, QueueKind, QueuedOperation};
use crate::refresh::RefreshTarget;
use crate::registry::Registry;
use crate::resolver::{DependencyReport, DependencyResolver};
use crate::resource::{
    ClientResourceInfo, ClientVersion, ContextHandle, Resource, ResourceInfo, StartFlags,
    StoredResource, SyncId, key_of,
};
use crate::storage::{ResourceStorage, StorageError};

/// Which resources an administrative listing includes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ListFilter {
    /// Every registered resource.
    #[default]
    All,
    /// Running resources.
    Running,
    /// Resources that are not running.
    NotRunning,
    /// Resources with a recorded failure.
    Failed,
}

impl ListFilter {
    fn matches(self, resource: &Resource) -> bool {
        match self {
            Self::All => true,
            Self::Running => resource.is_started(),
            Self::NotRunning => !resource.is_started(),
            Self::Failed => resource.failure().is_some(),
        }
    }
}

/// Owns every resource of the host and serializes their lifecycle.
pub struct ResourceManager {
    pub(crate) registry: Registry,
    pub(crate) resolver: DependencyResolver,
    pub(crate) controller: LifecycleController,
    pub(crate) queue: LifecycleQueue,
    pub(crate) storage: Arc<dyn ResourceStorage>,
    pub(crate) config: ManagerConfig,
    pub(crate) clock: Clock,
}

impl HostState for ResourceManager {}

impl core::fmt::Debug for ResourceManager {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ResourceManager")
            .field("registry", &self.registry)
            .field("controller", &self.controller)
            .field("queue", &self.queue)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ResourceManager {
    /// Creates a manager over `storage` that runs resources through `contexts`.
    #[must_use]
    pub fn new(storage: Arc<dyn ResourceStorage>, contexts: Arc<dyn ExecutionHost>) -> Self {
        let clock = Clock::system();
        Self {
            registry: Registry::new(),
            resolver: DependencyResolver::new(),
            controller: LifecycleController::new(contexts, clock.clone()),
            queue: LifecycleQueue::new(),
            storage,
            config: ManagerConfig::default(),
            clock,
        }
    }

    /// Replaces the configuration.
    #[must_use]
    pub fn with_config(mut self, config: ManagerConfig) -> Self {
        self.config = config;
        self
    }

    /// Uses `clock` for every timestamp. Call before loading anything.
    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.controller.set_clock(clock.clone());
        self.clock = clock;
        self
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Load / unload
    // ─────────────────────────────────────────────────────────────────────────

    /// Reads `name` from storage and registers it.
    ///
    /// # Errors
    ///
    /// - [`ResourceError::Storage`] if storage cannot open it
    /// - [`ResourceError::DuplicateName`] if it is already registered
    pub fn load(&mut self, name: &str) -> ResourceResult<()> {
        if let Some(existing) = self.registry.get(name) {
            return Err(ResourceError::DuplicateName(existing.name().to_string()));
        }
        let stored = self.storage.open(name)?;
        self.registry
            .register(Resource::new(name, stored, self.clock.now()))?;
        self.resolver.check_all(&mut self.registry);
        tracing::info!(resource = %name, "resource loaded");
        Ok(())
    }

    /// Registers every resource in storage that is not registered yet.
    ///
    /// Failures are collected; they never stop the batch.
    pub fn load_all(&mut self) -> BulkReport {
        let mut report = BulkReport::default();
        let names = match self.storage.enumerate() {
            Ok(names) => names,
            Err(err) => {
                let err = ResourceError::from(err);
                tracing::warn!(error = %err, "could not enumerate storage");
                report.fail("*", &err);
                return report;
            }
        };

        let now = self.clock.now();
        for name in names {
            if self.registry.contains(&name) {
                continue;
            }
            let result = self
                .storage
                .open(&name)
                .map_err(ResourceError::from)
                .and_then(|stored| self.registry.register(Resource::new(&*name, stored, now)));
            match result {
                Ok(()) => report.succeeded.push(name),
                Err(err) => {
                    tracing::warn!(resource = %name, error = %err, "resource failed to load");
                    report.fail(&name, &err);
                }
            }
        }

        self.resolver.check_all(&mut self.registry);
        self.resolver.reevaluate(&mut self.registry);
        tracing::info!(
            loaded = report.succeeded.len(),
            failed = report.failed.len(),
            "resources loaded"
        );
        report
    }

    /// Stops `name` (with its running dependents), drops its queued
    /// operations and unregisters it.
    ///
    /// # Errors
    ///
    /// [`ResourceError::NotFound`] if it is not registered.
    pub fn unload(&mut self, name: &str) -> ResourceResult<()> {
        self.controller
            .stop(&mut self.registry, &mut self.resolver, name)?;
        self.queue.dequeue(name);
        let removed = self.registry.unregister(name)?;

        self.resolver.check_all(&mut self.registry);
        self.resolver.reevaluate(&mut self.registry);
        tracing::info!(resource = %removed.name(), "resource unloaded");
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Start / stop
    // ─────────────────────────────────────────────────────────────────────────

    /// Starts `name` and its dependencies now. See [`LifecycleController::start`].
    ///
    /// # Errors
    ///
    /// See [`LifecycleController::start`].
    pub fn start(&mut self, name: &str, options: &StartOptions) -> ResourceResult<Vec<String>> {
        self.controller
            .start(&mut self.registry, &mut self.resolver, name, options)
    }

    /// Stops `name` and its running dependents now.
    ///
    /// # Errors
    ///
    /// [`ResourceError::NotFound`] if it is not registered.
    pub fn stop(&mut self, name: &str) -> ResourceResult<Vec<String>> {
        self.controller
            .stop(&mut self.registry, &mut self.resolver, name)
    }

    /// Restarts `name` with its previous flags, bringing its dependents back.
    ///
    /// # Errors
    ///
    /// See [`LifecycleController::reload`].
    pub fn reload(&mut self, name: &str) -> ResourceResult<Vec<String>> {
        self.controller
            .reload(&mut self.registry, &mut self.resolver, name)
    }

    /// Starts every registered resource that is not running.
    pub fn start_all(&mut self, flags: StartFlags) -> BulkReport {
        self.controller.start_all(
            &mut self.registry,
            &mut self.resolver,
            flags,
            self.config.allow_partial_start,
        )
    }

    /// Stops every running resource.
    pub fn stop_all(&mut self) -> BulkReport {
        self.controller
            .stop_all(&mut self.registry, &mut self.resolver)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Queue
    // ─────────────────────────────────────────────────────────────────────────

    /// Defers an operation to the next [`process_queue`](Self::process_queue).
    pub fn enqueue(&self, op: QueuedOperation) {
        self.queue.enqueue(op);
    }

    /// A handle other threads can enqueue through.
    #[must_use]
    pub fn queue(&self) -> LifecycleQueue {
        self.queue.clone()
    }

    /// Applies every operation that was queued before this call.
    ///
    /// Operations queued meanwhile, including the follow-ups this drain
    /// queues itself, wait for the next call. Returns the number applied,
    /// or zero if a drain is already running.
    pub fn process_queue(&mut self) -> usize {
        let Some(mut drain) = self.queue.begin_drain() else {
            tracing::debug!("queue drain already running");
            return 0;
        };

        let mut processed = 0;
        while let Some(op) = drain.next_pending() {
            self.apply_queued(op);
            processed += 1;
        }
        if processed > 0 {
            tracing::debug!(processed, "queue drained");
        }
        processed
    }

    fn apply_queued(&mut self, op: QueuedOperation) {
        tracing::debug!(resource = op.resource.as_deref().unwrap_or("*"), kind = ?op.kind, "applying queued operation");

        let target = match (op.kind, op.resource.as_deref()) {
            (QueueKind::StopAll, _) => {
                self.stop_all();
                return;
            }
            (QueueKind::RefreshAll, _) => {
                if let Err(err) = self.refresh(RefreshTarget::All) {
                    tracing::warn!(error = %err, "queued refresh failed");
                }
                return;
            }
            (_, Some(name)) if self.registry.contains(name) || op.kind == QueueKind::Refresh => {
                name.to_string()
            }
            (kind, name) => {
                tracing::warn!(resource = name.unwrap_or("*"), ?kind, "queued operation target is gone");
                return;
            }
        };

        let options = StartOptions {
            flags: op.flags,
            allow_missing: self.config.allow_partial_start,
            ..StartOptions::default()
        };

        match op.kind {
            QueueKind::Start => {
                // Failures are counted and recorded by the controller.
                let _ = self.start(&target, &options);
            }
            QueueKind::Stop => {
                let _ = self.stop(&target);
            }
            QueueKind::Restart => {
                let mut dependents = self.stop(&target).unwrap_or_default();
                dependents.pop();
                for listed in op.dependents {
                    if !dependents.iter().any(|name| key_of(name) == key_of(&listed)) {
                        dependents.push(listed);
                    }
                }
                self.queue.enqueue(QueuedOperation::new(
                    QueueKind::RestartApply,
                    target,
                    op.flags,
                    dependents,
                ));
            }
            QueueKind::RestartApply => match self.start(&target, &options) {
                Ok(_) => {
                    let started = self.controller.restart_all(
                        &mut self.registry,
                        &mut self.resolver,
                        &op.dependents,
                    );
                    tracing::info!(resource = %target, dependents = started.len(), "resource restarted");
                }
                Err(err) => {
                    tracing::warn!(resource = %target, error = %err, "restart failed, requeueing dependents");
                    for dependent in op.dependents {
                        let flags = self.requested_flags(&dependent);
                        self.queue.enqueue(QueuedOperation::new(
                            QueueKind::RestartApply,
                            dependent,
                            flags,
                            Vec::new(),
                        ));
                    }
                }
            },
            QueueKind::Refresh => {
                let succeeded = match self.refresh(RefreshTarget::One(target.clone())) {
                    Ok(report) => report.failed.is_empty(),
                    Err(err) => {
                        tracing::warn!(resource = %target, error = %err, "queued refresh failed");
                        false
                    }
                };
                for dependent in op.dependents {
                    if succeeded {
                        if self.registry.get(&dependent).is_some_and(|r| !r.is_started()) {
                            let options = StartOptions {
                                flags: self.requested_flags(&dependent),
                                ..options
                            };
                            let _ = self.start(&dependent, &options);
                        }
                    } else {
                        self.queue
                            .enqueue(QueuedOperation::refresh(dependent, Vec::new()));
                    }
                }
            }
            QueueKind::StopAll | QueueKind::RefreshAll => {}
        }
    }

    fn requested_flags(&self, name: &str) -> StartFlags {
        self.registry
            .get(name)
            .map_or(StartFlags::ALL, Resource::requested_flags)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Dependencies and execution contexts
    // ─────────────────────────────────────────────────────────────────────────

    /// Recomputes every resource's missing dependencies.
    pub fn check_dependencies(&mut self) -> DependencyReport {
        self.resolver.check_all(&mut self.registry)
    }

    /// Strictest minimum client version among running resources.
    #[must_use]
    pub fn min_client_requirement(&self) -> Option<ClientVersion> {
        self.resolver.host_min_requirement()
    }

    /// Records that the execution host opened `handle` for `name`.
    ///
    /// # Errors
    ///
    /// [`ResourceError::NotFound`] if `name` is not registered.
    pub fn notify_context_opened(&mut self, name: &str, handle: ContextHandle) -> ResourceResult<()> {
        self.registry.associate_context(name, handle)?;
        tracing::debug!(resource = %name, context = %handle, "context opened");
        Ok(())
    }

    /// Records that the execution host closed `handle`.
    ///
    /// Closing the context of a running resource is unexpected: the resource
    /// is queued for a stop. Returns the owning resource, if any.
    pub fn notify_context_closed(&mut self, handle: ContextHandle) -> Option<String> {
        let name = self.registry.find_by_context(handle)?.name().to_string();
        self.registry.dissociate_context(&name);

        if self.registry.get(&name).is_some_and(Resource::is_started) {
            tracing::warn!(resource = %name, context = %handle, "context closed unexpectedly");
            self.queue.enqueue(QueuedOperation::stop(name.clone()));
        }
        Some(name)
    }

    /// Resolves a `:resource/path` reference made from `current`.
    ///
    /// # Errors
    ///
    /// - [`ResourceError::InvalidPath`] if the reference is malformed
    /// - [`ResourceError::NotFound`] if the resource is not registered
    pub fn resolve_path(&self, input: &str, current: Option<&str>) -> ResourceResult<ResourcePath> {
        let parsed = parse_resource_path(input, current)
            .ok_or_else(|| ResourceError::InvalidPath(input.to_string()))?;
        let resource = self
            .registry
            .get(&parsed.resource)
            .ok_or_else(|| ResourceError::not_found(&parsed.resource))?;
        Ok(ResourcePath {
            resource: resource.name().to_string(),
            path: parsed.path,
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Lookups and reports
    // ─────────────────────────────────────────────────────────────────────────

    /// Looks a resource up by name, ignoring case.
    #[must_use]
    pub fn resource(&self, name: &str) -> Option<&Resource> {
        self.registry.get(name)
    }

    /// Looks a resource up by sync id.
    #[must_use]
    pub fn resource_by_sync_id(&self, id: SyncId) -> Option<&Resource> {
        self.registry.find_by_sync_id(id)
    }

    /// Looks a resource up by execution context.
    #[must_use]
    pub fn resource_by_context(&self, handle: ContextHandle) -> Option<&Resource> {
        self.registry.find_by_context(handle)
    }

    /// Owned copy of every record, in registration order.
    #[must_use]
    pub fn resources(&self) -> Vec<Resource> {
        self.registry.snapshot()
    }

    /// Read-only registry access.
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// What a joining client must synchronize: every running resource.
    #[must_use]
    pub fn client_snapshot(&self) -> Vec<ClientResourceInfo> {
        self.registry
            .iter()
            .filter(|resource| resource.is_started())
            .filter_map(|resource| {
                Some(ClientResourceInfo {
                    name: resource.name().to_string(),
                    sync_id: resource.sync_id()?,
                    parts: resource.active_parts().client_parts(),
                })
            })
            .collect()
    }

    /// Administrative listing.
    #[must_use]
    pub fn list(&self, filter: ListFilter) -> Vec<ResourceInfo> {
        let now = self.clock.now();
        self.registry
            .iter()
            .filter(|resource| filter.matches(resource))
            .map(|resource| ResourceInfo::of(resource, now))
            .collect()
    }

    /// Host-wide start counters.
    #[must_use]
    pub fn counters(&self) -> StatusCounters {
        self.controller.counters()
    }

    /// Number of sync ids currently allocated.
    #[must_use]
    pub fn sync_ids_in_use(&self) -> usize {
        self.controller.sync_ids_in_use()
    }

    /// Sum of registered resources' on-disk sizes.
    #[must_use]
    pub fn total_stored_size(&self) -> u64 {
        self.registry.total_stored_size()
    }

    pub(crate) fn open_stored(&self, name: &str) -> Result<Option<StoredResource>, StorageError> {
        match self.storage.open(name) {
            Ok(stored) => Ok(Some(stored)),
            Err(StorageError::NotFound(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }
}
