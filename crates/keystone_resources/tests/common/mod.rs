//! Shared helpers for resource manager integration tests.

#![expect(dead_code, reason = "each test binary uses a different subset")]

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use hashbrown::{HashMap, HashSet};
use keystone_resources::prelude::*;
use parking_lot::Mutex;

/// Execution host that records every call and can be told to fail.
#[derive(Default)]
pub struct RecordingHost {
    next: AtomicU64,
    failing: Mutex<HashSet<String>>,
    created: Mutex<Vec<ContextRequest>>,
    destroyed: Mutex<Vec<ContextHandle>>,
    live: Mutex<HashMap<ContextHandle, String>>,
}

impl RecordingHost {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next: AtomicU64::new(1),
            ..Self::default()
        })
    }

    /// Makes context creation fail for `name` until [`heal`](Self::heal).
    pub fn fail(&self, name: &str) {
        self.failing.lock().insert(name.to_lowercase());
    }

    pub fn heal(&self, name: &str) {
        self.failing.lock().remove(&name.to_lowercase());
    }

    /// Names of every context ever created, in order.
    pub fn created(&self) -> Vec<String> {
        self.created
            .lock()
            .iter()
            .map(|request| request.name.clone())
            .collect()
    }

    pub fn requests(&self) -> Vec<ContextRequest> {
        self.created.lock().clone()
    }

    pub fn destroyed(&self) -> Vec<ContextHandle> {
        self.destroyed.lock().clone()
    }

    /// Number of contexts currently alive.
    pub fn live(&self) -> usize {
        self.live.lock().len()
    }
}

impl ExecutionHost for RecordingHost {
    fn create(&self, request: &ContextRequest) -> Result<ContextHandle, ContextError> {
        if self.failing.lock().contains(&request.name.to_lowercase()) {
            return Err(ContextError::new(format!("script error in {}", request.name)));
        }
        let handle = ContextHandle(self.next.fetch_add(1, Ordering::SeqCst));
        self.created.lock().push(request.clone());
        self.live.lock().insert(handle, request.name.clone());
        Ok(handle)
    }

    fn destroy(&self, handle: ContextHandle) {
        self.live.lock().remove(&handle);
        self.destroyed.lock().push(handle);
    }
}

/// A stored resource depending on `deps`.
pub fn stored(deps: &[&str]) -> StoredResource {
    let manifest = deps
        .iter()
        .fold(ResourceManifest::default(), |manifest, dep| {
            manifest.with_dependency(*dep)
        });
    StoredResource::new(manifest, 100)
}

/// Everything a test needs to drive a manager.
pub struct Fixture {
    pub manager: ResourceManager,
    pub storage: Arc<MemoryStorage>,
    pub host: Arc<RecordingHost>,
}

impl Fixture {
    /// Stores `resources` (name, dependencies) and loads them all.
    pub fn new(resources: &[(&str, &[&str])]) -> Self {
        Self::with_config(resources, ManagerConfig::default())
    }

    pub fn with_config(resources: &[(&str, &[&str])], config: ManagerConfig) -> Self {
        let storage = Arc::new(MemoryStorage::new());
        for (name, deps) in resources {
            storage.insert(*name, stored(deps));
        }
        let host = RecordingHost::new();
        let mut manager =
            ResourceManager::new(storage.clone(), host.clone()).with_config(config);
        let report = manager.load_all();
        assert!(report.is_success(), "load failed: {:?}", report.failed);
        Self {
            manager,
            storage,
            host,
        }
    }

    pub fn state(&self, name: &str) -> ResourceState {
        self.manager
            .resource(name)
            .map(Resource::state)
            .unwrap_or_else(|| panic!("{name} is not registered"))
    }

    pub fn is_started(&self, name: &str) -> bool {
        self.manager.resource(name).is_some_and(Resource::is_started)
    }

    pub fn running(&self) -> Vec<String> {
        self.manager
            .list(ListFilter::Running)
            .into_iter()
            .map(|info| info.name)
            .collect()
    }
}
