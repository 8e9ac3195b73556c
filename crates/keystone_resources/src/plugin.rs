//! Host integration.

use std::sync::Arc;

use keystone_core::{Clock, TimePlugin};
use keystone_host::host::Host;
use keystone_host::plugin::{Plugin, PluginId, Schedule, ScheduleId};

use crate::config::ManagerConfig;
use crate::context::ExecutionHost;
use crate::manager::ResourceManager;
use crate::resource::StartFlags;
use crate::storage::ResourceStorage;

/// Schedule on which queued lifecycle operations are applied.
///
/// Tick it once per server frame with `host.tick::<ProcessQueue>()`.
pub struct ProcessQueue;

impl Schedule for ProcessQueue {}

/// Plugin that provides the [`ResourceManager`].
///
/// # State Provided
///
/// | State | Description |
/// |-------|-------------|
/// | [`ResourceManager`] | Registry, dependency resolution and lifecycle queue |
///
/// # Dependencies
///
/// - [`TimePlugin`]
///
/// # Schedules
///
/// - [`ProcessQueue`] drains the lifecycle queue
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use keystone_host::host::Host;
/// use keystone_host::plugin::PluginGroup;
/// use keystone_core::MinimalPlugins;
/// use keystone_resources::prelude::*;
///
/// let mut host = Host::new();
/// host.add_plugins(MinimalPlugins.build())
///     .add_plugins(ResourcesPlugin::new(Arc::new(MemoryStorage::new()), contexts));
/// host.finish().unwrap();
///
/// host.tick::<ProcessQueue>();
/// ```
pub struct ResourcesPlugin {
    storage: Arc<dyn ResourceStorage>,
    contexts: Arc<dyn ExecutionHost>,
    config: ManagerConfig,
}

impl ResourcesPlugin {
    /// Creates the plugin with the default configuration.
    #[must_use]
    pub fn new(storage: Arc<dyn ResourceStorage>, contexts: Arc<dyn ExecutionHost>) -> Self {
        Self {
            storage,
            contexts,
            config: ManagerConfig::default(),
        }
    }

    /// Replaces the configuration.
    #[must_use]
    pub fn with_config(mut self, config: ManagerConfig) -> Self {
        self.config = config;
        self
    }
}

impl Plugin for ResourcesPlugin {
    fn build(&self, host: &mut Host) {
        let clock = host.state::<Clock>().cloned().unwrap_or_default();
        let manager = ResourceManager::new(Arc::clone(&self.storage), Arc::clone(&self.contexts))
            .with_config(self.config.clone())
            .with_clock(clock);
        host.insert_state(manager);
    }

    fn ready(&self, host: &mut Host) {
        let Some(manager) = host.state_mut::<ResourceManager>() else {
            return;
        };
        if manager.config().load_on_ready {
            manager.load_all();
        }
        if manager.config().start_on_ready {
            manager.start_all(StartFlags::ALL);
        }
    }

    fn update(&self, host: &mut Host, schedule: ScheduleId) {
        if schedule != ProcessQueue::id() {
            return;
        }
        if let Some(manager) = host.state_mut::<ResourceManager>() {
            manager.process_queue();
        }
    }

    fn cleanup(&self, host: &mut Host) {
        if let Some(manager) = host.state_mut::<ResourceManager>() {
            let report = manager.stop_all();
            tracing::info!(stopped = report.succeeded.len(), "resource manager shut down");
        }
    }

    fn tick_schedules(&self) -> Vec<ScheduleId> {
        vec![ProcessQueue::id()]
    }

    fn dependencies(&self) -> Vec<PluginId> {
        vec![PluginId::of::<TimePlugin>()]
    }
}
