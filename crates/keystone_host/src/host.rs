//! The host runtime.
//!
//! The [`Host`] is the long-running process every Keystone plugin lives in.
//! It owns the typed [`StateMap`], orders plugins by their declared
//! dependencies and drives them through their lifecycle:
//!
//! 1. **Dependency Resolution** - Validate and topologically sort plugins
//! 2. **Build Phase** - Call `plugin.build()` in dependency order
//! 3. **Ready Phase** - Call `plugin.ready()` in dependency order
//! 4. **Tick Loop** - `host.tick::<S>()` calls `plugin.update()` on subscribers
//! 5. **Cleanup Phase** - Call `plugin.cleanup()` in reverse order
//!
//! Ticks never run concurrently with themselves: every tick takes `&mut Host`,
//! so anything a plugin does from `update()` is serialized on the tick thread.

use std::collections::VecDeque;
use std::sync::Arc;

use hashbrown::{HashMap, HashSet};

use crate::error::HostError;
use crate::plugin::{Plugin, PluginId, Plugins, ScheduleId};
use crate::state::{HostState, StateMap};

/// Represents the build state of the host.
///
/// Progresses linearly: `NotStarted` → `Building` → `Built`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum BuildState {
    #[default]
    NotStarted,
    Building,
    Built,
}

/// Internal entry for a registered plugin.
struct PluginEntry {
    id: PluginId,
    plugin: Arc<dyn Plugin>,
    name: String,
}

/// The runtime that orchestrates plugins and owns host state.
///
/// # Example
///
/// ```
/// use keystone_host::host::Host;
/// use keystone_host::plugin::{Plugin, ScheduleId};
/// use keystone_host::state::HostState;
///
/// struct Heartbeat;
///
/// #[derive(Default)]
/// struct Beats(u32);
/// impl HostState for Beats {}
///
/// struct HeartbeatPlugin;
///
/// impl Plugin for HeartbeatPlugin {
///     fn build(&self, host: &mut Host) {
///         host.insert_state(Beats::default());
///     }
///
///     fn tick_schedules(&self) -> Vec<ScheduleId> {
///         vec![ScheduleId::of::<Heartbeat>()]
///     }
///
///     fn update(&self, host: &mut Host, _schedule: ScheduleId) {
///         if let Some(beats) = host.state_mut::<Beats>() {
///             beats.0 += 1;
///         }
///     }
/// }
///
/// let mut host = Host::new();
/// host.add_plugins(HeartbeatPlugin);
/// host.finish().unwrap();
/// host.tick::<Heartbeat>();
/// host.tick::<Heartbeat>();
/// assert_eq!(host.state::<Beats>().unwrap().0, 2);
/// ```
pub struct Host {
    state: StateMap,

    /// Plugins pending build (not yet sorted).
    pending_plugins: Vec<PluginEntry>,

    /// Plugins that have been built, in dependency order.
    built_plugins: Vec<PluginEntry>,

    /// Plugin ids that have been added (for duplicate detection).
    plugin_ids: HashSet<PluginId>,

    /// Maps schedule → indices into `built_plugins`, in dependency order.
    schedule_registry: HashMap<ScheduleId, Vec<usize>>,

    build_state: BuildState,

    /// Registration errors surfaced by the next `finish()`.
    deferred_errors: Vec<HostError>,
}

impl Default for Host {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for Host {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Host")
            .field("state", &self.state)
            .field("pending_plugins", &self.pending_plugins.len())
            .field("built_plugins", &self.built_plugins.len())
            .field("build_state", &self.build_state)
            .finish()
    }
}

impl Host {
    /// Creates a new empty host.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: StateMap::new(),
            pending_plugins: Vec::new(),
            built_plugins: Vec::new(),
            plugin_ids: HashSet::new(),
            schedule_registry: HashMap::new(),
            build_state: BuildState::NotStarted,
            deferred_errors: Vec::new(),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Plugin Management
    // ─────────────────────────────────────────────────────────────────────────

    /// Adds one or more plugins to the host.
    ///
    /// Adding a unique plugin twice is reported by the next [`finish()`](Self::finish).
    pub fn add_plugins<P: Plugins>(&mut self, plugins: P) -> &mut Self {
        plugins.add_to_host(self);
        self
    }

    pub(crate) fn add_plugin_shared(&mut self, id: PluginId, plugin: Arc<dyn Plugin>) {
        let name = plugin.name().to_string();

        if plugin.is_unique() && self.plugin_ids.contains(&id) {
            tracing::warn!(plugin = %name, "unique plugin added twice");
            self.deferred_errors.push(HostError::DuplicatePlugin(name));
            return;
        }
        self.plugin_ids.insert(id);

        let entry = PluginEntry { id, plugin, name };

        // Plugins added while building are built on the spot.
        if self.build_state == BuildState::Building {
            let plugin = Arc::clone(&entry.plugin);
            plugin.build(self);
            self.built_plugins.push(entry);
        } else {
            self.pending_plugins.push(entry);
        }
    }

    /// Returns true if a plugin of the given type has been added.
    #[must_use]
    pub fn has_plugin<P: Plugin>(&self) -> bool {
        self.plugin_ids.contains(&PluginId::of::<P>())
    }

    /// Returns the names of built plugins in dependency order.
    #[must_use]
    pub fn plugin_names(&self) -> Vec<&str> {
        self.built_plugins
            .iter()
            .map(|entry| entry.name.as_str())
            .collect()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Host State
    // ─────────────────────────────────────────────────────────────────────────

    /// Inserts host state, returning the previous value of the same type.
    pub fn insert_state<S: HostState>(&mut self, value: S) -> Option<S> {
        self.state.insert(value)
    }

    /// Returns a reference to host state of type `S`.
    #[must_use]
    pub fn state<S: HostState>(&self) -> Option<&S> {
        self.state.get::<S>()
    }

    /// Returns a mutable reference to host state of type `S`.
    #[must_use]
    pub fn state_mut<S: HostState>(&mut self) -> Option<&mut S> {
        self.state.get_mut::<S>()
    }

    /// Removes host state of type `S`.
    pub fn remove_state<S: HostState>(&mut self) -> Option<S> {
        self.state.remove::<S>()
    }

    /// Returns true if host state of type `S` exists.
    #[must_use]
    pub fn contains_state<S: HostState>(&self) -> bool {
        self.state.contains::<S>()
    }

    /// Returns whether [`finish()`](Self::finish) has completed.
    #[must_use]
    pub fn is_built(&self) -> bool {
        self.build_state == BuildState::Built
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Tick Methods
    // ─────────────────────────────────────────────────────────────────────────

    /// Ticks the schedule identified by the marker type `S`.
    pub fn tick<S: 'static>(&mut self) {
        self.tick_schedule(ScheduleId::of::<S>());
    }

    /// Ticks the given schedule. Subscribers run in dependency order.
    pub fn tick_schedule(&mut self, schedule: ScheduleId) {
        let Some(indices) = self.schedule_registry.get(&schedule) else {
            return;
        };

        let subscribers: Vec<Arc<dyn Plugin>> = indices
            .iter()
            .map(|&idx| Arc::clone(&self.built_plugins[idx].plugin))
            .collect();

        for plugin in subscribers {
            plugin.update(self, schedule);
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Lifecycle Methods
    // ─────────────────────────────────────────────────────────────────────────

    /// Orders, builds and readies all plugins.
    ///
    /// # Errors
    ///
    /// - [`HostError::AlreadyBuilt`] if called more than once
    /// - [`HostError::DuplicatePlugin`] if a unique plugin was added twice
    /// - [`HostError::MissingDependency`] if a dependency was never added
    /// - [`HostError::DependencyCycle`] if plugin dependencies form a cycle
    pub fn finish(&mut self) -> Result<(), HostError> {
        if self.build_state != BuildState::NotStarted {
            return Err(HostError::AlreadyBuilt);
        }
        if let Some(err) = self.deferred_errors.drain(..).next() {
            return Err(err);
        }

        let sorted = self.sort_plugins_by_dependencies()?;

        self.build_state = BuildState::Building;
        for entry in sorted {
            tracing::debug!(plugin = %entry.name, "building plugin");
            let plugin = Arc::clone(&entry.plugin);
            plugin.build(self);
            self.built_plugins.push(entry);
        }

        let built: Vec<Arc<dyn Plugin>> = self
            .built_plugins
            .iter()
            .map(|entry| Arc::clone(&entry.plugin))
            .collect();
        for plugin in built {
            plugin.ready(self);
        }

        self.build_schedule_registry();
        self.build_state = BuildState::Built;
        tracing::info!(plugins = self.built_plugins.len(), "host ready");
        Ok(())
    }

    fn build_schedule_registry(&mut self) {
        self.schedule_registry.clear();
        for (idx, entry) in self.built_plugins.iter().enumerate() {
            for schedule in entry.plugin.tick_schedules() {
                self.schedule_registry
                    .entry(schedule)
                    .or_default()
                    .push(idx);
            }
        }
    }

    /// Cleans up all plugins in reverse dependency order.
    pub fn cleanup(&mut self) {
        let built: Vec<Arc<dyn Plugin>> = self
            .built_plugins
            .iter()
            .rev()
            .map(|entry| Arc::clone(&entry.plugin))
            .collect();
        for plugin in built {
            plugin.cleanup(self);
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Internal: Dependency Resolution
    // ─────────────────────────────────────────────────────────────────────────

    /// Sorts pending plugins with Kahn's algorithm, keeping insertion order
    /// among plugins that do not depend on each other.
    fn sort_plugins_by_dependencies(&mut self) -> Result<Vec<PluginEntry>, HostError> {
        let n = self.pending_plugins.len();
        if n == 0 {
            return Ok(Vec::new());
        }

        let index_of: HashMap<PluginId, usize> = self
            .pending_plugins
            .iter()
            .enumerate()
            .map(|(i, entry)| (entry.id, i))
            .collect();

        let mut in_degree = vec![0usize; n];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];

        for (i, entry) in self.pending_plugins.iter().enumerate() {
            for dep in entry.plugin.dependencies() {
                if let Some(&dep_idx) = index_of.get(&dep) {
                    dependents[dep_idx].push(i);
                    in_degree[i] += 1;
                } else if !self.built_plugins.iter().any(|built| built.id == dep) {
                    return Err(HostError::MissingDependency {
                        plugin: entry.name.clone(),
                        dependency: dep.type_name().to_string(),
                    });
                }
            }
        }

        let mut ready: VecDeque<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
        let mut order: Vec<usize> = Vec::with_capacity(n);

        while let Some(idx) = ready.pop_front() {
            order.push(idx);
            for &dependent in &dependents[idx] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    ready.push_back(dependent);
                }
            }
        }

        if order.len() != n {
            let in_cycle = in_degree
                .iter()
                .enumerate()
                .filter(|(_, deg)| **deg > 0)
                .map(|(i, _)| self.pending_plugins[i].name.clone())
                .collect();
            return Err(HostError::DependencyCycle(in_cycle));
        }

        let mut slots: Vec<Option<PluginEntry>> =
            core::mem::take(&mut self.pending_plugins).into_iter().map(Some).collect();
        Ok(order
            .into_iter()
            .filter_map(|idx| slots[idx].take())
            .collect())
    }
}
