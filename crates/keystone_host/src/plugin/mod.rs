//! Plugin system for extensible host functionality.
//!
//! Plugins are the unit of composition in the host. Resource management,
//! logging and timekeeping are all delivered as plugins; the [`Host`] only
//! orders them by dependency and drives their lifecycle.
//!
//! # Example
//!
//! ```
//! use keystone_host::plugin::{Plugin, PluginId};
//! use keystone_host::host::Host;
//! use keystone_host::state::HostState;
//!
//! struct CurrentMap(String);
//! impl HostState for CurrentMap {}
//!
//! struct LogPlugin;
//! impl Plugin for LogPlugin {
//!     fn build(&self, _host: &mut Host) {}
//! }
//!
//! struct GamemodePlugin {
//!     map: String,
//! }
//!
//! impl Plugin for GamemodePlugin {
//!     fn build(&self, host: &mut Host) {
//!         host.insert_state(CurrentMap(self.map.clone()));
//!     }
//!
//!     fn dependencies(&self) -> Vec<PluginId> {
//!         vec![PluginId::of::<LogPlugin>()]
//!     }
//! }
//!
//! let mut host = Host::new();
//! host.add_plugins(LogPlugin)
//!     .add_plugins(GamemodePlugin { map: "stadium".into() });
//! host.finish().unwrap();
//! ```

mod schedule;

pub use schedule::{Schedule, ScheduleId};

use core::any::TypeId;
use std::sync::Arc;

use crate::host::Host;

// ─────────────────────────────────────────────────────────────────────────────
// PluginId
// ─────────────────────────────────────────────────────────────────────────────

/// Unique identifier for a plugin type.
///
/// Based on [`TypeId`], so each plugin type has exactly one `PluginId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PluginId {
    type_id: TypeId,
    type_name: &'static str,
}

impl PluginId {
    /// Creates a `PluginId` for the given plugin type.
    #[must_use]
    pub fn of<P: Plugin>() -> Self {
        Self {
            type_id: TypeId::of::<P>(),
            type_name: core::any::type_name::<P>(),
        }
    }

    /// Returns the underlying `TypeId`.
    #[must_use]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Returns the type name for debugging.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Plugin Trait
// ─────────────────────────────────────────────────────────────────────────────

/// A unit of host functionality.
///
/// Plugins follow a strict lifecycle managed by the host:
///
/// 1. **Build Phase** - `build()` is called in dependency order
/// 2. **Ready Phase** - `ready()` is called in dependency order
/// 3. **Tick Phase** - `update()` is called for every schedule the plugin subscribed to
/// 4. **Cleanup Phase** - `cleanup()` is called in reverse dependency order
pub trait Plugin: Send + Sync + 'static {
    /// Configures the host. Called once, in dependency order.
    fn build(&self, host: &mut Host);

    /// Called after every plugin has been built.
    fn ready(&self, _host: &mut Host) {}

    /// Called when a schedule this plugin subscribed to is ticked.
    ///
    /// Only called for schedules returned by [`tick_schedules()`](Self::tick_schedules).
    fn update(&self, _host: &mut Host, _schedule: ScheduleId) {}

    /// Called when the host shuts down, dependents before dependencies.
    fn cleanup(&self, _host: &mut Host) {}

    /// Declares which schedules this plugin wants updates on.
    fn tick_schedules(&self) -> Vec<ScheduleId> {
        Vec::new()
    }

    /// Returns the plugin's name for logs and error messages.
    fn name(&self) -> &str {
        core::any::type_name::<Self>()
    }

    /// Declares plugins that must be built before this one.
    fn dependencies(&self) -> Vec<PluginId> {
        Vec::new()
    }

    /// Returns true if this plugin can only be added once.
    fn is_unique(&self) -> bool {
        true
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Plugins Trait (for add_plugins polymorphism)
// ─────────────────────────────────────────────────────────────────────────────

/// Types that can be added to a host: a single [`Plugin`] or a [`PluginGroupBuilder`].
pub trait Plugins {
    /// Adds these plugins to the host.
    fn add_to_host(self, host: &mut Host);
}

impl<P: Plugin> Plugins for P {
    fn add_to_host(self, host: &mut Host) {
        host.add_plugin_shared(PluginId::of::<P>(), Arc::new(self));
    }
}

impl Plugins for PluginGroupBuilder {
    fn add_to_host(self, host: &mut Host) {
        for entry in self.plugins {
            host.add_plugin_shared(entry.id, entry.plugin);
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// PluginGroup
// ─────────────────────────────────────────────────────────────────────────────

/// A bundle of plugins that can be added together.
pub trait PluginGroup {
    /// Returns the plugins in this group.
    fn build(self) -> PluginGroupBuilder;
}

pub(crate) struct GroupEntry {
    pub(crate) id: PluginId,
    pub(crate) plugin: Arc<dyn Plugin>,
}

/// Builder for customizing plugin groups.
#[derive(Default)]
pub struct PluginGroupBuilder {
    pub(crate) plugins: Vec<GroupEntry>,
}

impl PluginGroupBuilder {
    /// Creates a new empty plugin group builder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            plugins: Vec::new(),
        }
    }

    /// Adds a plugin to the end of the group.
    #[must_use]
    #[expect(
        clippy::should_implement_trait,
        reason = "This is a builder method, not std::ops::Add"
    )]
    pub fn add<P: Plugin>(mut self, plugin: P) -> Self {
        self.plugins.push(GroupEntry {
            id: PluginId::of::<P>(),
            plugin: Arc::new(plugin),
        });
        self
    }

    /// Removes a plugin from the group by type. No-op when absent.
    #[must_use]
    pub fn disable<P: Plugin>(mut self) -> Self {
        let target = PluginId::of::<P>();
        self.plugins.retain(|entry| entry.id != target);
        self
    }

    /// Returns true if the group contains a plugin of type `P`.
    #[must_use]
    pub fn contains<P: Plugin>(&self) -> bool {
        let target = PluginId::of::<P>();
        self.plugins.iter().any(|entry| entry.id == target)
    }

    /// Returns the number of plugins in the group.
    #[must_use]
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    /// Returns true if the group contains no plugins.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}
