//! Core infrastructure plugins for Keystone.
//!
//! This crate provides foundational plugins that most Keystone hosts need:
//!
//! - [`HostInfoPlugin`] - Host metadata and build information
//! - [`TimePlugin`] - Time utilities with mockable clock for testing
//! - [`TracingPlugin`] - Logging and observability via the `tracing` crate
//! - [`DefaultPlugins`] - Convenient bundle of all infrastructure plugins
//!
//! # Feature Flags
//!
//! - `test-utils` - Enables [`MockClock`] for deterministic time testing
//!
//! # Example
//!
//! ```
//! use keystone_host::host::Host;
//! use keystone_host::plugin::PluginGroup;
//! use keystone_core::{Clock, MinimalPlugins};
//!
//! let mut host = Host::new();
//! host.add_plugins(MinimalPlugins.build());
//! host.finish().unwrap();
//! assert!(host.contains_state::<Clock>());
//! ```
//!
//! # Individual Plugin Usage
//!
//! ```
//! use keystone_host::host::Host;
//! use keystone_core::{HostInfoPlugin, TimePlugin, TracingPlugin};
//! use tracing::Level;
//!
//! let mut host = Host::new();
//! host.add_plugins(HostInfoPlugin)
//!     .add_plugins(TimePlugin::default())
//!     .add_plugins(TracingPlugin::default().with_level(Level::DEBUG));
//! host.finish().unwrap();
//! ```

mod host_info;
mod time;
mod tracing_plugin;

pub use host_info::{HostInfo, HostInfoPlugin};
pub use time::{Clock, ClockProvider, TimePlugin};
pub use tracing_plugin::{TracingConfig, TracingFormat, TracingPlugin};

#[cfg(any(test, feature = "test-utils"))]
pub use time::MockClock;

use keystone_host::plugin::{PluginGroup, PluginGroupBuilder};

/// Default plugins for most Keystone hosts.
///
/// Includes:
/// - [`HostInfoPlugin`] - Host metadata
/// - [`TimePlugin`] - Time utilities
/// - [`TracingPlugin`] - Logging and observability
///
/// Use the builder to customize:
///
/// ```
/// use keystone_host::plugin::PluginGroup;
/// use keystone_core::{DefaultPlugins, TracingPlugin};
///
/// let plugins = DefaultPlugins.build().disable::<TracingPlugin>();
/// assert_eq!(plugins.len(), 2);
/// ```
pub struct DefaultPlugins;

impl PluginGroup for DefaultPlugins {
    fn build(self) -> PluginGroupBuilder {
        PluginGroupBuilder::new()
            .add(HostInfoPlugin)
            .add(TimePlugin::default())
            .add(TracingPlugin::default())
    }
}

/// Minimal plugins for headless or testing scenarios.
///
/// Includes only [`HostInfoPlugin`] and [`TimePlugin`]; no subscriber is
/// installed, which keeps test output quiet.
pub struct MinimalPlugins;

impl PluginGroup for MinimalPlugins {
    fn build(self) -> PluginGroupBuilder {
        PluginGroupBuilder::new()
            .add(HostInfoPlugin)
            .add(TimePlugin::default())
    }
}
