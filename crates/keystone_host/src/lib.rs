//! The plugin host runtime for Keystone.
//!
//! `keystone_host` provides the long-running process that every other
//! Keystone crate plugs into:
//!
//! - [`plugin`] - Plugin trait, plugin groups and schedule identifiers
//! - [`state`] - Typed host state shared between plugins
//! - [`host`] - The [`Host`](host::Host) runtime that orders, builds and ticks plugins
//! - [`error`] - Errors raised while assembling the host
//!
//! # Example
//!
//! ```
//! use keystone_host::host::Host;
//! use keystone_host::plugin::Plugin;
//! use keystone_host::state::HostState;
//!
//! #[derive(Default)]
//! struct Motd(String);
//! impl HostState for Motd {}
//!
//! struct MotdPlugin;
//!
//! impl Plugin for MotdPlugin {
//!     fn build(&self, host: &mut Host) {
//!         host.insert_state(Motd("welcome".into()));
//!     }
//! }
//!
//! let mut host = Host::new();
//! host.add_plugins(MotdPlugin);
//! host.finish().unwrap();
//! assert_eq!(host.state::<Motd>().unwrap().0, "welcome");
//! ```

/// Errors raised while assembling the host.
pub mod error;

/// The host runtime.
pub mod host;

/// Plugin trait and plugin groups.
pub mod plugin;

/// Typed host state.
pub mod state;

/// Re-export all common types for easy access.
pub mod prelude {
    pub use crate::error::*;
    pub use crate::host::*;
    pub use crate::plugin::*;
    pub use crate::state::*;
}
