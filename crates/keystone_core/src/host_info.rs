//! Host information plugin.

use keystone_host::host::Host;
use keystone_host::plugin::Plugin;
use keystone_host::state::HostState;

/// Host build information.
///
/// Read-only host state describing the running build.
#[derive(Debug, Clone)]
pub struct HostInfo {
    /// Framework version string.
    pub version: &'static str,
    /// Whether the host was compiled with debug assertions.
    pub debug: bool,
}

impl HostState for HostInfo {}

impl Default for HostInfo {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION"),
            debug: cfg!(debug_assertions),
        }
    }
}

/// Plugin that provides [`HostInfo`].
///
/// Foundational plugin with no dependencies; the other core plugins depend on it.
#[derive(Debug, Default, Clone, Copy)]
pub struct HostInfoPlugin;

impl Plugin for HostInfoPlugin {
    fn build(&self, host: &mut Host) {
        host.insert_state(HostInfo::default());
    }
}
