//! Resource manager configuration.

use serde::{Deserialize, Serialize};

/// Tunables for the [`ResourceManager`](crate::manager::ResourceManager).
///
/// Deserializes with defaults for every missing field.
///
/// # Example
///
/// ```
/// use keystone_resources::config::ManagerConfig;
///
/// let config = ManagerConfig::from_json(r#"{ "show_refresh_timing": true }"#).unwrap();
/// assert!(config.show_refresh_timing);
/// assert!(config.load_on_ready);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Load every resource in storage when the host becomes ready.
    pub load_on_ready: bool,
    /// Start every loaded resource when the host becomes ready.
    pub start_on_ready: bool,
    /// After a refresh, start resources whose start was deferred on
    /// dependencies that are now registered.
    pub auto_start_deferred: bool,
    /// Let bulk and queued starts proceed with unregistered dependencies.
    pub allow_partial_start: bool,
    /// Measure and log how long refreshes take.
    pub show_refresh_timing: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            load_on_ready: true,
            start_on_ready: false,
            auto_start_deferred: true,
            allow_partial_start: false,
            show_refresh_timing: false,
        }
    }
}

impl ManagerConfig {
    /// Parses a configuration from JSON.
    ///
    /// # Errors
    ///
    /// Returns the parse error when `json` is malformed.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
